use crow_http::Transport;
use futures_lite::{AsyncRead, AsyncWrite};
use std::{
    io,
    net::Shutdown,
    pin::Pin,
    task::{Context, Poll},
};

/// The listening socket: TCP by address and port, or a unix domain socket
/// by path.
#[derive(Debug)]
pub enum Listener {
    /// a TCP listener
    Tcp(async_net::TcpListener),
    /// a unix domain socket listener
    #[cfg(unix)]
    Unix(async_net::unix::UnixListener),
}

impl Listener {
    /// bind a TCP listener
    pub async fn bind_tcp(addr: &str, port: u16) -> io::Result<Self> {
        async_net::TcpListener::bind((addr, port)).await.map(Self::Tcp)
    }

    /// bind a unix domain socket listener, replacing a stale socket file
    #[cfg(unix)]
    pub async fn bind_unix(path: &std::path::Path) -> io::Result<Self> {
        let _ = std::fs::remove_file(path);
        async_net::unix::UnixListener::bind(path).map(Self::Unix)
    }

    /// the bound TCP port, when listening on TCP
    pub fn port(&self) -> Option<u16> {
        match self {
            Self::Tcp(listener) => listener.local_addr().ok().map(|addr| addr.port()),
            #[cfg(unix)]
            Self::Unix(_) => None,
        }
    }

    /// accept one connection
    pub async fn accept(&self) -> io::Result<Stream> {
        match self {
            Self::Tcp(listener) => {
                let (stream, _) = listener.accept().await?;
                let _ = stream.set_nodelay(true);
                Ok(Stream::Tcp(stream))
            }
            #[cfg(unix)]
            Self::Unix(listener) => {
                let (stream, _) = listener.accept().await?;
                Ok(Stream::Unix(stream))
            }
        }
    }

    /// remove the socket file of a unix listener; no-op for TCP
    pub fn clean_up(&self) {
        #[cfg(unix)]
        if let Self::Unix(listener) = self
            && let Ok(addr) = listener.local_addr()
            && let Some(path) = addr.as_pathname()
        {
            log::info!("deleting {}", path.display());
            let _ = std::fs::remove_file(path);
        }
    }
}

/// One accepted connection's byte stream. Cheaply cloneable; clones share
/// the underlying socket, which is what lets the idle-timeout task shut a
/// connection down from outside its serve loop.
#[derive(Debug, Clone)]
pub enum Stream {
    /// a TCP connection
    Tcp(async_net::TcpStream),
    /// a unix domain socket connection
    #[cfg(unix)]
    Unix(async_net::unix::UnixStream),
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(unix)]
            Stream::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(unix)]
            Stream::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(unix)]
            Stream::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(stream) => Pin::new(stream).poll_close(cx),
            #[cfg(unix)]
            Stream::Unix(stream) => Pin::new(stream).poll_close(cx),
        }
    }
}

impl Transport for Stream {
    fn shutdown(&self) {
        let result = match self {
            Stream::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Stream::Unix(stream) => stream.shutdown(Shutdown::Both),
        };
        if let Err(error) = result {
            log::debug!("shutdown failed: {error}");
        }
    }

    fn peer_addr(&self) -> Option<String> {
        match self {
            Stream::Tcp(stream) => stream.peer_addr().ok().map(|addr| addr.to_string()),
            #[cfg(unix)]
            Stream::Unix(_) => None,
        }
    }
}
