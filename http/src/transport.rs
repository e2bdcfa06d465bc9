use futures_lite::{AsyncRead, AsyncWrite};

/// The byte stream a connection is served over.
///
/// Implemented by the server's TCP and unix-socket streams and by the
/// in-memory transport in `crow-testing`. `Clone` is required because the
/// idle-timeout task holds its own handle to shut the stream down; all of
/// the implementing stream types are cheaply cloneable handles to a shared
/// socket.
pub trait Transport: AsyncRead + AsyncWrite + Clone + Send + Sync + Unpin + 'static {
    /// Immediately shut down both directions of the stream. Pending and
    /// future reads and writes fail or return end-of-stream. Used by the
    /// idle timeout; never reported to the handler.
    fn shutdown(&self);

    /// the peer's address formatted as a string, when the transport knows
    /// one
    fn peer_addr(&self) -> Option<String> {
        None
    }
}
