use crate::{CloseCode, Frame, FrameDecoder, Handshake, Opcode, WebSocketRoute, encode_frame};
use crow_http::{StateMap, Transport};
use futures_lite::{AsyncReadExt, AsyncWriteExt, future};
use std::sync::{Arc, Mutex, MutexGuard};
use swansong::Swansong;

const SHUTDOWN_REASON: &str = "Server Application Terminated";

enum Command {
    Send(Opcode, Vec<u8>),
    Close(u16, String),
}

struct HandleInner {
    tx: async_channel::Sender<Command>,
    subprotocol: Option<String>,
    remote_ip: String,
    userdata: Mutex<StateMap>,
}

/// The application's side of a websocket connection.
///
/// Handed to every callback and cloneable into application state; all
/// methods may be called from any thread. Sends enqueue onto the
/// connection's task, which coalesces queued buffers and writes them in
/// FIFO order.
#[derive(Clone)]
pub struct Handle(Arc<HandleInner>);

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("subprotocol", &self.0.subprotocol)
            .field("remote_ip", &self.0.remote_ip)
            .finish_non_exhaustive()
    }
}

impl Handle {
    /// send a text message
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self
            .0
            .tx
            .try_send(Command::Send(Opcode::Text, text.into().into_bytes()));
    }

    /// send a binary message
    pub fn send_binary(&self, data: impl Into<Vec<u8>>) {
        let _ = self
            .0
            .tx
            .try_send(Command::Send(Opcode::Binary, data.into()));
    }

    /// send a ping
    pub fn send_ping(&self, data: impl Into<Vec<u8>>) {
        let _ = self.0.tx.try_send(Command::Send(Opcode::Ping, data.into()));
    }

    /// send an unsolicited pong
    pub fn send_pong(&self, data: impl Into<Vec<u8>>) {
        let _ = self.0.tx.try_send(Command::Send(Opcode::Pong, data.into()));
    }

    /// Initiate a close with a reason and status code. The connection shuts
    /// down once the peer echoes the close.
    pub fn close(&self, reason: impl Into<String>, code: impl Into<u16>) {
        let _ = self
            .0
            .tx
            .try_send(Command::Close(code.into(), reason.into()));
    }

    /// the negotiated subprotocol, if one was selected
    pub fn subprotocol(&self) -> Option<&str> {
        self.0.subprotocol.as_deref()
    }

    /// the peer's address, as a string; empty when unknown
    pub fn remote_ip(&self) -> &str {
        &self.0.remote_ip
    }

    /// State attached by the accept hook, addressable by type. Replaces
    /// the opaque user-data pointer of handler-style websocket APIs.
    pub fn userdata(&self) -> MutexGuard<'_, StateMap> {
        self.0.userdata.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// do two handles refer to the same connection?
    pub fn same(&self, other: &Handle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

enum Event {
    Read(std::io::Result<usize>),
    Command(Option<Command>),
}

/// The connection-side state machine for one upgraded socket.
///
/// Owns the transport; reads race against the outbound command queue, the
/// frame decoder carries partial-frame state between reads, and close
/// semantics follow RFC 6455: the close callback runs exactly once, an
/// unanswered peer close is echoed, and the socket shuts down once both
/// sides have closed. Server shutdown interrupts the race: the connection
/// writes a close frame and winds down without waiting for the peer's
/// echo, so the owning worker can drain.
pub struct Connection<'a, T: Transport> {
    route: &'a WebSocketRoute,
    transport: T,
    decoder: FrameDecoder,
    handle: Handle,
    rx: async_channel::Receiver<Command>,
    swansong: Swansong,
    pending: Vec<Vec<u8>>,
    message: Vec<u8>,
    is_binary: bool,
    has_sent_close: bool,
    has_recv_close: bool,
    close_handler_called: bool,
    shutdown_after_flush: bool,
}

impl<T: Transport> std::fmt::Debug for Connection<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("has_sent_close", &self.has_sent_close)
            .field("has_recv_close", &self.has_recv_close)
            .finish_non_exhaustive()
    }
}

impl<'a, T: Transport> Connection<'a, T> {
    /// Build a connection from a negotiated handshake. The returned
    /// [`Handle`] is the same one the callbacks receive; the caller keeps a
    /// clone for its shutdown registry.
    pub fn new(
        route: &'a WebSocketRoute,
        transport: T,
        handshake: Handshake,
        default_max_payload: u64,
        swansong: Swansong,
    ) -> (Self, Handle) {
        let (tx, rx) = async_channel::unbounded();
        let remote_ip = transport.peer_addr().unwrap_or_default();
        let handle = Handle(Arc::new(HandleInner {
            tx,
            subprotocol: handshake.subprotocol,
            remote_ip,
            userdata: Mutex::new(handshake.userdata),
        }));

        let max_payload = route.max_payload.unwrap_or(default_max_payload);
        let mut decoder = FrameDecoder::new().with_max_payload(max_payload);
        if route.enforce_masking {
            decoder = decoder.with_masking_enforcement();
        }
        let connection = Self {
            route,
            transport,
            decoder,
            handle: handle.clone(),
            rx,
            swansong,
            pending: vec![handshake.response],
            message: Vec::new(),
            is_binary: false,
            has_sent_close: false,
            has_recv_close: false,
            close_handler_called: false,
            shutdown_after_flush: false,
        };
        (connection, handle)
    }

    /// Drive the connection until it closes. `leftover` is whatever the
    /// HTTP layer had read past the upgrade request's header block.
    pub async fn run(mut self, leftover: Vec<u8>) {
        if self.flush().await.is_err() {
            self.fail_io("handshake write failed");
            return;
        }

        if let Some(on_open) = &self.route.on_open {
            on_open(&self.handle);
        }

        if !leftover.is_empty() && !self.ingest(&leftover) {
            self.finish().await;
            return;
        }

        let mut buf = vec![0u8; 4096];
        loop {
            if self.flush().await.is_err() {
                self.fail_io("write failed");
                return;
            }

            if self.shutdown_after_flush || (self.has_sent_close && self.has_recv_close) {
                break;
            }

            let interrupted = self
                .swansong
                .interrupt(future::or(
                    async { Event::Read(self.transport.read(&mut buf).await) },
                    async { Event::Command(self.rx.recv().await.ok()) },
                ))
                .await;

            let Some(event) = interrupted else {
                // server shutdown: flush a close frame on the next loop
                // turn and stop without waiting for the peer's echo
                self.queue_close(CloseCode::NormalClosure.into(), SHUTDOWN_REASON);
                self.shutdown_after_flush = true;
                continue;
            };

            match event {
                Event::Read(Ok(0)) => {
                    self.call_error("connection closed by peer");
                    self.call_close("uncleanly", CloseCode::ClosedAbnormally.into());
                    self.transport.shutdown();
                    return;
                }
                Event::Read(Ok(n)) => {
                    if !self.ingest(&buf[..n]) {
                        break;
                    }
                }
                Event::Read(Err(error)) => {
                    self.call_error(&error.to_string());
                    self.call_close("uncleanly", CloseCode::ClosedAbnormally.into());
                    self.transport.shutdown();
                    return;
                }
                Event::Command(Some(Command::Send(opcode, payload))) => {
                    self.queue_data(opcode, &payload);
                }
                Event::Command(Some(Command::Close(code, reason))) => {
                    self.local_close(code, &reason);
                }
                Event::Command(None) => {
                    // every handle dropped; nothing further can be sent
                    self.local_close(CloseCode::NormalClosure.into(), "");
                }
            }
        }

        self.finish().await;
    }

    async fn finish(&mut self) {
        let _ = self.flush().await;
        self.call_close("uncleanly", CloseCode::ClosedAbnormally.into());
        self.transport.shutdown();
    }

    /// Feed received bytes through the decoder and process the resulting
    /// frames. Returns false when the connection must stop reading.
    fn ingest(&mut self, bytes: &[u8]) -> bool {
        match self.decoder.feed(bytes) {
            Ok(frames) => {
                for frame in frames {
                    if !self.handle_frame(frame) {
                        return false;
                    }
                }
                true
            }
            Err(error) => {
                log::debug!("websocket protocol error: {error}");
                self.call_error(error.message);
                self.queue_close(error.code.into(), "");
                self.call_close("uncleanly", error.code.into());
                self.shutdown_after_flush = true;
                false
            }
        }
    }

    /// Process one frame. Control frames are handled immediately and do
    /// not disturb fragment reassembly.
    fn handle_frame(&mut self, frame: Frame) -> bool {
        match frame.opcode {
            Opcode::Text | Opcode::Binary => {
                self.is_binary = frame.opcode == Opcode::Binary;
                self.message.extend_from_slice(&frame.payload);
                if frame.fin {
                    return self.deliver_message();
                }
            }
            Opcode::Continuation => {
                self.message.extend_from_slice(&frame.payload);
                if frame.fin {
                    return self.deliver_message();
                }
            }
            Opcode::Ping => {
                self.queue_data(Opcode::Pong, &frame.payload);
            }
            Opcode::Pong => {}
            Opcode::Close => {
                let (code, reason) = if frame.payload.len() >= 2 {
                    (
                        u16::from_be_bytes([frame.payload[0], frame.payload[1]]),
                        String::from_utf8_lossy(&frame.payload[2..]).into_owned(),
                    )
                } else {
                    (CloseCode::NoStatusCodePresent.into(), String::new())
                };

                self.has_recv_close = true;
                self.call_close(&reason, code);
                if !self.has_sent_close {
                    // echo the close before shutting down
                    self.queue_close(code, &reason);
                }
                self.shutdown_after_flush = true;
                return false;
            }
        }
        true
    }

    fn deliver_message(&mut self) -> bool {
        let message = std::mem::take(&mut self.message);
        if !self.is_binary && std::str::from_utf8(&message).is_err() {
            self.call_error("text message is not valid utf-8");
            self.queue_close(CloseCode::InconsistentData.into(), "");
            self.call_close("uncleanly", CloseCode::InconsistentData.into());
            self.shutdown_after_flush = true;
            return false;
        }
        if let Some(on_message) = &self.route.on_message {
            on_message(&self.handle, &message, self.is_binary);
        }
        true
    }

    fn local_close(&mut self, code: u16, reason: &str) {
        if self.has_sent_close {
            return;
        }
        self.queue_close(code, reason);
        if self.has_recv_close {
            self.call_close(reason, code);
            self.shutdown_after_flush = true;
        }
    }

    fn queue_data(&mut self, opcode: Opcode, payload: &[u8]) {
        if !self.has_sent_close {
            self.pending.push(encode_frame(opcode, true, payload));
        }
    }

    fn queue_close(&mut self, code: u16, reason: &str) {
        if self.has_sent_close {
            return;
        }
        self.has_sent_close = true;
        // 1005 is reserved for the no-status case and never goes on the
        // wire; send an empty close frame instead
        let payload = if code == u16::from(CloseCode::NoStatusCodePresent) {
            Vec::new()
        } else {
            let mut payload = code.to_be_bytes().to_vec();
            payload.extend_from_slice(reason.as_bytes());
            payload
        };
        self.pending.push(encode_frame(Opcode::Close, true, &payload));
    }

    /// Coalesce the queued buffers and write them in order.
    async fn flush(&mut self) -> std::io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let buffers = std::mem::take(&mut self.pending);
        let total: usize = buffers.iter().map(Vec::len).sum();
        let mut coalesced = Vec::with_capacity(total);
        for buffer in buffers {
            coalesced.extend_from_slice(&buffer);
        }
        self.transport.write_all(&coalesced).await?;
        self.transport.flush().await
    }

    fn fail_io(&mut self, message: &str) {
        self.call_error(message);
        self.call_close("uncleanly", CloseCode::ClosedAbnormally.into());
        self.transport.shutdown();
    }

    fn call_error(&self, message: &str) {
        if let Some(on_error) = &self.route.on_error {
            on_error(&self.handle, message);
        }
    }

    /// The close callback runs exactly once, whatever path ends the
    /// connection.
    fn call_close(&mut self, reason: &str, code: u16) {
        if !self.close_handler_called {
            self.close_handler_called = true;
            if let Some(on_close) = &self.route.on_close {
                on_close(&self.handle, reason, code);
            }
        }
    }
}
