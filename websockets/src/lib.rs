#![forbid(unsafe_code)]
#![deny(
    clippy::dbg_macro,
    missing_copy_implementations,
    rustdoc::missing_crate_level_docs,
    missing_debug_implementations,
    nonstandard_style,
    unused_qualifications
)]

/*!
# WebSocket support for the crow server library

Contains the RFC 6455 frame codec, the upgrade handshake, and the
per-connection state machine. Applications configure a websocket route with
[`WebSocketRoute`]'s callback builder; the server's connection layer calls
[`negotiate`] during the HTTP upgrade and then hands the socket to
[`Connection::run`].
*/

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use crow_http::{KnownHeaderName, Request, StateMap};
use sha1::{Digest, Sha1};

mod frame;
pub use frame::{Frame, FrameDecoder, FrameError, Opcode, build_header, encode_frame,
    encode_masked_frame};

mod connection;
pub use connection::{Connection, Handle};

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// RFC 6455 section 7.4.1 close status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
#[non_exhaustive]
pub enum CloseCode {
    /// 1000: normal closure
    NormalClosure = 1000,
    /// 1001: endpoint going away
    EndpointGoingAway = 1001,
    /// 1002: protocol error
    ProtocolError = 1002,
    /// 1003: data the endpoint cannot accept
    UnacceptableData = 1003,
    /// 1005: reserved, no status code present in the close frame
    NoStatusCodePresent = 1005,
    /// 1006: reserved, the connection closed without a close frame
    ClosedAbnormally = 1006,
    /// 1007: data inconsistent with the message type
    InconsistentData = 1007,
    /// 1008: message violates the endpoint's policy
    PolicyViolated = 1008,
    /// 1009: message too big to process
    MessageTooBig = 1009,
    /// 1010: client expected an extension the server did not negotiate
    ExtensionsNotNegotiated = 1010,
    /// 1011: the server hit an unexpected condition
    UnexpectedCondition = 1011,
    /// 1015: reserved, TLS handshake failure
    TlsHandshakeFailure = 1015,
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> u16 {
        code as u16
    }
}

/// Reasons an upgrade request is refused before any frames flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum HandshakeError {
    /// the request lacked `Upgrade: websocket`
    #[error("request is not a websocket upgrade")]
    NotAnUpgrade,

    /// the `Host` header was missing. Not part of the websocket handshake
    /// proper, but required here.
    #[error("missing Host header")]
    MissingHost,

    /// the `Sec-WebSocket-Key` header was missing
    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,

    /// the route's accept hook rejected the connection
    #[error("connection rejected by accept hook")]
    Rejected,
}

type OpenHandler = Box<dyn Fn(&Handle) + Send + Sync>;
type MessageHandler = Box<dyn Fn(&Handle, &[u8], bool) + Send + Sync>;
type CloseHandler = Box<dyn Fn(&Handle, &str, u16) + Send + Sync>;
type ErrorHandler = Box<dyn Fn(&Handle, &str) + Send + Sync>;
type AcceptHandler = Box<dyn Fn(&Request, &mut StateMap) -> bool + Send + Sync>;

/// A websocket endpoint's configuration: the callback set, the advertised
/// subprotocols, and the payload cap. Registered on the application under a
/// route pattern.
#[derive(Default)]
pub struct WebSocketRoute {
    pub(crate) on_open: Option<OpenHandler>,
    pub(crate) on_message: Option<MessageHandler>,
    pub(crate) on_close: Option<CloseHandler>,
    pub(crate) on_error: Option<ErrorHandler>,
    pub(crate) on_accept: Option<AcceptHandler>,
    pub(crate) subprotocols: Vec<String>,
    pub(crate) mirror_protocols: bool,
    pub(crate) max_payload: Option<u64>,
    pub(crate) enforce_masking: bool,
}

impl std::fmt::Debug for WebSocketRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketRoute")
            .field("subprotocols", &self.subprotocols)
            .field("mirror_protocols", &self.mirror_protocols)
            .field("max_payload", &self.max_payload)
            .finish_non_exhaustive()
    }
}

impl WebSocketRoute {
    /// construct an endpoint with no callbacks
    pub fn new() -> Self {
        Self::default()
    }

    /// called once after the handshake response is written
    pub fn onopen(mut self, f: impl Fn(&Handle) + Send + Sync + 'static) -> Self {
        self.on_open = Some(Box::new(f));
        self
    }

    /// called for each complete (reassembled) text or binary message; the
    /// bool is true for binary
    pub fn onmessage(mut self, f: impl Fn(&Handle, &[u8], bool) + Send + Sync + 'static) -> Self {
        self.on_message = Some(Box::new(f));
        self
    }

    /// called exactly once when the connection closes, with the reason and
    /// status code
    pub fn onclose(mut self, f: impl Fn(&Handle, &str, u16) + Send + Sync + 'static) -> Self {
        self.on_close = Some(Box::new(f));
        self
    }

    /// called when a read, write, or protocol error terminates the
    /// connection
    pub fn onerror(mut self, f: impl Fn(&Handle, &str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Called during the handshake. Return false to reject the upgrade;
    /// values inserted into the [`StateMap`] are available on the
    /// connection's [`Handle`] afterwards.
    pub fn onaccept(
        mut self,
        f: impl Fn(&Request, &mut StateMap) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.on_accept = Some(Box::new(f));
        self
    }

    /// advertise the subprotocols this endpoint understands; the first one
    /// the client also lists is selected
    pub fn protocols(mut self, protocols: &[&str]) -> Self {
        self.subprotocols = protocols.iter().map(ToString::to_string).collect();
        self
    }

    /// echo the client's `Sec-WebSocket-Protocol` header verbatim instead
    /// of selecting from an advertised set
    pub fn mirror_protocols(mut self) -> Self {
        self.mirror_protocols = true;
        self
    }

    /// cap the per-frame payload size for this endpoint, overriding the
    /// application-wide setting
    pub fn max_payload(mut self, bytes: u64) -> Self {
        self.max_payload = Some(bytes);
        self
    }

    /// Close connections that send unmasked client frames with status 1003
    /// instead of tolerating them.
    pub fn enforce_masking(mut self) -> Self {
        self.enforce_masking = true;
        self
    }
}

/// The `Sec-WebSocket-Accept` value for a client's `Sec-WebSocket-Key`.
pub fn accept_hash(key: &str) -> String {
    let hash = Sha1::new()
        .chain_update(key)
        .chain_update(WEBSOCKET_GUID)
        .finalize();
    BASE64.encode(&hash[..])
}

/// A successful handshake: the raw `101 Switching Protocols` response to
/// write, the selected subprotocol, and any user data the accept hook
/// attached.
#[derive(Debug)]
pub struct Handshake {
    /// the full response head, ready to write
    pub response: Vec<u8>,
    /// the selected or mirrored subprotocol, if any
    pub subprotocol: Option<String>,
    /// state attached by the accept hook
    pub userdata: StateMap,
}

/// Validate an upgrade request against a route and produce the handshake
/// response.
pub fn negotiate(route: &WebSocketRoute, req: &Request) -> Result<Handshake, HandshakeError> {
    if !req
        .headers()
        .eq_ignore_ascii_case(KnownHeaderName::Upgrade, "websocket")
    {
        return Err(HandshakeError::NotAnUpgrade);
    }

    if req.host().is_none() {
        return Err(HandshakeError::MissingHost);
    }

    let key = req
        .headers()
        .get_str(KnownHeaderName::SecWebsocketKey)
        .ok_or(HandshakeError::MissingKey)?;

    let requested = req
        .headers()
        .get_str(KnownHeaderName::SecWebsocketProtocol)
        .unwrap_or_default();

    let subprotocol = if route.mirror_protocols && !requested.is_empty() {
        Some(requested.to_owned())
    } else {
        requested
            .split(',')
            .map(str::trim)
            .find(|candidate| route.subprotocols.iter().any(|p| p == candidate))
            .map(str::to_owned)
    };

    let mut userdata = StateMap::new();
    if let Some(accept) = &route.on_accept
        && !accept(req, &mut userdata)
    {
        return Err(HandshakeError::Rejected);
    }

    let mut response = Vec::with_capacity(160);
    response.extend_from_slice(
        b"HTTP/1.1 101 Switching Protocols\r\n\
          Upgrade: websocket\r\n\
          Connection: Upgrade\r\n\
          Sec-WebSocket-Accept: ",
    );
    response.extend_from_slice(accept_hash(key).as_bytes());
    response.extend_from_slice(b"\r\n");
    if let Some(protocol) = &subprotocol {
        response.extend_from_slice(b"Sec-WebSocket-Protocol: ");
        response.extend_from_slice(protocol.as_bytes());
        response.extend_from_slice(b"\r\n");
    }
    response.extend_from_slice(b"\r\n");

    Ok(Handshake {
        response,
        subprotocol,
        userdata,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crow_http::Method;

    fn upgrade_request() -> Request {
        let mut req = Request::synthetic(Method::Get, "/ws", "");
        req.headers_mut().insert(KnownHeaderName::Host, "example.com");
        req.headers_mut().insert(KnownHeaderName::Upgrade, "websocket");
        req.headers_mut().insert(KnownHeaderName::Connection, "Upgrade");
        req.headers_mut()
            .insert(KnownHeaderName::SecWebsocketKey, "dGhlIHNhbXBsZSBub25jZQ==");
        req
    }

    #[test]
    fn rfc_example_accept_hash() {
        // the worked example from RFC 6455 section 1.3
        assert_eq!(
            accept_hash("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn negotiate_produces_101() {
        let route = WebSocketRoute::new();
        let handshake = negotiate(&route, &upgrade_request()).unwrap();
        let text = String::from_utf8(handshake.response).unwrap();
        assert!(text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(text.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
        assert!(handshake.subprotocol.is_none());
    }

    #[test]
    fn host_is_mandatory() {
        let route = WebSocketRoute::new();
        let mut req = upgrade_request();
        req.headers_mut().remove(KnownHeaderName::Host);
        assert!(matches!(
            negotiate(&route, &req),
            Err(HandshakeError::MissingHost)
        ));
    }

    #[test]
    fn subprotocol_selection() {
        let route = WebSocketRoute::new().protocols(&["chat", "superchat"]);
        let mut req = upgrade_request();
        req.headers_mut()
            .insert(KnownHeaderName::SecWebsocketProtocol, "superchat, chat");
        let handshake = negotiate(&route, &req).unwrap();
        assert_eq!(handshake.subprotocol.as_deref(), Some("superchat"));
    }

    #[test]
    fn mirrored_protocols() {
        let route = WebSocketRoute::new().mirror_protocols();
        let mut req = upgrade_request();
        req.headers_mut()
            .insert(KnownHeaderName::SecWebsocketProtocol, "a, b, c");
        let handshake = negotiate(&route, &req).unwrap();
        assert_eq!(handshake.subprotocol.as_deref(), Some("a, b, c"));
    }

    #[test]
    fn accept_hook_can_reject() {
        let route = WebSocketRoute::new().onaccept(|_, _| false);
        assert!(matches!(
            negotiate(&route, &upgrade_request()),
            Err(HandshakeError::Rejected)
        ));
    }
}
