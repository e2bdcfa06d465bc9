use crate::{
    HeaderValue, Headers, Method, ParseError, QueryString, Request, StateMap, Version,
};

/// Callbacks emitted by [`HttpParser::feed`].
///
/// Data callbacks may fire several times for one logical element when the
/// element spans multiple feeds or several header lines; the sink
/// concatenates. `on_headers_complete` fires once per message, before any
/// body data, and `on_message_complete` fires exactly once when the message
/// is final.
#[allow(unused_variables)]
pub trait ParserSink {
    /// a new message has started
    fn on_message_begin(&mut self) {}
    /// a slice of the request target
    fn on_url(&mut self, data: &[u8]) {}
    /// a slice of the response reason phrase (response mode only)
    fn on_status(&mut self, data: &[u8]) {}
    /// a slice of a header name
    fn on_header_field(&mut self, data: &[u8]) {}
    /// a slice of a header value
    fn on_header_value(&mut self, data: &[u8]) {}
    /// the header block is final
    fn on_headers_complete(&mut self) {}
    /// a slice of body payload
    fn on_body(&mut self, data: &[u8]) {}
    /// the message is final
    fn on_message_complete(&mut self) {}
}

/// Whether the parser reads requests or responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserKind {
    /// parse requests (server side)
    Request,
    /// parse responses (client side, used by the test tooling)
    Response,
}

/// Which of the headers the parser itself interprets the current header is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderKind {
    Other,
    Connection,
    ContentLength,
    TransferEncoding,
    Upgrade,
    Expect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UrlState {
    Schema,
    SchemaSlash,
    SchemaSlash2,
    Server,
    Path,
    Query,
    Fragment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    StartReq,
    Method,
    SpacesBeforeUrl,
    Url(UrlState),
    ReqHttpLiteral(u8),
    ReqVersionMajor,
    ReqVersionDot,
    ReqVersionMinor,
    ReqLineAlmostDone,

    StartRes,
    ResHttpLiteral(u8),
    ResVersionMajor,
    ResVersionDot,
    ResVersionMinor,
    ResSpaceBeforeStatus,
    ResStatusCode,
    ResStatusText,
    ResLineAlmostDone,

    HeaderFieldStart,
    HeaderField,
    HeaderValueDiscardWs,
    HeaderValue,
    HeaderAlmostDone,
    HeadersAlmostDone,

    BodyIdentity,
    BodyIdentityEof,
    ChunkSizeStart,
    ChunkSize,
    ChunkExtensions,
    ChunkSizeAlmostDone,
    ChunkData,
    ChunkDataAlmostDone,
    ChunkDataDone,

    MessageDone,
}

#[derive(Debug, Default, Clone, Copy)]
struct Flags {
    chunked: bool,
    transfer_encoding: bool,
    connection_keep_alive: bool,
    connection_close: bool,
    connection_upgrade: bool,
    upgrade_header: bool,
    expect_continue: bool,
    trailing: bool,
}

/// Default cap on the total octets of request line plus headers.
pub const DEFAULT_MAX_HEAD_LEN: usize = 80 * 1024;

const INTERESTING_VALUE_CAP: usize = 1024;

fn is_url_char(b: u8) -> bool {
    // RFC 3986 characters plus the sub-delims browsers emit. Control bytes
    // and whitespace always fail; bytes >= 0x80 are let through for
    // percent-unencoded utf-8 paths.
    match b {
        0..=0x1f | 0x7f | b' ' => false,
        b'"' | b'<' | b'>' | b'\\' | b'^' | b'`' | b'{' | b'|' | b'}' => false,
        _ => true,
    }
}

fn is_hex(b: u8) -> Option<u64> {
    match b {
        b'0'..=b'9' => Some(u64::from(b - b'0')),
        b'a'..=b'f' => Some(u64::from(b - b'a' + 10)),
        b'A'..=b'F' => Some(u64::from(b - b'A' + 10)),
        _ => None,
    }
}

/// An incremental, single-pass HTTP/1.x parser.
///
/// Bytes are pushed in with [`feed`][HttpParser::feed] and structure comes
/// out through a [`ParserSink`]. Any failure latches: the error is returned
/// from the failing `feed` and from every later call until
/// [`clear`][HttpParser::clear].
#[derive(Debug)]
pub struct HttpParser {
    kind: ParserKind,
    state: State,
    error: Option<ParseError>,
    lenient: bool,
    max_head_len: usize,
    head_len: usize,

    method_mask: u64,
    method_len: usize,
    method: Option<Method>,
    version_major: u8,
    version_minor: u8,
    status_code: u16,

    header_kind: HeaderKind,
    field_buf: Vec<u8>,
    value_buf: Vec<u8>,
    content_length: Option<u64>,
    flags: Flags,

    body_remaining: u64,
    chunk_size: u64,

    keep_alive: bool,
    close_connection: bool,
    upgrade: bool,
    message_complete: bool,
}

impl HttpParser {
    /// construct a parser for the given message kind
    pub fn new(kind: ParserKind) -> Self {
        Self {
            kind,
            state: match kind {
                ParserKind::Request => State::StartReq,
                ParserKind::Response => State::StartRes,
            },
            error: None,
            lenient: false,
            max_head_len: DEFAULT_MAX_HEAD_LEN,
            head_len: 0,
            method_mask: 0,
            method_len: 0,
            method: None,
            version_major: 0,
            version_minor: 0,
            status_code: 0,
            header_kind: HeaderKind::Other,
            field_buf: Vec::new(),
            value_buf: Vec::new(),
            content_length: None,
            flags: Flags::default(),
            body_remaining: 0,
            chunk_size: 0,
            keep_alive: false,
            close_connection: false,
            upgrade: false,
            message_complete: false,
        }
    }

    /// construct a request-mode parser
    pub fn request() -> Self {
        Self::new(ParserKind::Request)
    }

    /// construct a response-mode parser
    pub fn response() -> Self {
        Self::new(ParserKind::Response)
    }

    /// cap the combined octets of the request line and headers
    pub fn with_max_head_len(mut self, max: usize) -> Self {
        self.max_head_len = max;
        self
    }

    /// permit `Content-Length` alongside a `Transfer-Encoding` whose final
    /// coding is not `chunked`
    pub fn set_lenient(&mut self, lenient: bool) {
        self.lenient = lenient;
    }

    /// the parsed request method, once the request line is through
    pub fn method(&self) -> Option<Method> {
        self.method
    }

    /// the parsed protocol version
    pub fn version(&self) -> Option<Version> {
        Version::from_parts(self.version_major, self.version_minor)
    }

    /// the response status code (response mode)
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// should the connection stay open after this message?
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// must the connection close after this message?
    pub fn close_connection(&self) -> bool {
        self.close_connection
    }

    /// did this message request a protocol upgrade? Bytes following the
    /// header block are not consumed in that case.
    pub fn upgrade(&self) -> bool {
        self.upgrade
    }

    /// did the client send `Expect: 100-continue` on HTTP/1.1?
    pub fn needs_continue(&self) -> bool {
        self.flags.expect_continue && self.version() == Some(Version::Http1_1)
    }

    /// has a full message been parsed?
    pub fn is_message_complete(&self) -> bool {
        self.message_complete
    }

    /// the latched error, if parsing has failed
    pub fn error(&self) -> Option<ParseError> {
        self.error
    }

    /// Reset all per-message state, keeping configuration. Required between
    /// messages on a keep-alive connection and after an error.
    pub fn clear(&mut self) {
        let kind = self.kind;
        let lenient = self.lenient;
        let max_head_len = self.max_head_len;
        *self = Self::new(kind);
        self.lenient = lenient;
        self.max_head_len = max_head_len;
    }

    /// Signal end of input. Only legal at a message boundary or while
    /// reading an until-close response body, which it completes.
    pub fn done<S: ParserSink>(&mut self, sink: &mut S) -> Result<(), ParseError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        match self.state {
            State::StartReq | State::StartRes | State::MessageDone => Ok(()),
            State::BodyIdentityEof => {
                self.finish_message(sink);
                Ok(())
            }
            _ => {
                self.error = Some(ParseError::InvalidEofState);
                Err(ParseError::InvalidEofState)
            }
        }
    }

    /// Push bytes through the state machine, emitting callbacks on `sink`.
    ///
    /// Returns the number of bytes consumed. Consumption stops early at a
    /// message boundary and at an upgrade exit; the caller owns the
    /// remaining bytes. On failure the error latches and the same error is
    /// returned from every subsequent call until [`clear`][Self::clear].
    pub fn feed<S: ParserSink>(&mut self, data: &[u8], sink: &mut S) -> Result<usize, ParseError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if self.message_complete {
            return Ok(0);
        }

        match self.run(data, sink) {
            Ok(consumed) => Ok(consumed),
            Err(error) => {
                self.error = Some(error);
                Err(error)
            }
        }
    }

    fn run<S: ParserSink>(&mut self, data: &[u8], sink: &mut S) -> Result<usize, ParseError> {
        let mut i = 0;

        // spans for the data callbacks; flushed on state exit and at the
        // end of each feed
        let mut url_mark: Option<usize> = None;
        let mut status_mark: Option<usize> = None;
        let mut field_mark: Option<usize> = None;
        let mut value_mark: Option<usize> = None;

        macro_rules! flush {
            ($mark:ident, $cb:ident, $end:expr) => {
                if let Some(start) = $mark.take() {
                    if start < $end {
                        sink.$cb(&data[start..$end]);
                    }
                }
            };
        }

        while i < data.len() {
            let byte = data[i];

            // head octet accounting covers the request line and headers,
            // trailers included, but not body framing
            if !matches!(
                self.state,
                State::BodyIdentity
                    | State::BodyIdentityEof
                    | State::ChunkSizeStart
                    | State::ChunkSize
                    | State::ChunkExtensions
                    | State::ChunkSizeAlmostDone
                    | State::ChunkData
                    | State::ChunkDataAlmostDone
                    | State::ChunkDataDone
                    | State::MessageDone
            ) {
                self.head_len += 1;
                if self.head_len > self.max_head_len {
                    return Err(ParseError::HeaderOverflow);
                }
            }

            match self.state {
                State::StartReq => match byte {
                    b'\r' | b'\n' => {}
                    b'A'..=b'Z' => {
                        sink.on_message_begin();
                        self.method_mask = Method::ALL
                            .iter()
                            .enumerate()
                            .filter(|(_, m)| m.as_str().as_bytes()[0] == byte)
                            .fold(0u64, |mask, (index, _)| mask | 1 << index);
                        if self.method_mask == 0 {
                            return Err(ParseError::InvalidMethod);
                        }
                        self.method_len = 1;
                        self.state = State::Method;
                    }
                    _ => return Err(ParseError::InvalidMethod),
                },

                State::Method => match byte {
                    b' ' => {
                        self.method = Method::ALL
                            .iter()
                            .enumerate()
                            .filter(|(index, _)| self.method_mask & (1 << index) != 0)
                            .find(|(_, m)| m.as_str().len() == self.method_len)
                            .map(|(_, m)| *m);
                        if self.method.is_none() {
                            return Err(ParseError::InvalidMethod);
                        }
                        self.state = State::SpacesBeforeUrl;
                    }
                    b'A'..=b'Z' | b'-' => {
                        // disambiguate: drop candidates that diverge at
                        // this position
                        self.method_mask &= Method::ALL
                            .iter()
                            .enumerate()
                            .filter(|(_, m)| {
                                m.as_str().as_bytes().get(self.method_len) == Some(&byte)
                            })
                            .fold(0u64, |mask, (index, _)| mask | 1 << index);
                        if self.method_mask == 0 {
                            return Err(ParseError::InvalidMethod);
                        }
                        self.method_len += 1;
                    }
                    _ => return Err(ParseError::InvalidMethod),
                },

                State::SpacesBeforeUrl => {
                    if byte != b' ' {
                        url_mark = Some(i);
                        self.state = if self.method == Some(Method::Connect) {
                            State::Url(UrlState::Server)
                        } else {
                            match byte {
                                b'/' | b'*' => State::Url(UrlState::Path),
                                b'a'..=b'z' | b'A'..=b'Z' => State::Url(UrlState::Schema),
                                _ => return Err(ParseError::InvalidUrl),
                            }
                        };
                    }
                }

                State::Url(url_state) => match byte {
                    b' ' => {
                        flush!(url_mark, on_url, i);
                        self.state = State::ReqHttpLiteral(0);
                    }
                    b'\r' | b'\n' => return Err(ParseError::InvalidVersion),
                    _ => {
                        if !is_url_char(byte) {
                            return Err(ParseError::InvalidUrl);
                        }
                        // re-mark after a feed boundary split the url
                        if url_mark.is_none() {
                            url_mark = Some(i);
                        }
                        self.state = State::Url(match (url_state, byte) {
                            (UrlState::Schema, b':') => UrlState::SchemaSlash,
                            (UrlState::Schema, b'a'..=b'z' | b'A'..=b'Z') => UrlState::Schema,
                            (UrlState::Schema, _) => return Err(ParseError::InvalidUrl),
                            (UrlState::SchemaSlash, b'/') => UrlState::SchemaSlash2,
                            (UrlState::SchemaSlash | UrlState::SchemaSlash2, _) if byte != b'/' => {
                                return Err(ParseError::InvalidUrl);
                            }
                            (UrlState::SchemaSlash2, b'/') => UrlState::Server,
                            (UrlState::Server, b'/') => UrlState::Path,
                            (UrlState::Server, b'?') => UrlState::Query,
                            (UrlState::Server, _) => UrlState::Server,
                            (UrlState::Path, b'?') => UrlState::Query,
                            (UrlState::Path | UrlState::Query, b'#') => UrlState::Fragment,
                            (state, _) => state,
                        });
                    }
                },

                State::ReqHttpLiteral(index) => {
                    let expected = b"HTTP/"[usize::from(index)];
                    if byte != expected {
                        return Err(ParseError::InvalidConstant);
                    }
                    self.state = if usize::from(index) + 1 == b"HTTP/".len() {
                        State::ReqVersionMajor
                    } else {
                        State::ReqHttpLiteral(index + 1)
                    };
                }

                State::ReqVersionMajor => match byte {
                    b'0'..=b'9' => {
                        self.version_major = byte - b'0';
                        self.state = State::ReqVersionDot;
                    }
                    _ => return Err(ParseError::InvalidVersion),
                },

                State::ReqVersionDot => match byte {
                    b'.' => self.state = State::ReqVersionMinor,
                    _ => return Err(ParseError::InvalidVersion),
                },

                State::ReqVersionMinor => match byte {
                    b'0'..=b'9' => {
                        self.version_minor = byte - b'0';
                        if self.version().is_none() {
                            return Err(ParseError::InvalidVersion);
                        }
                        self.state = State::ReqLineAlmostDone;
                    }
                    _ => return Err(ParseError::InvalidVersion),
                },

                State::ReqLineAlmostDone | State::ResLineAlmostDone => match byte {
                    b'\r' => {}
                    b'\n' => self.state = State::HeaderFieldStart,
                    _ => return Err(ParseError::InvalidConstant),
                },

                State::StartRes => match byte {
                    b'\r' | b'\n' => {}
                    b'H' => {
                        sink.on_message_begin();
                        self.state = State::ResHttpLiteral(1);
                    }
                    _ => return Err(ParseError::InvalidConstant),
                },

                State::ResHttpLiteral(index) => {
                    let expected = b"HTTP/"[usize::from(index)];
                    if byte != expected {
                        return Err(ParseError::InvalidConstant);
                    }
                    self.state = if usize::from(index) + 1 == b"HTTP/".len() {
                        State::ResVersionMajor
                    } else {
                        State::ResHttpLiteral(index + 1)
                    };
                }

                State::ResVersionMajor => match byte {
                    b'0'..=b'9' => {
                        self.version_major = byte - b'0';
                        self.state = State::ResVersionDot;
                    }
                    _ => return Err(ParseError::InvalidVersion),
                },

                State::ResVersionDot => match byte {
                    b'.' => self.state = State::ResVersionMinor,
                    _ => return Err(ParseError::InvalidVersion),
                },

                State::ResVersionMinor => match byte {
                    b'0'..=b'9' => {
                        self.version_minor = byte - b'0';
                        self.state = State::ResSpaceBeforeStatus;
                    }
                    _ => return Err(ParseError::InvalidVersion),
                },

                State::ResSpaceBeforeStatus => match byte {
                    b' ' => self.state = State::ResStatusCode,
                    _ => return Err(ParseError::InvalidStatus),
                },

                State::ResStatusCode => match byte {
                    b'0'..=b'9' => {
                        self.status_code = self.status_code * 10 + u16::from(byte - b'0');
                        if self.status_code > 999 {
                            return Err(ParseError::InvalidStatus);
                        }
                    }
                    b' ' => {
                        status_mark = Some(i + 1);
                        self.state = State::ResStatusText;
                    }
                    b'\r' | b'\n' => {
                        self.state = if byte == b'\r' {
                            State::ResLineAlmostDone
                        } else {
                            State::HeaderFieldStart
                        };
                    }
                    _ => return Err(ParseError::InvalidStatus),
                },

                State::ResStatusText => match byte {
                    b'\r' => {
                        flush!(status_mark, on_status, i);
                        self.state = State::ResLineAlmostDone;
                    }
                    b'\n' => {
                        flush!(status_mark, on_status, i);
                        self.state = State::HeaderFieldStart;
                    }
                    _ => {
                        if status_mark.is_none() {
                            status_mark = Some(i);
                        }
                    }
                },

                State::HeaderFieldStart => match byte {
                    b'\r' => self.state = State::HeadersAlmostDone,
                    b'\n' => {
                        self.state = State::HeadersAlmostDone;
                        // reprocess the newline in HeadersAlmostDone
                        continue;
                    }
                    _ if crate::headers::is_tchar(byte) => {
                        self.field_buf.clear();
                        self.field_buf.push(byte);
                        field_mark = Some(i);
                        self.state = State::HeaderField;
                    }
                    _ => return Err(ParseError::InvalidHeaderToken),
                },

                State::HeaderField => match byte {
                    b':' => {
                        flush!(field_mark, on_header_field, i);
                        self.header_kind = self.classify_header();
                        self.value_buf.clear();
                        self.state = State::HeaderValueDiscardWs;
                    }
                    _ if crate::headers::is_tchar(byte) => {
                        if field_mark.is_none() {
                            field_mark = Some(i);
                        }
                        self.field_buf.push(byte);
                        if self.field_buf.len() > self.max_head_len {
                            return Err(ParseError::HeaderOverflow);
                        }
                    }
                    _ => return Err(ParseError::InvalidHeaderToken),
                },

                State::HeaderValueDiscardWs => match byte {
                    b' ' | b'\t' => {}
                    b'\r' => {
                        // the value is empty; emit it so the sink closes
                        // out the header
                        sink.on_header_value(b"");
                        self.interpret_header_value()?;
                        self.state = State::HeaderAlmostDone;
                    }
                    b'\n' => {
                        sink.on_header_value(b"");
                        self.interpret_header_value()?;
                        self.state = State::HeaderFieldStart;
                    }
                    _ => {
                        value_mark = Some(i);
                        self.push_value_byte(byte);
                        self.state = State::HeaderValue;
                    }
                },

                State::HeaderValue => match byte {
                    b'\r' => {
                        flush!(value_mark, on_header_value, i);
                        self.interpret_header_value()?;
                        self.state = State::HeaderAlmostDone;
                    }
                    b'\n' => {
                        flush!(value_mark, on_header_value, i);
                        self.interpret_header_value()?;
                        self.state = State::HeaderFieldStart;
                    }
                    _ => {
                        if value_mark.is_none() {
                            value_mark = Some(i);
                        }
                        self.push_value_byte(byte);
                    }
                },

                State::HeaderAlmostDone => match byte {
                    b'\n' => self.state = State::HeaderFieldStart,
                    _ => return Err(ParseError::InvalidConstant),
                },

                State::HeadersAlmostDone => match byte {
                    b'\n' => {
                        if self.flags.trailing {
                            self.finish_message(sink);
                            return Ok(i + 1);
                        }

                        self.finish_head()?;
                        sink.on_headers_complete();

                        if self.upgrade {
                            self.finish_message(sink);
                            return Ok(i + 1);
                        }

                        if self.flags.chunked {
                            self.state = State::ChunkSizeStart;
                        } else if let Some(length) = self.content_length {
                            if length == 0 {
                                self.finish_message(sink);
                                return Ok(i + 1);
                            }
                            self.body_remaining = length;
                            self.state = State::BodyIdentity;
                        } else if self.kind == ParserKind::Request || !self.response_has_body() {
                            self.finish_message(sink);
                            return Ok(i + 1);
                        } else {
                            self.state = State::BodyIdentityEof;
                        }
                    }
                    _ => return Err(ParseError::InvalidConstant),
                },

                State::BodyIdentity => {
                    let available = data.len() - i;
                    let take = usize::try_from(self.body_remaining)
                        .unwrap_or(usize::MAX)
                        .min(available);
                    sink.on_body(&data[i..i + take]);
                    self.body_remaining -= take as u64;
                    i += take;
                    if self.body_remaining == 0 {
                        self.finish_message(sink);
                        return Ok(i);
                    }
                    continue;
                }

                State::BodyIdentityEof => {
                    sink.on_body(&data[i..]);
                    return Ok(data.len());
                }

                State::ChunkSizeStart => match is_hex(byte) {
                    Some(value) => {
                        self.chunk_size = value;
                        self.state = State::ChunkSize;
                    }
                    None => return Err(ParseError::InvalidChunkSize),
                },

                State::ChunkSize => match byte {
                    b';' | b' ' => self.state = State::ChunkExtensions,
                    b'\r' => self.state = State::ChunkSizeAlmostDone,
                    b'\n' => {
                        self.state = State::ChunkSizeAlmostDone;
                        continue;
                    }
                    _ => match is_hex(byte) {
                        Some(value) => {
                            self.chunk_size = self
                                .chunk_size
                                .checked_mul(16)
                                .and_then(|size| size.checked_add(value))
                                .ok_or(ParseError::InvalidChunkSize)?;
                        }
                        None => return Err(ParseError::InvalidChunkSize),
                    },
                },

                State::ChunkExtensions => match byte {
                    b'\r' => self.state = State::ChunkSizeAlmostDone,
                    b'\n' => {
                        self.state = State::ChunkSizeAlmostDone;
                        continue;
                    }
                    _ => {}
                },

                State::ChunkSizeAlmostDone => match byte {
                    b'\n' => {
                        if self.chunk_size == 0 {
                            self.flags.trailing = true;
                            self.state = State::HeaderFieldStart;
                        } else {
                            self.state = State::ChunkData;
                        }
                    }
                    _ => return Err(ParseError::InvalidConstant),
                },

                State::ChunkData => {
                    let available = data.len() - i;
                    let take = usize::try_from(self.chunk_size)
                        .unwrap_or(usize::MAX)
                        .min(available);
                    sink.on_body(&data[i..i + take]);
                    self.chunk_size -= take as u64;
                    i += take;
                    if self.chunk_size == 0 {
                        self.state = State::ChunkDataAlmostDone;
                    }
                    continue;
                }

                State::ChunkDataAlmostDone => match byte {
                    b'\r' => self.state = State::ChunkDataDone,
                    b'\n' => self.state = State::ChunkSizeStart,
                    _ => return Err(ParseError::InvalidConstant),
                },

                State::ChunkDataDone => match byte {
                    b'\n' => self.state = State::ChunkSizeStart,
                    _ => return Err(ParseError::InvalidConstant),
                },

                State::MessageDone => return Ok(i),
            }

            i += 1;
        }

        // input exhausted mid-element: flush the open spans so data
        // callbacks can fire again on the next feed
        flush!(url_mark, on_url, data.len());
        flush!(status_mark, on_status, data.len());
        flush!(field_mark, on_header_field, data.len());
        flush!(value_mark, on_header_value, data.len());

        Ok(data.len())
    }

    fn classify_header(&self) -> HeaderKind {
        let field = &self.field_buf;
        if field.eq_ignore_ascii_case(b"connection") || field.eq_ignore_ascii_case(b"proxy-connection")
        {
            HeaderKind::Connection
        } else if field.eq_ignore_ascii_case(b"content-length") {
            HeaderKind::ContentLength
        } else if field.eq_ignore_ascii_case(b"transfer-encoding") {
            HeaderKind::TransferEncoding
        } else if field.eq_ignore_ascii_case(b"upgrade") {
            HeaderKind::Upgrade
        } else if field.eq_ignore_ascii_case(b"expect") {
            HeaderKind::Expect
        } else {
            HeaderKind::Other
        }
    }

    fn push_value_byte(&mut self, byte: u8) {
        if self.header_kind != HeaderKind::Other && self.value_buf.len() < INTERESTING_VALUE_CAP {
            self.value_buf.push(byte);
        }
    }

    fn interpret_header_value(&mut self) -> Result<(), ParseError> {
        let value = std::mem::take(&mut self.value_buf);
        match self.header_kind {
            HeaderKind::Other => {}
            HeaderKind::ContentLength => {
                let text = std::str::from_utf8(&value)
                    .map_err(|_| ParseError::InvalidContentLength)?
                    .trim();
                let parsed: u64 = text.parse().map_err(|_| ParseError::InvalidContentLength)?;
                match self.content_length {
                    Some(existing) if existing != parsed => {
                        return Err(ParseError::InvalidContentLength);
                    }
                    _ => self.content_length = Some(parsed),
                }
            }
            HeaderKind::TransferEncoding => {
                self.flags.transfer_encoding = true;
                let text = String::from_utf8_lossy(&value);
                if let Some(last) = text.split(',').next_back() {
                    self.flags.chunked = last.trim().eq_ignore_ascii_case("chunked");
                }
            }
            HeaderKind::Connection => {
                let text = String::from_utf8_lossy(&value);
                for token in text.split(',') {
                    let token = token.trim();
                    if token.eq_ignore_ascii_case("keep-alive") {
                        self.flags.connection_keep_alive = true;
                    } else if token.eq_ignore_ascii_case("close") {
                        self.flags.connection_close = true;
                    } else if token.eq_ignore_ascii_case("upgrade") {
                        self.flags.connection_upgrade = true;
                    }
                }
            }
            HeaderKind::Upgrade => self.flags.upgrade_header = true,
            HeaderKind::Expect => {
                if String::from_utf8_lossy(&value)
                    .trim()
                    .eq_ignore_ascii_case("100-continue")
                {
                    self.flags.expect_continue = true;
                }
            }
        }
        self.header_kind = HeaderKind::Other;
        Ok(())
    }

    fn finish_head(&mut self) -> Result<(), ParseError> {
        if self.content_length.is_some() && self.flags.transfer_encoding {
            // lenient mode tolerates the pair only when chunked is not the
            // final coding, in which case Content-Length governs framing
            if self.lenient && !self.flags.chunked {
                self.flags.transfer_encoding = false;
            } else {
                return Err(ParseError::UnexpectedContentLength);
            }
        }

        let http_1_1 = self.version_major == 1 && self.version_minor == 1;
        let http_1_0 = self.version_major == 1 && self.version_minor == 0;
        self.keep_alive = if http_1_0 {
            self.flags.connection_keep_alive
        } else {
            http_1_1 && !self.flags.connection_close
        };
        self.close_connection = if http_1_0 {
            !self.flags.connection_keep_alive
        } else {
            http_1_1 && self.flags.connection_close
        };

        self.upgrade = (self.flags.connection_upgrade && self.flags.upgrade_header)
            || self.method == Some(Method::Connect);

        Ok(())
    }

    fn response_has_body(&self) -> bool {
        !(self.status_code < 200 || self.status_code == 204 || self.status_code == 304)
    }

    fn finish_message<S: ParserSink>(&mut self, sink: &mut S) {
        self.state = State::MessageDone;
        self.message_complete = true;
        sink.on_message_complete();
    }
}

/// Accumulates parser callbacks into a [`Request`].
///
/// This is the layer the connection drives: raw reads go to
/// [`feed`][RequestParser::feed], and once
/// [`is_message_complete`][RequestParser::is_message_complete] reports true
/// the request is taken with [`take_request`][RequestParser::take_request]
/// and the parser is ready to be cleared for the next message.
#[derive(Debug)]
pub struct RequestParser {
    parser: HttpParser,
    acc: Accumulator,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Building {
    #[default]
    Start,
    Field,
    Value,
}

#[derive(Debug, Default)]
struct Accumulator {
    raw_url: Vec<u8>,
    field: Vec<u8>,
    value: Vec<u8>,
    building: Building,
    headers: Headers,
    headers_complete: bool,
    body: Vec<u8>,
    complete: bool,
}

impl Accumulator {
    fn commit_header(&mut self) {
        if !self.field.is_empty() {
            let name = String::from_utf8_lossy(&self.field).into_owned();
            let value = HeaderValue::from(std::mem::take(&mut self.value));
            self.headers.append(name, value);
            self.field.clear();
        }
        self.building = Building::Start;
    }
}

impl ParserSink for Accumulator {
    fn on_url(&mut self, data: &[u8]) {
        self.raw_url.extend_from_slice(data);
    }

    fn on_header_field(&mut self, data: &[u8]) {
        // a field callback after a value callback starts a new header
        if self.building != Building::Field {
            self.commit_header();
            self.building = Building::Field;
        }
        self.field.extend_from_slice(data);
    }

    fn on_header_value(&mut self, data: &[u8]) {
        self.building = Building::Value;
        self.value.extend_from_slice(data);
    }

    fn on_headers_complete(&mut self) {
        self.commit_header();
        self.headers_complete = true;
    }

    fn on_body(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
    }

    fn on_message_complete(&mut self) {
        // trailers of a chunked body may still be pending
        self.commit_header();
        self.complete = true;
    }
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    /// construct a request parser with default limits
    pub fn new() -> Self {
        Self {
            parser: HttpParser::request(),
            acc: Accumulator::default(),
        }
    }

    /// cap the combined octets of the request line and headers
    pub fn with_max_head_len(mut self, max: usize) -> Self {
        self.parser = self.parser.with_max_head_len(max);
        self
    }

    /// see [`HttpParser::set_lenient`]
    pub fn with_lenient(mut self, lenient: bool) -> Self {
        self.parser.set_lenient(lenient);
        self
    }

    /// see [`HttpParser::feed`]
    pub fn feed(&mut self, data: &[u8]) -> Result<usize, ParseError> {
        self.parser.feed(data, &mut self.acc)
    }

    /// has a full request been parsed?
    pub fn is_message_complete(&self) -> bool {
        self.acc.complete
    }

    /// is the header block final?
    pub fn headers_complete(&self) -> bool {
        self.acc.headers_complete
    }

    /// the request headers parsed so far
    pub fn headers(&self) -> &Headers {
        &self.acc.headers
    }

    /// did the client send `Expect: 100-continue` on HTTP/1.1?
    pub fn needs_continue(&self) -> bool {
        self.parser.needs_continue()
    }

    /// did this request ask for a protocol upgrade?
    pub fn upgrade(&self) -> bool {
        self.parser.upgrade()
    }

    /// the latched error, if parsing has failed
    pub fn error(&self) -> Option<ParseError> {
        self.parser.error()
    }

    /// Build the [`Request`] for a complete message and reset for the next
    /// one. Calling this before `is_message_complete` yields a partial
    /// request; the connection never does.
    pub fn take_request(&mut self, remote_ip: String) -> Request {
        let raw_url = String::from_utf8_lossy(&self.acc.raw_url).into_owned();
        let without_fragment = raw_url
            .split_once('#')
            .map_or(raw_url.as_str(), |(before, _)| before);
        let (path, query) = match without_fragment.split_once('?') {
            Some((path, query)) => (path.to_owned(), QueryString::parse(query)),
            None => (without_fragment.to_owned(), QueryString::default()),
        };

        let request = Request::new(
            self.parser.method().unwrap_or(Method::Get),
            raw_url.clone(),
            path,
            query,
            std::mem::take(&mut self.acc.headers),
            std::mem::take(&mut self.acc.body),
            self.parser.version().unwrap_or(Version::Http1_1),
            self.parser.keep_alive(),
            self.parser.close_connection(),
            self.parser.upgrade(),
            remote_ip,
            StateMap::new(),
        );

        self.clear();
        request
    }

    /// reset all per-message state
    pub fn clear(&mut self) {
        self.parser.clear();
        self.acc = Accumulator::default();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Default)]
    struct Events {
        url: Vec<u8>,
        fields: Vec<Vec<u8>>,
        values: Vec<Vec<u8>>,
        body: Vec<u8>,
        headers_complete: bool,
        complete: bool,
        field_fires: usize,
    }

    impl ParserSink for Events {
        fn on_url(&mut self, data: &[u8]) {
            self.url.extend_from_slice(data);
        }
        fn on_header_field(&mut self, data: &[u8]) {
            self.fields.push(data.to_vec());
            self.field_fires += 1;
        }
        fn on_header_value(&mut self, data: &[u8]) {
            self.values.push(data.to_vec());
        }
        fn on_headers_complete(&mut self) {
            self.headers_complete = true;
        }
        fn on_body(&mut self, data: &[u8]) {
            self.body.extend_from_slice(data);
        }
        fn on_message_complete(&mut self) {
            self.complete = true;
        }
    }

    #[test]
    fn simple_get() {
        let mut parser = HttpParser::request();
        let mut events = Events::default();
        let input = b"GET /hello?a=1 HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let consumed = parser.feed(input, &mut events).unwrap();
        assert_eq!(consumed, input.len());
        assert!(events.complete);
        assert_eq!(events.url, b"/hello?a=1");
        assert_eq!(parser.method(), Some(Method::Get));
        assert_eq!(parser.version(), Some(Version::Http1_1));
        assert!(parser.keep_alive());
        assert!(!parser.close_connection());
    }

    #[test]
    fn byte_at_a_time() {
        let mut parser = HttpParser::request();
        let mut events = Events::default();
        let input = b"POST /submit HTTP/1.1\r\nHost: h\r\nContent-Length: 5\r\n\r\nhello";
        for chunk in input.chunks(1) {
            parser.feed(chunk, &mut events).unwrap();
        }
        assert!(events.complete);
        assert_eq!(events.body, b"hello");
        assert_eq!(parser.method(), Some(Method::Post));
        // single-byte feeds fire the field callback once per byte
        assert!(events.field_fires > 2);
    }

    #[test]
    fn method_disambiguation() {
        for (input, expected) in [
            ("PUT / HTTP/1.1\r\n\r\n", Method::Put),
            ("PATCH / HTTP/1.1\r\n\r\n", Method::Patch),
            ("PROPFIND / HTTP/1.1\r\n\r\n", Method::PropFind),
            ("PROPPATCH / HTTP/1.1\r\n\r\n", Method::PropPatch),
            ("M-SEARCH / HTTP/1.1\r\n\r\n", Method::MSearch),
            ("UNSUBSCRIBE / HTTP/1.1\r\n\r\n", Method::Unsubscribe),
        ] {
            let mut parser = HttpParser::request();
            parser.feed(input.as_bytes(), &mut Events::default()).unwrap();
            assert_eq!(parser.method(), Some(expected), "{input}");
        }
    }

    #[test]
    fn invalid_method_fails_and_latches() {
        let mut parser = HttpParser::request();
        let err = parser
            .feed(b"QUACK / HTTP/1.1\r\n\r\n", &mut Events::default())
            .unwrap_err();
        assert_eq!(err, ParseError::InvalidMethod);
        // latched until clear
        assert_eq!(
            parser.feed(b"GET / HTTP/1.1\r\n\r\n", &mut Events::default()),
            Err(ParseError::InvalidMethod)
        );
        parser.clear();
        assert!(parser.feed(b"GET / HTTP/1.1\r\n\r\n", &mut Events::default()).is_ok());
    }

    #[test]
    fn prefix_method_is_not_enough() {
        // GETX diverges after the full GET; it must not resolve to GET
        let mut parser = HttpParser::request();
        let err = parser
            .feed(b"GETX / HTTP/1.1\r\n\r\n", &mut Events::default())
            .unwrap_err();
        assert_eq!(err, ParseError::InvalidMethod);
    }

    #[test]
    fn chunked_body_with_extensions_and_trailers() {
        let mut parser = HttpParser::request();
        let mut events = Events::default();
        let input = b"POST /up HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: chunked\r\n\r\n\
                      4;ext=1\r\nWiki\r\n5\r\npedia\r\n0\r\nX-Trailer: yes\r\n\r\n";
        let consumed = parser.feed(input, &mut events).unwrap();
        assert_eq!(consumed, input.len());
        assert!(events.complete);
        assert_eq!(events.body, b"Wikipedia");
    }

    #[test]
    fn content_length_and_chunked_conflict() {
        let mut parser = HttpParser::request();
        let err = parser
            .feed(
                b"POST / HTTP/1.1\r\nContent-Length: 5\r\nTransfer-Encoding: chunked\r\n\r\n",
                &mut Events::default(),
            )
            .unwrap_err();
        assert_eq!(err, ParseError::UnexpectedContentLength);
    }

    #[test]
    fn lenient_tolerates_non_final_chunked() {
        let mut parser = HttpParser::request();
        parser.set_lenient(true);
        let mut events = Events::default();
        let input =
            b"POST / HTTP/1.1\r\nContent-Length: 2\r\nTransfer-Encoding: gzip\r\n\r\nhi";
        parser.feed(input, &mut events).unwrap();
        assert!(events.complete);
        assert_eq!(events.body, b"hi");
    }

    #[test]
    fn header_overflow() {
        let mut parser = HttpParser::request().with_max_head_len(64);
        let mut input = b"GET / HTTP/1.1\r\nX-Big: ".to_vec();
        input.extend(std::iter::repeat_n(b'a', 128));
        let err = parser.feed(&input, &mut Events::default()).unwrap_err();
        assert_eq!(err, ParseError::HeaderOverflow);
    }

    #[test]
    fn keep_alive_policy() {
        // 1.1 defaults to keep-alive
        let mut parser = HttpParser::request();
        parser
            .feed(b"GET / HTTP/1.1\r\n\r\n", &mut Events::default())
            .unwrap();
        assert!(parser.keep_alive());

        // 1.1 with close
        let mut parser = HttpParser::request();
        parser
            .feed(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n", &mut Events::default())
            .unwrap();
        assert!(!parser.keep_alive());
        assert!(parser.close_connection());

        // 1.0 defaults to close
        let mut parser = HttpParser::request();
        parser
            .feed(b"GET / HTTP/1.0\r\n\r\n", &mut Events::default())
            .unwrap();
        assert!(!parser.keep_alive());
        assert!(parser.close_connection());

        // 1.0 with keep-alive
        let mut parser = HttpParser::request();
        parser
            .feed(
                b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n",
                &mut Events::default(),
            )
            .unwrap();
        assert!(parser.keep_alive());
        assert!(!parser.close_connection());
    }

    #[test]
    fn expect_continue_flag() {
        let mut parser = HttpParser::request();
        parser
            .feed(
                b"POST / HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 1\r\n\r\n",
                &mut Events::default(),
            )
            .unwrap();
        assert!(parser.needs_continue());
    }

    #[test]
    fn upgrade_stops_consumption() {
        let mut parser = HttpParser::request();
        let mut events = Events::default();
        let input = b"GET /ws HTTP/1.1\r\nConnection: upgrade\r\nUpgrade: websocket\r\n\r\n\x81\x00";
        let consumed = parser.feed(input, &mut events).unwrap();
        assert!(parser.upgrade());
        assert!(events.complete);
        assert_eq!(consumed, input.len() - 2);
    }

    #[test]
    fn stops_at_message_boundary() {
        let mut parser = HttpParser::request();
        let mut events = Events::default();
        let input = b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n";
        let consumed = parser.feed(input, &mut events).unwrap();
        assert_eq!(consumed, input.len() / 2);
        assert!(events.complete);
    }

    #[test]
    fn response_mode() {
        let mut parser = HttpParser::response();
        let mut events = Events::default();
        parser
            .feed(
                b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi",
                &mut events,
            )
            .unwrap();
        assert!(events.complete);
        assert_eq!(parser.status_code(), 200);
        assert_eq!(events.body, b"hi");
    }

    #[test]
    fn response_until_eof() {
        let mut parser = HttpParser::response();
        let mut events = Events::default();
        parser
            .feed(b"HTTP/1.0 200 OK\r\n\r\npartial", &mut events)
            .unwrap();
        assert!(!events.complete);
        parser.feed(b" body", &mut events).unwrap();
        parser.done(&mut events).unwrap();
        assert!(events.complete);
        assert_eq!(events.body, b"partial body");
    }

    #[test]
    fn eof_mid_message_is_an_error() {
        let mut parser = HttpParser::request();
        let mut events = Events::default();
        parser.feed(b"GET / HT", &mut events).unwrap();
        assert_eq!(parser.done(&mut events), Err(ParseError::InvalidEofState));
    }

    #[test]
    fn request_parser_round_trip() {
        let mut parser = RequestParser::new();
        let input = b"POST /things?a=1&b=2 HTTP/1.1\r\nHost: example.com\r\nX-One: 1\r\n\
                      Content-Length: 3\r\n\r\nabc";
        parser.feed(input).unwrap();
        assert!(parser.is_message_complete());
        let request = parser.take_request("127.0.0.1".into());
        assert_eq!(request.method(), Method::Post);
        assert_eq!(request.path(), "/things");
        assert_eq!(request.query().get("b"), Some("2"));
        assert_eq!(request.headers().get_str("host"), Some("example.com"));
        assert_eq!(request.body(), b"abc");
        assert!(request.keep_alive());
    }

    #[test]
    fn cleared_parser_has_no_leakage() {
        let mut parser = RequestParser::new();
        parser
            .feed(b"POST /a HTTP/1.1\r\nX-First: 1\r\nContent-Length: 3\r\n\r\nabc")
            .unwrap();
        let first = parser.take_request("".into());
        assert_eq!(first.path(), "/a");

        parser.feed(b"GET /b HTTP/1.1\r\n\r\n").unwrap();
        let second = parser.take_request("".into());
        assert_eq!(second.path(), "/b");
        assert!(second.body().is_empty());
        assert!(!second.headers().has_header("x-first"));
    }
}
