use crate::{KnownHeaderName, Response, Status, Version};

/// Everything the response head writer needs from the connection: the
/// request's protocol version, the keep-alive decision, the worker's cached
/// date string, and the request `Host` for redirect absolutization.
#[derive(Debug, Clone, Copy)]
pub struct HeadContext<'a> {
    /// protocol version to put on the status line
    pub version: Version,
    /// emit `Connection: Keep-Alive`?
    pub keep_alive: bool,
    /// value for the auto-added `Server` header
    pub server_name: &'a str,
    /// preformatted RFC 1123 date for the auto-added `Date` header
    pub date: &'a str,
    /// the request's `Host` header, for `Location` absolutization
    pub host: Option<&'a str>,
    /// was the request received over TLS?
    pub secure: bool,
}

/// Apply the response-head fixups that depend on request context: relative
/// `Location` values gain a scheme and host, and empty error bodies receive
/// the canonical reason phrase.
pub fn finalize(res: &mut Response, ctx: &HeadContext<'_>) {
    let absolute = match (res.headers().get_str(KnownHeaderName::Location), ctx.host) {
        (Some(location), Some(host)) if !location.contains("://") => {
            let scheme = if ctx.secure { "https" } else { "http" };
            Some(format!("{scheme}://{host}{location}"))
        }
        _ => None,
    };
    if let Some(absolute) = absolute {
        res.headers_mut()
            .insert(KnownHeaderName::Location, absolute);
    }

    if res.status().is_error() && res.body().is_empty() && res.static_file().is_none() {
        let reason = res.status().canonical_reason();
        res.set_body(reason);
    }
}

/// Emit the header block: status line, application headers in insertion
/// order, then the auto headers that are not already present —
/// `Content-Length` (unless set manually), `Server`, `Date`, and
/// `Connection: Keep-Alive` when the connection stays open — and the
/// terminating blank line.
pub fn encode_head(res: &Response, ctx: &HeadContext<'_>) -> Vec<u8> {
    use std::io::Write;

    let mut out = Vec::with_capacity(256);
    let status = res.status();

    let _ = write!(
        out,
        "{} {} {}\r\n",
        ctx.version,
        u16::from(status),
        status.canonical_reason()
    );

    for (name, values) in res.headers() {
        if !name.is_valid() {
            log::error!("skipping header with invalid name {name:?}");
            continue;
        }
        for value in values {
            if value.is_valid() {
                let _ = write!(out, "{name}: ");
                out.extend_from_slice(value.as_ref());
                out.extend_from_slice(b"\r\n");
            } else {
                log::error!("skipping invalid value for header {name}");
            }
        }
    }

    if !res.manual_length_header() {
        let length = res
            .static_file()
            .map_or(res.body().len() as u64, |file| file.len());
        let _ = write!(out, "Content-Length: {length}\r\n");
    }

    if !res.headers().has_header(KnownHeaderName::Server) {
        let _ = write!(out, "Server: {}\r\n", ctx.server_name);
    }

    if !res.headers().has_header(KnownHeaderName::Date) {
        let _ = write!(out, "Date: {}\r\n", ctx.date);
    }

    if ctx.keep_alive {
        out.extend_from_slice(b"Connection: Keep-Alive\r\n");
    }

    out.extend_from_slice(b"\r\n");
    out
}

/// The interim response for `Expect: 100-continue`.
pub const CONTINUE_RESPONSE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// Does a response to this request method/status pair carry a body on the
/// wire? HEAD responses and 1xx/204/304 never do.
pub fn response_has_body(method_is_head: bool, status: Status) -> bool {
    !(method_is_head
        || status.is_informational()
        || status == Status::NoContent
        || status == Status::NotModified)
}
