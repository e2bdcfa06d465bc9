use crate::{HeaderName, HeaderValues, Headers, KnownHeaderName, Status};
use std::{
    fmt::{self, Debug, Formatter},
    path::{Path, PathBuf},
};

type Finisher = Box<dyn FnOnce(&mut Response) + Send>;

/// An HTTP response under construction.
///
/// A response belongs to the connection serving it; handlers and middleware
/// receive it by mutable reference. Calling [`end`][Response::end] marks it
/// complete; a handler that wants to finish later takes a
/// [`Deferral`] with [`defer`][Response::defer] and the connection waits for
/// [`Deferral::finish`] before writing.
pub struct Response {
    status: Status,
    headers: Headers,
    body: Vec<u8>,
    static_file: Option<StaticFile>,
    completed: bool,
    manual_length_header: bool,
    compress_eligible: bool,
    deferral_rx: Option<async_channel::Receiver<Finisher>>,
}

/// A file attached to a response with [`Response::set_static_file`]. The
/// connection streams it after the header block instead of buffering it.
#[derive(Debug, Clone)]
pub struct StaticFile {
    pub(crate) path: PathBuf,
    pub(crate) len: u64,
}

impl StaticFile {
    /// the file's on-disk path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// the file's size from the stat at attach time
    pub fn len(&self) -> u64 {
        self.len
    }

    /// is the file empty?
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// One-shot completion handle for a deferred response. See
/// [`Response::defer`].
pub struct Deferral {
    tx: async_channel::Sender<Finisher>,
}

impl Deferral {
    /// Apply final mutations to the response on the connection's thread and
    /// complete it. May be called from any thread; consuming the deferral
    /// without calling this completes the response as-is.
    pub fn finish(self, f: impl FnOnce(&mut Response) + Send + 'static) {
        let _ = self.tx.try_send(Box::new(f));
    }
}

impl Debug for Deferral {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferral").finish()
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    /// construct an empty 200 response
    pub fn new() -> Self {
        Self {
            status: Status::Ok,
            headers: Headers::new(),
            body: Vec::new(),
            static_file: None,
            completed: false,
            manual_length_header: false,
            compress_eligible: true,
            deferral_rx: None,
        }
    }

    /// the current status code
    pub fn status(&self) -> Status {
        self.status
    }

    /// Set the status code from anything convertible. Codes outside the
    /// recognized table become 500, mirroring the writer's fixed status
    /// line table.
    pub fn set_status(&mut self, status: impl TryInto<Status>) {
        self.status = status.try_into().unwrap_or_else(|_| {
            log::error!("attempted to set an unrecognized status code");
            Status::InternalServerError
        });
    }

    /// the response headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// mutable access to the response headers
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Set a header, replacing existing values under the same name.
    /// Setting `Content-Length` by hand switches off the automatic length
    /// header.
    pub fn set_header(&mut self, name: impl Into<HeaderName>, values: impl Into<HeaderValues>) {
        let name = name.into();
        if name == KnownHeaderName::ContentLength.into() {
            self.manual_length_header = true;
        }
        self.headers.insert(name, values);
    }

    /// Add a header without replacing existing values under the same name.
    pub fn add_header(&mut self, name: impl Into<HeaderName>, values: impl Into<HeaderValues>) {
        self.headers.append(name, values);
    }

    /// the response body accumulated so far
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// replace the response body
    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();
    }

    /// append to the response body
    pub fn write(&mut self, data: impl AsRef<[u8]>) {
        self.body.extend_from_slice(data.as_ref());
    }

    /// take the body out of this response
    pub fn take_body(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.body)
    }

    /// Mark the response complete. Idempotent; everything after the first
    /// call is a no-op.
    pub fn end(&mut self) {
        self.completed = true;
    }

    /// has this response been completed?
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// was `Content-Length` set manually?
    pub fn manual_length_header(&self) -> bool {
        self.manual_length_header
    }

    /// may the compression hook rewrite this body?
    pub fn compress_eligible(&self) -> bool {
        self.compress_eligible
    }

    /// opt this response out of response compression
    pub fn skip_compression(&mut self) {
        self.compress_eligible = false;
    }

    /// Obtain a one-shot completion handle and leave the response pending.
    /// The connection stays in its handling state until
    /// [`Deferral::finish`] runs (or the deferral is dropped).
    pub fn defer(&mut self) -> Deferral {
        let (tx, rx) = async_channel::bounded(1);
        self.deferral_rx = Some(rx);
        Deferral { tx }
    }

    /// has a deferral been taken for this response?
    pub fn is_deferred(&self) -> bool {
        self.deferral_rx.is_some()
    }

    pub(crate) fn take_deferral(&mut self) -> Option<async_channel::Receiver<Finisher>> {
        self.deferral_rx.take()
    }

    /// Await a taken deferral and apply its finishing closure. Used by the
    /// connection; completes the response either way.
    pub async fn wait_for_deferral(&mut self) {
        if let Some(rx) = self.take_deferral() {
            if let Ok(finish) = rx.recv().await {
                finish(self);
            }
            self.end();
        }
    }

    /// Respond with a `302 Found` redirect to `location`.
    pub fn redirect(&mut self, location: impl Into<String>) {
        self.status = Status::Found;
        self.headers
            .insert(KnownHeaderName::Location, location.into());
    }

    /// Respond with a `301 Moved Permanently` redirect to `location`.
    pub fn redirect_perm(&mut self, location: impl Into<String>) {
        self.status = Status::MovedPermanently;
        self.headers
            .insert(KnownHeaderName::Location, location.into());
    }

    /// Attach a file to stream as the response body. Stats the file
    /// immediately: a missing or unreadable path turns the response into a
    /// plain 404. `Content-Type` is derived from the extension unless one
    /// was already set.
    pub fn set_static_file(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        match std::fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => {
                self.headers.try_insert(
                    KnownHeaderName::ContentType,
                    content_type_for_path(&path),
                );
                self.static_file = Some(StaticFile {
                    len: metadata.len(),
                    path,
                });
            }
            _ => {
                log::warn!("static file not found: {}", path.display());
                self.status = Status::NotFound;
                self.static_file = None;
            }
        }
    }

    /// the attached static file, if any
    pub fn static_file(&self) -> Option<&StaticFile> {
        self.static_file.as_ref()
    }

    pub fn take_static_file(&mut self) -> Option<StaticFile> {
        self.static_file.take()
    }

    /// Reset this response for reuse on the next request of a keep-alive
    /// connection.
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

impl Debug for Response {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("static_file", &self.static_file)
            .field("completed", &self.completed)
            .finish()
    }
}

/// The `Content-Type` the server assumes for a static file with this
/// extension. Falls back to `text/plain`.
pub fn content_type_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("html" | "htm") => "text/html",
        Some("css") => "text/css",
        Some("js" | "mjs") => "text/javascript",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("txt") => "text/plain",
        Some("csv") => "text/csv",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        Some("wasm") => "application/wasm",
        Some("zip") => "application/zip",
        Some("gz") => "application/gzip",
        Some("mp3") => "audio/mpeg",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        _ => "text/plain",
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn end_is_idempotent() {
        let mut response = Response::new();
        assert!(!response.is_completed());
        response.end();
        response.end();
        assert!(response.is_completed());
    }

    #[test]
    fn manual_content_length_is_detected() {
        let mut response = Response::new();
        response.set_header("content-length", "42");
        assert!(response.manual_length_header());
    }

    #[test]
    fn missing_static_file_is_a_404() {
        let mut response = Response::new();
        response.set_static_file("/definitely/not/a/real/file.txt");
        assert_eq!(response.status(), Status::NotFound);
        assert!(response.static_file().is_none());
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for_path(Path::new("a/b.html")), "text/html");
        assert_eq!(content_type_for_path(Path::new("b.JSON")), "application/json");
        assert_eq!(content_type_for_path(Path::new("noext")), "text/plain");
    }

    #[test]
    fn deferral_completes_response() {
        let mut response = Response::new();
        let deferral = response.defer();
        deferral.finish(|res| {
            res.set_body("later");
        });
        futures_lite::future::block_on(response.wait_for_deferral());
        assert!(response.is_completed());
        assert_eq!(response.body(), b"later");
    }
}
