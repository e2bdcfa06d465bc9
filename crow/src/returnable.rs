use crow_http::{KnownHeaderName, Response};

/// A value a handler can send as a response body: a content type plus a
/// serialization. Adapters for richer types (JSON documents, rendered
/// templates) implement this in their own crates; the core ships the plain
/// text and byte impls.
pub trait Returnable {
    /// the `Content-Type` to attach, unless one is already set
    fn content_type(&self) -> &'static str;

    /// serialize into the response body
    fn dump(self) -> Vec<u8>;
}

impl Returnable for String {
    fn content_type(&self) -> &'static str {
        "text/plain"
    }

    fn dump(self) -> Vec<u8> {
        self.into_bytes()
    }
}

impl Returnable for &str {
    fn content_type(&self) -> &'static str {
        "text/plain"
    }

    fn dump(self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl Returnable for Vec<u8> {
    fn content_type(&self) -> &'static str {
        "application/octet-stream"
    }

    fn dump(self) -> Vec<u8> {
        self
    }
}

/// Extends [`Response`] with a one-call way to answer with any
/// [`Returnable`].
pub trait SendReturnable {
    /// set the content type (if absent), set the body, and complete the
    /// response
    fn send(&mut self, value: impl Returnable);
}

impl SendReturnable for Response {
    fn send(&mut self, value: impl Returnable) {
        self.headers_mut()
            .try_insert(KnownHeaderName::ContentType, value.content_type());
        self.set_body(value.dump());
        self.end();
    }
}
