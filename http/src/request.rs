use crate::{Headers, KnownHeaderName, Method, QueryString, StateMap, Version};
use std::fmt::{self, Debug, Formatter};

/// A fully parsed HTTP request.
///
/// Requests are produced by the connection's parser and live exactly as long
/// as the connection serving them; middleware and handlers borrow them. The
/// [`StateMap`] carried here is the per-request middleware context block.
pub struct Request {
    method: Method,
    raw_url: String,
    path: String,
    query: QueryString,
    headers: Headers,
    body: Vec<u8>,
    version: Version,
    keep_alive: bool,
    close_connection: bool,
    upgrade: bool,
    remote_ip: String,
    state: StateMap,
}

impl Request {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        method: Method,
        raw_url: String,
        path: String,
        query: QueryString,
        headers: Headers,
        body: Vec<u8>,
        version: Version,
        keep_alive: bool,
        close_connection: bool,
        upgrade: bool,
        remote_ip: String,
        state: StateMap,
    ) -> Self {
        Self {
            method,
            raw_url,
            path,
            query,
            headers,
            body,
            version,
            keep_alive,
            close_connection,
            upgrade,
            remote_ip,
            state,
        }
    }

    /// Construct a request without a connection behind it. Useful for
    /// exercising routing and middleware in tests.
    pub fn synthetic(method: Method, url: &str, body: impl Into<Vec<u8>>) -> Self {
        let without_fragment = url.split_once('#').map_or(url, |(before, _)| before);
        let (path, query) = match without_fragment.split_once('?') {
            Some((path, query)) => (path.to_owned(), QueryString::parse(query)),
            None => (without_fragment.to_owned(), QueryString::default()),
        };
        Self::new(
            method,
            url.to_owned(),
            path,
            query,
            Headers::new(),
            body.into(),
            Version::Http1_1,
            true,
            false,
            false,
            String::new(),
            StateMap::new(),
        )
    }

    /// the request method
    pub fn method(&self) -> Method {
        self.method
    }

    /// the request target exactly as it appeared on the request line
    pub fn raw_url(&self) -> &str {
        &self.raw_url
    }

    /// the path portion of the url, before any `?`
    pub fn path(&self) -> &str {
        &self.path
    }

    /// the parsed query parameters
    pub fn query(&self) -> &QueryString {
        &self.query
    }

    /// mutable access to the query parameters, for the destructive `pop`
    /// api
    pub fn query_mut(&mut self) -> &mut QueryString {
        &mut self.query
    }

    /// the request headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// mutable access to the request headers
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// the first value of the named header, if it is utf-8
    pub fn header(&self, name: impl Into<crate::HeaderName>) -> Option<&str> {
        self.headers.get_str(name)
    }

    /// the `Host` header, if present
    pub fn host(&self) -> Option<&str> {
        self.headers.get_str(KnownHeaderName::Host)
    }

    /// the request body bytes
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// the request body as a string, if it is utf-8
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// the protocol version of this request
    pub fn version(&self) -> Version {
        self.version
    }

    /// should the connection stay open after responding?
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// must the connection close after responding?
    pub fn close_connection(&self) -> bool {
        self.close_connection
    }

    /// did this request ask for a protocol upgrade?
    pub fn is_upgrade(&self) -> bool {
        self.upgrade
    }

    /// the peer address, as a string; empty when unknown
    pub fn remote_ip(&self) -> &str {
        &self.remote_ip
    }

    /// the per-request state map. Middleware contexts live here, addressed
    /// by their type.
    pub fn state(&self) -> &StateMap {
        &self.state
    }

    /// mutable access to the per-request state map
    pub fn state_mut(&mut self) -> &mut StateMap {
        &mut self.state
    }
}

impl Debug for Request {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("raw_url", &self.raw_url)
            .field("version", &self.version)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("keep_alive", &self.keep_alive)
            .field("upgrade", &self.upgrade)
            .field("remote_ip", &self.remote_ip)
            .finish()
    }
}
