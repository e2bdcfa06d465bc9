use crow_http::{Request, Response, Transport};
use swansong::Swansong;

/// The application seen from the connection layer.
///
/// `crow`'s `App` is the implementation: `handle` runs the middleware
/// pipeline and router for one request, and the upgrade pair hands over the
/// socket when a matched route negotiates a protocol switch.
///
/// Handlers run on whichever single-threaded worker owns the connection, so
/// the futures these methods return do not need to be `Send`; the service
/// itself is shared across workers and must be `Sync`.
pub trait Service: Send + Sync + 'static {
    /// Produce the response for one request. The connection has already
    /// parsed the request completely; when this returns, the response is
    /// final and will be written.
    fn handle(
        &self,
        req: &mut Request,
        res: &mut Response,
    ) -> impl Future<Output = ()>;

    /// Does the application want to take over the transport for this
    /// upgrade request? Consulted only when the request carried an upgrade.
    fn wants_upgrade(&self, _req: &Request) -> bool {
        false
    }

    /// Take ownership of the transport for an upgrade accepted by
    /// [`wants_upgrade`][Service::wants_upgrade]. `leftover` holds any
    /// bytes the connection had read past the request's header block, and
    /// `swansong` is the server's shutdown signal: the upgraded protocol
    /// must wind down promptly once it fires, because the worker drains
    /// before stopping. The connection is destroyed when this returns.
    fn upgrade<T: Transport>(
        &self,
        _req: Request,
        _transport: T,
        _leftover: Vec<u8>,
        _swansong: Swansong,
    ) -> impl Future<Output = ()> {
        async {}
    }
}
