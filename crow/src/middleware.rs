use crow_http::{Request, Response};
use std::any::Any;

/// A before/after hook pair run around every handler.
///
/// Middlewares are declared in order at app construction and are read-only
/// while serving. For each request, `before_handle` hooks run in
/// declaration order and `after_handle` hooks run in reverse; if a
/// `before_handle` completes the response, the handler and the remaining
/// `before_handle`s are skipped, and only the `after_handle`s of
/// middlewares whose `before_handle` ran are invoked.
///
/// Each middleware contributes a per-request context value, created by
/// [`new_context`][Middleware::new_context] and stored in the request's
/// [`StateMap`][crow_http::StateMap] under its concrete type. Hooks reach
/// their own context — or another middleware's, for cross-middleware reads —
/// through `req.state()`/`req.state_mut()`:
///
/// ```
/// use crow::{Middleware, Request, Response};
///
/// #[derive(Default)]
/// struct VisitCounter;
///
/// #[derive(Default)]
/// struct VisitContext {
///     page: String,
/// }
///
/// impl Middleware for VisitCounter {
///     fn new_context(&self) -> Box<dyn std::any::Any + Send + Sync> {
///         Box::new(VisitContext::default())
///     }
///
///     fn before_handle(&self, req: &mut Request, _res: &mut Response) {
///         let page = req.path().to_owned();
///         req.state_mut().get_mut::<VisitContext>().unwrap().page = page;
///     }
/// }
/// ```
pub trait Middleware: Send + Sync + 'static {
    /// A fresh context for one request. The default is a unit value for
    /// middlewares that keep no per-request state.
    fn new_context(&self) -> Box<dyn Any + Send + Sync> {
        Box::new(())
    }

    /// runs before the handler, in declaration order. Completing the
    /// response here skips everything up to the matching `after_handle`.
    fn before_handle(&self, _req: &mut Request, _res: &mut Response) {}

    /// runs after the handler, in reverse declaration order
    fn after_handle(&self, _req: &mut Request, _res: &mut Response) {}
}

/// Run a chain's `before_handle`s in order, stopping after the first one
/// that completes the response. Returns how many ran.
pub(crate) fn run_before(
    middlewares: &[std::sync::Arc<dyn Middleware>],
    req: &mut Request,
    res: &mut Response,
) -> usize {
    for middleware in middlewares {
        req.state_mut().insert_boxed(middleware.new_context());
    }

    let mut ran = 0;
    for middleware in middlewares {
        ran += 1;
        middleware.before_handle(req, res);
        if res.is_completed() {
            break;
        }
    }
    ran
}

/// Run the `after_handle`s of the first `ran` middlewares, in reverse.
pub(crate) fn run_after(
    middlewares: &[std::sync::Arc<dyn Middleware>],
    ran: usize,
    req: &mut Request,
    res: &mut Response,
) {
    for middleware in middlewares[..ran].iter().rev() {
        middleware.after_handle(req, res);
    }
}
