use crate::Middleware;
use crow_http::{Method, Request, Response};
use crow_router::{FromRouteParams, MethodMask, RouteParams, pattern_tag};
use crow_websockets::WebSocketRoute;
use std::sync::Arc;

pub(crate) type HandlerFn = Box<dyn Fn(&mut Request, &mut Response, &RouteParams) + Send + Sync>;

/// What a matched rule dispatches to: a plain handler with its rule-local
/// middleware, or a websocket endpoint that takes over the transport.
pub(crate) enum Endpoint {
    Handler {
        run: HandlerFn,
        middlewares: Vec<Arc<dyn Middleware>>,
    },
    WebSocket(Arc<WebSocketRoute>),
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Handler { middlewares, .. } => f
                .debug_struct("Handler")
                .field("middlewares", &middlewares.len())
                .finish_non_exhaustive(),
            Self::WebSocket(route) => f.debug_tuple("WebSocket").field(route).finish(),
        }
    }
}

/// Anything routes can be registered on: the app itself or a blueprint.
pub(crate) trait Routable {
    fn add_endpoint(
        &mut self,
        pattern: &str,
        methods: MethodMask,
        name: Option<String>,
        endpoint: Endpoint,
    );
}

/// Incremental registration of one route. Produced by `route()` on
/// [`App`][crate::App] and [`Blueprint`][crate::Blueprint]; the route is
/// registered when [`to`][RouteBuilder::to] installs the handler.
///
/// The handler's tuple argument is checked against the pattern's
/// placeholders here, at registration time; a mismatch is a programming
/// error and panics with a description of both sides.
pub struct RouteBuilder<'a> {
    target: &'a mut dyn Routable,
    pattern: String,
    methods: MethodMask,
    name: Option<String>,
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl std::fmt::Debug for RouteBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteBuilder")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

impl<'a> RouteBuilder<'a> {
    pub(crate) fn new(target: &'a mut dyn Routable, pattern: &str) -> Self {
        Self {
            target,
            pattern: pattern.to_owned(),
            methods: MethodMask::EMPTY,
            name: None,
            middlewares: Vec::new(),
        }
    }

    /// the methods this route accepts; GET when never called
    pub fn methods(mut self, methods: &[Method]) -> Self {
        for method in methods {
            self.methods.add(*method);
        }
        self
    }

    /// name the route
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach a middleware that runs only for this route, after the global
    /// `before_handle` chain and before the global `after_handle` chain.
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Install the handler and register the route. `Args` is a tuple of
    /// `i64`/`u64`/`f64`/`String` matching the pattern's placeholders, or
    /// `()` for a pattern without any.
    pub fn to<Args, F>(self, handler: F)
    where
        Args: FromRouteParams + 'static,
        F: Fn(&mut Request, &mut Response, Args) + Send + Sync + 'static,
    {
        let kinds = pattern_tag(&self.pattern)
            .unwrap_or_else(|| panic!("invalid placeholder in route pattern {:?}", self.pattern));
        assert!(
            Args::matches(&kinds),
            "handler arguments ({}) do not match the placeholders of {:?}",
            Args::describe(),
            self.pattern,
        );

        let run: HandlerFn =
            Box::new(move |req, res, params| handler(req, res, Args::from_params(params)));
        let methods = if self.methods.is_empty() {
            MethodMask::of(Method::Get)
        } else {
            self.methods
        };
        self.target.add_endpoint(
            &self.pattern,
            methods,
            self.name,
            Endpoint::Handler {
                run,
                middlewares: self.middlewares,
            },
        );
    }

    /// Register a websocket endpoint at this route instead of a handler.
    pub fn websocket(self, route: WebSocketRoute) {
        let methods = if self.methods.is_empty() {
            MethodMask::of(Method::Get)
        } else {
            self.methods
        };
        self.target.add_endpoint(
            &self.pattern,
            methods,
            self.name,
            Endpoint::WebSocket(Arc::new(route)),
        );
    }
}

pub(crate) fn catchall_endpoint(
    handler: impl Fn(&mut Request, &mut Response) + Send + Sync + 'static,
) -> Endpoint {
    Endpoint::Handler {
        run: Box::new(move |req, res, _params| handler(req, res)),
        middlewares: Vec::new(),
    }
}
