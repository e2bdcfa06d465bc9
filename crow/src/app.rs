use crate::{
    Compressor, LogLevel, Middleware, RouteBuilder, logger,
    middleware::{run_after, run_before},
    routes::{Endpoint, HandlerFn, Routable, catchall_endpoint},
};
use crow_http::{KnownHeaderName, Method, Request, Response, Status, Transport};
use crow_router::{Match, MethodMask, RouteParams, Router, RouterError};
use crow_server::{Server, ServerConfig, Service, Swansong};
use crow_websockets::{CloseCode, Connection as WebSocketConnection, Handle as WebSocketHandle,
    WebSocketRoute, negotiate};
use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, Mutex},
    time::Duration,
};

type ExceptionHandler = Box<dyn Fn(&mut Response) + Send + Sync>;

macro_rules! method_sugar {
    ($(#[$doc:meta] $fn_name:ident => $method:ident),+ $(,)?) => {
        $(
            #[$doc]
            pub fn $fn_name<Args, F>(&mut self, pattern: &str, handler: F)
            where
                Args: crow_router::FromRouteParams + 'static,
                F: Fn(&mut Request, &mut Response, Args) + Send + Sync + 'static,
            {
                self.route(pattern).methods(&[Method::$method]).to(handler);
            }
        )+
    };
}

/// The application: the route table, the middleware chain, and the
/// configuration the server is started with.
///
/// Everything is registered up front; the app becomes read-only once
/// [`run`][App::run] or [`run_async`][App::run_async] validates it and
/// starts serving.
pub struct App {
    router: Router<Endpoint>,
    middlewares: Vec<Arc<dyn Middleware>>,
    server_config: ServerConfig,
    options_success_status: Status,
    websocket_max_payload: u64,
    compressor: Option<Box<dyn Compressor>>,
    exception_handler: ExceptionHandler,
    websockets: Mutex<Vec<WebSocketHandle>>,
    server_handle: Mutex<Option<crow_server::ServerHandle>>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("router", &self.router)
            .field("middlewares", &self.middlewares.len())
            .field("server_config", &self.server_config)
            .finish_non_exhaustive()
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl Routable for App {
    fn add_endpoint(
        &mut self,
        pattern: &str,
        methods: MethodMask,
        name: Option<String>,
        endpoint: Endpoint,
    ) {
        let rule = self
            .router
            .add(pattern, methods, endpoint)
            .expect("could not add route");
        if let Some(name) = name {
            rule.set_name(name);
        }
    }
}

impl App {
    /// construct an app with no routes and default configuration
    pub fn new() -> Self {
        Self {
            router: Router::new(),
            middlewares: Vec::new(),
            server_config: ServerConfig::default(),
            options_success_status: Status::NoContent,
            websocket_max_payload: u64::MAX,
            compressor: None,
            exception_handler: Box::new(|res| {
                res.set_status(Status::InternalServerError);
                res.set_body("");
            }),
            websockets: Mutex::new(Vec::new()),
            server_handle: Mutex::new(None),
        }
    }

    // ---- registration ----------------------------------------------------

    /// Begin registering a route at `pattern`. Finish with
    /// [`RouteBuilder::to`] or [`RouteBuilder::websocket`].
    pub fn route(&mut self, pattern: &str) -> RouteBuilder<'_> {
        RouteBuilder::new(self, pattern)
    }

    method_sugar! {
        /// register a GET route
        get => Get,
        /// register a POST route
        post => Post,
        /// register a PUT route
        put => Put,
        /// register a DELETE route
        delete => Delete,
        /// register a PATCH route
        patch => Patch,
        /// register a HEAD route
        head => Head,
    }

    /// register a websocket endpoint at `pattern`
    pub fn websocket(&mut self, pattern: &str, route: WebSocketRoute) {
        self.route(pattern).websocket(route);
    }

    /// install the handler run when no route matches
    pub fn catchall(
        &mut self,
        handler: impl Fn(&mut Request, &mut Response) + Send + Sync + 'static,
    ) {
        self.router.set_catchall(catchall_endpoint(handler));
    }

    /// append a middleware to the global chain, in declaration order
    pub fn middleware(&mut self, middleware: impl Middleware) -> &mut Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// mount a [`Blueprint`]'s routes under its prefix
    pub fn register_blueprint(&mut self, blueprint: Blueprint) {
        self.mount("", blueprint);
    }

    fn mount(&mut self, parent_prefix: &str, blueprint: Blueprint) {
        let prefix = format!("{parent_prefix}{}", blueprint.prefix);
        for (pattern, methods, name, endpoint) in blueprint.routes {
            let full = format!("{prefix}{pattern}");
            self.add_endpoint(&full, methods, name, endpoint);
        }
        self.router.add_blueprint(prefix.clone(), blueprint.catchall);
        for child in blueprint.children {
            self.mount(&prefix, child);
        }
    }

    /// Check the route table for conflicts. Called automatically by `run`;
    /// exposed for applications that want the check earlier.
    pub fn validate(&self) -> Result<(), RouterError> {
        self.router.validate()
    }

    // ---- configuration ---------------------------------------------------

    /// set the listen port
    pub fn port(mut self, port: u16) -> Self {
        self.server_config.port = port;
        self
    }

    /// set the listen address (default `0.0.0.0`)
    pub fn bindaddr(mut self, bindaddr: impl Into<String>) -> Self {
        self.server_config.bindaddr = bindaddr.into();
        self
    }

    /// serve over a unix domain socket at `path` instead of TCP
    #[cfg(unix)]
    pub fn local_socket_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.server_config.local_socket_path = Some(path.into());
        self
    }

    /// set the total thread count; values below 2 are clamped to 2
    pub fn concurrency(mut self, concurrency: u16) -> Self {
        self.server_config.concurrency = concurrency;
        self
    }

    /// use one thread per hardware thread
    pub fn multithreaded(self) -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| u16::try_from(n.get()).unwrap_or(u16::MAX))
            .unwrap_or(2);
        self.concurrency(threads)
    }

    /// set the per-connection idle timeout in seconds (default 5)
    pub fn timeout(mut self, seconds: u8) -> Self {
        self.server_config.timeout = seconds;
        self
    }

    /// set the value of the `Server` header
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_config.server_name = name.into();
        self
    }

    /// set the body size above which responses are written in blocks
    pub fn stream_threshold(mut self, bytes: usize) -> Self {
        self.server_config.http.stream_threshold = bytes;
        self
    }

    /// cap websocket frame payloads, app-wide (routes may override)
    pub fn websocket_max_payload(mut self, bytes: u64) -> Self {
        self.websocket_max_payload = bytes;
        self
    }

    /// remove every signal from the shutdown handler
    pub fn signal_clear(mut self) -> Self {
        self.server_config.signals.clear();
        self
    }

    /// bind an additional signal to the shutdown handler
    pub fn signal_add(mut self, signal: i32) -> Self {
        self.server_config.signals.push(signal);
        self
    }

    /// set the log filter level
    pub fn loglevel(self, level: LogLevel) -> Self {
        log::set_max_level(level.into());
        self
    }

    /// install a response compression backend
    pub fn use_compression(mut self, compressor: impl Compressor) -> Self {
        self.compressor = Some(Box::new(compressor));
        self
    }

    /// run `f` every `interval` on the accept loop
    pub fn tick(mut self, interval: Duration, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.server_config.tick = Some((interval, Arc::new(f)));
        self
    }

    /// The status for automatic `OPTIONS` responses: `204 No Content` by
    /// default, `200 OK` for clients that insist on it.
    pub fn options_success_status(mut self, status: Status) -> Self {
        self.options_success_status = status;
        self
    }

    /// Replace the handler invoked when a route handler panics. The
    /// default produces an empty 500.
    pub fn exception_handler(
        mut self,
        handler: impl Fn(&mut Response) + Send + Sync + 'static,
    ) -> Self {
        self.exception_handler = Box::new(handler);
        self
    }

    // ---- serving ---------------------------------------------------------

    /// Validate, bind, and serve on the calling thread until stopped by a
    /// signal or [`AppHandle::stop`].
    pub fn run(self) -> std::io::Result<()> {
        let (_app, server) = self.into_server();
        server.run()
    }

    /// Validate, bind, and serve on a background thread. The returned
    /// handle waits for startup, stops the server, and joins the thread.
    pub fn run_async(self) -> AppHandle {
        let (app, server) = self.into_server();
        let server_handle = server.handle();
        let thread = std::thread::spawn(move || {
            if let Err(error) = server.run() {
                log::error!("server failed: {error}");
            }
        });
        AppHandle {
            app,
            server: server_handle,
            thread: Some(thread),
        }
    }

    fn into_server(mut self) -> (Arc<App>, Server<App>) {
        logger::ensure_logger();
        self.validate().expect("route table is invalid");
        let config = std::mem::take(&mut self.server_config);
        let app = Arc::new(self);
        let server = Server::new(app.clone(), config);
        *app.server_handle.lock().unwrap() = Some(server.handle());
        (app, server)
    }

    /// Stop serving: close every websocket with a shutdown close frame,
    /// then stop the workers and the accept loop. Blocks until in-flight
    /// connections have drained — requests already being handled finish
    /// and their responses reach the wire before this returns.
    pub fn stop(&self) {
        for websocket in self.websockets.lock().unwrap().drain(..) {
            websocket.close("Server Application Terminated", CloseCode::NormalClosure);
        }
        if let Some(handle) = self.server_handle.lock().unwrap().as_ref() {
            handle.stop();
        }
    }

    // ---- dispatch --------------------------------------------------------

    async fn dispatch(&self, req: &mut Request, res: &mut Response) {
        if req.method() == Method::Options && req.raw_url() == "*" {
            res.set_status(self.options_success_status);
            res.set_header(
                KnownHeaderName::Allow,
                self.router.allow_all().allow_header_value(),
            );
            res.end();
            return;
        }

        let path = req.path().to_owned();
        match self.router.route(req.method(), &path) {
            Match::Found { rule, params } => match &rule.handler {
                Endpoint::Handler { run, middlewares } => {
                    let ran = run_before(middlewares, req, res);
                    if !res.is_completed() {
                        self.invoke(run, req, res, &params);
                        if !res.is_completed() && res.is_deferred() {
                            res.wait_for_deferral().await;
                        }
                    }
                    run_after(middlewares, ran, req, res);
                }
                Endpoint::WebSocket(_) => {
                    // websocket routes answer only upgrade requests
                    res.set_status(Status::NotFound);
                }
            },
            Match::MethodNotAllowed { allow } => {
                if req.method() == Method::Options {
                    res.set_status(self.options_success_status);
                    res.set_header(KnownHeaderName::Allow, allow.allow_header_value());
                    res.end();
                } else {
                    res.set_status(Status::MethodNotAllowed);
                    res.set_header(KnownHeaderName::Allow, allow.allow_header_value());
                }
            }
            Match::NotFound => match self.router.catchall_for(&path) {
                Some(Endpoint::Handler { run, .. }) => {
                    self.invoke(run, req, res, &RouteParams::default());
                }
                _ => res.set_status(Status::NotFound),
            },
        }
    }

    fn invoke(&self, run: &HandlerFn, req: &mut Request, res: &mut Response, params: &RouteParams) {
        if catch_unwind(AssertUnwindSafe(|| run(req, res, params))).is_err() {
            log::error!("handler panicked, invoking the exception handler");
            (self.exception_handler)(res);
        }
    }

    fn apply_compression(&self, req: &Request, res: &mut Response) {
        let Some(compressor) = &self.compressor else {
            return;
        };
        if !res.compress_eligible() || res.body().is_empty() || res.static_file().is_some() {
            return;
        }
        let token = compressor.algorithm().token();
        if !req
            .headers()
            .contains_token(KnownHeaderName::AcceptEncoding, token)
        {
            return;
        }
        let body = compressor.compress(res.body());
        res.headers_mut()
            .insert(KnownHeaderName::ContentEncoding, token);
        res.set_body(body);
    }

    fn add_websocket(&self, handle: WebSocketHandle) {
        self.websockets.lock().unwrap().push(handle);
    }

    fn remove_websocket(&self, handle: &WebSocketHandle) {
        self.websockets.lock().unwrap().retain(|h| !h.same(handle));
    }
}

impl Service for App {
    async fn handle(&self, req: &mut Request, res: &mut Response) {
        let ran = run_before(&self.middlewares, req, res);
        if !res.is_completed() {
            self.dispatch(req, res).await;
        }
        run_after(&self.middlewares, ran, req, res);
        res.end();
        self.apply_compression(req, res);
    }

    fn wants_upgrade(&self, req: &Request) -> bool {
        matches!(
            self.router.route(req.method(), req.path()),
            Match::Found {
                rule,
                ..
            } if matches!(rule.handler, Endpoint::WebSocket(_))
        )
    }

    async fn upgrade<T: Transport>(
        &self,
        req: Request,
        transport: T,
        leftover: Vec<u8>,
        swansong: Swansong,
    ) {
        let Match::Found { rule, .. } = self.router.route(req.method(), req.path()) else {
            transport.shutdown();
            return;
        };
        let Endpoint::WebSocket(route) = &rule.handler else {
            transport.shutdown();
            return;
        };

        match negotiate(route, &req) {
            Ok(handshake) => {
                let (connection, handle) = WebSocketConnection::new(
                    route,
                    transport,
                    handshake,
                    self.websocket_max_payload,
                    swansong,
                );
                self.add_websocket(handle.clone());
                connection.run(leftover).await;
                self.remove_websocket(&handle);
            }
            Err(error) => {
                log::debug!("websocket handshake refused: {error}");
                transport.shutdown();
            }
        }
    }
}

/// A named group of routes mounted under a shared url prefix, with an
/// optional blueprint-local catch-all. Blueprints nest; prefixes
/// concatenate at registration.
pub struct Blueprint {
    prefix: String,
    routes: Vec<(String, MethodMask, Option<String>, Endpoint)>,
    catchall: Option<Endpoint>,
    children: Vec<Blueprint>,
}

impl std::fmt::Debug for Blueprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blueprint")
            .field("prefix", &self.prefix)
            .field("routes", &self.routes.len())
            .field("children", &self.children.len())
            .finish_non_exhaustive()
    }
}

impl Routable for Blueprint {
    fn add_endpoint(
        &mut self,
        pattern: &str,
        methods: MethodMask,
        name: Option<String>,
        endpoint: Endpoint,
    ) {
        self.routes
            .push((pattern.to_owned(), methods, name, endpoint));
    }
}

impl Blueprint {
    /// Construct a blueprint mounted at `prefix`. A missing leading slash
    /// is added; a trailing slash is dropped.
    pub fn new(prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.starts_with('/') {
            prefix.insert(0, '/');
        }
        while prefix.len() > 1 && prefix.ends_with('/') {
            prefix.pop();
        }
        Self {
            prefix,
            routes: Vec::new(),
            catchall: None,
            children: Vec::new(),
        }
    }

    /// the mount prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Begin registering a route at `pattern`, relative to the prefix.
    pub fn route(&mut self, pattern: &str) -> RouteBuilder<'_> {
        RouteBuilder::new(self, pattern)
    }

    method_sugar! {
        /// register a GET route relative to the prefix
        get => Get,
        /// register a POST route relative to the prefix
        post => Post,
        /// register a PUT route relative to the prefix
        put => Put,
        /// register a DELETE route relative to the prefix
        delete => Delete,
        /// register a PATCH route relative to the prefix
        patch => Patch,
        /// register a HEAD route relative to the prefix
        head => Head,
    }

    /// install this blueprint's catch-all, run for unmatched paths under
    /// its prefix
    pub fn catchall(
        &mut self,
        handler: impl Fn(&mut Request, &mut Response) + Send + Sync + 'static,
    ) {
        self.catchall = Some(catchall_endpoint(handler));
    }

    /// nest another blueprint under this one
    pub fn register_blueprint(&mut self, child: Blueprint) {
        self.children.push(child);
    }
}

/// Control of a server started with [`App::run_async`].
#[derive(Debug)]
pub struct AppHandle {
    app: Arc<App>,
    server: crow_server::ServerHandle,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl AppHandle {
    /// Block until the server is accepting; returns the bound TCP port if
    /// there is one.
    pub fn wait_for_server_start(&self) -> Option<u16> {
        self.server.wait_for_server_start()
    }

    /// Like [`wait_for_server_start`][Self::wait_for_server_start], giving
    /// up after `timeout`. Returns false on timeout.
    pub fn wait_for_server_start_timeout(&self, timeout: Duration) -> bool {
        self.server.wait_for_server_start_timeout(timeout)
    }

    /// the bound TCP port, once started
    pub fn port(&self) -> Option<u16> {
        self.server.port()
    }

    /// stop the server: websockets first, then workers, then the acceptor
    pub fn stop(&self) {
        self.app.stop();
    }

    /// wait for the server thread to exit
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
