#![forbid(unsafe_code)]
#![deny(
    clippy::dbg_macro,
    rustdoc::missing_crate_level_docs,
    nonstandard_style,
    unused_qualifications
)]

/*!
# Crow: an embeddable HTTP/1.1 and WebSocket server library

Link it, register routes, call [`App::run`]:

```no_run
let mut app = crow::App::new();

app.get("/", |_req, res, ()| {
    res.set_body("Hello world");
    res.end();
});

app.get("/add/<int>/<int>", |_req, res, (a, b): (i64, i64)| {
    res.set_body(format!("{}", a + b));
    res.end();
});

app.port(18080).multithreaded().run().unwrap();
```

Url placeholders are typed — `<int>`, `<uint>`, `<double>`, `<string>`, and
`<path>` — and arrive as a tuple whose shape is checked against the pattern
at registration time. Middleware runs in declaration order around every
handler, websocket routes upgrade in place, and each connection is owned by
one worker thread for its whole life.
*/

pub use crow_http::{
    Deferral, HeaderName, HeaderValue, HeaderValues, Headers, HttpConfig, KnownHeaderName, Method,
    QueryString, Request, Response, StateMap, Status, Version,
};
pub use crow_router::{FromRouteParams, MethodMask, ParamKind, RouteParams};
pub use crow_server::ServerHandle;
pub use crow_websockets::{CloseCode, Handle as WebSocketHandle, WebSocketRoute};

mod middleware;
pub use middleware::Middleware;

mod returnable;
pub use returnable::{Returnable, SendReturnable};

mod compression;
pub use compression::{CompressionAlgorithm, Compressor};

mod logger;
pub use logger::LogLevel;

mod routes;
pub use routes::RouteBuilder;

mod app;
pub use app::{App, AppHandle, Blueprint};

pub use log;
