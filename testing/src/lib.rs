#![forbid(unsafe_code)]
#![deny(
    clippy::dbg_macro,
    rustdoc::missing_crate_level_docs,
    nonstandard_style,
    unused_qualifications
)]

/*!
# Testing harness for crow applications

Runs a real connection — parser, pipeline, router, timer and all — over an
in-memory transport, so tests can speak raw HTTP bytes without opening
sockets:

```
let mut app = crow::App::new();
app.get("/", |_req, res, ()| {
    res.set_body("hello");
    res.end();
});

let server = crow_testing::TestServer::start(app);
let client = server.connect();
client.write_all("GET / HTTP/1.1\r\nHost: test\r\n\r\n");
let response = crow_testing::block_on(crow_testing::read_response(&client));
assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
assert!(response.ends_with("hello"));
```
*/

mod test_transport;
pub use test_transport::TestTransport;

use crow::App;
use crow_server::{DateCache, Swansong, TaskTimer, WorkerContext, serve};
use std::{rc::Rc, sync::Arc};

/// execute a future on the current thread, driving the async-io reactor
pub fn block_on<T>(future: impl Future<Output = T>) -> T {
    async_io::block_on(future)
}

/// A validated app plus the worker configuration test connections are
/// served with.
#[derive(Debug)]
pub struct TestServer {
    app: Arc<App>,
    timeout: u8,
    http_config: crow_http::HttpConfig,
    server_name: Arc<str>,
    swansong: Swansong,
}

impl TestServer {
    /// Validate the app and wrap it for serving. Panics on an invalid
    /// route table, exactly as `run` would.
    pub fn start(app: App) -> Self {
        app.validate().expect("route table is invalid");
        Self {
            app: Arc::new(app),
            timeout: 5,
            http_config: crow_http::HttpConfig::default(),
            server_name: "Crow/test".into(),
            swansong: Swansong::new(),
        }
    }

    /// override the idle timeout served to subsequent connections
    pub fn with_timeout(mut self, seconds: u8) -> Self {
        self.timeout = seconds;
        self
    }

    /// override connection tunables for subsequent connections
    pub fn with_http_config(mut self, http_config: crow_http::HttpConfig) -> Self {
        self.http_config = http_config;
        self
    }

    /// the app under test
    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    /// Open one connection: the returned transport is the client end, and
    /// a background thread runs the server side — an executor with a
    /// ticking task timer driving the real connection state machine.
    pub fn connect(&self) -> TestTransport {
        let (client, server_side) = TestTransport::new();
        let app = self.app.clone();
        let timeout = self.timeout;
        let http_config = self.http_config;
        let server_name = self.server_name.clone();
        let swansong = self.swansong.clone();

        std::thread::spawn(move || {
            let executor = Rc::new(async_executor::LocalExecutor::new());
            let timer = TaskTimer::new();
            let context = WorkerContext {
                timer: timer.clone(),
                date: DateCache::new(),
                http_config,
                server_name,
                timeout,
                swansong,
            };

            let inner = executor.clone();
            async_io::block_on(executor.run(async move {
                inner.spawn(timer.run()).detach();
                serve(app, server_side, context).await;
            }));
        });

        client
    }
}

/// Read one complete HTTP response from the client end of a transport:
/// the full head plus a `Content-Length` body. Lossily decoded for easy
/// assertions.
pub async fn read_response(client: &TestTransport) -> String {
    let mut data: Vec<u8> = Vec::new();
    loop {
        let chunk = client.read_available().await;
        if chunk.is_empty() {
            // closed; return whatever arrived
            return String::from_utf8_lossy(&data).into_owned();
        }
        data.extend_from_slice(&chunk);

        let Some(head_end) = find_double_crlf(&data) else {
            continue;
        };
        let head = String::from_utf8_lossy(&data[..head_end]);
        let content_length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.trim()
                    .eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())?
            })
            .unwrap_or(0);

        let total = head_end + 4 + content_length;
        if data.len() >= total {
            return String::from_utf8_lossy(&data[..total]).into_owned();
        }
    }
}

fn find_double_crlf(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|window| window == b"\r\n\r\n")
}
