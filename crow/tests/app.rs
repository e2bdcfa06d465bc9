use crow::{
    App, CompressionAlgorithm, Compressor, Middleware, Request, Response, SendReturnable,
};
use crow_testing::{TestServer, block_on, read_response};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

fn send_request(server: &TestServer, method: &str, target: &str) -> String {
    let client = server.connect();
    client.write_all(format!("{method} {target} HTTP/1.1\r\nHost: test\r\n\r\n"));
    block_on(read_response(&client))
}

fn body_of(response: &str) -> &str {
    response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body)
        .unwrap_or("")
}

fn header_of<'a>(response: &'a str, name: &str) -> Option<&'a str> {
    response.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.eq_ignore_ascii_case(name).then(|| value.trim())
    })
}

#[test]
fn hello_world() {
    let mut app = App::new();
    app.get("/", |_req, res, ()| res.send("Hello world"));

    let server = TestServer::start(app);
    let response = send_request(&server, "GET", "/");
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert_eq!(header_of(&response, "content-length"), Some("11"));
    assert_eq!(header_of(&response, "content-type"), Some("text/plain"));
    assert!(header_of(&response, "server").unwrap().starts_with("Crow/"));
    assert!(header_of(&response, "date").is_some());
    assert_eq!(header_of(&response, "connection"), Some("Keep-Alive"));
    assert_eq!(body_of(&response), "Hello world");
}

#[test]
fn typed_route_dispatch() {
    let mut app = App::new();
    app.get(
        "/5/<int>/<uint>/<double>/<string>/<path>",
        |_req, res, (a, b, c, d, e): (i64, u64, f64, String, String)| {
            res.send(format!("{a}|{b}|{c}|{d}|{e}"));
        },
    );

    let server = TestServer::start(app);
    let response = send_request(&server, "GET", "/5/-5/999/3.141592/hello_there/a/b/c/d");
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert_eq!(body_of(&response), "-5|999|3.141592|hello_there|a/b/c/d");
}

#[test]
#[should_panic(expected = "do not match the placeholders")]
fn mismatched_handler_arguments_panic_at_registration() {
    let mut app = App::new();
    app.get("/x/<int>", |_req, res, (_s,): (String,)| res.end());
}

#[test]
fn method_gate() {
    let mut app = App::new();
    app.get("/get_only", |_req, res, ()| res.send("get"));

    let server = TestServer::start(app);
    let response = send_request(&server, "POST", "/get_only");
    assert!(
        response.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"),
        "{response}"
    );
    assert_eq!(header_of(&response, "allow"), Some("OPTIONS, HEAD, GET"));
    assert_eq!(body_of(&response), "Method Not Allowed");
}

#[test]
fn options_catalog() {
    let mut app = App::new();
    app.get("/", |_req, res, ()| res.send("get"));
    app.post("/", |_req, res, ()| res.send("post"));

    let server = TestServer::start(app);

    let response = send_request(&server, "OPTIONS", "/");
    assert!(response.starts_with("HTTP/1.1 204 No Content\r\n"), "{response}");
    assert_eq!(
        header_of(&response, "allow"),
        Some("OPTIONS, HEAD, GET, POST")
    );

    let response = send_request(&server, "OPTIONS", "*");
    assert_eq!(
        header_of(&response, "allow"),
        Some("OPTIONS, HEAD, GET, POST")
    );
}

#[test]
fn url_params() {
    let mut app = App::new();
    app.get("/params", |req: &mut Request, res: &mut Response, ()| {
        let kees = req.query().get_dict("kees");
        let tmnt = req.query().get_list("tmnt");
        assert_eq!(kees.len(), 2);
        assert_eq!(kees[0], ("one", "vee1"));
        assert_eq!(kees[1], ("two", "vee2"));
        assert_eq!(tmnt, vec!["leo", "don"]);
        res.send("checked");
    });

    let server = TestServer::start(app);
    let response = send_request(
        &server,
        "GET",
        "/params?kees[one]=vee1&kees[two]=vee2&tmnt[]=leo&tmnt[]=don",
    );
    assert_eq!(body_of(&response), "checked");
}

type EventLog = Arc<Mutex<Vec<String>>>;

struct Named {
    name: &'static str,
    log: EventLog,
}

impl Middleware for Named {
    fn before_handle(&self, req: &mut Request, res: &mut Response) {
        self.log.lock().unwrap().push(format!("{}-before", self.name));
        if self.name == "B" && req.path().contains("/break") {
            res.end();
        }
    }

    fn after_handle(&self, _req: &mut Request, _res: &mut Response) {
        self.log.lock().unwrap().push(format!("{}-after", self.name));
    }
}

fn middleware_app(log: &EventLog) -> App {
    let mut app = App::new();
    for name in ["A", "B", "C"] {
        app.middleware(Named {
            name,
            log: log.clone(),
        });
    }
    let handler_log = log.clone();
    let handler = move |_req: &mut Request, res: &mut Response, (): ()| {
        handler_log.lock().unwrap().push("handle".into());
        res.send("ok");
    };
    app.get("/", handler.clone());
    app.get("/break/now", handler);
    app
}

#[test]
fn middleware_runs_in_order_and_reverses() {
    let log: EventLog = Arc::default();
    let server = TestServer::start(middleware_app(&log));

    send_request(&server, "GET", "/");
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "A-before", "B-before", "C-before", "handle", "C-after", "B-after", "A-after"
        ]
    );
}

#[test]
fn middleware_break_short_circuits() {
    let log: EventLog = Arc::default();
    let server = TestServer::start(middleware_app(&log));

    send_request(&server, "GET", "/break/now");
    assert_eq!(
        *log.lock().unwrap(),
        vec!["A-before", "B-before", "B-after", "A-after"]
    );
}

struct CountingContext(u32);

struct Counting;

impl Middleware for Counting {
    fn new_context(&self) -> Box<dyn std::any::Any + Send + Sync> {
        Box::new(CountingContext(1))
    }

    fn before_handle(&self, req: &mut Request, _res: &mut Response) {
        req.state_mut().get_mut::<CountingContext>().unwrap().0 += 1;
    }
}

#[test]
fn middleware_context_is_readable_from_the_handler() {
    let mut app = App::new();
    app.middleware(Counting);
    app.get("/", |req: &mut Request, res: &mut Response, ()| {
        let count = req.state().get::<CountingContext>().unwrap().0;
        res.send(format!("{count}"));
    });

    let server = TestServer::start(app);
    assert_eq!(body_of(&send_request(&server, "GET", "/")), "2");
}

#[test]
fn per_rule_middleware_runs_inside_global_chain() {
    let log: EventLog = Arc::default();
    let mut app = App::new();
    app.middleware(Named {
        name: "G",
        log: log.clone(),
    });
    let local_log = log.clone();
    app.route("/local")
        .middleware(Named {
            name: "L",
            log: log.clone(),
        })
        .to(move |_req, res: &mut Response, (): ()| {
            local_log.lock().unwrap().push("handle".into());
            res.send("ok");
        });

    let server = TestServer::start(app);
    send_request(&server, "GET", "/local");
    assert_eq!(
        *log.lock().unwrap(),
        vec!["G-before", "L-before", "handle", "L-after", "G-after"]
    );
}

#[test]
fn keep_alive_requests_are_isolated() {
    let mut app = App::new();
    app.get("/first", |req: &mut Request, res: &mut Response, ()| {
        assert!(req.query().get("marker").is_some());
        res.send("one");
    });
    app.get("/second", |req: &mut Request, res: &mut Response, ()| {
        // nothing from the first request may leak into the second
        assert!(req.query().get("marker").is_none());
        assert!(!req.headers().has_header("x-first-only"));
        res.send("two");
    });

    let server = TestServer::start(app);
    let client = server.connect();

    client.write_all(
        "GET /first?marker=1 HTTP/1.1\r\nHost: test\r\nX-First-Only: yes\r\n\r\n",
    );
    let first = block_on(read_response(&client));
    assert_eq!(body_of(&first), "one");

    client.write_all("GET /second HTTP/1.1\r\nHost: test\r\n\r\n");
    let second = block_on(read_response(&client));
    assert_eq!(body_of(&second), "two");
}

#[test]
fn missing_host_is_a_400() {
    let mut app = App::new();
    app.get("/", |_req, res, ()| res.send("ok"));

    let server = TestServer::start(app);
    let client = server.connect();
    client.write_all("GET / HTTP/1.1\r\n\r\n");
    let response = block_on(read_response(&client));
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{response}");
}

#[test]
fn head_suppresses_the_body() {
    let mut app = App::new();
    app.get("/page", |_req, res, ()| res.send("hello"));

    let server = TestServer::start(app);
    let client = server.connect();
    client.write_all("HEAD /page HTTP/1.1\r\nHost: test\r\n\r\n");

    let head = block_on(async {
        let mut data = Vec::new();
        loop {
            let chunk = client.read_available().await;
            assert!(!chunk.is_empty(), "connection closed before response head");
            data.extend_from_slice(&chunk);
            if data.windows(4).any(|w| w == b"\r\n\r\n") {
                break String::from_utf8_lossy(&data).into_owned();
            }
        }
    });

    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(header_of(&head, "content-length"), Some("5"));
    assert!(head.ends_with("\r\n\r\n"));
    assert!(!head.contains("hello"));
}

#[test]
fn deferred_completion() {
    let mut app = App::new();
    app.get("/later", |_req, res: &mut Response, ()| {
        let deferral = res.defer();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            deferral.finish(|res| {
                res.set_body("deferred");
                res.end();
            });
        });
    });

    let server = TestServer::start(app);
    let response = send_request(&server, "GET", "/later");
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert_eq!(body_of(&response), "deferred");
}

#[test]
fn not_found_and_catchall() {
    let mut app = App::new();
    app.get("/", |_req, res, ()| res.send("index"));

    let server = TestServer::start(app);
    let response = send_request(&server, "GET", "/missing");
    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"), "{response}");
    assert_eq!(body_of(&response), "Not Found");

    let mut app = App::new();
    app.catchall(|_req, res| {
        res.set_status(404u16);
        res.send("custom catchall");
    });
    let server = TestServer::start(app);
    let response = send_request(&server, "GET", "/missing");
    assert_eq!(body_of(&response), "custom catchall");
}

#[test]
fn blueprints_mount_under_their_prefix() {
    let mut api = crow::Blueprint::new("/api");
    api.get("/status", |_req, res: &mut Response, ()| res.send("api up"));
    api.catchall(|_req, res| {
        res.set_status(404u16);
        res.send("api fallback");
    });

    let mut v2 = crow::Blueprint::new("/v2");
    v2.get("/status", |_req, res: &mut Response, ()| res.send("v2 up"));
    api.register_blueprint(v2);

    let mut app = App::new();
    app.register_blueprint(api);

    let server = TestServer::start(app);
    assert_eq!(body_of(&send_request(&server, "GET", "/api/status")), "api up");
    assert_eq!(
        body_of(&send_request(&server, "GET", "/api/v2/status")),
        "v2 up"
    );
    assert_eq!(
        body_of(&send_request(&server, "GET", "/api/missing")),
        "api fallback"
    );
    assert_eq!(body_of(&send_request(&server, "GET", "/missing")), "Not Found");
}

#[test]
fn handler_panic_becomes_a_500() {
    let mut app = App::new();
    app.get("/boom", |_req, _res, ()| panic!("deliberate test panic"));

    let server = TestServer::start(app);
    let response = send_request(&server, "GET", "/boom");
    assert!(
        response.starts_with("HTTP/1.1 500 Internal Server Error\r\n"),
        "{response}"
    );
    assert_eq!(body_of(&response), "Internal Server Error");
}

struct FakeGzip;

impl Compressor for FakeGzip {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Gzip
    }

    fn compress(&self, body: &[u8]) -> Vec<u8> {
        let mut out = b"<gz>".to_vec();
        out.extend_from_slice(body);
        out
    }
}

#[test]
fn compression_hook_honors_accept_encoding() {
    let mut app = App::new();
    app.get("/data", |_req, res, ()| res.send("payload"));
    let app = app.use_compression(FakeGzip);

    let server = TestServer::start(app);

    let client = server.connect();
    client.write_all("GET /data HTTP/1.1\r\nHost: test\r\nAccept-Encoding: gzip, br\r\n\r\n");
    let response = block_on(read_response(&client));
    assert_eq!(header_of(&response, "content-encoding"), Some("gzip"));
    assert_eq!(body_of(&response), "<gz>payload");

    let plain = send_request(&server, "GET", "/data");
    assert_eq!(header_of(&plain, "content-encoding"), None);
    assert_eq!(body_of(&plain), "payload");
}

#[test]
fn expect_100_continue() {
    let mut app = App::new();
    app.post("/echo", |req: &mut Request, res: &mut Response, ()| {
        let body = req.body().to_vec();
        res.set_body(body);
        res.end();
    });

    let server = TestServer::start(app);
    let client = server.connect();
    client.write_all(
        "POST /echo HTTP/1.1\r\nHost: test\r\nExpect: 100-continue\r\nContent-Length: 5\r\n\r\n",
    );

    let interim = block_on(client.read_available_string());
    assert_eq!(interim, "HTTP/1.1 100 Continue\r\n\r\n");

    client.write_all("hello");
    let response = block_on(read_response(&client));
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert_eq!(body_of(&response), "hello");
}

#[test]
fn static_files_set_length_and_type() {
    let path = std::env::temp_dir().join(format!("crow-static-{}.txt", std::process::id()));
    std::fs::write(&path, "static file contents").unwrap();

    let mut app = App::new();
    let file = path.clone();
    app.get("/file", move |_req, res: &mut Response, ()| {
        res.set_static_file(file.clone());
        res.end();
    });

    let server = TestServer::start(app);
    let response = send_request(&server, "GET", "/file");
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert_eq!(header_of(&response, "content-length"), Some("20"));
    assert_eq!(header_of(&response, "content-type"), Some("text/plain"));
    assert_eq!(body_of(&response), "static file contents");

    std::fs::remove_file(&path).ok();
}

#[test]
fn bodies_above_the_stream_threshold_arrive_whole() {
    let mut app = App::new();
    app.get("/big", |_req, res: &mut Response, ()| {
        res.set_body(vec![b'x'; 2 * 1024 * 1024]);
        res.end();
    });

    let server = TestServer::start(app);
    let response = send_request(&server, "GET", "/big");
    assert_eq!(
        header_of(&response, "content-length"),
        Some("2097152")
    );
    assert_eq!(body_of(&response).len(), 2 * 1024 * 1024);
    assert!(body_of(&response).bytes().all(|b| b == b'x'));
}

#[test]
fn relative_redirects_gain_scheme_and_host() {
    let mut app = App::new();
    app.get("/old", |_req, res: &mut Response, ()| {
        res.redirect("/new");
        res.end();
    });

    let server = TestServer::start(app);
    let response = send_request(&server, "GET", "/old");
    assert!(response.starts_with("HTTP/1.1 302 Found\r\n"), "{response}");
    assert_eq!(header_of(&response, "location"), Some("http://test/new"));
}

#[test]
fn literal_routes_win_over_typed() {
    let mut app = App::new();
    app.get("/get/<string>", |_req, res, (s,): (String,)| {
        res.send(format!("param {s}"))
    });
    app.get("/get/special", |_req, res, ()| res.send("special"));

    let server = TestServer::start(app);
    assert_eq!(body_of(&send_request(&server, "GET", "/get/special")), "special");
    assert_eq!(
        body_of(&send_request(&server, "GET", "/get/other")),
        "param other"
    );
}
