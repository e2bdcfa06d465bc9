use crow::{App, Response, SendReturnable};
use std::{
    io::{Read, Write},
    net::TcpStream,
    time::{Duration, Instant},
};

fn hello_app() -> App {
    let mut app = App::new();
    app.get("/", |_req, res, ()| res.send("over the wire"));
    app
}

#[test]
fn serves_over_tcp_and_stops() {
    let handle = hello_app()
        .bindaddr("127.0.0.1")
        .port(0)
        .concurrency(4)
        .signal_clear()
        .run_async();

    assert!(handle.wait_for_server_start_timeout(Duration::from_secs(5)));
    let port = handle.port().expect("bound tcp port");

    // sequential connections spread across the worker pool
    for _ in 0..3 {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
        assert!(response.ends_with("over the wire"), "{response}");
    }

    handle.stop();
    handle.join();
}

#[test]
fn stop_waits_for_in_flight_responses() {
    let mut app = App::new();
    app.get("/slow", |_req, res: &mut Response, ()| {
        let deferral = res.defer();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(400));
            deferral.finish(|res| {
                res.set_body("late");
                res.end();
            });
        });
    });

    let handle = app
        .bindaddr("127.0.0.1")
        .port(0)
        .signal_clear()
        .run_async();
    assert!(handle.wait_for_server_start_timeout(Duration::from_secs(5)));
    let port = handle.port().expect("bound tcp port");

    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream
        .write_all(b"GET /slow HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .unwrap();

    // let the request reach the handler and defer
    std::thread::sleep(Duration::from_millis(100));

    // stop must block until the deferred response has been written
    let stopping = Instant::now();
    handle.stop();
    let stopped_after = stopping.elapsed();
    assert!(
        stopped_after >= Duration::from_millis(200),
        "stop returned before the in-flight response drained: {stopped_after:?}"
    );

    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert!(response.ends_with("late"), "{response}");

    handle.join();
}

#[test]
fn stop_delivers_websocket_close_frames() {
    let mut app = App::new();
    app.websocket("/ws", crow::WebSocketRoute::new());

    let handle = app
        .bindaddr("127.0.0.1")
        .port(0)
        .signal_clear()
        .run_async();
    assert!(handle.wait_for_server_start_timeout(Duration::from_secs(5)));
    let port = handle.port().expect("bound tcp port");

    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream
        .write_all(
            b"GET /ws HTTP/1.1\r\nHost: localhost\r\nConnection: Upgrade\r\n\
              Upgrade: websocket\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
        )
        .unwrap();

    // read the 101 head before stopping, so the upgrade is live
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).unwrap();
        head.push(byte[0]);
    }
    assert!(head.starts_with(b"HTTP/1.1 101 Switching Protocols\r\n"));

    // blocks until the websocket has flushed its close frame and wound down
    handle.stop();

    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).unwrap();
    let reason = b"Server Application Terminated";
    let mut expected = vec![0x88, (reason.len() + 2) as u8, 0x03, 0xe8];
    expected.extend_from_slice(reason);
    assert_eq!(rest, expected);

    handle.join();
}

#[cfg(unix)]
#[test]
fn serves_over_a_unix_socket() {
    let path = std::env::temp_dir().join(format!("crow-test-{}.sock", std::process::id()));

    let handle = hello_app()
        .local_socket_path(path.clone())
        .signal_clear()
        .run_async();

    assert!(handle.wait_for_server_start_timeout(Duration::from_secs(5)));

    let mut stream = std::os::unix::net::UnixStream::connect(&path).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    assert!(response.ends_with("over the wire"), "{response}");

    handle.stop();
    handle.join();
}
