use crow::{App, SendReturnable};
use crow_testing::{TestServer, block_on, read_response};
use std::time::{Duration, Instant};

fn app() -> App {
    let mut app = App::new();
    app.get("/", |_req, res, ()| res.send("ok"));
    app
}

#[test]
fn idle_connections_are_shut_down() {
    let server = TestServer::start(app()).with_timeout(2);
    let client = server.connect();
    let started = Instant::now();

    // nothing is ever sent; the server must hang up on its own
    let data = block_on(client.read_available());
    let elapsed = started.elapsed();

    assert!(data.is_empty());
    assert!(
        elapsed >= Duration::from_millis(1500),
        "closed too early: {elapsed:?}"
    );
    assert!(
        elapsed <= Duration::from_millis(4500),
        "closed too late: {elapsed:?}"
    );
}

#[test]
fn responsive_connections_get_a_fresh_window() {
    let server = TestServer::start(app()).with_timeout(2);
    let client = server.connect();

    client.write_all("GET / HTTP/1.1\r\nHost: test\r\n\r\n");
    let first = block_on(read_response(&client));
    assert!(first.starts_with("HTTP/1.1 200 OK\r\n"));

    // still within the first window; the timer must have been re-armed
    std::thread::sleep(Duration::from_millis(1200));
    client.write_all("GET / HTTP/1.1\r\nHost: test\r\n\r\n");
    let second = block_on(read_response(&client));
    assert!(second.starts_with("HTTP/1.1 200 OK\r\n"));

    // after the second response the connection idles out within its own
    // window
    let started = Instant::now();
    let data = block_on(client.read_available());
    let elapsed = started.elapsed();
    assert!(data.is_empty());
    assert!(
        elapsed >= Duration::from_millis(1500),
        "closed too early: {elapsed:?}"
    );
    assert!(
        elapsed <= Duration::from_millis(4500),
        "closed too late: {elapsed:?}"
    );
}
