use crow::{App, WebSocketRoute};
use crow_testing::{TestServer, TestTransport, block_on, read_response};
use crow_websockets::{Opcode, encode_masked_frame};
use std::sync::{Arc, Mutex};

const HANDSHAKE: &str = "GET /ws HTTP/1.1\r\n\
    Host: test\r\n\
    Connection: Upgrade\r\n\
    Upgrade: websocket\r\n\
    Sec-WebSocket-Version: 13\r\n\
    Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";

fn open_websocket(server: &TestServer) -> TestTransport {
    let client = server.connect();
    client.write_all(HANDSHAKE);
    let response = block_on(read_response(&client));
    assert!(
        response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"),
        "{response}"
    );
    assert!(
        response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"),
        "{response}"
    );
    client
}

fn read_exact(client: &TestTransport, len: usize) -> Vec<u8> {
    block_on(async {
        let mut data = Vec::new();
        while data.len() < len {
            let chunk = client.read_available().await;
            assert!(!chunk.is_empty(), "connection closed after {:?}", data);
            data.extend_from_slice(&chunk);
        }
        data
    })
}

#[test]
fn ping_is_answered_with_pong() {
    let mut app = App::new();
    app.websocket("/ws", WebSocketRoute::new());

    let server = TestServer::start(app);
    let client = open_websocket(&server);

    // unmasked ping with an empty payload
    client.write_all(b"\x89\x00");
    assert_eq!(read_exact(&client, 2), b"\x8a\x00");
}

#[test]
fn close_is_echoed_and_reported_once() {
    let closes: Arc<Mutex<Vec<(u16, String)>>> = Arc::default();
    let seen = closes.clone();

    let mut app = App::new();
    app.websocket(
        "/ws",
        WebSocketRoute::new().onclose(move |_conn, reason, code| {
            seen.lock().unwrap().push((code, reason.to_owned()));
        }),
    );

    let server = TestServer::start(app);
    let client = open_websocket(&server);

    // close with status code 1000 and no reason
    client.write_all(b"\x88\x02\x03\xe8");
    assert_eq!(read_exact(&client, 4), b"\x88\x02\x03\xe8");

    // the connection shuts down after the echo
    assert!(block_on(client.read_available()).is_empty());
    assert_eq!(*closes.lock().unwrap(), vec![(1000, String::new())]);
}

#[test]
fn close_without_status_reports_1005() {
    let closes: Arc<Mutex<Vec<(u16, String)>>> = Arc::default();
    let seen = closes.clone();

    let mut app = App::new();
    app.websocket(
        "/ws",
        WebSocketRoute::new().onclose(move |_conn, reason, code| {
            seen.lock().unwrap().push((code, reason.to_owned()));
        }),
    );

    let server = TestServer::start(app);
    let client = open_websocket(&server);

    client.write_all(b"\x88\x00");
    // the echo close carries no status either
    assert_eq!(read_exact(&client, 2), b"\x88\x00");
    assert!(block_on(client.read_available()).is_empty());
    assert_eq!(*closes.lock().unwrap(), vec![(1005, String::new())]);
}

#[test]
fn text_messages_are_reassembled_and_echoed() {
    let mut app = App::new();
    app.websocket(
        "/ws",
        WebSocketRoute::new().onmessage(|conn, message, is_binary| {
            assert!(!is_binary);
            conn.send_text(format!(
                "received: {}",
                String::from_utf8_lossy(message)
            ));
        }),
    );

    let server = TestServer::start(app);
    let client = open_websocket(&server);

    // fragmented text with an interleaved ping
    client.write_all(encode_masked_frame(Opcode::Text, false, b"hel", [1, 2, 3, 4]));
    client.write_all(encode_masked_frame(Opcode::Ping, true, b"", [5, 6, 7, 8]));
    client.write_all(encode_masked_frame(
        Opcode::Continuation,
        true,
        b"lo",
        [9, 10, 11, 12],
    ));

    // pong first: the control frame is handled immediately
    let expected_text = b"received: hello";
    let mut expected = vec![0x8a, 0x00, 0x81, expected_text.len() as u8];
    expected.extend_from_slice(expected_text);
    assert_eq!(read_exact(&client, expected.len()), expected);
}

#[test]
fn oversized_frames_close_with_1009() {
    let mut app = App::new();
    app.websocket("/ws", WebSocketRoute::new().max_payload(8));

    let server = TestServer::start(app);
    let client = open_websocket(&server);

    client.write_all(encode_masked_frame(
        Opcode::Binary,
        true,
        &[0u8; 64],
        [1, 1, 1, 1],
    ));

    // close frame with code 1009, then shutdown
    assert_eq!(read_exact(&client, 4), b"\x88\x02\x03\xf1");
    assert!(block_on(client.read_available()).is_empty());
}

#[test]
fn accept_hook_userdata_reaches_the_connection() {
    let mut app = App::new();
    app.websocket(
        "/ws",
        WebSocketRoute::new()
            .onaccept(|_req, userdata| {
                userdata.insert(String::from("attached"));
                true
            })
            .onmessage(|conn, _message, _is_binary| {
                let value = conn.userdata().get::<String>().unwrap().clone();
                conn.send_text(value);
            }),
    );

    let server = TestServer::start(app);
    let client = open_websocket(&server);

    client.write_all(encode_masked_frame(Opcode::Text, true, b"hi", [1, 2, 3, 4]));
    let mut expected = vec![0x81, 8];
    expected.extend_from_slice(b"attached");
    assert_eq!(read_exact(&client, expected.len()), expected);
}

#[test]
fn rejected_handshake_closes_the_socket() {
    let mut app = App::new();
    app.websocket("/ws", WebSocketRoute::new().onaccept(|_req, _userdata| false));

    let server = TestServer::start(app);
    let client = server.connect();
    client.write_all(HANDSHAKE);
    assert!(block_on(client.read_available()).is_empty());
}

#[test]
fn stopping_the_app_closes_websockets() {
    let mut app = App::new();
    app.websocket("/ws", WebSocketRoute::new());

    let server = TestServer::start(app);
    let client = open_websocket(&server);

    server.app().stop();

    let reason = b"Server Application Terminated";
    let mut expected = vec![0x88, (reason.len() + 2) as u8, 0x03, 0xe8];
    expected.extend_from_slice(reason);
    assert_eq!(read_exact(&client, expected.len()), expected);
}
