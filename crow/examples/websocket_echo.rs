use crow::{WebSocketRoute, log};

fn main() -> std::io::Result<()> {
    env_logger::init();

    let mut app = crow::App::new();

    app.websocket(
        "/ws",
        WebSocketRoute::new()
            .onopen(|conn| {
                log::info!("websocket opened from {:?}", conn.remote_ip());
            })
            .onmessage(|conn, message, is_binary| {
                if is_binary {
                    conn.send_binary(message.to_vec());
                } else {
                    conn.send_text(String::from_utf8_lossy(message).into_owned());
                }
            })
            .onclose(|_conn, reason, code| {
                log::info!("websocket closed: {code} {reason:?}");
            }),
    );

    app.port(18080).run()
}
