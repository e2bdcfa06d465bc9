use crow::SendReturnable;

fn main() -> std::io::Result<()> {
    env_logger::init();

    let mut app = crow::App::new();

    app.get("/", |_req, res, ()| {
        res.send("Hello world");
    });

    app.get("/add/<int>/<int>", |_req, res, (a, b): (i64, i64)| {
        res.send(format!("{}", a + b));
    });

    app.get("/hello/<string>", |_req, res, (name,): (String,)| {
        res.send(format!("Hello, {name}!"));
    });

    app.port(18080).multithreaded().run()
}
