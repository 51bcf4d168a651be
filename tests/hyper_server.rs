use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use waypost::{Context, Error, HttpError, HyperServer, Router, ShutdownSignal};

fn start(router: Router) -> (SocketAddr, ShutdownSignal, JoinHandle<Result<(), Error>>) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let signal = ShutdownSignal::new();
    let serving = tokio::spawn({
        let signal = signal.clone();
        async move { router.serve(HyperServer::from_listener(listener), signal).await }
    });
    (addr, signal, serving)
}

/// Sends one HTTP/1.1 request on a fresh connection and returns the raw
/// response text.
async fn exchange(addr: SocketAddr, method: &str, path: &str, body: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "{method} {path} HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\ncontent-length: {}\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut raw))
        .await
        .unwrap()
        .unwrap();
    String::from_utf8(raw).unwrap()
}

fn status_line(raw: &str) -> &str {
    raw.lines().next().unwrap_or_default()
}

fn body(raw: &str) -> &str {
    raw.split_once("\r\n\r\n").map(|(_, body)| body).unwrap_or_default()
}

#[tokio::test]
async fn serves_routes_over_http1() {
    let router = Router::new().get("/hello/:name", |ctx: Context| async move {
        format!("hello {}", ctx.param("name").unwrap_or_default())
    });
    let (addr, signal, serving) = start(router);

    let raw = exchange(addr, "GET", "/hello/ada", "").await;
    assert_eq!(status_line(&raw), "HTTP/1.1 200 OK");
    assert!(raw.to_ascii_lowercase().contains("x-request-id: "), "{raw}");
    assert!(raw.contains("text/plain"), "{raw}");
    assert_eq!(body(&raw), "hello ada");

    let raw = exchange(addr, "GET", "/nowhere", "").await;
    assert_eq!(status_line(&raw), "HTTP/1.1 404 Not Found");

    signal.trigger();
    tokio::time::timeout(Duration::from_secs(2), serving).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn request_bodies_reach_handlers() {
    async fn echo(ctx: Context) -> Result<Bytes, HttpError> {
        if ctx.request().body().is_empty() {
            return Err(HttpError::bad_request("empty body"));
        }
        Ok(ctx.request().body().clone())
    }
    let router = Router::new().post("/echo", echo);
    let (addr, signal, serving) = start(router);

    let raw = exchange(addr, "POST", "/echo", r#"{"n":1}"#).await;
    assert_eq!(status_line(&raw), "HTTP/1.1 200 OK");
    assert!(raw.contains("application/json"), "{raw}");
    assert_eq!(body(&raw), r#"{"n":1}"#);

    let raw = exchange(addr, "POST", "/echo", "").await;
    assert_eq!(status_line(&raw), "HTTP/1.1 400 Bad Request");
    assert!(body(&raw).contains("empty body"));

    signal.trigger();
    tokio::time::timeout(Duration::from_secs(2), serving).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn events_carry_the_peer_address() {
    let router = Router::new().get("/peer", |ctx: Context| async move {
        match ctx.event().remote_addr() {
            Some(addr) => addr.ip().to_string(),
            None => "unknown".to_owned(),
        }
    });
    let (addr, signal, serving) = start(router);

    let raw = exchange(addr, "GET", "/peer", "").await;
    assert_eq!(body(&raw), "127.0.0.1");

    signal.trigger();
    tokio::time::timeout(Duration::from_secs(2), serving).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_lets_the_open_request_finish() {
    let router = Router::new().get("/slow", |_ctx: Context| async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        "finished"
    });
    let (addr, signal, serving) = start(router);

    let slow = tokio::spawn(exchange(addr, "GET", "/slow", ""));
    tokio::time::sleep(Duration::from_millis(30)).await;
    signal.trigger();

    let raw = slow.await.unwrap();
    assert_eq!(status_line(&raw), "HTTP/1.1 200 OK");
    assert_eq!(body(&raw), "finished");

    tokio::time::timeout(Duration::from_secs(2), serving).await.unwrap().unwrap().unwrap();
}
