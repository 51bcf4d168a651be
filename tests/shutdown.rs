use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use http::StatusCode;
use tokio::sync::Notify;
use waypost::{Context, Error, MemoryServer, Router, ShutdownSignal};

fn get(path: &str) -> http::Request<&'static str> {
    http::Request::get(path).body("").unwrap()
}

async fn wait_until(cond: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn gated(gate: &Arc<Notify>) -> impl Fn(Context) -> std::pin::Pin<Box<dyn Future<Output = &'static str> + Send>> + Send + Sync + 'static {
    let gate = Arc::clone(gate);
    move |_ctx: Context| {
        let gate = Arc::clone(&gate);
        Box::pin(async move {
            gate.notified().await;
            "done"
        })
    }
}

#[tokio::test]
async fn shutdown_waits_for_in_flight_requests() {
    let gate = Arc::new(Notify::new());
    let router = Router::new().get("/slow", gated(&gate));
    let (server, client) = MemoryServer::channel();
    let signal = ShutdownSignal::new();

    let serving = tokio::spawn({
        let router = router.clone();
        let signal = signal.clone();
        async move { router.serve(server, signal).await }
    });

    let response = client.send(get("/slow"));
    wait_until(|| router.in_flight() == 1).await;

    signal.trigger();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!serving.is_finished(), "serve returned with a request still in flight");

    gate.notify_one();
    let res = response.await.unwrap();
    assert_eq!(res.status_code(), StatusCode::OK);

    tokio::time::timeout(Duration::from_secs(2), serving).await.unwrap().unwrap().unwrap();
    assert_eq!(router.in_flight(), 0);
}

#[tokio::test]
async fn nothing_is_dispatched_after_the_signal() {
    let hits = Arc::new(AtomicUsize::new(0));
    let router = {
        let hits = Arc::clone(&hits);
        Router::new().get("/", move |_ctx: Context| {
            hits.fetch_add(1, Ordering::SeqCst);
            async { "hello" }
        })
    };
    let (server, client) = MemoryServer::channel();
    let signal = ShutdownSignal::new();

    // Queued before serving starts, but the signal is already up.
    let queued = client.send(get("/"));
    signal.trigger();
    router.serve(server, signal).await.unwrap();

    let res = queued.await.unwrap();
    assert_eq!(res.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    // The transport is gone now.
    assert!(matches!(client.send(get("/")).await, Err(Error::Aborted(_))));
}

#[tokio::test]
async fn drain_timeout_aborts_stuck_requests() {
    let router = Router::new()
        .get("/stuck", |_ctx: Context| std::future::pending::<()>())
        .with_drain_timeout(Duration::from_millis(50));
    let (server, client) = MemoryServer::channel();
    let signal = ShutdownSignal::new();

    let serving = tokio::spawn({
        let router = router.clone();
        let signal = signal.clone();
        async move { router.serve(server, signal).await }
    });

    let response = client.send(get("/stuck"));
    wait_until(|| router.in_flight() == 1).await;
    signal.trigger();

    tokio::time::timeout(Duration::from_secs(2), serving).await.unwrap().unwrap().unwrap();
    assert!(matches!(response.await, Err(Error::Aborted(_))));
    assert_eq!(router.in_flight(), 0);
}

#[tokio::test]
async fn serve_ends_when_the_transport_closes() {
    let router = Router::new().get("/", |_ctx: Context| async { "hello" });
    let (server, client) = MemoryServer::channel();

    let res = {
        let response = client.send(get("/"));
        drop(client);
        let serving = router.serve(server, ShutdownSignal::new());
        let (served, res) = tokio::join!(serving, response);
        served.unwrap();
        res.unwrap()
    };
    assert_eq!(&res.body()[..], b"hello");
}

#[tokio::test]
async fn requests_complete_independently() {
    let gate = Arc::new(Notify::new());
    let router = Router::new()
        .get("/slow", gated(&gate))
        .get("/fast", |_ctx: Context| async { "fast" });
    let (server, client) = MemoryServer::channel();
    let signal = ShutdownSignal::new();

    let serving = tokio::spawn({
        let router = router.clone();
        let signal = signal.clone();
        async move { router.serve(server, signal).await }
    });

    let slow = client.send(get("/slow"));
    let fast = client.send(get("/fast")).await.unwrap();
    assert_eq!(&fast.body()[..], b"fast");
    wait_until(|| router.in_flight() == 1).await;

    gate.notify_one();
    assert_eq!(&slow.await.unwrap().body()[..], b"done");

    signal.trigger();
    serving.await.unwrap().unwrap();
}
