//! HTTP over TCP.

use std::net::SocketAddr;

use bytes::Bytes;
use http::header::{CONNECTION, HeaderValue};
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

use super::{Addr, RequestServer};
use crate::config::ServeOptions;
use crate::error::Error;
use crate::event::RequestEvent;
use crate::lifecycle::ShutdownSignal;
use crate::request::Request;
use crate::response::Response;

/// Events accepted but not yet picked up by the router.
const EVENT_BACKLOG: usize = 1024;

/// Serves HTTP/1.1 and HTTP/2 (whatever the client negotiates) over TCP.
///
/// Request bodies are read in full before the event reaches the router.
pub struct HyperServer {
    bind: Bind,
    running: Option<Running>,
}

enum Bind {
    Addr(String),
    Listener(Option<std::net::TcpListener>),
}

struct Running {
    events: mpsc::Receiver<RequestEvent>,
    acceptor: JoinHandle<()>,
    signal: ShutdownSignal,
}

impl HyperServer {
    /// A server that will bind `addr` (`host:port`, names allowed) on
    /// [`listen`](RequestServer::listen).
    ///
    /// ```rust,no_run
    /// use waypost::HyperServer;
    /// let server = HyperServer::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: impl Into<String>) -> Self {
        Self { bind: Bind::Addr(addr.into()), running: None }
    }

    /// Serves on a listener that is already bound (socket activation, or
    /// port `0` in tests).
    pub fn from_listener(listener: std::net::TcpListener) -> Self {
        Self { bind: Bind::Listener(Some(listener)), running: None }
    }

    pub fn from_options(options: &ServeOptions) -> Result<Self, Error> {
        Ok(Self::bind(options.addr()?))
    }
}

impl RequestServer for HyperServer {
    async fn listen(&mut self, signal: ShutdownSignal) -> Result<Addr, Error> {
        let listener = match &mut self.bind {
            Bind::Addr(addr) => TcpListener::bind(addr.as_str()).await?,
            Bind::Listener(slot) => {
                let listener = slot.take().ok_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::AddrInUse, "listener already taken")
                })?;
                listener.set_nonblocking(true)?;
                TcpListener::from_std(listener)?
            }
        };
        let local = listener.local_addr()?;

        let (tx, rx) = mpsc::channel(EVENT_BACKLOG);
        let acceptor = tokio::spawn(accept_loop(listener, tx, signal.clone()));
        self.running = Some(Running { events: rx, acceptor, signal });

        Ok(Addr::Tcp(local))
    }

    async fn next_event(&mut self) -> Option<RequestEvent> {
        match self.running.as_mut() {
            Some(running) => running.events.recv().await,
            None => None,
        }
    }

    async fn close(self) {
        let Some(Running { mut events, acceptor, signal }) = self.running else { return };

        // Anything still queued arrived after the router stopped taking events.
        events.close();
        while let Some(event) = events.recv().await {
            let _ = event.respond(unavailable());
        }

        if !signal.is_triggered() {
            acceptor.abort();
        }
        match acceptor.await {
            Err(e) if !e.is_cancelled() => error!("acceptor task failed: {e}"),
            _ => {}
        }
    }
}

async fn accept_loop(listener: TcpListener, events: mpsc::Sender<RequestEvent>, signal: ShutdownSignal) {
    // JoinSet tracks every connection task so shutdown can wait for them.
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            () = signal.wait() => {
                info!(connections = connections.len(), "no longer accepting connections");
                break;
            }

            res = listener.accept() => {
                let (stream, remote_addr) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };
                connections.spawn(serve_connection(stream, remote_addr, events.clone(), signal.clone()));
            }

            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);
    drop(events);
    while connections.join_next().await.is_some() {}
}

async fn serve_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    events: mpsc::Sender<RequestEvent>,
    signal: ShutdownSignal,
) {
    // TokioIo adapts tokio's AsyncRead/AsyncWrite to the hyper IO traits.
    let io = TokioIo::new(stream);

    // Called once per request on the connection, not once per connection.
    let svc = {
        let signal = signal.clone();
        service_fn(move |req| exchange(req, remote_addr, events.clone(), signal.clone()))
    };

    let builder = ConnBuilder::new(TokioExecutor::new());
    let conn = builder.serve_connection(io, svc);
    tokio::pin!(conn);

    let result = tokio::select! {
        res = conn.as_mut() => res,
        () = signal.wait() => {
            // Finish the exchange in progress, then close.
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };

    if let Err(e) = result {
        debug!(peer = %remote_addr, "connection error: {e}");
    }
}

/// One HTTP exchange: turn the hyper request into an event, wait for the
/// router to settle it.
async fn exchange(
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
    events: mpsc::Sender<RequestEvent>,
    signal: ShutdownSignal,
) -> Result<http::Response<Full<Bytes>>, Error> {
    if signal.is_triggered() {
        return Ok(unavailable().into_inner());
    }

    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();
    let (event, response) = RequestEvent::new(Request::from_parts(parts, body), Some(remote_addr), false);

    if events.send(event).await.is_err() {
        return Ok(unavailable().into_inner());
    }

    // An aborted event surfaces as an error here, which makes hyper drop the
    // connection instead of inventing a response.
    response.await.map(Response::into_inner)
}

fn unavailable() -> Response {
    let mut response = Response::status(StatusCode::SERVICE_UNAVAILABLE);
    response.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
    response
}
