//! An in-process transport.
//!
//! ```rust
//! # async fn demo() -> Result<(), waypost::Error> {
//! use waypost::{Context, MemoryServer, Router, ShutdownSignal};
//!
//! async fn hello(_ctx: Context) -> &'static str { "hello" }
//!
//! let (server, client) = MemoryServer::channel();
//! let signal = ShutdownSignal::new();
//! let router = Router::new().get("/", hello);
//! let serving = tokio::spawn({
//!     let signal = signal.clone();
//!     async move { router.serve(server, signal).await }
//! });
//!
//! let res = client.send(http::Request::get("/").body("").unwrap()).await?;
//! assert_eq!(&res.body()[..], b"hello");
//!
//! signal.trigger();
//! serving.await.unwrap()?;
//! # Ok(())
//! # }
//! ```

use http::StatusCode;
use tokio::sync::mpsc;

use super::{Addr, RequestServer};
use crate::error::Error;
use crate::event::{RequestEvent, ResponseFuture};
use crate::lifecycle::ShutdownSignal;
use crate::request::Request;
use crate::response::Response;

/// Receiving half of an in-process transport.
pub struct MemoryServer {
    events: mpsc::UnboundedReceiver<RequestEvent>,
}

/// Sending half of an in-process transport. Cloneable.
#[derive(Clone)]
pub struct MemoryClient {
    events: mpsc::UnboundedSender<RequestEvent>,
    secure: bool,
}

impl MemoryServer {
    /// Creates a connected server/client pair.
    pub fn channel() -> (MemoryServer, MemoryClient) {
        let (tx, rx) = mpsc::unbounded_channel();
        (MemoryServer { events: rx }, MemoryClient { events: tx, secure: false })
    }
}

impl MemoryClient {
    /// Marks requests from this client as arriving over a secure channel.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Sends a request; the returned future resolves to the response.
    ///
    /// If the server side is gone the future resolves to
    /// [`Error::Aborted`].
    pub fn send(&self, request: impl Into<Request>) -> ResponseFuture {
        let (event, response) = RequestEvent::new(request, None, self.secure);
        // A refused event is dropped here, which settles it as aborted.
        let _ = self.events.send(event);
        response
    }
}

impl RequestServer for MemoryServer {
    async fn listen(&mut self, _signal: ShutdownSignal) -> Result<Addr, Error> {
        Ok(Addr::Memory)
    }

    async fn next_event(&mut self) -> Option<RequestEvent> {
        self.events.recv().await
    }

    async fn close(mut self) {
        self.events.close();
        while let Some(event) = self.events.recv().await {
            let _ = event.respond(Response::status(StatusCode::SERVICE_UNAVAILABLE));
        }
    }
}
