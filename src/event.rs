//! One inbound request and its single, settle-once response.
//!
//! A transport builds a [`RequestEvent`] per request and keeps the matching
//! [`ResponseFuture`]. The router (or a handler that answers early) settles the
//! event exactly once; the transport then writes whatever it was settled with.
//!
//! ```text
//! transport                         router
//!   RequestEvent::new(req) ──event──▶ dispatch
//!   ResponseFuture.await   ◀─settle── event.respond(res)
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

type Settlement = Result<Response, Error>;

/// A single request and its eventual response.
///
/// Settling twice is a caller fault and returns [`Error::AlreadyResponded`].
/// An event dropped without being settled settles itself with
/// [`Error::Aborted`], so the transport is never left waiting.
pub struct RequestEvent {
    id: String,
    remote_addr: Option<SocketAddr>,
    secure: bool,
    request: Request,
    responder: Mutex<Option<oneshot::Sender<Settlement>>>,
}

impl RequestEvent {
    /// Creates an event with a fresh UUID and the future that resolves when it
    /// is settled.
    pub fn new(
        request: impl Into<Request>,
        remote_addr: Option<SocketAddr>,
        secure: bool,
    ) -> (Self, ResponseFuture) {
        let (tx, rx) = oneshot::channel();
        let event = Self {
            id: Uuid::new_v4().to_string(),
            remote_addr,
            secure,
            request: request.into(),
            responder: Mutex::new(Some(tx)),
        };
        (event, ResponseFuture { rx })
    }

    /// Opaque correlation id, unique per request.
    pub fn id(&self) -> &str { &self.id }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }
    pub fn request(&self) -> &Request { &self.request }

    /// Whether the transport received this request over TLS.
    pub fn is_secure(&self) -> bool { self.secure }

    pub fn responded(&self) -> bool {
        self.responder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Settles the event with a response.
    pub fn respond(&self, response: Response) -> Result<(), Error> {
        self.settle(Ok(response))
    }

    /// Settles the event with a failure; the transport closes the exchange
    /// without a regular response.
    pub fn error(&self, reason: impl Into<String>) -> Result<(), Error> {
        self.settle(Err(Error::Aborted(reason.into())))
    }

    fn settle(&self, settlement: Settlement) -> Result<(), Error> {
        let tx = self
            .responder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| Error::AlreadyResponded { id: self.id.clone() })?;
        tx.send(settlement)
            .map_err(|_| Error::Disconnected { id: self.id.clone() })
    }
}

impl Drop for RequestEvent {
    fn drop(&mut self) {
        let slot = self.responder.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = slot.take() {
            let _ = tx.send(Err(Error::Aborted("request dropped without a response".into())));
        }
    }
}

impl std::fmt::Debug for RequestEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestEvent")
            .field("id", &self.id)
            .field("method", self.request.method())
            .field("path", &self.request.path())
            .field("responded", &self.responded())
            .finish()
    }
}

/// Resolves once the paired [`RequestEvent`] is settled.
#[derive(Debug)]
pub struct ResponseFuture {
    rx: oneshot::Receiver<Settlement>,
}

impl Future for ResponseFuture {
    type Output = Result<Response, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|settled| {
            settled.unwrap_or_else(|_| Err(Error::Aborted("request event vanished".into())))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    fn event() -> (RequestEvent, ResponseFuture) {
        RequestEvent::new(http::Request::get("/").body("").unwrap(), None, false)
    }

    #[tokio::test]
    async fn settles_once() {
        let (ev, fut) = event();
        assert!(!ev.responded());
        ev.respond(Response::status(StatusCode::ACCEPTED)).unwrap();
        assert!(ev.responded());

        let second = ev.respond(Response::status(StatusCode::OK));
        assert!(matches!(second, Err(Error::AlreadyResponded { .. })));
        assert!(matches!(ev.error("late"), Err(Error::AlreadyResponded { .. })));

        assert_eq!(fut.await.unwrap().status_code(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn error_settles_with_abort() {
        let (ev, fut) = event();
        ev.error("socket upgrade failed").unwrap();
        assert!(matches!(fut.await, Err(Error::Aborted(reason)) if reason == "socket upgrade failed"));
    }

    #[tokio::test]
    async fn dropped_event_never_leaves_the_transport_waiting() {
        let (ev, fut) = event();
        drop(ev);
        assert!(matches!(fut.await, Err(Error::Aborted(_))));
    }

    #[test]
    fn gone_receiver_is_a_disconnect() {
        let (ev, fut) = event();
        drop(fut);
        assert!(matches!(ev.respond(Response::text("x")), Err(Error::Disconnected { .. })));
        assert!(ev.responded());
    }

    #[test]
    fn ids_are_unique() {
        let (a, _fa) = event();
        let (b, _fb) = event();
        assert_ne!(a.id(), b.id());
    }
}
