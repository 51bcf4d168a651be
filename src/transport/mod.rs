//! Transports: where request events come from.
//!
//! The router never touches sockets. A [`RequestServer`] produces
//! [`RequestEvent`]s and delivers whatever the router settles them with;
//! [`Router::serve`](crate::Router::serve) drives one to completion.
//!
//! Two are provided:
//!
//! - [`HyperServer`] — HTTP/1.1 and HTTP/2 over TCP via hyper.
//! - [`MemoryServer`] — an in-process channel, for tests and embedding.

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;

use crate::error::Error;
use crate::event::RequestEvent;
use crate::lifecycle::ShutdownSignal;

mod memory;
mod tcp;

pub use memory::{MemoryClient, MemoryServer};
pub use tcp::HyperServer;

/// A source of request events.
///
/// `next_event` is raced against the shutdown signal, so it must be
/// cancel-safe: dropping its future must not lose an event.
pub trait RequestServer: Send {
    /// Starts accepting. `signal` fires when the router stops taking events;
    /// transports use it to stop accepting and wind down connections.
    fn listen(&mut self, signal: ShutdownSignal) -> impl Future<Output = Result<Addr, Error>> + Send;

    /// The next request, or `None` once the transport has nothing more to give.
    fn next_event(&mut self) -> impl Future<Output = Option<RequestEvent>> + Send;

    /// Called once, after every dispatched request has settled.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Where a transport is listening.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Addr {
    Tcp(SocketAddr),
    Memory,
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Addr::Tcp(addr) => write!(f, "http://{addr}"),
            Addr::Memory    => f.write_str("memory"),
        }
    }
}
