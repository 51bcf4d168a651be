//! The batteries-included entry point: hyper over TCP, stopped by SIGTERM or
//! Ctrl-C.
//!
//! For anything else (a custom transport, a shutdown signal you trigger
//! yourself) call [`Router::serve`] directly.

use crate::config::ServeOptions;
use crate::error::Error;
use crate::lifecycle::ShutdownSignal;
use crate::router::Router;
use crate::transport::HyperServer;

/// The HTTP server.
pub struct Server {
    addr: String,
    options: Option<ServeOptions>,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust,no_run
    /// use waypost::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: &str) -> Self {
        Self { addr: addr.to_owned(), options: None }
    }

    /// Address and drain timeout from configuration.
    pub fn from_options(options: ServeOptions) -> Result<Self, Error> {
        Ok(Self { addr: options.addr()?, options: Some(options) })
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests settling).
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        let router = match self.options.as_ref().and_then(ServeOptions::drain_timeout) {
            Some(timeout) => router.with_drain_timeout(timeout),
            None => router,
        };
        router.serve(HyperServer::bind(self.addr), ShutdownSignal::os()).await
    }
}
