//! # waypost
//!
//! An HTTP request router that tries routes in order, post-processes every
//! response by status code, and drains cleanly on shutdown.
//!
//! ## The model
//!
//! - **Ordered routes.** Routes are tried in registration order. A handler
//!   that returns [`Decline`] passes the request to the next matching route.
//! - **Status routes.** After a response exists (from a handler, the `404`,
//!   or the default error response) every status handler whose
//!   [`StatusFilter`] matches gets to inspect or replace it, in order.
//! - **Hooks.** `on_request`, `on_not_found`, `on_error` and `on_handled`
//!   observe or steer each stage of a request.
//! - **Failures never escape.** A handler error or panic becomes an error
//!   response; a client that hung up becomes an `on_error` notification.
//! - **Graceful drain.** On the shutdown signal the router stops taking
//!   requests and waits for the ones in flight.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::StatusCode;
//! use serde::Serialize;
//! use waypost::{Context, HttpError, Json, Response, Router, Server, StatusRange};
//!
//! #[derive(Serialize)]
//! struct Book { id: u32, title: &'static str }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), waypost::Error> {
//!     let app = Router::new()
//!         .get("/books/:id", get_book)
//!         .on_status(StatusRange::Error, log_errors);
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await
//! }
//!
//! async fn get_book(ctx: Context) -> Result<Json<Book>, HttpError> {
//!     match ctx.param("id") {
//!         Some("1") => Ok(Json(Book { id: 1, title: "Dune" })),
//!         _ => Err(HttpError::new(StatusCode::NOT_FOUND, "no such book")),
//!     }
//! }
//!
//! async fn log_errors(ctx: Context, status: StatusCode, _current: Response) {
//!     tracing::warn!(path = ctx.request().path(), %status, "error response");
//! }
//! ```
//!
//! ## What a handler may return
//!
//! Anything implementing [`IntoReply`]:
//!
//! | Returned | Sent |
//! |---|---|
//! | [`Response`] | as is |
//! | `&'static str` / `String` | `200`, content type sniffed (HTML, JSON or text) |
//! | `Bytes` / `Vec<u8>` | `200`, `application/json` |
//! | [`Json<T>`] / `serde_json::Value` | `200`, serialized |
//! | [`StatusCode`](http::StatusCode) | that status, empty body |
//! | `()` | `204 No Content` |
//! | [`Decline`] | nothing; the next matching route runs |
//! | `Result<T, E>` | `T` as above, `E` through the error path |

mod config;
mod context;
mod error;
mod event;
mod handler;
mod hooks;
mod lifecycle;
mod method;
mod path;
mod reply;
mod request;
mod response;
mod route;
mod router;
mod server;
mod status;

pub mod transport;

pub use config::ServeOptions;
pub use context::{Context, ResponseHeaders};
pub use error::{Error, HttpError};
pub use event::{RequestEvent, ResponseFuture};
pub use handler::{Handler, StatusHandler};
pub use hooks::{Failure, Handled, NotFound};
pub use lifecycle::{InFlight, InFlightGuard, ShutdownSignal};
pub use method::Methods;
pub use path::{Params, PathMatcher};
pub use reply::{Decline, IntoReply, Json, Reply};
pub use request::Request;
pub use response::{ContentType, Response, ResponseBuilder};
pub use route::RouteInfo;
pub use router::{Removable, Router};
pub use server::Server;
pub use status::{StatusFilter, StatusMatch, StatusRange};
pub use transport::{Addr, HyperServer, MemoryClient, MemoryServer, RequestServer};

pub use http::{Method, StatusCode};
