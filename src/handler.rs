//! Handler traits and type erasure.
//!
//! # How async handlers are stored
//!
//! The router keeps handlers of *different* concrete types in one ordered
//! `Vec`. Rust collections hold one type, so each handler is hidden behind a
//! trait object (`dyn ErasedHandler`) and stored uniformly.
//!
//! ```text
//! async fn get_book(ctx: Context) -> Json<Book> { … }   ← user writes this
//!        ↓ router.get("/books/:id", get_book)
//! get_book.into_boxed_handler()                        ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(get_book))                        ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(ctx)  at request time                   ← one vtable dispatch
//!        ↓
//! Box::pin(async { get_book(ctx).await.into_reply() })  ← BoxFuture
//! ```
//!
//! Status handlers go through the same machinery with a wider signature:
//! `(Context, StatusCode, Response)`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::StatusCode;

use crate::context::Context;
use crate::error::HttpError;
use crate::reply::{IntoReply, Reply};
use crate::response::Response;

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future.
///
/// `Send + 'static` lets tokio move the future across worker threads.
pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Internal dispatch interface for route handlers.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, ctx: Context) -> BoxFuture<Result<Reply, HttpError>>;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Internal dispatch interface for status handlers.
#[doc(hidden)]
pub trait ErasedStatusHandler {
    fn call(&self, ctx: Context, status: StatusCode, current: Response) -> BoxFuture<Result<Reply, HttpError>>;
}

#[doc(hidden)]
pub type BoxedStatusHandler = Arc<dyn ErasedStatusHandler + Send + Sync + 'static>;

// ── Public traits ─────────────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is automatically satisfied for any
/// `async fn` (or closure returning a future) with the signature:
///
/// ```text
/// async fn name(ctx: Context) -> impl IntoReply
/// ```
///
/// The trait is **sealed**: only the blanket impl below can satisfy it.
pub trait Handler: private::SealedHandler + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

/// Implemented for every valid status handler:
///
/// ```text
/// async fn name(ctx: Context, status: StatusCode, current: Response) -> impl IntoReply
/// ```
///
/// `current` is a copy of the working response; returning `()` leaves the
/// working response untouched.
pub trait StatusHandler: private::SealedStatusHandler + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_status_handler(self) -> BoxedStatusHandler;
}

/// The sealing module. Because the traits are private, external crates cannot
/// name them and therefore cannot implement `Handler` on their own types.
///
/// Two separate marker traits: one blanket impl each, so the `Fn` signatures
/// never have to be proven disjoint.
mod private {
    pub trait SealedHandler {}
    pub trait SealedStatusHandler {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, Fut, R> private::SealedHandler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

impl<F, Fut, R> private::SealedStatusHandler for F
where
    F: Fn(Context, StatusCode, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + Send + 'static,
{
}

impl<F, Fut, R> StatusHandler for F
where
    F: Fn(Context, StatusCode, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + Send + 'static,
{
    fn into_boxed_status_handler(self) -> BoxedStatusHandler {
        Arc::new(FnStatusHandler(self))
    }
}

// ── Concrete wrappers ─────────────────────────────────────────────────────────

/// Newtype wrapper that holds a concrete handler `F` and implements
/// [`ErasedHandler`], bridging the typed world to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture<Result<Reply, HttpError>> {
        let fut = (self.0)(ctx);
        Box::pin(async move { fut.await.into_reply() })
    }
}

struct FnStatusHandler<F>(F);

impl<F, Fut, R> ErasedStatusHandler for FnStatusHandler<F>
where
    F: Fn(Context, StatusCode, Response) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + Send + 'static,
{
    fn call(&self, ctx: Context, status: StatusCode, current: Response) -> BoxFuture<Result<Reply, HttpError>> {
        let fut = (self.0)(ctx, status, current);
        Box::pin(async move { fut.await.into_reply() })
    }
}
