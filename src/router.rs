//! The request router.
//!
//! Routes are tried in registration order; the first one whose pattern and
//! method match and whose handler does not [`Decline`](crate::Decline) answers
//! the request. Whatever response comes out (including the `404` when nothing
//! matched, or the default error response) then runs through every status
//! handler whose filter matches, again in registration order, each one seeing
//! the previous one's output.
//!
//! # One request, start to finish
//!
//! ```text
//! Received ─▶ on_request ─▶ route scan ─┬─▶ status chain ─▶ respond ─▶ on_handled
//!                                       ├─▶ not found (404/405) ─▶ on_not_found ─┘
//!                      any failure ─────┴─▶ on_error ─▶ default error response ─┘
//! ```
//!
//! Route and status-route lists live behind [`ArcSwap`]: a dispatch loads one
//! snapshot and scans it, so registering or removing a route never disturbs a
//! scan already underway.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use futures_util::FutureExt;
use http::header::{ALLOW, HeaderName, HeaderValue};
use http::{Method, StatusCode};
use tokio::task::JoinSet;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, Instrument, debug, error, info, info_span, warn};

use crate::context::{Context, ResponseHeaders};
use crate::error::{Error, HttpError};
use crate::event::RequestEvent;
use crate::handler::{Handler, StatusHandler};
use crate::hooks::{Failure, Handled, Hooks, NotFound};
use crate::lifecycle::{InFlight, InFlightGuard, ShutdownSignal};
use crate::method::Methods;
use crate::path::Params;
use crate::request::Request;
use crate::response::Response;
use crate::route::{Route, RouteInfo, RouteMatch, RouteOutput, StatusRoute};
use crate::status::StatusFilter;
use crate::transport::RequestServer;

const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// The application router.
///
/// Cheap to clone; clones share routes, hooks and the in-flight set.
///
/// ```rust,no_run
/// use http::StatusCode;
/// use waypost::{Context, Json, Response, Router, StatusRange};
///
/// # async fn get_book(_: Context) -> Json<()> { Json(()) }
/// # async fn shape_errors(_: Context, _: StatusCode, _: Response) {}
/// let app = Router::new()
///     .get("/books/:id", get_book)
///     .on_status(StatusRange::Error, shape_errors)
///     .on_handled(|h| tracing::info!(elapsed = ?h.duration, "done"));
/// ```
#[derive(Clone)]
pub struct Router {
    inner: Arc<Inner>,
}

struct Inner {
    routes: ArcSwap<Vec<Arc<Route>>>,
    status_routes: ArcSwap<Vec<Arc<StatusRoute>>>,
    hooks: ArcSwap<Hooks>,
    settings: ArcSwap<Settings>,
    in_flight: InFlight,
    next_id: AtomicU64,
}

#[derive(Clone, Default)]
struct Settings {
    drain_timeout: Option<Duration>,
    dispatch: Option<Dispatch>,
}

/// A handler that failed, with the route it belonged to.
struct Fault {
    error: HttpError,
    route: Option<Arc<RouteInfo>>,
}

impl Fault {
    fn new(error: HttpError, route: Option<Arc<RouteInfo>>) -> Self {
        Self { error, route }
    }
}

#[derive(Default)]
struct Processed {
    /// `None` when the event was settled out of band.
    response: Option<Response>,
    route: Option<Arc<RouteInfo>>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                routes: ArcSwap::from_pointee(Vec::new()),
                status_routes: ArcSwap::from_pointee(Vec::new()),
                hooks: ArcSwap::from_pointee(Hooks::default()),
                settings: ArcSwap::from_pointee(Settings::default()),
                in_flight: InFlight::new(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    // ── Registration ─────────────────────────────────────────────────────────

    /// Registers a route and returns a handle that can remove it again.
    ///
    /// Patterns use `:name`, `:name?` and a trailing `*`; see [`PathMatcher`](crate::PathMatcher).
    pub fn add_route(
        &self,
        methods: impl Into<Methods>,
        pattern: &str,
        handler: impl Handler,
    ) -> Result<Removable, Error> {
        let id = self.next_id();
        let route = Arc::new(Route::new(id, pattern, methods.into(), handler.into_boxed_handler())?);
        self.inner.routes.rcu(|routes| {
            let mut next = Vec::clone(routes);
            next.push(Arc::clone(&route));
            next
        });
        debug!(pattern, methods = %route.info().methods(), "route registered");
        Ok(Removable { router: Arc::downgrade(&self.inner), target: Target::Route(id) })
    }

    /// Registers a status handler. Every status handler whose filter matches
    /// runs, in registration order, on every response.
    pub fn add_status_handler(&self, filter: impl Into<StatusFilter>, handler: impl StatusHandler) -> Removable {
        let id = self.next_id();
        let filter = filter.into();
        debug!(filter = %filter, "status handler registered");
        let status_route = Arc::new(StatusRoute::new(id, filter, handler.into_boxed_status_handler()));
        self.inner.status_routes.rcu(|chain| {
            let mut next = Vec::clone(chain);
            next.push(Arc::clone(&status_route));
            next
        });
        Removable { router: Arc::downgrade(&self.inner), target: Target::Status(id) }
    }

    /// Registers a handler for a method set + pattern pair. Returns `self` for
    /// chaining.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is malformed. Use [`Router::add_route`] to handle
    /// the error instead.
    ///
    /// ```rust,no_run
    /// # use http::Method;
    /// # use waypost::{Context, Router};
    /// # async fn get_book(_: Context) {}
    /// # async fn put_book(_: Context) {}
    /// Router::new()
    ///     .on(Method::GET,               "/books/:id", get_book)
    ///     .on([Method::PUT, Method::PATCH], "/books/:id", put_book);
    /// ```
    pub fn on(self, methods: impl Into<Methods>, pattern: &str, handler: impl Handler) -> Self {
        if let Err(e) = self.add_route(methods, pattern, handler) {
            panic!("invalid route `{pattern}`: {e}");
        }
        self
    }

    pub fn get(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, pattern, handler)
    }

    pub fn post(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, pattern, handler)
    }

    pub fn put(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, pattern, handler)
    }

    pub fn patch(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::PATCH, pattern, handler)
    }

    pub fn delete(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, pattern, handler)
    }

    /// Registers a handler for every method.
    pub fn any(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Methods::Any, pattern, handler)
    }

    /// Chaining form of [`Router::add_status_handler`].
    pub fn on_status(self, filter: impl Into<StatusFilter>, handler: impl StatusHandler) -> Self {
        self.add_status_handler(filter, handler);
        self
    }

    // ── Hooks ────────────────────────────────────────────────────────────────

    /// Observes every request before matching. To answer early, settle the
    /// event with [`RequestEvent::respond`]; the router notices and skips
    /// straight to delivery.
    pub fn on_request(self, hook: impl Fn(&RequestEvent) + Send + Sync + 'static) -> Self {
        let hook: crate::hooks::RequestHook = Arc::new(hook);
        self.update_hooks(|hooks| hooks.on_request.push(Arc::clone(&hook)));
        self
    }

    /// Runs when no route produced a response. Returning `Some` replaces the
    /// default `404`/`405`.
    pub fn on_not_found(
        self,
        hook: impl Fn(&NotFound<'_>) -> Option<Response> + Send + Sync + 'static,
    ) -> Self {
        let hook: crate::hooks::NotFoundHook = Arc::new(hook);
        self.update_hooks(|hooks| hooks.on_not_found.push(Arc::clone(&hook)));
        self
    }

    /// Observes every finished request.
    pub fn on_handled(self, hook: impl Fn(&Handled<'_>) + Send + Sync + 'static) -> Self {
        let hook: crate::hooks::HandledHook = Arc::new(hook);
        self.update_hooks(|hooks| hooks.on_handled.push(Arc::clone(&hook)));
        self
    }

    /// Runs when a handler or hook fails, and on transport faults. Returning
    /// `Some` replaces the default error response.
    pub fn on_error(
        self,
        hook: impl Fn(&Failure<'_>) -> Option<Response> + Send + Sync + 'static,
    ) -> Self {
        let hook: crate::hooks::ErrorHook = Arc::new(hook);
        self.update_hooks(|hooks| hooks.on_error.push(Arc::clone(&hook)));
        self
    }

    fn update_hooks(&self, add: impl Fn(&mut Hooks)) {
        self.inner.hooks.rcu(|hooks| {
            let mut next = Hooks::clone(hooks);
            add(&mut next);
            next
        });
    }

    // ── Settings ─────────────────────────────────────────────────────────────

    /// Bounds how long [`Router::serve`] waits for in-flight requests after the
    /// shutdown signal. Requests still running afterwards are aborted.
    pub fn with_drain_timeout(self, timeout: Duration) -> Self {
        self.inner.settings.rcu(|s| Settings { drain_timeout: Some(timeout), ..Settings::clone(s) });
        self
    }

    /// Routes this router's log output to `dispatch` instead of the process
    /// default subscriber.
    pub fn with_dispatch(self, dispatch: Dispatch) -> Self {
        self.inner.settings.rcu(|s| Settings { dispatch: Some(dispatch.clone()), ..Settings::clone(s) });
        self
    }

    /// Number of requests currently being dispatched.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Resolves once no request is being dispatched.
    pub async fn drain(&self) {
        self.inner.in_flight.idle().await;
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    // ── Serving ──────────────────────────────────────────────────────────────

    /// Takes request events from `server` and dispatches each as its own task
    /// until `signal` fires or the transport closes, then drains in-flight
    /// requests and closes the transport.
    pub async fn serve<S: RequestServer>(&self, mut server: S, signal: ShutdownSignal) -> Result<(), Error> {
        let addr = server.listen(signal.clone()).await?;
        info!(%addr, "waypost listening");

        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                // Shutdown first, so a signal stops intake even when more
                // events are already queued.
                biased;

                () = signal.wait() => {
                    info!(in_flight = self.in_flight(), "shutdown signal received, draining requests");
                    break;
                }

                event = server.next_event() => {
                    let Some(event) = event else {
                        info!("transport closed");
                        break;
                    };
                    let guard = self.inner.in_flight.enter();
                    let router = self.clone();
                    tasks.spawn(async move { router.dispatch(event, guard).await });
                }

                // Reap finished tasks so the JoinSet does not grow without
                // bound on long-running servers.
                Some(res) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = res {
                        error!("dispatch task failed: {e}");
                    }
                }
            }
        }

        self.drain_tasks(&mut tasks).await;
        server.close().await;

        info!("waypost stopped");
        Ok(())
    }

    async fn drain_tasks(&self, tasks: &mut JoinSet<()>) {
        let timeout = self.inner.settings.load().drain_timeout;
        let drained = match timeout {
            Some(limit) => tokio::time::timeout(limit, self.inner.in_flight.idle()).await.is_ok(),
            None => {
                self.inner.in_flight.idle().await;
                true
            }
        };
        if drained {
            while tasks.join_next().await.is_some() {}
        } else {
            warn!(remaining = self.in_flight(), "drain timeout elapsed, aborting in-flight requests");
            tasks.shutdown().await;
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────────────────

    /// Dispatches one event. The event is always settled when this returns.
    pub async fn handle(&self, event: RequestEvent) {
        let guard = self.inner.in_flight.enter();
        self.dispatch(event, guard).await;
    }

    /// Dispatches a request built in memory and returns what the client would
    /// have received.
    pub async fn oneshot(&self, request: impl Into<Request>) -> Result<Response, Error> {
        let (event, response) = RequestEvent::new(request, None, false);
        self.handle(event).await;
        response.await
    }

    async fn dispatch(&self, event: RequestEvent, _guard: InFlightGuard) {
        let dispatch = self
            .inner
            .settings
            .load()
            .dispatch
            .clone()
            .unwrap_or_else(|| tracing::dispatcher::get_default(Dispatch::clone));

        async move {
            let span = info_span!(
                "request",
                id = %event.id(),
                method = %event.request().method(),
                path = %event.request().path(),
            );
            self.run(event).instrument(span).await;
        }
        .with_subscriber(dispatch)
        .await;
    }

    async fn run(&self, event: RequestEvent) {
        let started = Instant::now();
        let event = Arc::new(event);
        let headers = ResponseHeaders::new();
        let hooks = self.inner.hooks.load_full();

        let processed = AssertUnwindSafe(self.process(&event, &headers, &hooks))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(Fault::new(HttpError::from_panic(panic), None)));

        let (response, route) = match processed {
            Ok(done) => (done.response, done.route),
            Err(fault) => {
                let response = AssertUnwindSafe(self.recover(&event, &headers, &hooks, &fault))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        error!(error = %HttpError::from_panic(panic), "error handling failed");
                        None
                    });
                (response, fault.route)
            }
        };

        let delivered = deliver(&event, &hooks, response, route.as_deref());

        if !event.responded() {
            warn!("request finished without a response, closing it");
            let _ = event.error("request finished without a response");
        }

        let handled = Handled {
            event: &event,
            response: delivered.as_ref(),
            route: route.as_deref(),
            duration: started.elapsed(),
        };
        if std::panic::catch_unwind(AssertUnwindSafe(|| hooks.handled(&handled))).is_err() {
            error!("on_handled hook panicked");
        }
    }

    /// Received → Matching → Handling → StatusProcessing.
    async fn process(
        &self,
        event: &Arc<RequestEvent>,
        headers: &ResponseHeaders,
        hooks: &Hooks,
    ) -> Result<Processed, Fault> {
        hooks.request(event);
        if event.responded() {
            debug!("answered by on_request hook");
            return Ok(Processed::default());
        }

        let request = event.request();
        let routes = self.inner.routes.load_full();
        let mut allowed: Vec<Method> = Vec::new();
        let mut produced = None;

        for route in routes.iter() {
            let params = match route.matches(request.method(), request.path()) {
                RouteMatch::Matched(params) => params,
                RouteMatch::MethodNotAllowed => {
                    for method in route.info().methods().as_slice() {
                        if !allowed.contains(method) {
                            allowed.push(method.clone());
                        }
                    }
                    continue;
                }
                RouteMatch::NoMatch => continue,
            };

            let info = Arc::clone(route.info());
            let ctx = Context::new(Arc::clone(event), params, headers.clone(), Some(Arc::clone(&info)));
            let output = route
                .handle(ctx.clone())
                .await
                .map_err(|err| Fault::new(err, Some(Arc::clone(&info))))?;

            if event.responded() {
                debug!(pattern = info.pattern(), "answered out of band");
                return Ok(Processed { response: None, route: Some(info) });
            }

            match output {
                RouteOutput::Response(response) => {
                    produced = Some((ctx, response));
                    break;
                }
                RouteOutput::NoContent => {
                    let mut response = Response::status(StatusCode::NO_CONTENT);
                    headers.merge_into(&mut response);
                    produced = Some((ctx, response));
                    break;
                }
                RouteOutput::Declined => debug!(pattern = info.pattern(), "route declined"),
            }
        }

        let (ctx, response) = match produced {
            Some(found) => found,
            None => {
                let mut response = hooks.not_found(event, not_found_response(&allowed));
                if event.responded() {
                    return Ok(Processed::default());
                }
                headers.merge_into(&mut response);
                (Context::new(Arc::clone(event), Params::default(), headers.clone(), None), response)
            }
        };

        let route = ctx.route_arc();
        let response = self
            .apply_status_routes(&ctx, response)
            .await
            .map_err(|err| Fault::new(err, route.clone()))?;
        Ok(Processed { response: Some(response), route })
    }

    /// Runs `response` through every matching status handler, in order.
    async fn apply_status_routes(&self, ctx: &Context, mut response: Response) -> Result<Response, HttpError> {
        let chain = self.inner.status_routes.load_full();
        for status_route in chain.iter() {
            if !status_route.matches(response.status_code()) {
                continue;
            }
            if let Some(replacement) = status_route.handle(ctx.clone(), &response).await? {
                response = replacement;
            }
            if ctx.event().responded() {
                break;
            }
        }
        Ok(response)
    }

    /// ErrorHandling: `on_error`, then the default error response, then the
    /// status chain. `None` when nothing can be sent any more.
    async fn recover(
        &self,
        event: &Arc<RequestEvent>,
        headers: &ResponseHeaders,
        hooks: &Hooks,
        fault: &Fault,
    ) -> Option<Response> {
        let err = &fault.error;
        if err.status().is_server_error() {
            error!(error = %err, causes = ?err.causes(), "request failed");
        } else {
            warn!(error = %err, "request failed");
        }

        let respondable = !event.responded();
        let supplied = hooks.error(&Failure {
            message: err.message(),
            error: err,
            event,
            respondable,
            route: fault.route.as_deref(),
        });
        if !respondable || event.responded() {
            return None;
        }

        let response = supplied.unwrap_or_else(|| err.to_response(event.request().header("accept")));
        let ctx = Context::new(Arc::clone(event), Params::default(), headers.clone(), fault.route.clone());
        match self.apply_status_routes(&ctx, response.clone()).await {
            Ok(response) => Some(response),
            Err(e) => {
                error!(error = %e, "status handler failed while handling an error");
                Some(response)
            }
        }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

/// Responded: settles the event. Returns a copy of the delivered response when
/// `on_handled` hooks want to see it.
fn deliver(
    event: &RequestEvent,
    hooks: &Hooks,
    response: Option<Response>,
    route: Option<&RouteInfo>,
) -> Option<Response> {
    let mut response = response?;
    if event.responded() {
        debug!("already answered, dropping the produced response");
        return None;
    }
    if let Ok(id) = HeaderValue::from_str(event.id()) {
        response.headers_mut().entry(REQUEST_ID).or_insert(id);
    }

    let status = response.status_code();
    let copy = (!hooks.on_handled.is_empty()).then(|| response.clone());
    match event.respond(response) {
        Ok(()) => {
            debug!(status = status.as_u16(), "responded");
            copy
        }
        Err(e @ Error::Disconnected { .. }) => {
            warn!(error = %e, "transport fault");
            let err = HttpError::from(e);
            let failure = Failure {
                message: err.message(),
                error: &err,
                event,
                respondable: false,
                route,
            };
            if std::panic::catch_unwind(AssertUnwindSafe(|| hooks.error(&failure))).is_err() {
                error!("on_error hook panicked");
            }
            None
        }
        Err(e) => {
            error!(error = %e, "response could not be delivered");
            None
        }
    }
}

fn not_found_response(allowed: &[Method]) -> Response {
    if allowed.is_empty() {
        return Response::status(StatusCode::NOT_FOUND);
    }
    let mut response = Response::status(StatusCode::METHOD_NOT_ALLOWED);
    let allow = Methods::from(allowed.to_vec()).to_string();
    if let Ok(value) = HeaderValue::from_str(&allow) {
        response.headers_mut().insert(ALLOW, value);
    }
    response
}

// ── Removable ─────────────────────────────────────────────────────────────────

/// Handle returned by registration; removes what it registered.
#[derive(Debug)]
pub struct Removable {
    router: Weak<Inner>,
    target: Target,
}

#[derive(Clone, Copy, Debug)]
enum Target {
    Route(u64),
    Status(u64),
}

impl Removable {
    /// Removes the route or status handler. Requests already scanning a
    /// snapshot that contains it are unaffected. Calling twice is harmless.
    pub fn remove(&self) {
        let Some(inner) = self.router.upgrade() else { return };
        match self.target {
            Target::Route(id) => {
                inner.routes.rcu(|routes| {
                    routes.iter().filter(|r| r.id != id).cloned().collect::<Vec<_>>()
                });
            }
            Target::Status(id) => {
                inner.status_routes.rcu(|chain| {
                    chain.iter().filter(|r| r.id != id).cloned().collect::<Vec<_>>()
                });
            }
        }
    }
}
