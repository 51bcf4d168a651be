//! Registered routes and status routes.
//!
//! A [`Route`] is shared by every request whose path it matches, so matching
//! never writes to it: [`Route::matches`] hands the parameters back to the
//! caller, which threads them into [`Route::handle`].

use std::sync::Arc;

use http::{Method, StatusCode};

use crate::context::Context;
use crate::error::{Error, HttpError};
use crate::handler::{BoxedHandler, BoxedStatusHandler};
use crate::method::Methods;
use crate::path::{Params, PathMatcher};
use crate::reply::Reply;
use crate::response::Response;
use crate::status::StatusFilter;

/// Public description of a route, handed to hooks and handlers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RouteInfo {
    pattern: String,
    methods: Methods,
}

impl RouteInfo {
    pub fn pattern(&self) -> &str { &self.pattern }
    pub fn methods(&self) -> &Methods { &self.methods }
}

/// Outcome of testing one route against a request.
#[derive(Debug, PartialEq)]
pub(crate) enum RouteMatch {
    NoMatch,
    /// The path matched, the method did not.
    MethodNotAllowed,
    Matched(Params),
}

/// What a route produced for a request.
#[derive(Debug)]
pub(crate) enum RouteOutput {
    Response(Response),
    NoContent,
    Declined,
}

pub(crate) struct Route {
    pub(crate) id: u64,
    info: Arc<RouteInfo>,
    matcher: PathMatcher,
    handler: BoxedHandler,
}

impl Route {
    pub(crate) fn new(id: u64, pattern: &str, methods: Methods, handler: BoxedHandler) -> Result<Self, Error> {
        let matcher = PathMatcher::new(pattern)?;
        let info = Arc::new(RouteInfo { pattern: pattern.to_owned(), methods });
        Ok(Self { id, info, matcher, handler })
    }

    pub(crate) fn info(&self) -> &Arc<RouteInfo> {
        &self.info
    }

    pub(crate) fn matches(&self, method: &Method, pathname: &str) -> RouteMatch {
        match self.matcher.matches(pathname) {
            None => RouteMatch::NoMatch,
            Some(_) if !self.info.methods.contains(method) => RouteMatch::MethodNotAllowed,
            Some(params) => RouteMatch::Matched(params),
        }
    }

    /// Runs the handler and coerces its result. The request's header bag is
    /// merged into any response produced.
    pub(crate) async fn handle(&self, ctx: Context) -> Result<RouteOutput, HttpError> {
        let headers = ctx.response_headers().clone();
        let mut response = match self.handler.call(ctx).await? {
            Reply::Response(response) => response,
            Reply::Body { content_type, body } => Response::builder().bytes(content_type, body),
            Reply::Empty => return Ok(RouteOutput::NoContent),
            Reply::Decline => return Ok(RouteOutput::Declined),
        };
        headers.merge_into(&mut response);
        Ok(RouteOutput::Response(response))
    }
}

pub(crate) struct StatusRoute {
    pub(crate) id: u64,
    filter: StatusFilter,
    handler: BoxedStatusHandler,
}

impl StatusRoute {
    pub(crate) fn new(id: u64, filter: StatusFilter, handler: BoxedStatusHandler) -> Self {
        Self { id, filter, handler }
    }

    pub(crate) fn matches(&self, status: StatusCode) -> bool {
        self.filter.matches(status)
    }

    /// Runs the handler against a copy of `current`.
    ///
    /// `Ok(None)` means "no change". A bare body keeps `current`'s status.
    pub(crate) async fn handle(&self, ctx: Context, current: &Response) -> Result<Option<Response>, HttpError> {
        let status = current.status_code();
        let headers = ctx.response_headers().clone();
        let mut response = match self.handler.call(ctx, status, current.clone()).await? {
            Reply::Response(response) => response,
            Reply::Body { content_type, body } => {
                Response::builder().status(status).bytes(content_type, body)
            }
            Reply::Empty | Reply::Decline => return Ok(None),
        };
        headers.merge_into(&mut response);
        Ok(Some(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RequestEvent;
    use crate::context::ResponseHeaders;
    use crate::handler::{Handler, StatusHandler};
    use crate::reply::Decline;
    use crate::status::StatusRange;

    fn ctx(path: &str) -> Context {
        let (event, _fut) = RequestEvent::new(http::Request::get(path).body("").unwrap(), None, false);
        Context::new(Arc::new(event), Params::default(), ResponseHeaders::new(), None)
    }

    async fn hello(_ctx: Context) -> &'static str { "hello" }
    async fn nothing(_ctx: Context) {}
    async fn pass(_ctx: Context) -> Decline { Decline }

    #[test]
    fn distinguishes_method_mismatch() {
        let route = Route::new(1, "/books/:id", Method::GET.into(), hello.into_boxed_handler()).unwrap();
        assert_eq!(route.matches(&Method::POST, "/books/1"), RouteMatch::MethodNotAllowed);
        assert_eq!(route.matches(&Method::GET, "/authors/1"), RouteMatch::NoMatch);
        match route.matches(&Method::GET, "/books/1") {
            RouteMatch::Matched(params) => assert_eq!(params.get("id"), Some("1")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn coerces_handler_output() {
        let route = Route::new(1, "/", Methods::Any, hello.into_boxed_handler()).unwrap();
        let c = ctx("/");
        c.response_headers().append("set-cookie", "seen=1").unwrap();
        match route.handle(c).await.unwrap() {
            RouteOutput::Response(res) => {
                assert_eq!(res.status_code(), StatusCode::OK);
                assert_eq!(res.content_type(), Some("text/plain; charset=utf-8"));
                assert_eq!(res.header("set-cookie"), Some("seen=1"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let route = Route::new(2, "/", Methods::Any, nothing.into_boxed_handler()).unwrap();
        assert!(matches!(route.handle(ctx("/")).await.unwrap(), RouteOutput::NoContent));

        let route = Route::new(3, "/", Methods::Any, pass.into_boxed_handler()).unwrap();
        assert!(matches!(route.handle(ctx("/")).await.unwrap(), RouteOutput::Declined));
    }

    #[tokio::test]
    async fn status_route_bodies_keep_the_status() {
        async fn rewrite(_ctx: Context, _status: StatusCode, _current: Response) -> &'static str {
            r#"{"error":true}"#
        }
        let sr = StatusRoute::new(1, StatusRange::ClientError.into(), rewrite.into_boxed_status_handler());
        assert!(sr.matches(StatusCode::NOT_FOUND));
        assert!(!sr.matches(StatusCode::OK));

        let current = Response::status(StatusCode::NOT_FOUND);
        let res = sr.handle(ctx("/x"), &current).await.unwrap().unwrap();
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(res.content_type(), Some("application/json"));
        assert_eq!(&res.body()[..], br#"{"error":true}"#);
    }

    #[tokio::test]
    async fn status_route_unit_means_no_change() {
        async fn observe(_ctx: Context, _status: StatusCode, _current: Response) {}
        let sr = StatusRoute::new(1, StatusRange::Any.into(), observe.into_boxed_status_handler());
        let current = Response::text("keep");
        assert!(sr.handle(ctx("/"), &current).await.unwrap().is_none());
    }
}
