//! Per-call handler context.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use http::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;

use crate::error::{Error, HttpError};
use crate::event::RequestEvent;
use crate::path::Params;
use crate::request::Request;
use crate::response::Response;
use crate::route::RouteInfo;

/// Everything a handler gets to see about the request it is answering.
///
/// Cheap to clone: the event, parameters and header bag are shared handles.
#[derive(Clone)]
pub struct Context {
    event: Arc<RequestEvent>,
    params: Arc<Params>,
    headers: ResponseHeaders,
    route: Option<Arc<RouteInfo>>,
}

impl Context {
    pub(crate) fn new(
        event: Arc<RequestEvent>,
        params: Params,
        headers: ResponseHeaders,
        route: Option<Arc<RouteInfo>>,
    ) -> Self {
        Self { event, params: Arc::new(params), headers, route }
    }

    pub fn request(&self) -> &Request { self.event.request() }
    pub fn id(&self) -> &str { self.event.id() }

    /// The underlying event. Handlers that answer out of band (socket
    /// upgrades, streaming) settle it directly with [`RequestEvent::respond`].
    pub fn event(&self) -> &RequestEvent { &self.event }

    /// Returns a named path parameter.
    ///
    /// For a route `/books/:id`, `ctx.param("id")` on `/books/42` returns `Some("42")`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn params(&self) -> &Params { &self.params }
    pub fn query(&self) -> Option<&str> { self.event.request().query() }
    pub fn is_secure(&self) -> bool { self.event.is_secure() }

    /// The route that matched, if any. `None` on the not-found and error paths.
    pub fn route(&self) -> Option<&RouteInfo> { self.route.as_deref() }

    /// Headers merged into whatever response this request ends up with.
    pub fn response_headers(&self) -> &ResponseHeaders { &self.headers }

    /// Decodes the request body as JSON. A malformed body is a `400`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_slice(self.event.request().body())
            .map_err(|e| HttpError::bad_request(format!("invalid JSON body: {e}")))
    }

    pub(crate) fn route_arc(&self) -> Option<Arc<RouteInfo>> {
        self.route.clone()
    }
}

// ── ResponseHeaders ───────────────────────────────────────────────────────────

/// A per-request header bag.
///
/// Handlers set headers here (cookies, cache hints) without owning the final
/// response; the router merges them into every response it produces for the
/// request. One bag belongs to exactly one request.
#[derive(Clone, Default)]
pub struct ResponseHeaders(Arc<Mutex<HeaderMap>>);

impl ResponseHeaders {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Replaces any value already set under `name`.
    pub fn set(&self, name: &str, value: &str) -> Result<(), Error> {
        let (name, value) = parse_header(name, value)?;
        self.lock().insert(name, value);
        Ok(())
    }

    /// Adds a value, keeping earlier ones (e.g. several `set-cookie`).
    pub fn append(&self, name: &str, value: &str) -> Result<(), Error> {
        let (name, value) = parse_header(name, value)?;
        self.lock().append(name, value);
        Ok(())
    }

    pub fn remove(&self, name: &str) {
        self.lock().remove(name);
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.lock().get(name).and_then(|v| v.to_str().ok()).map(str::to_owned)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copies the bag into `response`, skipping name/value pairs it already has.
    pub(crate) fn merge_into(&self, response: &mut Response) {
        let bag = self.lock();
        for (name, value) in bag.iter() {
            let present = response.headers.get_all(name).iter().any(|v| v == value);
            if !present {
                response.headers.append(name.clone(), value.clone());
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HeaderMap> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), Error> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| Error::InvalidHeader(format!("{name}: {e}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| Error::InvalidHeader(format!("{name}: {e}")))?;
    Ok((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[test]
    fn merge_skips_pairs_already_present() {
        let bag = ResponseHeaders::new();
        bag.append("set-cookie", "a=1").unwrap();
        bag.append("set-cookie", "b=2").unwrap();
        bag.set("cache-control", "no-store").unwrap();

        let mut res = Response::status(StatusCode::OK);
        bag.merge_into(&mut res);
        bag.merge_into(&mut res);

        assert_eq!(res.headers().get_all("set-cookie").iter().count(), 2);
        assert_eq!(res.header("cache-control"), Some("no-store"));
    }

    #[test]
    fn rejects_invalid_headers() {
        let bag = ResponseHeaders::new();
        assert!(matches!(bag.set("bad header", "x"), Err(Error::InvalidHeader(_))));
        assert!(matches!(bag.set("x-ok", "line\nbreak"), Err(Error::InvalidHeader(_))));
        assert!(bag.is_empty());
    }

    #[test]
    fn set_replaces_and_remove_clears() {
        let bag = ResponseHeaders::new();
        bag.set("x-mode", "a").unwrap();
        bag.set("x-mode", "b").unwrap();
        assert_eq!(bag.get("x-mode").as_deref(), Some("b"));
        bag.remove("x-mode");
        assert_eq!(bag.get("x-mode"), None);
    }
}
