//! Error types.
//!
//! Two kinds of failure travel through the router:
//!
//! - [`Error`] — infrastructure faults: binding a port, a malformed route
//!   pattern, settling a [`RequestEvent`](crate::RequestEvent) twice, a client
//!   that hung up before its response was ready.
//! - [`HttpError`] — handler faults. A handler returns `Err(HttpError)` (or
//!   anything convertible with `?`) and the router turns it into a response.

use std::fmt;

use http::StatusCode;
use serde_json::json;

use crate::response::{ContentType, Response};

/// The error type returned by waypost's fallible operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("http: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("invalid route pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid status filter `{0}`")]
    InvalidStatusFilter(String),

    #[error("invalid method list `{0}`")]
    InvalidMethod(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("invalid listen address `{0}`")]
    InvalidAddress(String),

    /// `respond` or `error` was called on an event that is already settled.
    #[error("request {id} was already responded to")]
    AlreadyResponded { id: String },

    /// The transport stopped waiting for the response (client disconnected).
    #[error("client went away before request {id} could be answered")]
    Disconnected { id: String },

    /// The event was settled with an error instead of a response.
    #[error("request aborted: {0}")]
    Aborted(String),
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A failure raised by a route or status handler.
///
/// Any `std::error::Error` converts into an `HttpError` with status `500`, so
/// handlers can use `?` freely:
///
/// ```rust
/// use waypost::{Context, HttpError};
///
/// async fn port(ctx: Context) -> Result<String, HttpError> {
///     let n: u16 = ctx.param("port").unwrap_or_default().parse()?;
///     Ok(n.to_string())
/// }
/// ```
///
/// `HttpError` deliberately does not implement `std::error::Error` itself;
/// that is what makes the blanket `From` conversion possible.
pub struct HttpError {
    status: StatusCode,
    message: String,
    expose: bool,
    source: Option<BoxError>,
}

impl HttpError {
    /// A fault with an explicit status. Client errors (4xx) are exposed to the
    /// client by default; everything else is not.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            expose: status.is_client_error(),
            source: None,
        }
    }

    /// `500 Internal Server Error`, not exposed.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// `400 Bad Request`, exposed.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Overrides whether the message and cause chain reach the client.
    pub fn exposed(mut self, expose: bool) -> Self {
        self.expose = expose;
        self
    }

    /// Attaches an underlying cause.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn message(&self) -> &str { &self.message }
    pub fn is_exposed(&self) -> bool { self.expose }

    pub fn source(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Messages of the cause chain, outermost first.
    pub fn causes(&self) -> Vec<String> {
        let mut causes = Vec::new();
        let mut next = self
            .source
            .as_deref()
            .map(|err| err as &(dyn std::error::Error + 'static));
        while let Some(err) = next {
            causes.push(err.to_string());
            next = err.source();
        }
        causes
    }

    /// Builds a fault from a caught panic payload.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let detail = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_owned()
        };
        Self::internal(format!("handler panicked: {detail}"))
    }

    /// The default error response, negotiated against the request's `Accept`
    /// header. JSON unless the client prefers HTML.
    pub fn to_response(&self, accept: Option<&str>) -> Response {
        let message = if self.expose {
            self.message.clone()
        } else {
            self.status.canonical_reason().unwrap_or("Error").to_owned()
        };
        let causes = if self.expose { self.causes() } else { Vec::new() };

        let builder = Response::builder().status(self.status);
        if prefers_html(accept) {
            let mut page = format!(
                "<!DOCTYPE html><html><head><title>{code}</title></head><body><h1>{code}</h1><p>{msg}</p>",
                code = html_escape(&status_line(self.status)),
                msg = html_escape(&message),
            );
            if !causes.is_empty() {
                page.push_str("<pre>");
                page.push_str(&html_escape(&causes.join("\n")));
                page.push_str("</pre>");
            }
            page.push_str("</body></html>");
            builder.bytes(ContentType::Html, page.into_bytes())
        } else {
            let mut body = json!({ "status": self.status.as_u16(), "message": message });
            if !causes.is_empty() {
                body["causes"] = json!(causes);
            }
            builder.json(body.to_string().into_bytes())
        }
    }
}

impl<E> From<E> for HttpError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Self::internal(err.to_string()).with_source(err)
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status.as_u16(), self.message)
    }
}

impl fmt::Debug for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpError")
            .field("status", &self.status)
            .field("message", &self.message)
            .field("expose", &self.expose)
            .field("source", &self.source)
            .finish()
    }
}

// ── Content negotiation ───────────────────────────────────────────────────────

fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {reason}", status.as_u16()),
        None => status.as_u16().to_string(),
    }
}

/// True when `text/html` outranks `application/json` in an `Accept` header.
/// Ties go to JSON.
fn prefers_html(accept: Option<&str>) -> bool {
    let Some(accept) = accept else { return false };
    let mut html: f32 = 0.0;
    let mut json: f32 = 0.0;
    for part in accept.split(',') {
        let mut fields = part.split(';');
        let media = fields.next().unwrap_or("").trim().to_ascii_lowercase();
        let q = fields
            .filter_map(|p| p.trim().strip_prefix("q="))
            .find_map(|q| q.trim().parse::<f32>().ok())
            .unwrap_or(1.0);
        match media.as_str() {
            "text/html" | "application/xhtml+xml" => html = html.max(q),
            "application/json" => json = json.max(q),
            "text/*" => html = html.max(q * 0.9),
            "application/*" => json = json.max(q * 0.9),
            "*/*" => {
                html = html.max(q * 0.5);
                json = json.max(q * 0.5);
            }
            _ => {}
        }
    }
    html > json
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(res: &Response) -> String {
        String::from_utf8(res.body().to_vec()).unwrap()
    }

    #[test]
    fn foreign_errors_become_hidden_500s() {
        let err: HttpError = "x".parse::<u16>().unwrap_err().into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.is_exposed());
        assert!(err.source().is_some());

        let res = err.to_response(None);
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.content_type(), Some("application/json"));
        let text = body(&res);
        assert!(text.contains("Internal Server Error"));
        assert!(!text.contains("invalid digit"));
    }

    #[test]
    fn client_errors_are_exposed_by_default() {
        let res = HttpError::new(StatusCode::NOT_FOUND, "no such book").to_response(None);
        let value: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(value["status"], 404);
        assert_eq!(value["message"], "no such book");
    }

    #[test]
    fn exposed_errors_include_the_cause_chain() {
        let err = HttpError::internal("boom")
            .exposed(true)
            .with_source(std::io::Error::other("disk full"));
        let value: serde_json::Value = serde_json::from_slice(err.to_response(None).body()).unwrap();
        assert_eq!(value["message"], "boom");
        assert_eq!(value["causes"][0], "disk full");
    }

    #[test]
    fn browsers_get_html() {
        let accept = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
        let res = HttpError::new(StatusCode::FORBIDDEN, "<nope>").to_response(Some(accept));
        assert_eq!(res.content_type(), Some("text/html; charset=utf-8"));
        let text = body(&res);
        assert!(text.contains("<h1>403 Forbidden</h1>"));
        assert!(text.contains("&lt;nope&gt;"));
    }

    #[test]
    fn negotiation_prefers_json_on_ties() {
        assert!(!prefers_html(Some("*/*")));
        assert!(!prefers_html(Some("application/json, text/html")));
        assert!(prefers_html(Some("application/json;q=0.5, text/html")));
        assert!(!prefers_html(None));
    }

    #[test]
    fn panic_payloads_are_described() {
        let err = HttpError::from_panic(Box::new("kaboom"));
        assert_eq!(err.message(), "handler panicked: kaboom");
        let err = HttpError::from_panic(Box::new(String::from("owned")));
        assert_eq!(err.message(), "handler panicked: owned");
    }
}
