//! Incoming HTTP request type.

use bytes::Bytes;
use http::request::Parts;
use http::{Extensions, HeaderMap, Method, Uri};

/// An incoming HTTP request with its body already collected.
#[derive(Debug)]
pub struct Request {
    parts: Parts,
    body: Bytes,
}

impl Request {
    pub fn from_parts(parts: Parts, body: Bytes) -> Self {
        Self { parts, body }
    }

    pub fn method(&self) -> &Method { &self.parts.method }
    pub fn uri(&self) -> &Uri { &self.parts.uri }
    pub fn headers(&self) -> &HeaderMap { &self.parts.headers }
    pub fn body(&self) -> &Bytes { &self.body }

    /// Transport-supplied values (the per-runtime environment).
    pub fn extensions(&self) -> &Extensions { &self.parts.extensions }

    /// The pathname, without query string. Never empty.
    pub fn path(&self) -> &str {
        match self.parts.uri.path() {
            "" => "/",
            path => path,
        }
    }

    pub fn query(&self) -> Option<&str> {
        self.parts.uri.query()
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl<B: Into<Bytes>> From<http::Request<B>> for Request {
    fn from(req: http::Request<B>) -> Self {
        let (parts, body) = req.into_parts();
        Self { parts, body: body.into() }
    }
}
