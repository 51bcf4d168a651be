//! Content coercion: turning whatever a handler returns into a [`Reply`].
//!
//! | Handler returns | Becomes |
//! |---|---|
//! | [`Response`] | that response |
//! | `&'static str`, `String` | body, content type sniffed (HTML / JSON / text) |
//! | `Bytes`, `Vec<u8>`, `&'static [u8]` | body, `application/json` |
//! | [`Json<T>`], `serde_json::Value` | serialized body, `application/json` |
//! | [`StatusCode`] | empty response with that status |
//! | `()`, `None` | nothing: `204 No Content` from a route, "no change" from a status handler |
//! | [`Decline`] | route passes; the router tries the next matching route |
//! | `Result<T, E>` | `Ok` coerces `T`; `Err` is a handler fault |

use bytes::Bytes;
use http::StatusCode;
use serde::Serialize;

use crate::error::HttpError;
use crate::response::{ContentType, Response};

/// A handler's output after coercion.
#[derive(Debug)]
pub enum Reply {
    /// A complete response, used as is.
    Response(Response),
    /// A bare body. Routes send it as `200 OK`; status handlers keep the status
    /// of the response they replace.
    Body { content_type: ContentType, body: Bytes },
    /// No content produced.
    Empty,
    /// The route passes on this request.
    Decline,
}

impl Reply {
    pub(crate) fn body(content_type: ContentType, body: impl Into<Bytes>) -> Self {
        Self::Body { content_type, body: body.into() }
    }
}

/// Returned from a route handler to pass the request on to the next route
/// whose pattern and method also match.
#[derive(Clone, Copy, Debug, Default)]
pub struct Decline;

/// Serializes `T` with serde_json as an `application/json` body.
///
/// ```rust
/// use serde::Serialize;
/// use waypost::{Context, Json};
///
/// #[derive(Serialize)]
/// struct Book { title: &'static str }
///
/// async fn get_book(_ctx: Context) -> Json<Book> {
///     Json(Book { title: "It" })
/// }
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct Json<T>(pub T);

/// Conversion into a [`Reply`]. Implement on your own types to return them
/// directly from handlers.
pub trait IntoReply {
    fn into_reply(self) -> Result<Reply, HttpError>;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Result<Reply, HttpError> { Ok(self) }
}

impl IntoReply for Response {
    fn into_reply(self) -> Result<Reply, HttpError> { Ok(Reply::Response(self)) }
}

impl IntoReply for StatusCode {
    fn into_reply(self) -> Result<Reply, HttpError> { Ok(Reply::Response(Response::status(self))) }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Result<Reply, HttpError> {
        Ok(Reply::body(ContentType::sniff(self), self))
    }
}

impl IntoReply for String {
    fn into_reply(self) -> Result<Reply, HttpError> {
        Ok(Reply::body(ContentType::sniff(&self), self))
    }
}

impl IntoReply for Bytes {
    fn into_reply(self) -> Result<Reply, HttpError> { Ok(Reply::body(ContentType::Json, self)) }
}

impl IntoReply for Vec<u8> {
    fn into_reply(self) -> Result<Reply, HttpError> { Ok(Reply::body(ContentType::Json, self)) }
}

impl IntoReply for &'static [u8] {
    fn into_reply(self) -> Result<Reply, HttpError> { Ok(Reply::body(ContentType::Json, self)) }
}

impl IntoReply for serde_json::Value {
    fn into_reply(self) -> Result<Reply, HttpError> { Json(self).into_reply() }
}

impl<T: Serialize> IntoReply for Json<T> {
    fn into_reply(self) -> Result<Reply, HttpError> {
        let body = serde_json::to_vec(&self.0)
            .map_err(|e| HttpError::internal(format!("response serialization failed: {e}")))?;
        Ok(Reply::body(ContentType::Json, body))
    }
}

impl IntoReply for () {
    fn into_reply(self) -> Result<Reply, HttpError> { Ok(Reply::Empty) }
}

impl IntoReply for Decline {
    fn into_reply(self) -> Result<Reply, HttpError> { Ok(Reply::Decline) }
}

impl<T: IntoReply> IntoReply for Option<T> {
    fn into_reply(self) -> Result<Reply, HttpError> {
        match self {
            Some(value) => value.into_reply(),
            None => Ok(Reply::Empty),
        }
    }
}

impl<T, E> IntoReply for Result<T, E>
where
    T: IntoReply,
    E: Into<HttpError>,
{
    fn into_reply(self) -> Result<Reply, HttpError> {
        self.map_err(Into::into)?.into_reply()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body_of(reply: Reply) -> (ContentType, String) {
        match reply {
            Reply::Body { content_type, body } => (content_type, String::from_utf8(body.to_vec()).unwrap()),
            other => panic!("expected a body, got {other:?}"),
        }
    }

    #[test]
    fn strings_are_sniffed() {
        assert_eq!(body_of("<p>hi</p>".into_reply().unwrap()).0, ContentType::Html);
        assert_eq!(body_of(String::from("{\"a\":1}").into_reply().unwrap()).0, ContentType::Json);
        assert_eq!(body_of("plain".into_reply().unwrap()).0, ContentType::Text);
    }

    #[test]
    fn binary_bodies_are_json_typed() {
        assert_eq!(body_of(vec![1u8, 2, 3].into_reply().unwrap()).0, ContentType::Json);
        assert_eq!(body_of(Bytes::from_static(b"x").into_reply().unwrap()).0, ContentType::Json);
    }

    #[test]
    fn values_serialize_to_json() {
        let (ct, body) = body_of(json!({ "title": "It" }).into_reply().unwrap());
        assert_eq!(ct, ContentType::Json);
        assert_eq!(body, r#"{"title":"It"}"#);
    }

    #[test]
    fn unit_and_none_are_empty_decline_is_decline() {
        assert!(matches!(().into_reply(), Ok(Reply::Empty)));
        assert!(matches!(None::<String>.into_reply(), Ok(Reply::Empty)));
        assert!(matches!(Decline.into_reply(), Ok(Reply::Decline)));
    }

    #[test]
    fn errors_become_faults() {
        let res: Result<String, std::io::Error> = Err(std::io::Error::other("nope"));
        let err = res.into_reply().unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let res: Result<(), HttpError> = Err(HttpError::new(StatusCode::CONFLICT, "taken"));
        assert_eq!(res.into_reply().unwrap_err().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn status_codes_are_responses() {
        match StatusCode::ACCEPTED.into_reply().unwrap() {
            Reply::Response(res) => assert_eq!(res.status_code(), StatusCode::ACCEPTED),
            other => panic!("unexpected {other:?}"),
        }
    }
}
