//! Lifecycle hooks.
//!
//! Four fixed hook kinds, each a list of callbacks run synchronously in
//! registration order:
//!
//! | Hook | Fires | May respond |
//! |---|---|---|
//! | `on_request` | before matching | no (answer early through the event itself) |
//! | `on_not_found` | no route produced a response | yes |
//! | `on_error` | a handler or hook failed | yes |
//! | `on_handled` | after the response was handed to the transport | no |
//!
//! For the hooks that may respond, the last `Some` wins.

use std::sync::Arc;
use std::time::Duration;

use crate::error::HttpError;
use crate::event::RequestEvent;
use crate::response::Response;
use crate::route::RouteInfo;

/// Passed to `on_not_found` hooks.
pub struct NotFound<'a> {
    pub event: &'a RequestEvent,
    /// The default response (`404`, or `405` when only the method missed).
    pub response: &'a Response,
}

/// Passed to `on_handled` hooks.
pub struct Handled<'a> {
    pub event: &'a RequestEvent,
    /// `None` when the request was answered out of band or could not be
    /// answered at all.
    pub response: Option<&'a Response>,
    pub route: Option<&'a RouteInfo>,
    pub duration: Duration,
}

/// Passed to `on_error` hooks.
pub struct Failure<'a> {
    pub message: &'a str,
    pub error: &'a HttpError,
    pub event: &'a RequestEvent,
    /// `false` when no response can reach the client any more: the event was
    /// already settled, or the transport went away.
    pub respondable: bool,
    pub route: Option<&'a RouteInfo>,
}

pub(crate) type RequestHook = Arc<dyn Fn(&RequestEvent) + Send + Sync>;
pub(crate) type NotFoundHook = Arc<dyn Fn(&NotFound<'_>) -> Option<Response> + Send + Sync>;
pub(crate) type HandledHook = Arc<dyn Fn(&Handled<'_>) + Send + Sync>;
pub(crate) type ErrorHook = Arc<dyn Fn(&Failure<'_>) -> Option<Response> + Send + Sync>;

#[derive(Clone, Default)]
pub(crate) struct Hooks {
    pub(crate) on_request: Vec<RequestHook>,
    pub(crate) on_not_found: Vec<NotFoundHook>,
    pub(crate) on_handled: Vec<HandledHook>,
    pub(crate) on_error: Vec<ErrorHook>,
}

impl Hooks {
    pub(crate) fn request(&self, event: &RequestEvent) {
        for hook in &self.on_request {
            hook(event);
        }
    }

    pub(crate) fn not_found(&self, event: &RequestEvent, mut response: Response) -> Response {
        for hook in &self.on_not_found {
            if let Some(replacement) = hook(&NotFound { event, response: &response }) {
                response = replacement;
            }
        }
        response
    }

    pub(crate) fn handled(&self, handled: &Handled<'_>) {
        for hook in &self.on_handled {
            hook(handled);
        }
    }

    pub(crate) fn error(&self, failure: &Failure<'_>) -> Option<Response> {
        let mut supplied = None;
        for hook in &self.on_error {
            if let Some(response) = hook(failure) {
                supplied = Some(response);
            }
        }
        supplied
    }
}
