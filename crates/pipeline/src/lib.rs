//! Request pipeline with pluggable authorization hooks
//!
//! `ApiClient` sends buffered requests through a `Dispatcher` and runs every
//! registered `RequestPlugin` around each attempt:
//!
//! - `on_before_request` runs before every dispatch, including the resend
//! - `on_response_error` runs when a dispatch fails and may ask for one resend
//!
//! The retry budget travels as a `RetryContext` value passed into each
//! attempt. A logical request is dispatched at most twice no matter what the
//! plugins answer.

pub mod client;
pub mod dispatch;
pub mod request;
pub mod token;

pub use client::ApiClient;
pub use dispatch::{Dispatcher, ReqwestDispatcher};
pub use request::{OutgoingRequest, RequestError, Response};
pub use token::AccessToken;

use std::future::Future;
use std::pin::Pin;

/// Per-attempt retry state of one logical request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryContext {
    /// Set on the resend: an authorization retry has already been spent.
    pub already_retried: bool,
}

impl RetryContext {
    pub fn retried(self) -> Self {
        Self {
            already_retried: true,
        }
    }
}

/// Context handed to `RequestPlugin::on_before_request`.
pub struct BeforeRequest<'a> {
    pub request: &'a OutgoingRequest,
    pub retry: RetryContext,
    /// The client's live token. Plugins may replace it before dispatch.
    pub access_token: &'a AccessToken,
}

/// Context handed to `RequestPlugin::on_response_error`.
pub struct ResponseErrorContext<'a> {
    pub request: &'a OutgoingRequest,
    pub error: &'a RequestError,
    pub retry: RetryContext,
    pub access_token: &'a AccessToken,
}

/// What the pipeline should do with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Return the original error to the caller
    Propagate,
    /// Resend the same request once; its outcome replaces the original error
    Retry,
}

/// Hook points a plugin can attach to.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn RequestPlugin>`).
pub trait RequestPlugin: Send + Sync {
    /// Identifier for logging
    fn id(&self) -> &str;

    fn on_before_request<'a>(
        &'a self,
        _ctx: BeforeRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async {})
    }

    fn on_response_error<'a>(
        &'a self,
        _ctx: ResponseErrorContext<'a>,
    ) -> Pin<Box<dyn Future<Output = ErrorAction> + Send + 'a>> {
        Box::pin(async { ErrorAction::Propagate })
    }
}
