//! Request-issuing client
//!
//! Runs plugins around each dispatch and performs at most one resend per
//! logical request. The resend is driven by an explicit `RetryContext` value
//! owned by the attempt loop, so cloning the request between attempts cannot
//! reset the retry budget.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::dispatch::Dispatcher;
use crate::request::{OutgoingRequest, RequestError, Response};
use crate::token::AccessToken;
use crate::{BeforeRequest, ErrorAction, RequestPlugin, ResponseErrorContext, RetryContext};

/// Client holding the live access token and its plugins.
#[derive(Clone)]
pub struct ApiClient {
    dispatcher: Arc<dyn Dispatcher>,
    access_token: AccessToken,
    plugins: Vec<Arc<dyn RequestPlugin>>,
}

impl ApiClient {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, access_token: AccessToken) -> Self {
        Self {
            dispatcher,
            access_token,
            plugins: Vec::new(),
        }
    }

    /// Register a plugin. Plugins run in registration order.
    pub fn with_plugin(mut self, plugin: Arc<dyn RequestPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn access_token(&self) -> &AccessToken {
        &self.access_token
    }

    /// Send a request, resending it at most once if a plugin asks to.
    ///
    /// When a resend happens its outcome is returned, replacing the error of
    /// the first attempt.
    pub async fn send(&self, request: OutgoingRequest) -> Result<Response, RequestError> {
        let mut retry = RetryContext::default();
        loop {
            let error = match self.attempt(&request, retry).await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            match self.handle_error(&request, &error, retry).await {
                ErrorAction::Propagate => return Err(error),
                ErrorAction::Retry if retry.already_retried => {
                    warn!(
                        url = %request.url,
                        "plugin requested a second resend of the same request, refusing"
                    );
                    return Err(error);
                }
                ErrorAction::Retry => {
                    debug!(url = %request.url, error = %error, "resending request once");
                    retry = retry.retried();
                }
            }
        }
    }

    async fn attempt(
        &self,
        request: &OutgoingRequest,
        retry: RetryContext,
    ) -> Result<Response, RequestError> {
        for plugin in &self.plugins {
            plugin
                .on_before_request(BeforeRequest {
                    request,
                    retry,
                    access_token: &self.access_token,
                })
                .await;
        }

        // Read after the hooks so a token they just wrote is the one sent
        let bearer = self.access_token.current();
        self.dispatcher.dispatch(request, bearer.expose()).await
    }

    /// The first plugin asking for a retry wins.
    async fn handle_error(
        &self,
        request: &OutgoingRequest,
        error: &RequestError,
        retry: RetryContext,
    ) -> ErrorAction {
        for plugin in &self.plugins {
            let action = plugin
                .on_response_error(ResponseErrorContext {
                    request,
                    error,
                    retry,
                    access_token: &self.access_token,
                })
                .await;
            if action == ErrorAction::Retry {
                debug!(plugin = plugin.id(), "plugin requested resend");
                return ErrorAction::Retry;
            }
        }
        ErrorAction::Propagate
    }
}
