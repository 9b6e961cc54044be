//! Authorization client abstraction
//!
//! `AuthorizationClient` is the only thing the refresh coordinator knows about
//! the token endpoint. `HttpAuthorizationClient` is the production
//! implementation; tests substitute counting fakes.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::constants::DEFAULT_REFRESH_TIMEOUT_SECS;
use crate::error::Result;
use crate::token::{self, ClientCredentials, TokenResponse};

/// Performs one refresh-token exchange.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn AuthorizationClient>`).
pub trait AuthorizationClient: Send + Sync {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenResponse>> + Send + 'a>>;
}

/// Refresh-grant client backed by `reqwest`.
pub struct HttpAuthorizationClient {
    http: reqwest::Client,
    token_endpoint: String,
    credentials: ClientCredentials,
    timeout: Duration,
}

impl HttpAuthorizationClient {
    pub fn new(
        http: reqwest::Client,
        token_endpoint: impl Into<String>,
        credentials: ClientCredentials,
    ) -> Self {
        Self {
            http,
            token_endpoint: token_endpoint.into(),
            credentials,
            timeout: Duration::from_secs(DEFAULT_REFRESH_TIMEOUT_SECS),
        }
    }

    /// Override the per-call timeout for the token endpoint.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn token_endpoint(&self) -> &str {
        &self.token_endpoint
    }
}

impl AuthorizationClient for HttpAuthorizationClient {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenResponse>> + Send + 'a>> {
        Box::pin(token::refresh_token(
            &self.http,
            &self.token_endpoint,
            &self.credentials,
            refresh_token,
            self.timeout,
        ))
    }
}
