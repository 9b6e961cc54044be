//! Test doubles for the authorization endpoint and upstream

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use oauth_refresh::{AuthorizationClient, TokenResponse};
use pipeline::{Dispatcher, OutgoingRequest, RequestError, Response};

/// One scripted answer of `FakeAuth`.
pub struct Scripted {
    delay: Duration,
    outcome: oauth_refresh::Result<TokenResponse>,
}

impl Scripted {
    /// Resolve after `millis` of (virtual) time.
    pub fn delayed(mut self, millis: u64) -> Self {
        self.delay = Duration::from_millis(millis);
        self
    }
}

pub fn token(access: &str, refresh: Option<&str>, expires_in: u64) -> Scripted {
    Scripted {
        delay: Duration::ZERO,
        outcome: Ok(TokenResponse {
            access_token: access.into(),
            refresh_token: refresh.map(str::to_string),
            expires_in,
            scope: None,
            token_type: Some("bearer".into()),
        }),
    }
}

/// Authorization client replaying a script and recording presented tokens.
pub struct FakeAuth {
    script: Mutex<VecDeque<Scripted>>,
    presented: Mutex<Vec<String>>,
}

impl FakeAuth {
    pub fn new(script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            presented: Mutex::new(Vec::new()),
        })
    }

    pub fn rejected() -> Scripted {
        Scripted {
            delay: Duration::ZERO,
            outcome: Err(oauth_refresh::Error::Response {
                status: 400,
                body: r#"{"error":"invalid_grant"}"#.into(),
            }),
        }
    }

    pub fn calls(&self) -> usize {
        self.presented.lock().unwrap().len()
    }

    pub fn presented(&self) -> Vec<String> {
        self.presented.lock().unwrap().clone()
    }
}

impl AuthorizationClient for FakeAuth {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = oauth_refresh::Result<TokenResponse>> + Send + 'a>> {
        self.presented.lock().unwrap().push(refresh_token.to_string());
        let next = self.script.lock().unwrap().pop_front();
        Box::pin(async move {
            let Some(Scripted { delay, outcome }) = next else {
                return Err(oauth_refresh::Error::Request("script exhausted".into()));
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            outcome
        })
    }
}

/// Upstream that accepts exactly one bearer token and rejects the rest with
/// `reject_status`. Records the bearer of every dispatch.
pub struct FakeUpstream {
    accepted: Option<String>,
    reject_status: u16,
    bearers: Mutex<Vec<String>>,
}

impl FakeUpstream {
    pub fn accepting(token: &str) -> Arc<Self> {
        Arc::new(Self {
            accepted: Some(token.to_string()),
            reject_status: 401,
            bearers: Mutex::new(Vec::new()),
        })
    }

    /// Rejects every token with `status`.
    pub fn rejecting(status: u16) -> Arc<Self> {
        Arc::new(Self {
            accepted: None,
            reject_status: status,
            bearers: Mutex::new(Vec::new()),
        })
    }

    pub fn bearers(&self) -> Vec<String> {
        self.bearers.lock().unwrap().clone()
    }
}

impl Dispatcher for FakeUpstream {
    fn dispatch<'a>(
        &'a self,
        _request: &'a OutgoingRequest,
        bearer: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Response, RequestError>> + Send + 'a>> {
        self.bearers.lock().unwrap().push(bearer.to_string());
        let accepted = self.accepted.as_deref() == Some(bearer);
        let status = self.reject_status;
        Box::pin(async move {
            // Let concurrent requests interleave like real I/O would
            tokio::task::yield_now().await;
            if accepted {
                Ok(Response::new(200, "ok"))
            } else {
                Err(RequestError::Status(Response::new(status, "Unauthorized")))
            }
        })
    }
}

/// Give spawned tasks (timers, refreshes) a chance to run.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
