//! Single-flight token refresh and expiry tracking
//!
//! All mutable state lives in one `std::sync::Mutex<State>` that is never held
//! across an await point:
//!
//! - `pending` holds a `Shared` future for the in-flight refresh. Starting a
//!   refresh and publishing its handle happen under one lock acquisition, so
//!   concurrent callers either start the refresh or join it, never both.
//! - The refresh itself runs in a spawned task and always runs to completion,
//!   even if every caller that joined it is dropped.
//! - The expiry timer takes the same lock before setting `expired`. A
//!   generation counter makes a superseded timer that is already running a
//!   no-op.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use common::Secret;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use oauth_refresh::{AuthorizationClient, ClientCredentials, HttpAuthorizationClient, TokenResponse};
use pipeline::{AccessToken, ErrorAction, RequestError, RetryContext};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::callbacks::{self, CallbackError, RefreshErrorFn, TokenUpdateFn};
use crate::error::{Error, Result};
use crate::metrics;
use crate::timer::ExpiryTimer;

/// How long before the reported expiry the token is considered expired.
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(20);

/// Outcome of a successful refresh.
///
/// `refresh_token` is always the token to present next: the rotated value if
/// the endpoint returned one, otherwise the one that was just presented.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshResult {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub scope: Option<String>,
}

impl RefreshResult {
    fn from_response(response: TokenResponse, presented: &str) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response
                .refresh_token
                .unwrap_or_else(|| presented.to_owned()),
            expires_in: response.expires_in,
            scope: response.scope,
        }
    }
}

impl fmt::Debug for RefreshResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshResult")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

/// What every caller of one refresh cycle observes.
pub type RefreshOutcome = std::result::Result<RefreshResult, oauth_refresh::Error>;

type PendingRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// How the coordinator reaches the token endpoint.
pub enum RefreshCredentials {
    /// Build an HTTP refresh client for this endpoint and client identity
    Client {
        token_endpoint: String,
        credentials: ClientCredentials,
    },
    /// Use an already configured client
    Preconfigured(Arc<dyn AuthorizationClient>),
}

impl RefreshCredentials {
    fn into_client(self) -> Arc<dyn AuthorizationClient> {
        match self {
            RefreshCredentials::Client {
                token_endpoint,
                credentials,
            } => Arc::new(HttpAuthorizationClient::new(
                reqwest::Client::new(),
                token_endpoint,
                credentials,
            )),
            RefreshCredentials::Preconfigured(client) => client,
        }
    }
}

struct State {
    refresh_token: Secret<String>,
    expired: bool,
    pending: Option<PendingRefresh>,
    timer: Option<ExpiryTimer>,
    timer_generation: u64,
    latest_access_token: Option<Secret<String>>,
}

struct Inner {
    state: Mutex<State>,
    client: Arc<dyn AuthorizationClient>,
    on_token_update: Option<TokenUpdateFn>,
    on_token_refresh_error: Option<RefreshErrorFn>,
}

/// Keeps one client's bearer token fresh. Clones share the same state.
#[derive(Clone)]
pub struct TokenRefreshCoordinator {
    inner: Arc<Inner>,
}

/// Builder for `TokenRefreshCoordinator`.
pub struct CoordinatorBuilder {
    refresh_token: String,
    credentials: RefreshCredentials,
    on_token_update: Option<TokenUpdateFn>,
    on_token_refresh_error: Option<RefreshErrorFn>,
    start_expired: bool,
}

impl CoordinatorBuilder {
    /// Called after every successful refresh, before the single-flight slot
    /// is released. A returned error is logged; the refresh still counts as
    /// successful.
    pub fn on_token_update<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(RefreshResult) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = std::result::Result<(), CallbackError>> + Send + 'static,
    {
        self.on_token_update = Some(callbacks::token_update_fn(callback));
        self
    }

    /// Called once per failed refresh with the underlying error.
    pub fn on_token_refresh_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&oauth_refresh::Error) + Send + Sync + 'static,
    {
        self.on_token_refresh_error = Some(Arc::new(callback));
        self
    }

    /// Start with the access token considered expired, e.g. when the client
    /// has no access token yet. The first request then refreshes first.
    pub fn start_expired(mut self, expired: bool) -> Self {
        self.start_expired = expired;
        self
    }

    pub fn build(self) -> Result<TokenRefreshCoordinator> {
        if self.refresh_token.trim().is_empty() {
            return Err(Error::Config("refresh token must not be empty".into()));
        }

        let state = State {
            refresh_token: Secret::new(self.refresh_token),
            expired: self.start_expired,
            pending: None,
            timer: None,
            timer_generation: 0,
            latest_access_token: None,
        };
        Ok(TokenRefreshCoordinator {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                client: self.credentials.into_client(),
                on_token_update: self.on_token_update,
                on_token_refresh_error: self.on_token_refresh_error,
            }),
        })
    }
}

impl TokenRefreshCoordinator {
    pub fn builder(
        refresh_token: impl Into<String>,
        credentials: RefreshCredentials,
    ) -> CoordinatorBuilder {
        CoordinatorBuilder {
            refresh_token: refresh_token.into(),
            credentials,
            on_token_update: None,
            on_token_refresh_error: None,
            start_expired: false,
        }
    }

    /// Join the in-flight refresh or start a new one.
    ///
    /// Every caller that arrives before the refresh resolves receives the
    /// same outcome; only one call reaches the authorization endpoint.
    pub async fn acquire_refresh(&self) -> RefreshOutcome {
        let (pending, started) = self.inner.pending_or_start();
        if !started {
            debug!("joining in-flight token refresh");
            metrics::record_joined();
        }
        pending.await
    }

    /// Pre-request hook.
    ///
    /// Waits for an in-flight refresh, or refreshes first when the token is
    /// believed expired. A failed proactive refresh is swallowed on purpose:
    /// the request goes out with the current token and a resulting 401/403
    /// is handled by `after_error`.
    pub async fn before_request(&self, access_token: &AccessToken) {
        let (pending, expired) = {
            let state = self.inner.lock();
            (state.pending.clone(), state.expired)
        };

        if let Some(pending) = pending {
            debug!("waiting for in-flight token refresh before sending request");
            if pending.await.is_ok() {
                self.inner.apply_latest(access_token);
            }
            return;
        }

        if expired {
            debug!("access token believed expired, refreshing before request");
            match self.acquire_refresh().await {
                Ok(_) => self.inner.apply_latest(access_token),
                Err(e) => {
                    debug!(error = %e, "proactive refresh failed, sending request with current token");
                }
            }
        }
    }

    /// Post-error hook.
    ///
    /// Asks for one resend when the request was rejected with 401/403, has
    /// not been retried yet, and a refresh succeeds. Otherwise the original
    /// error propagates.
    pub async fn after_error(
        &self,
        error: &RequestError,
        retry: RetryContext,
        access_token: &AccessToken,
    ) -> ErrorAction {
        if !error.is_authorization_failure() {
            return ErrorAction::Propagate;
        }
        if retry.already_retried {
            debug!(
                status = error.status(),
                "request rejected again after refresh, not retrying"
            );
            return ErrorAction::Propagate;
        }

        match self.acquire_refresh().await {
            Ok(_) => {
                self.inner.apply_latest(access_token);
                metrics::record_auth_retry();
                ErrorAction::Retry
            }
            // Already reported through on_token_refresh_error
            Err(_) => ErrorAction::Propagate,
        }
    }

    /// Whether the expiry timer has fired since the last successful refresh.
    pub fn is_expired(&self) -> bool {
        self.inner.lock().expired
    }

    pub fn is_refresh_pending(&self) -> bool {
        self.inner
            .lock()
            .pending
            .as_ref()
            .is_some_and(|pending| pending.peek().is_none())
    }

    /// The refresh token the next refresh will present.
    pub fn current_refresh_token(&self) -> Secret<String> {
        self.inner.lock().refresh_token.clone()
    }

    /// When the current token will be marked expired, if a refresh has
    /// succeeded and the timer has not fired yet.
    pub fn expires_at(&self) -> Option<Instant> {
        let state = self.inner.lock();
        if state.expired {
            return None;
        }
        state.timer.as_ref().map(ExpiryTimer::deadline)
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the pending refresh and whether this call started it.
    fn pending_or_start(self: &Arc<Self>) -> (PendingRefresh, bool) {
        let mut state = self.lock();
        if let Some(pending) = &state.pending {
            return (pending.clone(), false);
        }

        // Read under the lock that publishes the handle, so no other refresh
        // can present this token concurrently
        let presented = state.refresh_token.clone();
        let task = tokio::spawn(Arc::clone(self).run_refresh(presented));
        let pending = async move {
            task.await.unwrap_or_else(|e| {
                Err(oauth_refresh::Error::Request(format!(
                    "refresh task did not complete: {e}"
                )))
            })
        }
        .boxed()
        .shared();

        state.pending = Some(pending.clone());
        (pending, true)
    }

    async fn run_refresh(self: Arc<Self>, presented: Secret<String>) -> RefreshOutcome {
        debug!("requesting new access token");
        // Released on every exit, including a panic in this task
        let slot = PendingSlot(&self);
        let response = AssertUnwindSafe(async { self.client.refresh(presented.expose()).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(oauth_refresh::Error::Request(
                    "authorization client panicked".into(),
                ))
            });

        match response {
            Ok(response) => {
                let result = RefreshResult::from_response(response, presented.expose());
                let rotated = result.refresh_token != *presented.expose();
                self.commit(&result);
                metrics::record_refresh("success");
                info!(
                    expires_in = result.expires_in,
                    rotated, "access token refreshed"
                );

                if let Some(callback) = &self.on_token_update {
                    callbacks::notify_update(callback, &result).await;
                }
                drop(slot);
                Ok(result)
            }
            Err(refresh_error) => {
                warn!(
                    error = %refresh_error,
                    kind = refresh_error.kind(),
                    "token refresh failed"
                );
                metrics::record_refresh(refresh_error.kind());

                if let Some(callback) = &self.on_token_refresh_error {
                    callbacks::notify_error(callback, &refresh_error);
                }
                drop(slot);
                Err(refresh_error)
            }
        }
    }

    /// Install a successful refresh and reschedule the expiry timer.
    fn commit(self: &Arc<Self>, result: &RefreshResult) {
        let weak = Arc::downgrade(self);
        let delay = expiry_delay(result.expires_in);

        let mut state = self.lock();
        state.refresh_token.replace(result.refresh_token.clone());
        state.latest_access_token = Some(Secret::new(result.access_token.clone()));
        state.expired = false;
        state.timer_generation += 1;
        let generation = state.timer_generation;
        // Replacing the handle aborts the previous timer
        state.timer = Some(ExpiryTimer::schedule(delay, move || {
            if let Some(inner) = weak.upgrade() {
                inner.expire(generation);
            }
        }));
    }

    fn expire(&self, generation: u64) {
        let mut state = self.lock();
        if state.timer_generation != generation {
            return;
        }
        state.expired = true;
        // Only a resolved handle is stale; an in-flight refresh stays joinable
        if state
            .pending
            .as_ref()
            .is_some_and(|pending| pending.peek().is_some())
        {
            state.pending = None;
        }
        drop(state);

        metrics::record_expired();
        info!("access token lifetime elapsed, next request refreshes first");
    }

    /// Write the newest access token into the client's live slot.
    fn apply_latest(&self, access_token: &AccessToken) {
        let latest = self.lock().latest_access_token.clone();
        if let Some(token) = latest {
            access_token.set(token.expose());
        }
    }
}

/// Clears the single-flight slot when the refresh task finishes or unwinds.
///
/// While a refresh is in flight no other can start, so the handle in the
/// slot is always the one owned by this task.
struct PendingSlot<'a>(&'a Inner);

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.0.lock().pending = None;
    }
}

fn expiry_delay(expires_in: u64) -> Duration {
    Duration::from_secs(expires_in).saturating_sub(EXPIRY_MARGIN)
}
