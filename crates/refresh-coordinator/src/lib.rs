//! Single-flight OAuth token refresh for a request pipeline
//!
//! `TokenRefreshCoordinator` plugs into `pipeline::ApiClient` as a
//! `RequestPlugin` and keeps the client's bearer token fresh:
//!
//! 1. At most one refresh call is in flight; concurrent callers join it
//! 2. A request rejected with 401/403 is resent once with the refreshed token
//! 3. An expiry timer marks the token expired `expires_in - 20s` after each
//!    refresh, so the next request refreshes before it is sent
//!
//! Refresh failures are reported through the `on_token_refresh_error`
//! callback; callers of the wrapped client only ever see their own request's
//! error. Coordination is per process; several processes sharing one
//! rotating refresh token are not supported.

pub mod callbacks;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod plugin;
pub mod timer;

#[cfg(test)]
mod testing;

pub use callbacks::CallbackError;
pub use coordinator::{
    CoordinatorBuilder, EXPIRY_MARGIN, RefreshCredentials, RefreshOutcome, RefreshResult,
    TokenRefreshCoordinator,
};
pub use error::{Error, Result};
