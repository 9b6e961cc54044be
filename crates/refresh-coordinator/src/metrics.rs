//! Refresh metrics
//!
//! - `token_refresh_total` (counter): label `outcome`
//!   (`success`, `transport`, `rejected`, `malformed`)
//! - `token_refresh_joined_total` (counter): callers that joined an
//!   in-flight refresh instead of starting one
//! - `token_expired_total` (counter): expiry timer firings
//! - `request_auth_retries_total` (counter): requests resent after a refresh

/// Record the outcome of one refresh call.
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("token_refresh_total", "outcome" => outcome).increment(1);
}

pub fn record_joined() {
    metrics::counter!("token_refresh_joined_total").increment(1);
}

pub fn record_expired() {
    metrics::counter!("token_expired_total").increment(1);
}

pub fn record_auth_retry() {
    metrics::counter!("request_auth_retries_total").increment(1);
}
