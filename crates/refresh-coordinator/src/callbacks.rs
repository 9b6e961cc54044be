//! User-supplied refresh callbacks

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::error;

use crate::coordinator::RefreshResult;

/// Error type returned by a failing `on_token_update` callback.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

pub(crate) type TokenUpdateFn =
    Arc<dyn Fn(RefreshResult) -> BoxFuture<'static, Result<(), CallbackError>> + Send + Sync>;

pub(crate) type RefreshErrorFn = Arc<dyn Fn(&oauth_refresh::Error) + Send + Sync>;

/// Box an async closure into a `TokenUpdateFn`.
pub(crate) fn token_update_fn<F, Fut>(callback: F) -> TokenUpdateFn
where
    F: Fn(RefreshResult) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), CallbackError>> + Send + 'static,
{
    Arc::new(move |result| callback(result).boxed())
}

/// Run the update callback to completion.
///
/// A failure or panic is logged and otherwise ignored: the refresh already
/// succeeded and the single-flight slot must still be released.
pub(crate) async fn notify_update(callback: &TokenUpdateFn, result: &RefreshResult) {
    let outcome = AssertUnwindSafe(async { callback(result.clone()).await })
        .catch_unwind()
        .await;
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "on_token_update callback failed"),
        Err(_) => error!("on_token_update callback panicked"),
    }
}

/// Report a refresh failure. A panicking callback is logged and contained.
pub(crate) fn notify_error(callback: &RefreshErrorFn, refresh_error: &oauth_refresh::Error) {
    if std::panic::catch_unwind(AssertUnwindSafe(|| callback(refresh_error))).is_err() {
        error!("on_token_refresh_error callback panicked");
    }
}
