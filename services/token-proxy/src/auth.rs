//! Token refresh wiring
//!
//! Builds the `ApiClient` used for every upstream request, with the refresh
//! coordinator registered as its only plugin. Refresh outcomes feed the
//! token gauges; the coordinator does the logging.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use oauth_refresh::{ClientCredentials, HttpAuthorizationClient};
use pipeline::{AccessToken, ApiClient, ReqwestDispatcher};
use refresh_coordinator::{CallbackError, RefreshCredentials, RefreshResult, TokenRefreshCoordinator};
use tracing::warn;

use crate::config::{OAuthConfig, ProxyConfig};
use crate::metrics;

/// Build the upstream client and the coordinator keeping its token fresh.
///
/// Without an initial access token the coordinator starts expired, so the
/// first request refreshes before it is sent.
pub fn build_client(
    http: reqwest::Client,
    proxy: &ProxyConfig,
    oauth: &OAuthConfig,
) -> Result<(ApiClient, TokenRefreshCoordinator)> {
    let refresh_token = oauth
        .refresh_token
        .as_ref()
        .context("refresh token not configured")?;

    let credentials = match &oauth.client_secret {
        Some(secret) => ClientCredentials::confidential(&oauth.client_id, secret.expose().as_str()),
        None => ClientCredentials::public(&oauth.client_id),
    };
    let authorization =
        HttpAuthorizationClient::new(http.clone(), &oauth.token_endpoint, credentials)
            .with_timeout(Duration::from_secs(oauth.refresh_timeout_secs));

    let access_token = match &oauth.access_token {
        Some(token) => AccessToken::new(token.expose()),
        None => {
            warn!("no initial access token configured, first request will refresh");
            AccessToken::default()
        }
    };

    let coordinator = TokenRefreshCoordinator::builder(
        refresh_token.expose().as_str(),
        RefreshCredentials::Preconfigured(Arc::new(authorization)),
    )
    .start_expired(access_token.is_empty())
    .on_token_update(|result: RefreshResult| async move {
        metrics::record_token_refreshed(result.expires_in);
        Ok::<_, CallbackError>(())
    })
    .on_token_refresh_error(|_| metrics::record_token_refresh_failed())
    .build()
    .context("invalid token refresh configuration")?;

    let dispatcher = ReqwestDispatcher::new(http, Duration::from_secs(proxy.timeout_secs));
    let client = ApiClient::new(Arc::new(dispatcher), access_token)
        .with_plugin(Arc::new(coordinator.clone()));

    Ok((client, coordinator))
}
