//! OAuth token refresh exchange
//!
//! POSTs `grant_type=refresh_token` to the configured token endpoint and
//! classifies the outcome into the crate's error taxonomy. Confidential
//! clients authenticate with HTTP Basic; public clients send `client_id` in
//! the form body (RFC 6749 section 2.3.1).

use std::time::Duration;

use common::Secret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{MAX_ERROR_BODY_LEN, REFRESH_GRANT_TYPE};
use crate::error::{Error, Result};

/// Response from the token endpoint for a refresh grant.
///
/// `refresh_token` is optional: providers that do not rotate refresh tokens
/// omit it, and the caller keeps presenting the previous one.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires (delta, not absolute)
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// OAuth client identity presented to the token endpoint.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    /// `None` for public clients
    pub client_secret: Option<Secret<String>>,
}

impl ClientCredentials {
    pub fn public(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
        }
    }

    pub fn confidential(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: Some(Secret::new(client_secret.into())),
        }
    }
}

/// Exchange a refresh token for a new access token.
pub async fn refresh_token(
    client: &reqwest::Client,
    token_endpoint: &str,
    credentials: &ClientCredentials,
    refresh: &str,
    timeout: Duration,
) -> Result<TokenResponse> {
    let mut form = vec![
        ("grant_type", REFRESH_GRANT_TYPE),
        ("refresh_token", refresh),
    ];

    let mut request = client.post(token_endpoint).timeout(timeout);
    match &credentials.client_secret {
        Some(secret) => {
            request = request.basic_auth(&credentials.client_id, Some(secret.expose()));
        }
        None => form.push(("client_id", credentials.client_id.as_str())),
    }

    let response = request
        .form(&form)
        .send()
        .await
        .map_err(|e| Error::Request(format!("token endpoint unreachable: {e}")))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::Request(format!("reading token response body: {e}")))?;

    if !status.is_success() {
        return Err(Error::Response {
            status: status.as_u16(),
            body: truncate(body),
        });
    }

    let token = parse_token_response(&body)?;
    debug!(
        expires_in = token.expires_in,
        rotated = token.refresh_token.is_some(),
        "token endpoint returned new access token"
    );
    Ok(token)
}

/// Parse and validate a successful token endpoint body.
pub fn parse_token_response(body: &str) -> Result<TokenResponse> {
    let token: TokenResponse = serde_json::from_str(body)
        .map_err(|e| Error::PartialResponse(format!("invalid token response: {e}")))?;

    if token.access_token.is_empty() {
        return Err(Error::PartialResponse(
            "token response has an empty access_token".into(),
        ));
    }
    if token.refresh_token.as_deref() == Some("") {
        return Err(Error::PartialResponse(
            "token response has an empty refresh_token".into(),
        ));
    }
    Ok(token)
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY_LEN {
        let mut end = MAX_ERROR_BODY_LEN;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}
