//! Request and response values flowing through the pipeline

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::HeaderMap;

/// A fully buffered request, cheap to resend.
///
/// The bearer token is deliberately not part of the request: the dispatcher
/// reads the live `AccessToken` at send time, so a resend after a refresh
/// carries the new token without rebuilding the request.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl OutgoingRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// A fully buffered upstream response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure of one dispatched request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RequestError {
    /// Could not reach upstream or read its response
    #[error("upstream request failed: {0}")]
    Transport(String),

    #[error("upstream request timed out: {0}")]
    Timeout(String),

    /// Upstream answered with a non-success status
    #[error("upstream returned status {}", .0.status)]
    Status(Response),
}

impl RequestError {
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Status(response) => Some(response.status),
            _ => None,
        }
    }

    /// 401 or 403: the presented credential is invalid or expired.
    pub fn is_authorization_failure(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }
}
