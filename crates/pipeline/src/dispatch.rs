//! Transport seam
//!
//! `Dispatcher` sends one request with a bearer token. `ReqwestDispatcher` is
//! the HTTP implementation; non-2xx responses come back as
//! `RequestError::Status` so the pipeline can inspect them.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::debug;

use crate::request::{OutgoingRequest, RequestError, Response};

/// Sends a single request. Implementations must not retry.
pub trait Dispatcher: Send + Sync {
    fn dispatch<'a>(
        &'a self,
        request: &'a OutgoingRequest,
        bearer: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Response, RequestError>> + Send + 'a>>;
}

/// HTTP dispatcher backed by `reqwest`.
#[derive(Clone)]
pub struct ReqwestDispatcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestDispatcher {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

impl Dispatcher for ReqwestDispatcher {
    fn dispatch<'a>(
        &'a self,
        request: &'a OutgoingRequest,
        bearer: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Response, RequestError>> + Send + 'a>> {
        Box::pin(async move {
            let mut builder = self
                .client
                .request(request.method.clone(), &request.url)
                .headers(request.headers.clone())
                .timeout(self.timeout)
                .body(request.body.clone());
            if !bearer.is_empty() {
                builder = builder.bearer_auth(bearer);
            }

            let upstream = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    RequestError::Timeout(e.to_string())
                } else {
                    RequestError::Transport(e.to_string())
                }
            })?;

            let status = upstream.status().as_u16();
            let headers = upstream.headers().clone();
            let body = upstream.bytes().await.map_err(|e| {
                if e.is_timeout() {
                    RequestError::Timeout(e.to_string())
                } else {
                    RequestError::Transport(format!("reading response body: {e}"))
                }
            })?;

            let response = Response {
                status,
                headers,
                body,
            };
            if response.is_success() {
                Ok(response)
            } else {
                debug!(status, url = %request.url, "upstream returned non-success status");
                Err(RequestError::Status(response))
            }
        })
    }
}
