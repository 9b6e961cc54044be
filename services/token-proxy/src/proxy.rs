//! HTTP proxy logic
//!
//! Receives inbound requests, strips hop-by-hop headers and any client
//! credentials, and forwards them upstream through the `ApiClient` so the
//! refresh coordinator attaches a fresh bearer token. Upstream responses,
//! including error statuses, are returned verbatim.

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use pipeline::{ApiClient, OutgoingRequest, RequestError};
use tracing::{error, instrument, warn};

use crate::metrics::{self, ServiceMetrics};

/// Inbound request bodies are buffered up to this size
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Headers to strip before forwarding (hop-by-hop per RFC 2616 Section 13.5.1)
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Replaced by the proxy's own values
const CLIENT_ONLY_HEADERS: &[&str] = &["authorization", "host"];

/// Shared state passed to the proxy handler via axum State extractor
#[derive(Clone)]
pub struct ProxyState {
    pub client: ApiClient,
    pub upstream_url: String,
    pub timeout: Duration,
    pub metrics: ServiceMetrics,
}

/// JSON error body: {"error":{"type":"proxy_error","message":"...","request_id":"req_..."}}
fn error_response(status: StatusCode, message: &str, request_id: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": "proxy_error",
            "message": message,
            "request_id": request_id,
        }
    });
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Proxy an inbound request to upstream with a managed bearer token.
#[instrument(skip_all, fields(request_id = %request_id, method = %request.method(), path = %request.uri().path()))]
pub async fn proxy_request(
    state: &ProxyState,
    request: axum::http::Request<axum::body::Body>,
    request_id: String,
) -> Response {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    let _in_flight = state.metrics.track_in_flight();
    let started = Instant::now();
    let method = request.method().clone();

    let response = forward(state, request, &request_id).await;

    let status = response.status().as_u16();
    metrics::record_request(status, method.as_str(), started.elapsed().as_secs_f64());
    response
}

async fn forward(
    state: &ProxyState,
    request: axum::http::Request<axum::body::Body>,
    request_id: &str,
) -> Response {
    let (parts, body) = request.into_parts();

    let upstream_url = match parts.uri.path_and_query() {
        Some(pq) => format!("{}{}", state.upstream_url.trim_end_matches('/'), pq),
        None => state.upstream_url.clone(),
    };

    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            state.metrics.errors_total.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, "failed to read request body");
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("invalid request body: {e}"),
                request_id,
            );
        }
    };

    let mut outgoing = OutgoingRequest::new(parts.method, upstream_url).with_body(body);
    outgoing.headers = forwardable_headers(&parts.headers);

    match state.client.send(outgoing).await {
        Ok(upstream) | Err(RequestError::Status(upstream)) => {
            let mut response = Response::builder().status(upstream.status);
            for (name, value) in &upstream.headers {
                if !is_hop_by_hop(name.as_str()) {
                    response = response.header(name, value);
                }
            }
            response
                .body(axum::body::Body::from(upstream.body))
                .unwrap_or_else(|e| {
                    error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        &format!("response build error: {e}"),
                        request_id,
                    )
                })
        }
        Err(RequestError::Timeout(e)) => {
            state.metrics.errors_total.fetch_add(1, Ordering::Relaxed);
            metrics::record_upstream_error("timeout");
            error!(error = %e, "upstream timeout");
            error_response(
                StatusCode::GATEWAY_TIMEOUT,
                &format!("upstream timeout after {}s", state.timeout.as_secs()),
                request_id,
            )
        }
        Err(RequestError::Transport(e)) => {
            state.metrics.errors_total.fetch_add(1, Ordering::Relaxed);
            metrics::record_upstream_error("connection");
            error!(error = %e, "upstream request failed");
            error_response(
                StatusCode::BAD_GATEWAY,
                &format!("upstream error: {e}"),
                request_id,
            )
        }
    }
}

fn forwardable_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in inbound {
        let name_str = name.as_str();
        if !is_hop_by_hop(name_str) && !is_client_only(name_str) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

/// Check if a header is hop-by-hop (should be stripped before forwarding)
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

fn is_client_only(name: &str) -> bool {
    CLIENT_ONLY_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}
