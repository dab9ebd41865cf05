//! Request tracing middleware

use std::time::Instant;

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Log each request with timing under a span carrying its request id.
/// Incoming `x-request-id` values are reused, otherwise one is generated,
/// and the id is echoed on the response.
pub async fn request_tracing(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|s| !s.is_empty() && s.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let span = tracing::info_span!("request", request_id = %request_id);

    async move {
        let start = Instant::now();
        tracing::debug!(method = %method, path = %path, "Request started");

        let mut response = next.run(request).await;

        let status = response.status().as_u16();
        let duration_ms = start.elapsed().as_millis() as u64;
        if response.status().is_server_error() {
            tracing::error!(method = %method, path = %path, status, duration_ms, "Request failed");
        } else if response.status().is_client_error() {
            tracing::warn!(method = %method, path = %path, status, duration_ms, "Request rejected");
        } else {
            tracing::info!(method = %method, path = %path, status, duration_ms, "Request completed");
        }

        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }
    .instrument(span)
    .await
}
