use std::time::Instant;

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_FILTER: &str = "info";

/// Installs a compact subscriber filtered by `RUST_LOG`. Keeps an already
/// installed global subscriber.
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}

pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started_at = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = started_at.elapsed().as_millis();

    info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        duration_ms = elapsed_ms,
        "request summary"
    );

    if let Some(reason) = transport_rejection(status) {
        warn!(method = %method, path = %path, reason, "rpc request rejected");
    }

    response
}

fn transport_rejection(status: StatusCode) -> Option<&'static str> {
    match status {
        StatusCode::METHOD_NOT_ALLOWED => Some("method is not POST"),
        StatusCode::UNSUPPORTED_MEDIA_TYPE => Some("content type is not application/json"),
        StatusCode::NOT_ACCEPTABLE => Some("client does not accept application/json"),
        _ => None,
    }
}
