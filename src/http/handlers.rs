//! Axum handler for the RPC endpoint
//!
//! The pipeline and the called functions are synchronous, so each request is
//! processed on the blocking pool. A panic escaping the pipeline (containment
//! disabled) is re-raised on the handler task.

use std::{panic, sync::Arc};

use axum::{
    body::to_bytes,
    extract::{Request, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use crate::server::Processor;

/// Largest request body read into memory, matching axum's default body limit.
/// Larger bodies are answered as "Request is not readable".
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

pub async fn rpc_endpoint(State(processor): State<Arc<Processor>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    // Non-POST requests are rejected before decoding; their body is never read.
    let body = if parts.method == Method::POST {
        match to_bytes(body, MAX_BODY_BYTES).await {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(error = %err, limit = MAX_BODY_BYTES, "failed to read request body");
                None
            }
        }
    } else {
        None
    };

    let task = tokio::task::spawn_blocking(move || {
        processor.process(&parts.method, &parts.headers, body.as_deref())
    });

    match task.await {
        Ok(outcome) => outcome.into_response(),
        Err(err) if err.is_panic() => panic::resume_unwind(err.into_panic()),
        Err(err) => {
            error!(error = %err, "rpc pipeline task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
