use std::sync::Arc;

use axum::{middleware, routing::any, Router};

pub mod client;
pub mod config;
pub mod errors;
pub mod http;
pub mod logging;
pub mod rpc;
pub mod server;

pub use client::{Client, ClientError, HttpTransport, Reply, ReqwestTransport};
pub use config::{ClientSettings, ConfigError, ProcessorSettings};
pub use errors::Error;
pub use rpc::{parse_params, ErrorCode, MetaData, RpcError};
pub use server::Processor;

/// Router serving the processor at `/`.
pub fn build_app(processor: Arc<Processor>) -> Router {
    build_app_at("/", processor)
}

/// Router serving the processor at `path`. Every HTTP method is routed to the
/// pipeline so that non-POST requests are answered by its transport check.
pub fn build_app_at(path: &str, processor: Arc<Processor>) -> Router {
    Router::new()
        .route(path, any(http::handlers::rpc_endpoint))
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(processor)
}
