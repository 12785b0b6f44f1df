//! HTTP transport layer for the M1 processor
//!
//! Adapts inbound axum requests into the processor pipeline.

pub mod handlers;
