//! Server side of the protocol
//!
//! The [`Processor`] owns the function registry and the request counters and
//! runs every inbound HTTP request through the pipeline.

pub mod pipeline;
pub mod processor;
pub mod registry;
pub mod transport;

pub use pipeline::Outcome;
pub use processor::Processor;
pub use registry::{check_function_name, FunctionRegistry, RpcFunction, RpcResult};
