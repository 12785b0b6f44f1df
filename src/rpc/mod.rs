//! Wire-level types of the M1 protocol
//!
//! Error codes and their reserved messages, the error object, request and
//! response envelopes, and the metadata set exchanged with called functions.

pub mod code;
pub mod envelope;
pub mod error;
pub mod meta;

pub use code::ErrorCode;
pub use envelope::{decode_strict, parse_params, RawResponse, Request, Response, PROTOCOL_NAME};
pub use error::RpcError;
pub use meta::MetaData;
