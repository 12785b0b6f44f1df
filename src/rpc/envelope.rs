//! Request and response envelopes of the M1 protocol
//!
//! Request: `{"jsonrpc":"M1","id":"<string>","method":"<string>","params":<any>}`
//!
//! Response: `{"jsonrpc":"M1","id":..,"result":..,"error":..,"meta":{..},"ok":<bool>}`
//! where `meta` is omitted when empty and `ok` mirrors the absence of `error`.

use serde::{
    de::{DeserializeOwned, Error as _},
    Deserialize, Serialize,
};
use serde_json::{value::RawValue, Value};
use tracing::debug;

use crate::rpc::code::ErrorCode;
use crate::rpc::error::RpcError;
use crate::rpc::meta::MetaData;

pub const PROTOCOL_NAME: &str = "M1";

/// Request envelope as it appears on the wire.
///
/// Every field may be missing or null; the server rejects such requests only
/// after decoding so that a parsed `id` can still be echoed back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "jsonrpc")]
    pub protocol_name: Option<String>,
    pub id: Option<String>,
    pub method: Option<String>,
    pub params: Option<Box<RawValue>>,
}

impl Request {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Box<RawValue>) -> Self {
        Self {
            protocol_name: Some(PROTOCOL_NAME.to_string()),
            id: Some(id.into()),
            method: Some(method.into()),
            params: Some(params),
        }
    }

    pub fn has_all_root_fields(&self) -> bool {
        self.protocol_name.is_some()
            && self.id.is_some()
            && self.method.is_some()
            && self.params.is_some()
    }

    pub fn has_supported_protocol(&self) -> bool {
        self.protocol_name.as_deref() == Some(PROTOCOL_NAME)
    }
}

/// Response envelope produced by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "jsonrpc")]
    pub protocol_name: String,
    pub id: Option<String>,
    pub result: Option<Value>,
    pub error: Option<RpcError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<MetaData>,
    pub ok: bool,
}

impl Response {
    pub fn new() -> Self {
        Self {
            protocol_name: PROTOCOL_NAME.to_string(),
            id: None,
            result: None,
            error: None,
            meta: None,
            ok: false,
        }
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

/// Response envelope as decoded by the client; `result` stays undecoded.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawResponse {
    #[serde(rename = "jsonrpc")]
    pub protocol_name: String,
    pub id: Option<String>,
    #[serde(default)]
    pub result: Option<Box<RawValue>>,
    #[serde(default)]
    pub error: Option<RpcError>,
    #[serde(default)]
    pub meta: Option<MetaData>,
    pub ok: bool,
}

/// Decodes JSON text into `T`, failing on any field `T` does not know,
/// at every nesting level.
pub fn decode_strict<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    let mut unknown = Vec::new();
    let mut deserializer = serde_json::Deserializer::from_str(text);
    let value: T = serde_ignored::deserialize(&mut deserializer, |path| {
        unknown.push(path.to_string())
    })?;
    deserializer.end()?;

    match unknown.first() {
        Some(path) => Err(serde_json::Error::custom(format_args!("unknown field `{path}`"))),
        None => Ok(value),
    }
}

/// Decodes the parameters handed to a registered function.
///
/// Missing parameters, unknown fields and other decode failures all map to
/// the reserved "Invalid parameters" error.
pub fn parse_params<T: DeserializeOwned>(params: Option<&RawValue>) -> Result<T, RpcError> {
    let params = params.ok_or_else(invalid_parameters)?;
    decode_strict(params.get()).map_err(|err| {
        debug!(error = %err, "invalid rpc parameters");
        invalid_parameters()
    })
}

fn invalid_parameters() -> RpcError {
    RpcError::system_or_panic(ErrorCode::INVALID_PARAMETERS)
}
