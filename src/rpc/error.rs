use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Error;
use crate::rpc::code::{reserved_message, ErrorCode};

/// Error object carried in a response envelope.
///
/// System errors use one of the reserved negative codes together with its
/// fixed message; user errors use any strictly positive code and a message
/// chosen by the called function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

impl RpcError {
    pub fn system(code: ErrorCode, data: Value) -> Result<Self, Error> {
        // Positive codes already fail with `UserGeneratedCode` here.
        code.check()?;

        let message = reserved_message(code).ok_or(Error::UnknownErrorCode(code))?;
        if message.is_empty() {
            return Err(Error::EmptyErrorMessage);
        }

        Ok(Self {
            code,
            message: message.to_string(),
            data,
        })
    }

    /// Builds a system error without data.
    ///
    /// # Panics
    ///
    /// Panics if `code` is not one of the reserved codes.
    pub fn system_or_panic(code: ErrorCode) -> Self {
        match Self::system(code, Value::Null) {
            Ok(err) => err,
            Err(err) => panic!("{err}"),
        }
    }

    /// Builds an error reported by a registered function.
    ///
    /// # Panics
    ///
    /// Panics if `code` is not strictly positive.
    pub fn user(code: i64, message: impl Into<String>, data: Value) -> Self {
        let code = ErrorCode(code);
        if !code.is_generated_by_user() {
            panic!("{}", Error::NotUserGeneratedCode(code));
        }

        Self {
            code,
            message: message.into(),
            data,
        }
    }

    pub fn is_generated_by_user(&self) -> bool {
        self.code.is_generated_by_user()
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RpcError {}
