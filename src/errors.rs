use thiserror::Error;

use crate::rpc::code::ErrorCode;

/// Failures of library operations caused by invalid input or API misuse.
///
/// These never travel over the wire. Remote callers only ever see an
/// [`RpcError`](crate::rpc::error::RpcError).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("error code is not set")]
    ZeroErrorCode,
    #[error("user-generated errors use another constructor")]
    UserGeneratedCode(ErrorCode),
    #[error("user-generated errors have special codes")]
    NotUserGeneratedCode(ErrorCode),
    #[error("unknown error code: {0}")]
    UnknownErrorCode(ErrorCode),
    #[error("error message is not set")]
    EmptyErrorMessage,
    #[error("function name is empty")]
    EmptyFunctionName,
    #[error("bad symbol in function name: {0}")]
    BadSymbolInFunctionName(char),
    #[error("duplicate function")]
    DuplicateFunction { name: String },
    #[error("function is not found")]
    FunctionNotFound { name: String },
    #[error("duplicate meta data field: {0}")]
    DuplicateMetaField(String),
    #[error("meta data field is not found: {0}")]
    MetaFieldNotFound(String),
}

impl Error {
    pub fn duplicate_function(name: impl Into<String>) -> Self {
        Self::DuplicateFunction { name: name.into() }
    }

    pub fn function_not_found(name: impl Into<String>) -> Self {
        Self::FunctionNotFound { name: name.into() }
    }
}
