//! Error codes of the M1 protocol
//!
//! The integer space is partitioned: zero is invalid, strictly positive codes
//! belong to registered functions, negative codes are reserved for the
//! protocol itself. Only nine negative codes carry a registered message.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub i64);

impl ErrorCode {
    pub const REQUEST_IS_NOT_READABLE: Self = Self(-1);
    pub const INVALID_REQUEST: Self = Self(-2);
    pub const UNSUPPORTED_PROTOCOL: Self = Self(-4);
    pub const UNKNOWN_METHOD: Self = Self(-8);
    pub const INVALID_PARAMETERS: Self = Self(-16);
    pub const INTERNAL_RPC_ERROR: Self = Self(-32);
    pub const RESERVED_FOR_FUTURE_1: Self = Self(-64);
    pub const RESERVED_FOR_FUTURE_2: Self = Self(-128);
    pub const RESERVED_FOR_FUTURE_3: Self = Self(-256);

    pub const RESERVED: [Self; 9] = [
        Self::REQUEST_IS_NOT_READABLE,
        Self::INVALID_REQUEST,
        Self::UNSUPPORTED_PROTOCOL,
        Self::UNKNOWN_METHOD,
        Self::INVALID_PARAMETERS,
        Self::INTERNAL_RPC_ERROR,
        Self::RESERVED_FOR_FUTURE_1,
        Self::RESERVED_FOR_FUTURE_2,
        Self::RESERVED_FOR_FUTURE_3,
    ];

    /// Succeeds only for the reserved negative codes.
    pub fn check(self) -> Result<(), Error> {
        if self.0 == 0 {
            return Err(Error::ZeroErrorCode);
        }

        if self.is_generated_by_user() {
            return Err(Error::UserGeneratedCode(self));
        }

        if reserved_message(self).is_none() {
            return Err(Error::UnknownErrorCode(self));
        }

        Ok(())
    }

    pub fn is_generated_by_user(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ErrorCode {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Fixed message of a reserved code, `None` for every other code.
pub fn reserved_message(code: ErrorCode) -> Option<&'static str> {
    let message = match code {
        ErrorCode::REQUEST_IS_NOT_READABLE => "Request is not readable",
        ErrorCode::INVALID_REQUEST => "Invalid request",
        ErrorCode::UNSUPPORTED_PROTOCOL => "Unsupported protocol",
        ErrorCode::UNKNOWN_METHOD => "Unknown method",
        ErrorCode::INVALID_PARAMETERS => "Invalid parameters",
        ErrorCode::INTERNAL_RPC_ERROR => "Internal RPC error",
        ErrorCode::RESERVED_FOR_FUTURE_1 => "Reserved for future (1)",
        ErrorCode::RESERVED_FOR_FUTURE_2 => "Reserved for future (2)",
        ErrorCode::RESERVED_FOR_FUTURE_3 => "Reserved for future (3)",
        _ => return None,
    };

    Some(message)
}
