//! Error types for the signal store.
//!
//! Get and Set report failures per path inside a successful response;
//! the variants here are what Lock, Unlock and subscription streams return
//! for the request as a whole.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ValueType;

/// Errors returned by store operations and subscription streams.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShadowError {
    #[error("Signal not found: {path}")]
    NotFound { path: String },

    #[error("Signal {path} is locked by another token")]
    LockConflict { path: String },

    #[error("Lock token is unknown or expired")]
    InvalidToken,

    #[error("Type mismatch for {path}: expected {expected}, got {actual}")]
    TypeMismatch {
        path: String,
        expected: ValueType,
        actual: ValueType,
    },

    #[error("Subscriber fell behind; subscription closed")]
    BackpressureExceeded,

    #[error("Subscription closed")]
    SubscriptionClosed,

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Internal error: {reason}")]
    Internal { reason: String },
}

impl ShadowError {
    /// Wire code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ShadowError::NotFound { .. } => ErrorCode::NotFound,
            ShadowError::LockConflict { .. } => ErrorCode::LockConflict,
            ShadowError::InvalidToken => ErrorCode::InvalidToken,
            ShadowError::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            ShadowError::BackpressureExceeded => ErrorCode::BackpressureExceeded,
            ShadowError::SubscriptionClosed => ErrorCode::SubscriptionClosed,
            ShadowError::InvalidRequest { .. } => ErrorCode::InvalidRequest,
            ShadowError::Internal { .. } => ErrorCode::InternalError,
        }
    }

    pub(crate) fn invalid_request(reason: impl Into<String>) -> Self {
        ShadowError::InvalidRequest {
            reason: reason.into(),
        }
    }
}

/// Stable error codes exchanged with clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    LockConflict,
    InvalidToken,
    TypeMismatch,
    BackpressureExceeded,
    SubscriptionClosed,
    InvalidRequest,
    InternalError,
}

pub type ShadowResult<T> = Result<T, ShadowError>;
