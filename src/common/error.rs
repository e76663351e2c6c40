//! Error types for replikv

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Status codes reported to RPC callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    NotFound,
    Aborted,
    InvalidArgument,
    PermissionDenied,
    Internal,
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Code::NotFound => write!(f, "not_found"),
            Code::Aborted => write!(f, "aborted"),
            Code::InvalidArgument => write!(f, "invalid_argument"),
            Code::PermissionDenied => write!(f, "permission_denied"),
            Code::Internal => write!(f, "internal"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    // === RPC-level errors ===
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Aborted: {0}")]
    Aborted(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Storage Errors ===
    #[error("Corrupted data: {0}")]
    Corrupted(String),

    #[error("WAL error: {0}")]
    Wal(String),

    #[error("Operation not supported by {0} storage")]
    Unsupported(String),

    // === Replication Errors ===
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Replication to {address} failed: {reason}")]
    Replication { address: String, reason: String },

    // === Network Errors ===
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Remote error ({code}): {message}")]
    Remote { code: Code, message: String },

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Serialization ===
    #[error("Serialization error: {0}")]
    Serialization(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Collapse any error onto the status code surfaced to callers.
    pub fn code(&self) -> Code {
        match self {
            Error::NotFound(_) => Code::NotFound,
            Error::Aborted(_) => Code::Aborted,
            Error::InvalidArgument(_) => Code::InvalidArgument,
            Error::PermissionDenied(_) => Code::PermissionDenied,
            Error::Remote { code, .. } => *code,
            _ => Code::Internal,
        }
    }

    /// Is this a transport-level failure worth retrying?
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::ConnectionFailed(_) | Error::Http(_) => true,
            Error::Remote { code, .. } => *code == Code::Internal,
            _ => false,
        }
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        code_to_http_status(self.code())
    }

    /// Rebuild an error from a code received over the wire.
    pub fn from_code(code: Code, message: String) -> Self {
        match code {
            Code::NotFound => Error::NotFound(message),
            Code::Aborted => Error::Aborted(message),
            Code::InvalidArgument => Error::InvalidArgument(message),
            Code::PermissionDenied => Error::PermissionDenied(message),
            Code::Internal => Error::Remote { code, message },
        }
    }
}

pub fn code_to_http_status(code: Code) -> axum::http::StatusCode {
    use axum::http::StatusCode;
    match code {
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::Aborted => StatusCode::CONFLICT,
        Code::InvalidArgument => StatusCode::BAD_REQUEST,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            Error::ConnectionFailed(e.to_string())
        } else {
            Error::Http(e.to_string())
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}
