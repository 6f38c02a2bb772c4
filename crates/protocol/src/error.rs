//! Protocol error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid device key: {0}")]
    InvalidKey(String),

    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
