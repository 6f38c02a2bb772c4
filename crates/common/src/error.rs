//! Common error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("platform error: {0}")]
    Platform(String),

    /// Unexpected access-control failure outside the normal permission
    /// check path. The only condition surfaced to callers as a distinct
    /// call-level error.
    #[error("security fault: {0}")]
    Security(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
