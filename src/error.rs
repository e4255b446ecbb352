//! Error types for the heartbeat protocol.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the transport security layer.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("ciphertext too short: {0} bytes")]
    Truncated(usize),

    #[error("invalid cipher key or IV length")]
    InvalidKey,

    #[error("ciphertext could not be decrypted")]
    Decrypt,
}

/// Errors raised while resolving or touching managed files.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("managed file id {0:?} must be a non-empty relative path without '..'")]
    InvalidId(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors surfaced by one heartbeat round trip.
#[derive(Debug, Error)]
pub enum HeartbeatError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("server rejected heartbeat: {0}")]
    Protocol(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for HeartbeatError {
    fn from(err: reqwest::Error) -> Self {
        HeartbeatError::Transport(err.to_string())
    }
}

pub type Result<T, E = HeartbeatError> = std::result::Result<T, E>;
