//! Core error types.

use thiserror::Error;

/// Registry and store errors.
#[derive(Debug, Error)]
pub enum Error {
    /// No operation with this name is registered.
    #[error("operation not found: {0}")]
    NotFound(String),

    /// An operation with this name is already registered.
    #[error("operation already registered: {0}")]
    DuplicateOperation(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] confsync_proto::Error),
}
