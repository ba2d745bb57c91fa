//! Client error types.

use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Variables failed validation; nothing was sent to the transport.
    #[error("invalid variables: {field}: {reason}")]
    InvalidVariables { field: String, reason: String },

    /// Unknown operation name.
    #[error("operation not found: {0}")]
    NotFound(String),

    /// Other registry error.
    #[error("registry error: {0}")]
    Registry(#[source] confsync_core::Error),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(confsync_proto::Error),

    /// The listener handle is not attached to any channel.
    #[error("listener is not subscribed")]
    NotSubscribed,

    /// The manager has been shut down.
    #[error("channel manager is shut down")]
    Shutdown,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<confsync_proto::Error> for Error {
    fn from(err: confsync_proto::Error) -> Self {
        match err {
            confsync_proto::Error::InvalidVariables { field, reason } => {
                Error::InvalidVariables { field, reason }
            }
            other => Error::Protocol(other),
        }
    }
}

impl From<confsync_core::Error> for Error {
    fn from(err: confsync_core::Error) -> Self {
        match err {
            confsync_core::Error::NotFound(name) => Error::NotFound(name),
            confsync_core::Error::Protocol(inner) => inner.into(),
            other => Error::Registry(other),
        }
    }
}
