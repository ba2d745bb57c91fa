//! CLI error types.

use std::path::PathBuf;

use thiserror::Error;

/// CLI errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// File could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File content is not valid JSON.
    #[error("{path}:{line}: invalid JSON: {source}")]
    Json {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Variables file is not a JSON object.
    #[error("{0}: variables must be a JSON object")]
    NotAnObject(PathBuf),

    /// Client error.
    #[error(transparent)]
    Client(#[from] confsync_client::Error),

    /// Registry error.
    #[error(transparent)]
    Registry(#[from] confsync_core::Error),

    /// Protocol error.
    #[error(transparent)]
    Protocol(#[from] confsync_proto::Error),

    /// The replay channel did not produce what was expected.
    #[error("replay stalled: {0}")]
    Stalled(String),
}
