//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A variables bundle is missing a required field or carries a malformed one.
    #[error("invalid variables: {field}: {reason}")]
    InvalidVariables {
        /// Dotted path of the offending field (e.g. `applicationSelector.pageSize`).
        field: String,
        /// Human readable reason.
        reason: String,
    },

    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// A subscription payload does not match the expected response shape.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl Error {
    /// Build an `InvalidVariables` error.
    pub fn invalid_variables(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidVariables {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Prefix the field path of an `InvalidVariables` error with a parent name.
    pub fn within(self, parent: &str) -> Self {
        match self {
            Self::InvalidVariables { field, reason } => Self::InvalidVariables {
                field: format!("{}.{}", parent, field),
                reason,
            },
            other => other,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            Error::Deserialization(err.to_string())
        } else {
            Error::Serialization(err.to_string())
        }
    }
}
