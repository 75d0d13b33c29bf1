//! Error types surfaced by stream operations.

use thiserror::Error;

use crate::core::guard::GuardViolation;

#[derive(Debug, Error)]
pub enum StreamError {
    /// A call broke the access contract. Never retried.
    #[error("invalid state: {0}")]
    InvalidState(#[from] GuardViolation),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl StreamError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        StreamError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, StreamError::InvalidState(_))
    }

    pub fn violation(&self) -> Option<GuardViolation> {
        match self {
            StreamError::InvalidState(violation) => Some(*violation),
            StreamError::Io { .. } => None,
        }
    }
}

pub type StreamResult<T> = std::result::Result<T, StreamError>;
