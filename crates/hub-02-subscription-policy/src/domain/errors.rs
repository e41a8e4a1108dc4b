use shared_types::{ErrorKind, EventTypeError};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("invalid rule event type: {0}")]
    InvalidEventType(#[from] EventTypeError),

    #[error("rule store error: {0}")]
    Store(String),
}

impl PolicyError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidEventType(_) => ErrorKind::Input,
            Self::Store(_) => ErrorKind::Resource,
        }
    }
}
