use shared_types::{ErrorKind, EventTypeError};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    #[error("unknown event type: {0}")]
    UnknownEventType(#[from] EventTypeError),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("superuser stream requires a valid bearer token")]
    Unauthorized,

    #[error("invalid router configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid lifecycle transition {from} -> {to}")]
    InvalidTransition { from: &'static str, to: &'static str },
}

impl RouterError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedEvent(_) | Self::UnknownEventType(_) | Self::InvalidFilter(_) => ErrorKind::Input,
            Self::Unauthorized => ErrorKind::Policy,
            Self::InvalidConfig(_) | Self::InvalidTransition { .. } => ErrorKind::Fatal,
        }
    }

    /// Label for `hub_events_dropped_total{reason}`.
    #[must_use]
    pub fn drop_reason(&self) -> &'static str {
        match self {
            Self::MalformedEvent(_) => "malformed",
            Self::UnknownEventType(_) => "unknown_type",
            _ => "other",
        }
    }
}
