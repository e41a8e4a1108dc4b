//! Stream connection state machine.

use std::fmt;

use super::RouterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Accepting,
    Replaying,
    Live,
    Closed,
}

impl ConnectionState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepting => "accepting",
            Self::Replaying => "replaying",
            Self::Live => "live",
            Self::Closed => "closed",
        }
    }

    /// Forward-only transitions; any open state may close.
    #[must_use]
    pub fn can_transition(&self, next: ConnectionState) -> bool {
        matches!(
            (self, next),
            (Self::Accepting, Self::Replaying)
                | (Self::Replaying, Self::Live)
                | (Self::Accepting | Self::Replaying | Self::Live, Self::Closed)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current state of one stream.
#[derive(Debug)]
pub struct Lifecycle {
    state: ConnectionState,
}

impl Lifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Accepting,
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn advance(&mut self, next: ConnectionState) -> Result<(), RouterError> {
        if !self.state.can_transition(next) {
            return Err(RouterError::InvalidTransition {
                from: self.state.as_str(),
                to: next.as_str(),
            });
        }
        self.state = next;
        Ok(())
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut lc = Lifecycle::new();
        lc.advance(ConnectionState::Replaying).unwrap();
        lc.advance(ConnectionState::Live).unwrap();
        lc.advance(ConnectionState::Closed).unwrap();
        assert_eq!(lc.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_closed_is_terminal() {
        let mut lc = Lifecycle::new();
        lc.advance(ConnectionState::Closed).unwrap();
        assert!(lc.advance(ConnectionState::Live).is_err());
        assert!(lc.advance(ConnectionState::Closed).is_err());
    }

    #[test]
    fn test_cannot_skip_replay() {
        let mut lc = Lifecycle::new();
        assert!(matches!(
            lc.advance(ConnectionState::Live),
            Err(RouterError::InvalidTransition { from: "accepting", to: "live" })
        ));
    }
}
