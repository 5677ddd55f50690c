use std::time::Instant;

use thiserror::Error;

/// Lifecycle of a [`TapoSession`](super::TapoSession).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No handshake attempted yet.
    Uninitialized,
    /// A handshake is in flight; any previous cipher is already gone.
    Handshaking,
    /// A cipher and cookie are live.
    Established { since: Instant },
    /// The last handshake attempt failed.
    Failed(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid session transition: {from} -> {to}")]
pub struct SessionStateError {
    pub from: &'static str,
    pub to: &'static str,
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "Uninitialized",
            SessionState::Handshaking => "Handshaking",
            SessionState::Established { .. } => "Established",
            SessionState::Failed(_) => "Failed",
        }
    }

    /// Validates and applies a transition, consuming the current state.
    ///
    /// `Handshaking -> Handshaking` is allowed: a handshake future dropped
    /// mid-flight leaves `Handshaking` behind and the next attempt restarts.
    pub fn transition(self, next: SessionState) -> Result<SessionState, SessionStateError> {
        let allowed = matches!(
            (&self, &next),
            (
                SessionState::Uninitialized
                    | SessionState::Handshaking
                    | SessionState::Established { .. }
                    | SessionState::Failed(_),
                SessionState::Handshaking
            ) | (
                SessionState::Handshaking,
                SessionState::Established { .. } | SessionState::Failed(_)
            )
        );
        if allowed {
            Ok(next)
        } else {
            Err(SessionStateError {
                from: self.label(),
                to: next.label(),
            })
        }
    }

    pub fn is_established(&self) -> bool {
        matches!(self, SessionState::Established { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_then_establish() {
        let state = SessionState::Uninitialized
            .transition(SessionState::Handshaking)
            .unwrap()
            .transition(SessionState::Established {
                since: Instant::now(),
            })
            .unwrap();
        assert!(state.is_established());
    }

    #[test]
    fn rehandshake_from_established_and_failed() {
        let established = SessionState::Established {
            since: Instant::now(),
        };
        assert!(established.transition(SessionState::Handshaking).is_ok());
        let failed = SessionState::Failed("handshake1 rejected".into());
        assert!(failed.transition(SessionState::Handshaking).is_ok());
    }

    #[test]
    fn cannot_skip_handshake() {
        let err = SessionState::Uninitialized
            .transition(SessionState::Established {
                since: Instant::now(),
            })
            .unwrap_err();
        assert_eq!(err.from, "Uninitialized");
        assert_eq!(err.to, "Established");
        assert!(SessionState::Established {
            since: Instant::now()
        }
        .transition(SessionState::Failed("x".into()))
        .is_err());
    }

    #[test]
    fn abandoned_handshake_can_restart() {
        assert_eq!(
            SessionState::Handshaking.transition(SessionState::Handshaking),
            Ok(SessionState::Handshaking)
        );
    }
}
