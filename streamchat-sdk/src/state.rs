//! Session lifecycle state machine.
//!
//! ```text
//! Connecting -> Authenticating -> Joining -> Ready -> Closing -> Closed(reason)
//!      \______________\_______________\____________________/
//!                 (failure before Ready goes straight to Closed)
//! ```
//!
//! No state is revisited; a reconnect builds a new machine.

use std::fmt;

use crate::error::CloseReason;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticating,
    Joining,
    Ready,
    Closing,
    Closed(CloseReason),
}

impl SessionState {
    pub fn is_closed(&self) -> bool {
        matches!(self, SessionState::Closed(_))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Connecting => f.write_str("connecting"),
            SessionState::Authenticating => f.write_str("authenticating"),
            SessionState::Joining => f.write_str("joining"),
            SessionState::Ready => f.write_str("ready"),
            SessionState::Closing => f.write_str("closing"),
            SessionState::Closed(reason) => write!(f, "closed ({reason})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid session transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}

#[derive(Debug, Clone)]
pub struct StateMachine {
    state: SessionState,
    history: Vec<SessionState>,
    reached_ready: bool,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self {
            state: SessionState::Connecting,
            history: vec![SessionState::Connecting],
            reached_ready: false,
        }
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Every state visited so far, in order, starting with `Connecting`.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    pub fn reached_ready(&self) -> bool {
        self.reached_ready
    }

    pub fn advance(&mut self, next: SessionState) -> Result<(), InvalidTransition> {
        use SessionState::*;

        let allowed = matches!(
            (&self.state, &next),
            (Connecting, Authenticating)
                | (Authenticating, Joining)
                | (Joining, Ready)
                | (Ready, Closing)
                | (Connecting | Authenticating | Joining | Closing, Closed(_))
        );
        if !allowed {
            return Err(InvalidTransition {
                from: self.state.clone(),
                to: next,
            });
        }

        tracing::debug!(from = %self.state, to = %next, "session state change");
        if next == Ready {
            self.reached_ready = true;
        }
        self.history.push(next.clone());
        self.state = next;
        Ok(())
    }

    /// Move to `Closed(reason)`, passing through `Closing` when the session
    /// was `Ready`. Returns false if already closed.
    pub fn close(&mut self, reason: CloseReason) -> bool {
        if self.state.is_closed() {
            return false;
        }
        if self.state == SessionState::Ready {
            let _ = self.advance(SessionState::Closing);
        }
        self.advance(SessionState::Closed(reason)).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;

    fn ready_machine() -> StateMachine {
        let mut machine = StateMachine::new();
        machine.advance(SessionState::Authenticating).unwrap();
        machine.advance(SessionState::Joining).unwrap();
        machine.advance(SessionState::Ready).unwrap();
        machine
    }

    #[test]
    fn happy_path_reaches_ready() {
        let machine = ready_machine();
        assert_eq!(machine.state(), &SessionState::Ready);
        assert!(machine.reached_ready());
        assert_eq!(machine.history().len(), 4);
    }

    #[test]
    fn cannot_skip_states() {
        let mut machine = StateMachine::new();
        let err = machine.advance(SessionState::Ready).unwrap_err();
        assert_eq!(err.from, SessionState::Connecting);
        assert_eq!(machine.state(), &SessionState::Connecting);
    }

    #[test]
    fn cannot_go_backwards() {
        let mut machine = ready_machine();
        assert!(machine.advance(SessionState::Joining).is_err());
        assert!(machine.advance(SessionState::Ready).is_err());
    }

    #[test]
    fn ready_closes_through_closing() {
        let mut machine = ready_machine();
        let reason = CloseReason::Failed(SessionError::Transport("reset".into()));
        assert!(machine.close(reason.clone()));
        let tail: Vec<_> = machine.history()[3..].to_vec();
        assert_eq!(
            tail,
            vec![
                SessionState::Ready,
                SessionState::Closing,
                SessionState::Closed(reason)
            ]
        );
    }

    #[test]
    fn failure_before_ready_skips_closing() {
        let mut machine = StateMachine::new();
        machine.advance(SessionState::Authenticating).unwrap();
        let reason = CloseReason::Failed(SessionError::Auth("bad token".into()));
        assert!(machine.close(reason.clone()));
        assert_eq!(
            machine.history(),
            &[
                SessionState::Connecting,
                SessionState::Authenticating,
                SessionState::Closed(reason)
            ]
        );
        assert!(!machine.reached_ready());
    }

    #[test]
    fn close_after_closing_does_not_repeat_closing() {
        let mut machine = ready_machine();
        machine.advance(SessionState::Closing).unwrap();
        assert!(machine.close(CloseReason::Stopped));
        assert_eq!(
            &machine.history()[3..],
            &[
                SessionState::Ready,
                SessionState::Closing,
                SessionState::Closed(CloseReason::Stopped)
            ]
        );
    }

    #[test]
    fn close_is_idempotent() {
        let mut machine = ready_machine();
        assert!(machine.close(CloseReason::Stopped));
        assert!(!machine.close(CloseReason::ServerRequested));
        assert_eq!(machine.state(), &SessionState::Closed(CloseReason::Stopped));
        assert!(machine.advance(SessionState::Connecting).is_err());
    }
}
