//! Session failure taxonomy and the result a finished session reports.

use std::fmt;
use std::time::Duration;

/// Why a session attempt failed. Everything the transport or the codec can
/// throw is folded into one of these at the session boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Socket-level failure: refused, reset, EOF, write error, TLS failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server explicitly rejected our credentials.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// The server refused to let us into the channel.
    #[error("join of {channel} refused: {reason}")]
    Join {
        channel: String,
        reason: String,
        /// The refusal looks like a temporary server-side condition.
        transient: bool,
    },

    /// Nothing arrived for this long, including after a keep-alive probe.
    #[error("no inbound traffic for {0:?} after keep-alive probe")]
    LivenessTimeout(Duration),

    /// Malformed or missing handshake response.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::Transport(err.to_string())
    }
}

/// Why a session reached `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The operator (or the controller) asked us to stop.
    Stopped,
    /// The server sent RECONNECT.
    ServerRequested,
    Failed(SessionError),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Stopped => f.write_str("stopped"),
            CloseReason::ServerRequested => f.write_str("server requested reconnect"),
            CloseReason::Failed(err) => write!(f, "{err}"),
        }
    }
}

impl From<SessionError> for CloseReason {
    fn from(err: SessionError) -> Self {
        CloseReason::Failed(err)
    }
}

/// Outcome of one session attempt, as seen by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionResult {
    pub reached_ready: bool,
    pub reason: CloseReason,
}
