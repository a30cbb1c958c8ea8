//! One connection attempt, end to end.
//!
//! [`Session::open`] connects, authenticates and joins the channel, returning
//! only once the session is `Ready`. The caller then drains
//! [`Session::next_event`] until it yields `None`, and collects the outcome
//! with [`Session::finish`].
//!
//! Reading, the keep-alive timer and the stop signal share one
//! `tokio::select!`. Lines are read with `read_until`, which keeps partial
//! input in our buffer if another branch wins, so a timer tick never loses
//! bytes and no event is produced from an incomplete line.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::time::{Instant, sleep_until, timeout, timeout_at};
use tokio_util::sync::CancellationToken;

use crate::credentials::Credentials;
use crate::error::{CloseReason, SessionError, SessionResult};
use crate::event::ProtocolEvent;
use crate::irc::Command;
use crate::liveness::{LivenessAction, LivenessMonitor, PROBE_TOKEN, deadline_after};
use crate::state::{InvalidTransition, SessionState, StateMachine};
use crate::transport::{BoxedStream, Connector};

/// Timeouts and keep-alive tunables for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub connect_timeout: Duration,
    /// Bound on each handshake stage (auth ack, join ack).
    pub handshake_timeout: Duration,
    pub write_timeout: Duration,
    /// Quiet time before we send our own PING.
    pub keepalive_interval: Duration,
    /// How long a probe may go unanswered.
    pub keepalive_deadline: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(60),
            keepalive_deadline: Duration::from_secs(120),
        }
    }
}

impl SessionConfig {
    /// Set the probe interval; the deadline follows at twice the interval.
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self.keepalive_deadline = interval.saturating_mul(2);
        self
    }
}

/// Longest inbound line we buffer before giving up on the peer.
pub const MAX_LINE_BYTES: usize = 8192;

// NOTICE texts the platform uses to reject a login.
const AUTH_REJECTIONS: &[&str] = &[
    "login authentication failed",
    "login unsuccessful",
    "improperly formatted auth",
    "invalid nick",
];

// NOTICE texts that mean the channel cannot be joined.
const JOIN_REJECTIONS: &[&str] = &["does not exist", "has been suspended"];

fn is_auth_rejection(text: &str) -> bool {
    let text = text.to_lowercase();
    AUTH_REJECTIONS.iter().any(|needle| text.contains(needle))
}

fn is_join_rejection(text: &str) -> bool {
    let text = text.to_lowercase();
    JOIN_REJECTIONS.iter().any(|needle| text.contains(needle))
}

/// Numeric join refusals, and whether each is worth retrying.
fn join_refusal(code: u16) -> Option<bool> {
    match code {
        // ERR_UNAVAILRESOURCE, ERR_CHANNELISFULL
        437 | 471 => Some(true),
        // NOSUCHCHANNEL, TOOMANYCHANNELS, INVITEONLY, BANNED, BADKEY, BADCHANMASK
        403 | 405 | 473 | 474 | 475 | 476 => Some(false),
        _ => None,
    }
}

fn oversized_line() -> SessionError {
    SessionError::Protocol(format!("inbound line longer than {MAX_LINE_BYTES} bytes"))
}

impl From<InvalidTransition> for SessionError {
    fn from(err: InvalidTransition) -> Self {
        SessionError::Protocol(err.to_string())
    }
}

struct Connection {
    reader: BufReader<ReadHalf<BoxedStream>>,
    writer: WriteHalf<BoxedStream>,
}

enum Step {
    Stop,
    Read(std::io::Result<usize>),
    Tick,
}

pub struct Session {
    credentials: Arc<Credentials>,
    config: SessionConfig,
    conn: Option<Connection>,
    machine: StateMachine,
    liveness: LivenessMonitor,
    line_buf: Vec<u8>,
    /// Events that arrived during the handshake, delivered after Ready.
    pending: VecDeque<ProtocolEvent>,
    stop: CancellationToken,
}

impl Session {
    /// Connect, authenticate and join. On failure the connection has already
    /// been closed and the error says why.
    pub async fn open<C: Connector>(
        connector: &C,
        credentials: Arc<Credentials>,
        config: &SessionConfig,
        stop: CancellationToken,
    ) -> Result<Session, SessionError> {
        let mut machine = StateMachine::new();
        tracing::info!(server = %connector.describe(), "Connecting");

        let conn = match timeout(config.connect_timeout, connector.connect()).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                machine.close(e.clone().into());
                return Err(e);
            }
            Err(_) => {
                let e = SessionError::Transport(format!(
                    "connect timed out after {:?}",
                    config.connect_timeout
                ));
                machine.close(e.clone().into());
                return Err(e);
            }
        };
        tracing::debug!(kind = conn.kind(), "Transport established");

        let (reader, writer) = tokio::io::split(conn.into_stream());
        let mut session = Session {
            credentials,
            config: config.clone(),
            conn: Some(Connection {
                reader: BufReader::new(reader),
                writer,
            }),
            machine,
            liveness: LivenessMonitor::new(
                config.keepalive_interval,
                config.keepalive_deadline,
                Instant::now(),
            ),
            line_buf: Vec::with_capacity(512),
            pending: VecDeque::new(),
            stop,
        };

        match session.handshake().await {
            Ok(()) => Ok(session),
            Err(e) => {
                session.close_with(e.clone().into()).await;
                Err(e)
            }
        }
    }

    async fn handshake(&mut self) -> Result<(), SessionError> {
        self.machine.advance(SessionState::Authenticating)?;
        let nick = self.credentials.nick().to_string();
        let channel = self.credentials.channel_target();
        self.send(&Command::Pass(self.credentials.token().to_string()))
            .await?;
        self.send(&Command::Nick(nick.clone())).await?;

        let deadline = deadline_after(Instant::now(), self.config.handshake_timeout);
        loop {
            match self.handshake_event(deadline, "authentication").await? {
                ProtocolEvent::Welcome { .. } => break,
                ProtocolEvent::Notice(text) if is_auth_rejection(&text) => {
                    return Err(SessionError::Auth(text));
                }
                // ERR_PASSWDMISMATCH
                ProtocolEvent::Reply { code: 464, params } => {
                    let text = params.last().cloned().unwrap_or_default();
                    return Err(SessionError::Auth(text));
                }
                other => self.hold(other),
            }
        }
        tracing::info!(%nick, "Authenticated");

        self.machine.advance(SessionState::Joining)?;
        self.send(&Command::Join(channel.clone())).await?;

        let deadline = deadline_after(Instant::now(), self.config.handshake_timeout);
        loop {
            match self.handshake_event(deadline, "join").await? {
                ProtocolEvent::Join {
                    channel: joined,
                    actor,
                } if joined.eq_ignore_ascii_case(&channel) && actor.eq_ignore_ascii_case(&nick) => {
                    break;
                }
                // RPL_ENDOFNAMES for our channel also means we are in.
                ProtocolEvent::Reply { code: 366, params }
                    if params.get(1).is_some_and(|c| c.eq_ignore_ascii_case(&channel)) =>
                {
                    break;
                }
                ProtocolEvent::Reply { code, params }
                    if params.get(1).is_some_and(|c| c.eq_ignore_ascii_case(&channel))
                        && join_refusal(code).is_some() =>
                {
                    return Err(SessionError::Join {
                        channel,
                        reason: format!("{code} {}", params.last().cloned().unwrap_or_default()),
                        transient: join_refusal(code).unwrap_or(false),
                    });
                }
                ProtocolEvent::Notice(text) if is_join_rejection(&text) => {
                    return Err(SessionError::Join {
                        channel,
                        reason: text,
                        transient: false,
                    });
                }
                other => self.hold(other),
            }
        }

        self.machine.advance(SessionState::Ready)?;
        self.liveness.record_activity(Instant::now());
        tracing::info!(%channel, "Joined channel, session ready");
        Ok(())
    }

    /// Read the next handshake line, answering PINGs on the way.
    async fn handshake_event(
        &mut self,
        deadline: Instant,
        stage: &str,
    ) -> Result<ProtocolEvent, SessionError> {
        loop {
            let line = match timeout_at(deadline, self.read_line()).await {
                Ok(Ok(Some(line))) => line,
                Ok(Ok(None)) => {
                    return Err(SessionError::Transport(format!(
                        "connection closed during {stage}"
                    )));
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(SessionError::Protocol(format!(
                        "no {stage} acknowledgement within {:?}",
                        self.config.handshake_timeout
                    )));
                }
            };
            self.liveness.record_activity(Instant::now());

            match ProtocolEvent::decode(&line) {
                ProtocolEvent::Ping(token) => self.send(&Command::Pong(token)).await?,
                ProtocolEvent::Reconnect => {
                    return Err(SessionError::Transport(format!(
                        "server requested reconnect during {stage}"
                    )));
                }
                event => return Ok(event),
            }
        }
    }

    fn hold(&mut self, event: ProtocolEvent) {
        tracing::trace!(?event, "holding event until ready");
        self.pending.push_back(event);
    }

    /// Read one complete line. `Ok(None)` on end of stream; a trailing
    /// fragment without a newline is discarded.
    async fn read_line(&mut self) -> Result<Option<String>, SessionError> {
        loop {
            let room = self.line_room();
            let Some(conn) = self.conn.as_mut() else {
                return Ok(None);
            };
            let n = (&mut conn.reader)
                .take(room)
                .read_until(b'\n', &mut self.line_buf)
                .await?;
            if !self.line_buf.ends_with(b"\n") && self.line_buf.len() >= MAX_LINE_BYTES {
                self.line_buf.clear();
                return Err(oversized_line());
            }
            if n == 0 || !self.line_buf.ends_with(b"\n") {
                if !self.line_buf.is_empty() {
                    tracing::debug!(bytes = self.line_buf.len(), "discarding partial line at EOF");
                    self.line_buf.clear();
                }
                return Ok(None);
            }
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }
        }
    }

    /// Bytes the current line may still grow by.
    fn line_room(&self) -> u64 {
        MAX_LINE_BYTES.saturating_sub(self.line_buf.len()) as u64
    }

    /// Take the buffered line, or `None` if it was blank.
    fn take_line(&mut self) -> Option<String> {
        let line = String::from_utf8_lossy(&self.line_buf)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        self.line_buf.clear();
        tracing::trace!(%line, "recv");
        (!line.is_empty()).then_some(line)
    }

    /// Next inbound event, in wire order. `None` once the session has closed;
    /// the reason is then available from [`finish`](Self::finish).
    ///
    /// A server PING is answered before its event is returned.
    pub async fn next_event(&mut self) -> Option<ProtocolEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        if *self.machine.state() != SessionState::Ready {
            return None;
        }

        loop {
            let wakeup = self.liveness.next_wakeup();
            let room = self.line_room();
            let conn = self.conn.as_mut()?;
            // `Take` holds no buffer of its own, so a lost race keeps every
            // byte in `line_buf`.
            let mut limited = (&mut conn.reader).take(room);
            let step = tokio::select! {
                biased;
                _ = self.stop.cancelled() => Step::Stop,
                res = limited.read_until(b'\n', &mut self.line_buf) => Step::Read(res),
                _ = sleep_until(wakeup) => Step::Tick,
            };

            match step {
                Step::Stop => {
                    self.close_with(CloseReason::Stopped).await;
                    return None;
                }
                Step::Read(Err(e)) => {
                    self.close_with(SessionError::from(e).into()).await;
                    return None;
                }
                Step::Read(Ok(_)) if self.line_buf.len() >= MAX_LINE_BYTES
                    && !self.line_buf.ends_with(b"\n") =>
                {
                    self.line_buf.clear();
                    self.close_with(oversized_line().into()).await;
                    return None;
                }
                Step::Read(Ok(n)) => {
                    if n == 0 || !self.line_buf.ends_with(b"\n") {
                        let reason = if self.line_buf.is_empty() {
                            "connection closed by server"
                        } else {
                            "connection closed mid-line"
                        };
                        self.line_buf.clear();
                        self.close_with(SessionError::Transport(reason.to_string()).into())
                            .await;
                        return None;
                    }
                    self.liveness.record_activity(Instant::now());
                    let Some(line) = self.take_line() else {
                        continue;
                    };

                    let event = ProtocolEvent::decode(&line);
                    match &event {
                        ProtocolEvent::Ping(token) => {
                            if let Err(e) = self.send(&Command::Pong(token.clone())).await {
                                self.close_with(e.into()).await;
                                return None;
                            }
                        }
                        ProtocolEvent::Reconnect => {
                            tracing::info!("Server requested reconnect");
                            self.close_with(CloseReason::ServerRequested).await;
                        }
                        _ => {}
                    }
                    return Some(event);
                }
                Step::Tick => match self.liveness.poll(Instant::now()) {
                    LivenessAction::Idle => {}
                    LivenessAction::Probe => {
                        tracing::debug!("Line quiet, sending keep-alive probe");
                        if let Err(e) = self.send(&Command::Ping(PROBE_TOKEN.to_string())).await {
                            self.close_with(e.into()).await;
                            return None;
                        }
                        self.liveness.probe_sent(Instant::now());
                    }
                    LivenessAction::TimedOut(silent) => {
                        tracing::warn!(silent_secs = silent.as_secs(), "Keep-alive probe unanswered");
                        self.close_with(SessionError::LivenessTimeout(silent).into())
                            .await;
                        return None;
                    }
                },
            }
        }
    }

    /// Write one command line. Fails with `Transport` if the session is
    /// closed, the write errors, or it does not complete in time.
    pub async fn send(&mut self, command: &Command) -> Result<(), SessionError> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(SessionError::Transport("session is closed".to_string()));
        };
        let mut line = command.encode();
        line.push_str("\r\n");

        let write = async {
            conn.writer.write_all(line.as_bytes()).await?;
            conn.writer.flush().await
        };
        match timeout(self.config.write_timeout, write).await {
            Ok(Ok(())) => {
                tracing::debug!(%command, "send");
                Ok(())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(SessionError::Transport(format!(
                "write timed out after {:?}",
                self.config.write_timeout
            ))),
        }
    }

    /// Send a chat line to the joined channel.
    pub async fn say(&mut self, text: &str) -> Result<(), SessionError> {
        self.send(&Command::Privmsg {
            channel: self.credentials.channel().to_string(),
            text: text.to_string(),
        })
        .await
    }

    /// Controller-requested stop. Idempotent.
    pub async fn close(&mut self) {
        self.close_with(CloseReason::Stopped).await;
    }

    /// Tear down the connection. A Ready session enters `Closing` while the
    /// handle is still open and reaches `Closed` only once it is dropped.
    async fn close_with(&mut self, reason: CloseReason) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        if *self.machine.state() == SessionState::Ready {
            if let Err(e) = self.machine.advance(SessionState::Closing) {
                tracing::debug!(error = %e, "closing from unexpected state");
            }
            if reason == CloseReason::Stopped {
                let quit = format!("{}\r\n", Command::Quit(None).encode());
                let _ =
                    timeout(Duration::from_secs(1), conn.writer.write_all(quit.as_bytes())).await;
            }
        }
        let _ = timeout(Duration::from_secs(1), conn.writer.shutdown()).await;
        drop(conn);

        match &reason {
            CloseReason::Failed(e) => tracing::warn!(error = %e, "Session closed"),
            other => tracing::info!(reason = %other, "Session closed"),
        }
        self.machine.close(reason);
    }

    /// Close (if still open) and report the outcome.
    pub async fn finish(mut self) -> SessionResult {
        self.close_with(CloseReason::Stopped).await;
        let reason = match self.machine.state() {
            SessionState::Closed(reason) => reason.clone(),
            _ => CloseReason::Stopped,
        };
        SessionResult {
            reached_ready: self.machine.reached_ready(),
            reason,
        }
    }

    pub fn state(&self) -> &SessionState {
        self.machine.state()
    }

    /// States visited so far, starting at `Connecting`.
    pub fn history(&self) -> &[SessionState] {
        self.machine.history()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_auth_rejections() {
        assert!(is_auth_rejection("Login authentication failed"));
        assert!(is_auth_rejection("Improperly formatted auth"));
        assert!(!is_auth_rejection("Welcome to the chat!"));
    }

    #[test]
    fn recognizes_join_rejections() {
        assert!(is_join_rejection("This channel does not exist or has been suspended."));
        assert!(!is_join_rejection("Now hosting someone"));
    }

    #[test]
    fn classifies_numeric_refusals() {
        assert_eq!(join_refusal(471), Some(true));
        assert_eq!(join_refusal(437), Some(true));
        assert_eq!(join_refusal(403), Some(false));
        assert_eq!(join_refusal(474), Some(false));
        assert_eq!(join_refusal(366), None);
    }

    #[test]
    fn keepalive_deadline_tracks_interval() {
        let config = SessionConfig::default().with_keepalive_interval(Duration::from_secs(30));
        assert_eq!(config.keepalive_deadline, Duration::from_secs(60));

        let config = SessionConfig::default().with_keepalive_interval(Duration::MAX);
        assert_eq!(config.keepalive_deadline, Duration::MAX);
    }
}
