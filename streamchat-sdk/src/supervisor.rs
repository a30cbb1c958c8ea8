//! Keeps one healthy session alive until told to stop.
//!
//! Each attempt builds a fresh [`Session`]. When it ends, the
//! [`SessionResult`] alone decides what happens next: stop, give up with a
//! fatal error, or wait out the backoff delay and try again. There is no
//! attempt limit; the delay ceiling is the only bound.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::backoff::{Backoff, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY};
use crate::credentials::Credentials;
use crate::error::{CloseReason, SessionError, SessionResult};
use crate::event::ProtocolEvent;
use crate::session::{Session, SessionConfig};
use crate::transport::Connector;

/// Reacts to session lifecycle and inbound traffic. Errors are logged and
/// never end the session.
pub trait EventHandler: Send {
    /// Called once each time a session reaches `Ready`.
    fn on_ready(&mut self, session: &mut Session) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Called for every inbound event, in wire order.
    fn handle(
        &mut self,
        event: &ProtocolEvent,
        session: &mut Session,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// What to do when the server refuses the channel join.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JoinRefusalPolicy {
    /// Every refusal is a configuration problem.
    AlwaysFatal,
    /// Retry refusals that look temporary (channel full, resource
    /// unavailable); anything else is fatal.
    #[default]
    RetryTransient,
    /// Treat refusals like any transient failure.
    AlwaysRetry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Stop,
    Retry,
    Fatal(SessionError),
}

impl JoinRefusalPolicy {
    /// Decide the supervisor's next move from how a session ended.
    pub fn disposition(self, reason: &CloseReason) -> Disposition {
        match reason {
            CloseReason::Stopped => Disposition::Stop,
            CloseReason::ServerRequested => Disposition::Retry,
            CloseReason::Failed(err @ SessionError::Auth(_)) => Disposition::Fatal(err.clone()),
            CloseReason::Failed(err @ SessionError::Join { transient, .. }) => match self {
                JoinRefusalPolicy::AlwaysFatal => Disposition::Fatal(err.clone()),
                JoinRefusalPolicy::RetryTransient if !transient => Disposition::Fatal(err.clone()),
                _ => Disposition::Retry,
            },
            CloseReason::Failed(_) => Disposition::Retry,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub reconnect_initial_delay: Duration,
    pub reconnect_max_delay: Duration,
    pub join_refusal: JoinRefusalPolicy,
    pub session: SessionConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            reconnect_initial_delay: DEFAULT_INITIAL_DELAY,
            reconnect_max_delay: DEFAULT_MAX_DELAY,
            join_refusal: JoinRefusalPolicy::default(),
            session: SessionConfig::default(),
        }
    }
}

pub struct Supervisor<C> {
    connector: C,
    credentials: Arc<Credentials>,
    config: SupervisorConfig,
    backoff: Backoff,
    stop: CancellationToken,
}

impl<C: Connector> Supervisor<C> {
    pub fn new(
        connector: C,
        credentials: Credentials,
        config: SupervisorConfig,
        stop: CancellationToken,
    ) -> Self {
        let backoff = Backoff::new(config.reconnect_initial_delay, config.reconnect_max_delay);
        Self {
            connector,
            credentials: Arc::new(credentials),
            config,
            backoff,
            stop,
        }
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Run sessions until the stop token fires (`Ok`) or a failure that
    /// retrying cannot fix (`Err`).
    pub async fn run<H: EventHandler>(&mut self, handler: &mut H) -> Result<(), SessionError> {
        tracing::info!(
            channel = %self.credentials.channel_target(),
            nick = %self.credentials.nick(),
            "Starting supervisor"
        );

        loop {
            if self.stop.is_cancelled() {
                return Ok(());
            }

            let result = self.run_session(handler).await;
            match self.config.join_refusal.disposition(&result.reason) {
                Disposition::Stop => {
                    tracing::info!("Supervisor stopped");
                    return Ok(());
                }
                Disposition::Fatal(err) => {
                    tracing::error!(error = %err, "Fatal session failure, not retrying");
                    return Err(err);
                }
                Disposition::Retry => {}
            }

            let delay = self.backoff.next_delay();
            tracing::warn!(
                reason = %result.reason,
                reached_ready = result.reached_ready,
                attempt = self.backoff.attempt(),
                delay_secs = delay.as_secs(),
                "Session ended, reconnecting"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.stop.cancelled() => {
                    tracing::info!("Stop requested during reconnect wait");
                    return Ok(());
                }
            }
        }
    }

    async fn run_session<H: EventHandler>(&mut self, handler: &mut H) -> SessionResult {
        let opened = tokio::select! {
            res = Session::open(
                &self.connector,
                self.credentials.clone(),
                &self.config.session,
                self.stop.clone(),
            ) => res,
            _ = self.stop.cancelled() => {
                tracing::info!("Stop requested while connecting");
                return SessionResult {
                    reached_ready: false,
                    reason: CloseReason::Stopped,
                };
            }
        };

        let mut session = match opened {
            Ok(session) => session,
            Err(err) => {
                return SessionResult {
                    reached_ready: false,
                    reason: CloseReason::Failed(err),
                };
            }
        };

        self.backoff.reset();
        if let Err(e) = handler.on_ready(&mut session).await {
            tracing::error!(error = %e, "Ready handler error");
        }

        while let Some(event) = session.next_event().await {
            if let Err(e) = handler.handle(&event, &mut session).await {
                tracing::error!(error = %e, "Handler error");
            }
        }

        session.finish().await
    }
}
