//! Client core for IRC-style live-stream chat.
//!
//! Layers, bottom up:
//!
//! - [`irc`] / [`event`]: line parsing, command formatting, event decoding.
//! - [`transport`]: TCP/TLS (or in-memory) connections behind [`transport::Connector`].
//! - [`session`]: one connection attempt, driven through the [`state`] machine.
//! - [`liveness`]: keep-alive probing for a session.
//! - [`supervisor`] / [`backoff`]: reconnect forever with capped exponential delay.
//!
//! ## Reconnection
//!
//! A [`supervisor::Supervisor`] owns the retry loop. Authentication
//! rejections stop it for good; join refusals follow
//! [`supervisor::JoinRefusalPolicy`]; everything else is retried.

pub mod backoff;
pub mod credentials;
pub mod error;
pub mod event;
pub mod irc;
pub mod liveness;
pub mod session;
pub mod state;
pub mod supervisor;
pub mod transport;

pub use credentials::Credentials;
pub use error::{CloseReason, SessionError, SessionResult};
pub use event::ProtocolEvent;
pub use session::{Session, SessionConfig};
pub use supervisor::{EventHandler, JoinRefusalPolicy, Supervisor, SupervisorConfig};
