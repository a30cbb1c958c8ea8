//! Physical connections: TCP, TLS over TCP, and scripted in-memory streams.
//!
//! A [`Connector`] produces one [`EstablishedConnection`] per session
//! attempt. Production uses [`TcpConnector`]; tests hand a
//! `MemoryConnector` (feature `test-util`) pre-made duplex streams and drive
//! the server side themselves.

#[cfg(feature = "test-util")]
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, OnceLock};
#[cfg(feature = "test-util")]
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "test-util")]
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls;

use crate::error::SessionError;

/// Default chat endpoint (TLS).
pub const DEFAULT_SERVER: &str = "irc.chat.twitch.tv:6697";

/// Anything we can speak the line protocol over.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxedStream = Box<dyn AsyncStream>;

/// A connection that finished TCP (and TLS, if any) but has not started the
/// IRC handshake.
pub enum EstablishedConnection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
    Memory(DuplexStream),
}

impl EstablishedConnection {
    pub fn into_stream(self) -> BoxedStream {
        match self {
            EstablishedConnection::Plain(tcp) => Box::new(tcp),
            EstablishedConnection::Tls(tls) => tls,
            EstablishedConnection::Memory(duplex) => Box::new(duplex),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EstablishedConnection::Plain(_) => "plain",
            EstablishedConnection::Tls(_) => "TLS",
            EstablishedConnection::Memory(_) => "memory",
        }
    }
}

/// Opens the transport for one session attempt.
pub trait Connector: Send + Sync {
    fn connect(&self) -> impl Future<Output = Result<EstablishedConnection, SessionError>> + Send;

    /// Human-readable endpoint, for logs.
    fn describe(&self) -> String;
}

/// Connects over TCP, wrapping in TLS when asked (or when the port is 6697).
#[derive(Debug, Clone)]
pub struct TcpConnector {
    /// Server address (host:port).
    pub server_addr: String,
    pub tls: bool,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self {
            server_addr: DEFAULT_SERVER.to_string(),
            tls: true,
        }
    }
}

impl TcpConnector {
    fn use_tls(&self) -> bool {
        self.tls || self.server_addr.ends_with(":6697")
    }
}

impl Connector for TcpConnector {
    async fn connect(&self) -> Result<EstablishedConnection, SessionError> {
        let use_tls = self.use_tls();

        tracing::debug!("Resolving {}...", self.server_addr);
        let tcp = TcpStream::connect(&self.server_addr).await.map_err(|e| {
            SessionError::Transport(format!("TCP connect to {} failed: {e}", self.server_addr))
        })?;
        if let Err(e) = tcp.set_nodelay(true) {
            tracing::debug!(error = %e, "could not disable Nagle");
        }

        if !use_tls {
            return Ok(EstablishedConnection::Plain(tcp));
        }

        let connector = TlsConnector::from(tls_client_config()?);
        let host = self
            .server_addr
            .rsplit_once(':')
            .map(|(host, _)| host)
            .unwrap_or(&self.server_addr);
        let dns_name = rustls::pki_types::ServerName::try_from(host.to_string())
            .map_err(|e| SessionError::Transport(format!("invalid server name {host}: {e}")))?;
        let tls = connector.connect(dns_name, tcp).await.map_err(|e| {
            SessionError::Transport(format!("TLS handshake with {} failed: {e}", self.server_addr))
        })?;
        tracing::debug!("TLS handshake complete");
        Ok(EstablishedConnection::Tls(Box::new(tls)))
    }

    fn describe(&self) -> String {
        let mode = if self.use_tls() { "tls" } else { "plain" };
        format!("{} ({mode})", self.server_addr)
    }
}

#[cfg(feature = "ring")]
fn crypto_provider() -> rustls::crypto::CryptoProvider {
    rustls::crypto::ring::default_provider()
}

#[cfg(all(feature = "aws-lc-rs", not(feature = "ring")))]
fn crypto_provider() -> rustls::crypto::CryptoProvider {
    rustls::crypto::aws_lc_rs::default_provider()
}

#[cfg(not(any(feature = "ring", feature = "aws-lc-rs")))]
compile_error!("streamchat-sdk needs the `ring` or `aws-lc-rs` feature");

/// Client TLS settings, built on first use and shared by every connect.
fn tls_client_config() -> Result<Arc<rustls::ClientConfig>, SessionError> {
    static CONFIG: OnceLock<Arc<rustls::ClientConfig>> = OnceLock::new();
    if let Some(config) = CONFIG.get() {
        return Ok(config.clone());
    }

    let roots = rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = rustls::ClientConfig::builder_with_provider(Arc::new(crypto_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| SessionError::Transport(format!("TLS setup failed: {e}")))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(CONFIG.get_or_init(|| Arc::new(config)).clone())
}

#[cfg(feature = "test-util")]
enum Scripted {
    Stream(DuplexStream),
    Failure(String),
}

/// Hands out pre-arranged outcomes, one per `connect` call, in order.
/// Once the script runs out every attempt fails with a transport error.
#[cfg(feature = "test-util")]
#[derive(Clone, Default)]
pub struct MemoryConnector {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    attempts: Arc<AtomicUsize>,
}

#[cfg(feature = "test-util")]
impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful connection. Returns the server end of the stream.
    pub fn push_stream(&self, buffer: usize) -> DuplexStream {
        let (client, server) = tokio::io::duplex(buffer);
        self.script.lock().push_back(Scripted::Stream(client));
        server
    }

    /// Queue a failed connection attempt.
    pub fn push_failure(&self, reason: impl Into<String>) {
        self.script.lock().push_back(Scripted::Failure(reason.into()));
    }

    /// How many times `connect` has been called.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[cfg(feature = "test-util")]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<EstablishedConnection, SessionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().pop_front();
        match next {
            Some(Scripted::Stream(stream)) => Ok(EstablishedConnection::Memory(stream)),
            Some(Scripted::Failure(reason)) => Err(SessionError::Transport(reason)),
            None => Err(SessionError::Transport("connection refused".to_string())),
        }
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}
