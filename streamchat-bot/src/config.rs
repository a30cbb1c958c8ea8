//! Bot configuration: TOML file, overridden by flags and environment.
//!
//! The file lives at `<config_dir>/streamchat/bot.toml` unless `--config`
//! names another one. A missing default file is fine (built-in defaults
//! apply); a missing explicit file is an error.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use streamchat_sdk::credentials::CredentialsError;
use streamchat_sdk::transport::{DEFAULT_SERVER, TcpConnector};
use streamchat_sdk::{Credentials, JoinRefusalPolicy, SessionConfig, SupervisorConfig};

pub const DEFAULT_GREETING: &str = "hi";
pub const DEFAULT_LOG_FILE: &str = "streamchat-bot.log";
/// Upper bound for every delay and timeout setting: one day.
pub const MAX_TIMING_SECS: u64 = 86_400;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("can't read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("bad config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Parser, Debug, Default)]
#[command(
    name = "streamchat-bot",
    about = "Greets a live-stream chat channel and answers chat commands"
)]
pub struct Args {
    /// Config file (default: <config_dir>/streamchat/bot.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Chat server address (host:port)
    #[arg(long)]
    pub server: Option<String>,

    /// Connect without TLS (ignored for port 6697)
    #[arg(long)]
    pub no_tls: bool,

    /// Account name
    #[arg(long, env = "STREAMCHAT_NICK")]
    pub nick: Option<String>,

    /// OAuth token, with or without the `oauth:` prefix
    #[arg(long, env = "STREAMCHAT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Channel to join, with or without `#`
    #[arg(long, env = "STREAMCHAT_CHANNEL")]
    pub channel: Option<String>,

    /// Message sent each time the bot joins (empty to stay quiet)
    #[arg(long)]
    pub greeting: Option<String>,

    /// Log file path (empty to disable file logging)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Contents of `bot.toml`. Every field is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server: String,
    pub tls: bool,
    pub nick: Option<String>,
    pub token: Option<String>,
    pub channel: Option<String>,
    pub greeting: String,
    pub command_prefix: String,
    pub join_refusal: JoinRefusalPolicy,
    pub log_file: PathBuf,
    pub reconnect_initial_delay_secs: u64,
    pub reconnect_max_delay_secs: u64,
    pub keepalive_interval_secs: u64,
    pub keepalive_deadline_secs: u64,
    pub handshake_timeout_secs: u64,
    /// Command name (without prefix) to reply text.
    pub replies: BTreeMap<String, String>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            tls: true,
            nick: None,
            token: None,
            channel: None,
            greeting: DEFAULT_GREETING.to_string(),
            command_prefix: "!".to_string(),
            join_refusal: JoinRefusalPolicy::default(),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            reconnect_initial_delay_secs: 5,
            reconnect_max_delay_secs: 300,
            keepalive_interval_secs: 60,
            keepalive_deadline_secs: 120,
            handshake_timeout_secs: 10,
            replies: BTreeMap::new(),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("streamchat")
        .join("bot.toml")
}

impl FileConfig {
    /// Load `path`, or the default location when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::read(path),
            None => {
                let path = default_config_path();
                if path.exists() {
                    Self::read(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Everything the binary needs, validated.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub credentials: Credentials,
    pub connector: TcpConnector,
    pub supervisor: SupervisorConfig,
    pub greeting: String,
    pub command_prefix: String,
    pub replies: BTreeMap<String, String>,
    pub log_file: Option<PathBuf>,
}

impl BotConfig {
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let file = FileConfig::load(args.config.as_deref())?;
        Self::resolve(args, file)
    }

    /// Merge flags over the file and validate the result.
    pub fn resolve(args: &Args, file: FileConfig) -> Result<Self, ConfigError> {
        let nick = args.nick.clone().or(file.nick).unwrap_or_default();
        let token = args.token.clone().or(file.token).unwrap_or_default();
        let channel = args.channel.clone().or(file.channel).unwrap_or_default();
        let credentials = Credentials::new(&nick, &token, &channel)?;

        if file.reconnect_initial_delay_secs == 0 {
            return Err(ConfigError::Invalid(
                "reconnect_initial_delay_secs must be positive".into(),
            ));
        }
        if file.reconnect_max_delay_secs < file.reconnect_initial_delay_secs {
            return Err(ConfigError::Invalid(format!(
                "reconnect_max_delay_secs ({}) is below reconnect_initial_delay_secs ({})",
                file.reconnect_max_delay_secs, file.reconnect_initial_delay_secs
            )));
        }
        if file.keepalive_interval_secs == 0 || file.keepalive_deadline_secs == 0 {
            return Err(ConfigError::Invalid(
                "keep-alive interval and deadline must be positive".into(),
            ));
        }
        if file.handshake_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "handshake_timeout_secs must be positive".into(),
            ));
        }
        for (name, secs) in [
            ("reconnect_initial_delay_secs", file.reconnect_initial_delay_secs),
            ("reconnect_max_delay_secs", file.reconnect_max_delay_secs),
            ("keepalive_interval_secs", file.keepalive_interval_secs),
            ("keepalive_deadline_secs", file.keepalive_deadline_secs),
            ("handshake_timeout_secs", file.handshake_timeout_secs),
        ] {
            if secs > MAX_TIMING_SECS {
                return Err(ConfigError::Invalid(format!(
                    "{name} ({secs}) exceeds {MAX_TIMING_SECS} seconds"
                )));
            }
        }

        let connector = TcpConnector {
            server_addr: args.server.clone().unwrap_or(file.server),
            tls: file.tls && !args.no_tls,
        };

        let supervisor = SupervisorConfig {
            reconnect_initial_delay: Duration::from_secs(file.reconnect_initial_delay_secs),
            reconnect_max_delay: Duration::from_secs(file.reconnect_max_delay_secs),
            join_refusal: file.join_refusal,
            session: SessionConfig {
                handshake_timeout: Duration::from_secs(file.handshake_timeout_secs),
                keepalive_interval: Duration::from_secs(file.keepalive_interval_secs),
                keepalive_deadline: Duration::from_secs(file.keepalive_deadline_secs),
                ..SessionConfig::default()
            },
        };

        let log_file = args.log_file.clone().unwrap_or(file.log_file);
        let replies = file
            .replies
            .into_iter()
            .map(|(command, reply)| (command.to_lowercase(), reply))
            .collect();

        Ok(Self {
            credentials,
            connector,
            supervisor,
            greeting: args.greeting.clone().unwrap_or(file.greeting),
            command_prefix: file.command_prefix,
            replies,
            log_file: (!log_file.as_os_str().is_empty()).then_some(log_file),
        })
    }
}
