//! Subscriber setup: console plus an optional log file.
//!
//! `RUST_LOG` overrides the default filter. `STREAMCHAT_LOG_JSON=1` switches
//! the console to JSON lines; the file is always plain text.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

const DEFAULT_FILTER: &str = "streamchat_bot=info,streamchat_sdk=info";

/// Keeps the file writer flushing; drop it last.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

pub fn init(log_file: Option<&Path>) -> LogGuard {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = std::env::var("STREAMCHAT_LOG_JSON").unwrap_or_default() == "1";

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if json {
        layers.push(Box::new(tracing_subscriber::fmt::layer().json().with_target(true)));
    } else {
        layers.push(Box::new(tracing_subscriber::fmt::layer().with_target(true)));
    }

    let mut guard = None;
    let mut file_error = None;
    if let Some(path) = log_file {
        match split_log_path(path) {
            Some((dir, name)) => match std::fs::create_dir_all(&dir) {
                Ok(()) => {
                    let appender = tracing_appender::rolling::never(&dir, name);
                    let (writer, file_guard) = tracing_appender::non_blocking(appender);
                    layers.push(Box::new(
                        tracing_subscriber::fmt::layer()
                            .with_writer(writer)
                            .with_ansi(false)
                            .with_target(true),
                    ));
                    guard = Some(file_guard);
                }
                Err(e) => {
                    file_error = Some(format!("log dir init failed for {}: {e}", dir.display()));
                }
            },
            None => file_error = Some(format!("not a log file path: {}", path.display())),
        }
    }

    layers.push(Box::new(filter));
    Registry::default().with(layers).init();

    if let Some(error) = file_error {
        tracing::warn!("{error}");
    }
    LogGuard { _file: guard }
}

/// Directory and file name for the appender. A bare name goes in the
/// working directory.
fn split_log_path(path: &Path) -> Option<(PathBuf, PathBuf)> {
    let name = PathBuf::from(path.file_name()?);
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Some((dir, name))
}
