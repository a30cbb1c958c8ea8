//! streamchat-bot entry point.
//!
//! Exits 0 after Ctrl-C, non-zero on bad configuration or when the server
//! rejects the login.

use anyhow::{Context, Result};
use clap::Parser;
use streamchat_bot::config::{Args, BotConfig};
use streamchat_bot::controller::BotController;
use streamchat_bot::logging;
use streamchat_sdk::Supervisor;
use streamchat_sdk::transport::Connector;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = BotConfig::load(&args).context("Failed to load configuration")?;
    let _log_guard = logging::init(config.log_file.as_deref());

    tracing::info!(
        server = %config.connector.describe(),
        nick = %config.credentials.nick(),
        channel = %config.credentials.channel_target(),
        "Starting streamchat-bot"
    );

    let stop = CancellationToken::new();
    let ctrl_c = stop.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Ctrl-C received, shutting down");
                ctrl_c.cancel();
            }
            Err(e) => tracing::error!(error = %e, "Can't listen for Ctrl-C"),
        }
    });

    let mut controller = BotController::from_config(&config);
    let mut supervisor = Supervisor::new(
        config.connector,
        config.credentials,
        config.supervisor,
        stop,
    );
    supervisor
        .run(&mut controller)
        .await
        .context("Chat session failed permanently")?;

    tracing::info!(greetings = controller.greetings_sent(), "Bot stopped");
    Ok(())
}
