//! The bot's behaviour: greet on join, answer chat commands.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use streamchat_sdk::{EventHandler, ProtocolEvent, Session};

use crate::config::BotConfig;

/// Owned bot state, built once per process and reused across sessions.
pub struct BotController {
    greeting: String,
    command_prefix: String,
    replies: BTreeMap<String, String>,
    greetings_sent: usize,
}

impl BotController {
    pub fn new(
        greeting: impl Into<String>,
        command_prefix: impl Into<String>,
        replies: BTreeMap<String, String>,
    ) -> Self {
        Self {
            greeting: greeting.into(),
            command_prefix: command_prefix.into(),
            replies,
            greetings_sent: 0,
        }
    }

    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(
            config.greeting.clone(),
            config.command_prefix.clone(),
            config.replies.clone(),
        )
    }

    pub fn greetings_sent(&self) -> usize {
        self.greetings_sent
    }

    /// The configured reply for a chat line like `!ping extra words`.
    /// Command names match case-insensitively.
    pub fn reply_for(&self, text: &str) -> Option<&str> {
        let rest = text.trim_start().strip_prefix(self.command_prefix.as_str())?;
        let command = rest.split_whitespace().next()?;
        self.replies
            .get(&command.to_lowercase())
            .map(String::as_str)
    }
}

impl EventHandler for BotController {
    async fn on_ready(&mut self, session: &mut Session) -> Result<()> {
        if self.greeting.is_empty() {
            return Ok(());
        }
        session
            .say(&self.greeting)
            .await
            .context("sending greeting")?;
        self.greetings_sent += 1;
        tracing::info!(
            channel = %session.credentials().channel_target(),
            greeting = %self.greeting,
            "Greeted channel"
        );
        Ok(())
    }

    async fn handle(&mut self, event: &ProtocolEvent, session: &mut Session) -> Result<()> {
        match event {
            ProtocolEvent::ChatMessage {
                channel,
                actor,
                text,
            } => {
                tracing::debug!(%channel, %actor, %text, "chat");
                // Ignore our own messages
                if actor.eq_ignore_ascii_case(session.credentials().nick()) {
                    return Ok(());
                }
                if let Some(reply) = self.reply_for(text) {
                    session
                        .say(reply)
                        .await
                        .with_context(|| format!("replying to {actor}"))?;
                }
            }
            ProtocolEvent::Notice(text) => tracing::info!(%text, "Server notice"),
            ProtocolEvent::Join { channel, actor } => {
                tracing::debug!(%channel, %actor, "join");
            }
            ProtocolEvent::Reconnect => {
                tracing::info!("Server asked us to reconnect");
            }
            ProtocolEvent::Unknown(line) => tracing::trace!(%line, "unhandled line"),
            _ => {}
        }
        Ok(())
    }
}
