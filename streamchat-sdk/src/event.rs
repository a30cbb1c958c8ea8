//! Structured events decoded from inbound protocol lines.

use crate::irc::Message;

/// One inbound line, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// Server keep-alive probe. Must be answered with a PONG carrying the token.
    Ping(String),

    /// Reply to our own keep-alive probe.
    Pong(String),

    /// `001 RPL_WELCOME`: the server accepted our credentials.
    Welcome { nick: String },

    /// Someone (possibly us) joined a channel.
    Join { channel: String, actor: String },

    /// A chat line in a channel.
    ChatMessage {
        channel: String,
        actor: String,
        text: String,
    },

    /// Server notice text.
    Notice(String),

    /// Any other numeric reply (`353`, `366`, `403`, ...).
    Reply { code: u16, params: Vec<String> },

    /// The server asked us to reconnect; the connection is about to go away.
    Reconnect,

    /// Anything not understood, kept verbatim.
    Unknown(String),
}

impl ProtocolEvent {
    /// Classify a raw line. Never fails: anything unrecognized becomes
    /// [`ProtocolEvent::Unknown`].
    pub fn decode(raw: &str) -> ProtocolEvent {
        let unknown = || ProtocolEvent::Unknown(raw.trim_end_matches(['\r', '\n']).to_string());
        let Some(msg) = Message::parse(raw) else {
            return unknown();
        };

        if let Some(code) = msg.numeric() {
            return match code {
                1 => ProtocolEvent::Welcome {
                    nick: msg.params.first().cloned().unwrap_or_default(),
                },
                _ => ProtocolEvent::Reply {
                    code,
                    params: msg.params,
                },
            };
        }

        match msg.command.to_ascii_uppercase().as_str() {
            "PING" => ProtocolEvent::Ping(msg.params.last().cloned().unwrap_or_default()),
            "PONG" => ProtocolEvent::Pong(msg.params.last().cloned().unwrap_or_default()),
            "JOIN" => match (msg.params.first(), msg.nick()) {
                (Some(channel), Some(actor)) => ProtocolEvent::Join {
                    channel: channel.clone(),
                    actor: actor.to_string(),
                },
                _ => unknown(),
            },
            "PRIVMSG" => match (msg.params.as_slice(), msg.nick()) {
                ([channel, text], Some(actor)) => ProtocolEvent::ChatMessage {
                    channel: channel.clone(),
                    actor: actor.to_string(),
                    text: text.clone(),
                },
                _ => unknown(),
            },
            "NOTICE" => match msg.params.last() {
                Some(text) => ProtocolEvent::Notice(text.clone()),
                None => unknown(),
            },
            "RECONNECT" => ProtocolEvent::Reconnect,
            _ => unknown(),
        }
    }
}
