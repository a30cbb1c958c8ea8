//! Account credentials and target channel.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialsError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{field} must not contain whitespace or commas: {value:?}")]
    Invalid { field: &'static str, value: String },
}

/// Who we are and where we chat. Normalized on construction and immutable
/// afterwards. `Debug` never prints the token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    nick: String,
    token: String,
    channel: String,
}

impl Credentials {
    /// Account names and channels are lower-cased, a leading `#` on the
    /// channel is dropped and the token gets its `oauth:` prefix if missing.
    pub fn new(nick: &str, token: &str, channel: &str) -> Result<Self, CredentialsError> {
        let nick = nick.trim().to_lowercase();
        let channel = channel.trim().trim_start_matches('#').to_lowercase();
        let token = token.trim();

        if nick.is_empty() {
            return Err(CredentialsError::Missing("bot account name"));
        }
        if token.is_empty() || token == "oauth:" {
            return Err(CredentialsError::Missing("token"));
        }
        if channel.is_empty() {
            return Err(CredentialsError::Missing("channel"));
        }
        for (field, value) in [("bot account name", &nick), ("channel", &channel)] {
            if value.chars().any(|c| c.is_whitespace() || c == ',') {
                return Err(CredentialsError::Invalid {
                    field,
                    value: value.clone(),
                });
            }
        }

        let token = if token.starts_with("oauth:") {
            token.to_string()
        } else {
            format!("oauth:{token}")
        };

        Ok(Self {
            nick,
            token,
            channel,
        })
    }

    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Channel name without the `#`.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Channel name as it appears on the wire (`#name`).
    pub fn channel_target(&self) -> String {
        format!("#{}", self.channel)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("nick", &self.nick)
            .field("token", &"oauth:***")
            .field("channel", &self.channel)
            .finish()
    }
}
