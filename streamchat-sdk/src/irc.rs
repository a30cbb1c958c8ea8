//! Line-level IRC framing: parsing inbound lines and formatting outbound commands.
//!
//! Inbound lines look like `[@tags ][:prefix ]COMMAND [params] [:trailing]`.
//! Tags are tolerated and skipped; nothing in this client interprets them.

use std::fmt;

/// A parsed IRC line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Origin (`nick!user@host` or a server name), without the leading `:`.
    pub prefix: Option<String>,
    /// Command verb or three-digit numeric, as received.
    pub command: String,
    /// Middle parameters followed by the trailing parameter, if any.
    pub params: Vec<String>,
}

impl Message {
    /// Parse a single line. Returns `None` for anything that is not a
    /// well-formed IRC line (empty input, a prefix with no command, a
    /// command containing non-alphanumeric characters).
    pub fn parse(line: &str) -> Option<Message> {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        if let Some(tagged) = rest.strip_prefix('@') {
            let (_, after) = tagged.split_once(' ')?;
            rest = after.trim_start_matches(' ');
        }

        let mut prefix = None;
        if let Some(prefixed) = rest.strip_prefix(':') {
            let (origin, after) = prefixed.split_once(' ')?;
            if origin.is_empty() {
                return None;
            }
            prefix = Some(origin.to_string());
            rest = after.trim_start_matches(' ');
        }

        let (command, mut rest) = match rest.split_once(' ') {
            Some((command, after)) => (command, after),
            None => (rest, ""),
        };
        if command.is_empty() || !command.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((param, after)) => {
                    params.push(param.to_string());
                    rest = after;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Some(Message {
            prefix,
            command: command.to_string(),
            params,
        })
    }

    /// The nick portion of the prefix (`nick` in `nick!user@host`).
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        let nick = prefix.split('!').next().unwrap_or(prefix);
        (!nick.is_empty()).then_some(nick)
    }

    /// The numeric reply code, if the command is a three-digit numeric.
    pub fn numeric(&self) -> Option<u16> {
        if self.command.len() == 3 && self.command.bytes().all(|b| b.is_ascii_digit()) {
            self.command.parse().ok()
        } else {
            None
        }
    }
}

/// Outbound commands. `encode` produces the line without its terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Pass(String),
    Nick(String),
    /// Channel name, with or without the leading `#`.
    Join(String),
    Privmsg { channel: String, text: String },
    Ping(String),
    Pong(String),
    Quit(Option<String>),
}

impl Command {
    pub fn encode(&self) -> String {
        match self {
            Command::Pass(token) => format!("PASS {}", sanitize(token)),
            Command::Nick(nick) => format!("NICK {}", sanitize(nick)),
            Command::Join(channel) => format!("JOIN {}", channel_target(channel)),
            Command::Privmsg { channel, text } => {
                format!("PRIVMSG {} :{}", channel_target(channel), sanitize(text))
            }
            Command::Ping(token) => format!("PING :{}", sanitize(token)),
            Command::Pong(token) => format!("PONG :{}", sanitize(token)),
            Command::Quit(Some(message)) => format!("QUIT :{}", sanitize(message)),
            Command::Quit(None) => "QUIT".to_string(),
        }
    }

    /// The encoded line with secrets hidden, for logging.
    pub fn redacted(&self) -> String {
        match self {
            Command::Pass(_) => "PASS ***".to_string(),
            other => other.encode(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// `#name` for a channel given as `name` or `#name`.
pub fn channel_target(channel: &str) -> String {
    format!("#{}", sanitize(channel.trim_start_matches('#')))
}

// A parameter must never be able to end the line early.
fn sanitize(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '\r' | '\n' | '\0'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefix_command_and_trailing() {
        let msg = Message::parse(":alice!alice@alice.tmi.twitch.tv PRIVMSG #chan :hello there world\r\n")
            .unwrap();
        assert_eq!(msg.prefix.as_deref(), Some("alice!alice@alice.tmi.twitch.tv"));
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#chan", "hello there world"]);
        assert_eq!(msg.nick(), Some("alice"));
    }

    #[test]
    fn parses_without_prefix() {
        let msg = Message::parse("PING :tmi.twitch.tv").unwrap();
        assert_eq!(msg.prefix, None);
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.params, vec!["tmi.twitch.tv"]);
    }

    #[test]
    fn skips_tags() {
        let msg = Message::parse("@badge-info=;color=#FF0000 :bob!bob@bob PRIVMSG #c :hey").unwrap();
        assert_eq!(msg.nick(), Some("bob"));
        assert_eq!(msg.params, vec!["#c", "hey"]);
    }

    #[test]
    fn middle_params_and_empty_trailing() {
        let msg = Message::parse(":tmi.twitch.tv 353 bot = #chan :").unwrap();
        assert_eq!(msg.numeric(), Some(353));
        assert_eq!(msg.params, vec!["bot", "=", "#chan", ""]);
    }

    #[test]
    fn server_prefix_has_no_bang() {
        let msg = Message::parse(":tmi.twitch.tv 001 bot :Welcome, GLHF!").unwrap();
        assert_eq!(msg.nick(), Some("tmi.twitch.tv"));
        assert_eq!(msg.numeric(), Some(1));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!(Message::parse(""), None);
        assert_eq!(Message::parse("\r\n"), None);
        assert_eq!(Message::parse(":onlyprefix"), None);
        assert_eq!(Message::parse(": PRIVMSG #c :x"), None);
        assert_eq!(Message::parse("@tags-without-anything-else"), None);
        assert_eq!(Message::parse("PRIV-MSG #c :x"), None);
    }

    #[test]
    fn encodes_handshake_commands() {
        assert_eq!(Command::Pass("oauth:abc".into()).encode(), "PASS oauth:abc");
        assert_eq!(Command::Nick("mybot".into()).encode(), "NICK mybot");
        assert_eq!(Command::Join("chan".into()).encode(), "JOIN #chan");
        assert_eq!(Command::Join("#chan".into()).encode(), "JOIN #chan");
        assert_eq!(Command::Pong("tmi.twitch.tv".into()).encode(), "PONG :tmi.twitch.tv");
        assert_eq!(Command::Quit(None).encode(), "QUIT");
    }

    #[test]
    fn privmsg_uses_trailing_parameter() {
        let cmd = Command::Privmsg {
            channel: "chan".into(),
            text: "hi there :)".into(),
        };
        assert_eq!(cmd.encode(), "PRIVMSG #chan :hi there :)");
    }

    #[test]
    fn line_breaks_cannot_inject_commands() {
        let cmd = Command::Privmsg {
            channel: "chan".into(),
            text: "hi\r\nQUIT".into(),
        };
        assert_eq!(cmd.encode(), "PRIVMSG #chan :hiQUIT");
    }

    #[test]
    fn redacts_token() {
        let cmd = Command::Pass("oauth:secret".into());
        assert_eq!(cmd.redacted(), "PASS ***");
        assert_eq!(cmd.to_string(), "PASS ***");
        assert!(!format!("{cmd}").contains("secret"));
    }
}
