//! Channel identity.
//!
//! A [`Channel`] is built once from the streamer name the user typed and is
//! immutable afterwards. It provides both spellings the rest of the crate
//! needs: the bare streamer login (log file name, event tag) and the IRC
//! channel name with its `#` prefix (`JOIN` target).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Characters that never appear in a channel login and would break either
/// the `JOIN` command or the log file path.
const FORBIDDEN_CHARS: &[char] = &[',', ':', '#', '/', '\\', '*', '?', '"', '<', '>', '|'];

/// A validated chat channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Channel {
    streamer: String,
}

impl Channel {
    /// Builds a channel from a streamer name.
    ///
    /// Surrounding whitespace and a single leading `#` are removed and the
    /// name is lower-cased, since channel logins are case-insensitive.
    pub fn new(streamer: &str) -> Result<Self, ChannelError> {
        let trimmed = streamer.trim();
        let bare = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if bare.is_empty() {
            return Err(ChannelError::Empty);
        }
        if let Some(invalid) = bare
            .chars()
            .find(|c| c.is_whitespace() || c.is_control() || FORBIDDEN_CHARS.contains(c))
        {
            return Err(ChannelError::InvalidCharacter {
                name: streamer.to_string(),
                invalid,
            });
        }
        Ok(Self {
            streamer: bare.to_lowercase(),
        })
    }

    /// The streamer login without prefix, e.g. `foo`.
    pub fn streamer(&self) -> &str {
        &self.streamer
    }

    /// The IRC channel name, e.g. `#foo`.
    pub fn irc_name(&self) -> String {
        format!("#{}", self.streamer)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.streamer)
    }
}

impl TryFrom<String> for Channel {
    type Error = ChannelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Channel> for String {
    fn from(channel: Channel) -> Self {
        channel.streamer
    }
}
