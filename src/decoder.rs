//! Chat message decoding.
//!
//! Turns one raw `PRIVMSG` line into a [`ChatEvent`] using the loose
//! colon-split heuristic the chat gateway's plain format allows:
//!
//! ```text
//! :alice!alice@alice.tmi.twitch.tv PRIVMSG #foo :hello world
//!  └─ segment 2 ─────────────────────────────┘ └ segment 3 ┘
//! ```
//!
//! The author is segment 2 up to the first `!`, the text is segment 3
//! trimmed. Messages whose text itself starts with `:` or odd host masks can
//! misparse; tags and capabilities are not negotiated, so the simple form is
//! all the server sends.

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::channel::Channel;
use crate::constants::TIME_FORMAT;

/// One decoded chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatEvent {
    /// Channel the message was received on.
    pub channel: Channel,
    /// Author login, host mask removed.
    pub username: String,
    /// Local wall-clock time at receipt.
    pub timestamp: DateTime<Local>,
    /// Message text, trimmed.
    pub message: String,
}

impl ChatEvent {
    /// The timestamp as written to the `Time` column.
    pub fn formatted_time(&self) -> String {
        self.timestamp.format(TIME_FORMAT).to_string()
    }
}

/// Decode a chat line received now.
///
/// Returns `None` for lines that do not split into three colon-delimited
/// segments or that carry no author; such lines are normal and not errors.
/// The author is taken verbatim, only the message text is trimmed.
pub fn decode(channel: &Channel, raw_line: &str) -> Option<ChatEvent> {
    decode_at(channel, raw_line, Local::now())
}

/// Decode a chat line with an explicit receipt time.
pub fn decode_at(
    channel: &Channel,
    raw_line: &str,
    received_at: DateTime<Local>,
) -> Option<ChatEvent> {
    let mut segments = raw_line.splitn(3, ':');
    let _before_prefix = segments.next()?;
    let prefix = segments.next()?;
    let text = segments.next()?;

    let username = prefix.split('!').next().unwrap_or_default();
    if username.is_empty() {
        log::trace!("[Decoder] Dropping line without author: {raw_line:?}");
        return None;
    }

    Some(ChatEvent {
        channel: channel.clone(),
        username: username.to_string(),
        timestamp: received_at,
        message: text.trim().to_string(),
    })
}
