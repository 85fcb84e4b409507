//! Wire protocol codec for the chat server.
//!
//! Plaintext, line-oriented IRC subset:
//!
//! ```text
//! client → server   PASS <token>\r\n
//!                   NICK <account>\r\n
//!                   JOIN #<channel>\r\n
//!                   PONG [<argument>]\r\n
//! server → client   PING [<argument>]
//!                   :<nick>!<user>@<host> PRIVMSG #<channel> :<text>
//!                   anything else (ignored)
//! ```
//!
//! Inbound bytes arrive in arbitrary chunks; [`LineDecoder`] reassembles
//! them into lines and [`classify`] sorts each line into a [`Line`].

use std::fmt;

use crate::constants::{LINE_TERMINATOR, MAX_LINE_LENGTH, PING_TOKEN, PONG_TOKEN, PRIVMSG_TOKEN};

/// An outbound command.
#[derive(Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// `PASS <token>`.
    Pass(&'a str),
    /// `NICK <account>`.
    Nick(&'a str),
    /// `JOIN <#channel>`.
    Join(&'a str),
    /// `PONG`, echoing the PING argument when there was one.
    Pong(Option<&'a str>),
}

impl Command<'_> {
    /// Encode the command as a terminated wire line.
    pub fn encode(&self) -> Vec<u8> {
        let body = match self {
            Command::Pass(token) => format!("PASS {token}"),
            Command::Nick(account) => format!("NICK {account}"),
            Command::Join(channel) => format!("JOIN {channel}"),
            Command::Pong(Some(argument)) => format!("{PONG_TOKEN} {argument}"),
            Command::Pong(None) => PONG_TOKEN.to_string(),
        };
        format!("{body}{LINE_TERMINATOR}").into_bytes()
    }
}

// Display and Debug are used in logs, so the token never appears in them.
impl fmt::Display for Command<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Pass(_) => write!(f, "PASS [REDACTED]"),
            Command::Nick(account) => write!(f, "NICK {account}"),
            Command::Join(channel) => write!(f, "JOIN {channel}"),
            Command::Pong(Some(argument)) => write!(f, "{PONG_TOKEN} {argument}"),
            Command::Pong(None) => write!(f, "{PONG_TOKEN}"),
        }
    }
}

impl fmt::Debug for Command<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command({self})")
    }
}

/// Classification of one inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'a> {
    /// Keep-alive challenge; must be answered with a PONG.
    Ping {
        /// Text after `PING`, if any (usually `:tmi.twitch.tv`).
        argument: Option<&'a str>,
    },
    /// A chat message line, to be handed to the decoder whole.
    ChatMessage(&'a str),
    /// Join/part notices, numerics, capability lines, ...
    Other(&'a str),
}

/// Sort a line by the keep-alive and chat markers.
///
/// `PING` is matched at the start of the line only; `PRIVMSG` anywhere.
pub fn classify(line: &str) -> Line<'_> {
    if let Some(rest) = line.strip_prefix(PING_TOKEN) {
        let argument = rest.trim();
        return Line::Ping {
            argument: (!argument.is_empty()).then_some(argument),
        };
    }
    if line.contains(PRIVMSG_TOKEN) {
        Line::ChatMessage(line)
    } else {
        Line::Other(line)
    }
}

/// Reassembles newline-terminated lines from a byte stream.
///
/// Bytes are buffered rather than text so that a multi-byte character split
/// across two reads decodes correctly. Lines are decoded as lossy UTF-8 with
/// the trailing `\r\n` or `\n` removed; blank lines are skipped.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completes, in order.
    ///
    /// An unterminated tail longer than [`MAX_LINE_LENGTH`] is returned as a
    /// line of its own so a misbehaving peer cannot grow the buffer forever.
    pub fn feed(&mut self, data: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(data);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            push_line(&mut lines, &raw[..raw.len() - 1]);
        }

        if self.buffer.len() > MAX_LINE_LENGTH {
            let raw = std::mem::take(&mut self.buffer);
            log::warn!(
                "[Protocol] Flushing {} bytes without line terminator",
                raw.len()
            );
            push_line(&mut lines, &raw);
        }

        lines
    }

    /// Number of buffered bytes still waiting for a terminator.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

fn push_line(lines: &mut Vec<String>, raw: &[u8]) {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    if raw.is_empty() {
        return;
    }
    lines.push(String::from_utf8_lossy(raw).into_owned());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_handshake_commands() {
        assert_eq!(Command::Pass("oauth:abc").encode(), b"PASS oauth:abc\r\n");
        assert_eq!(Command::Nick("alice").encode(), b"NICK alice\r\n");
        assert_eq!(Command::Join("#foo").encode(), b"JOIN #foo\r\n");
    }

    #[test]
    fn test_encode_pong() {
        assert_eq!(Command::Pong(None).encode(), b"PONG\r\n");
        assert_eq!(
            Command::Pong(Some(":tmi.twitch.tv")).encode(),
            b"PONG :tmi.twitch.tv\r\n"
        );
    }

    #[test]
    fn test_pass_is_redacted_in_logs() {
        let cmd = Command::Pass("oauth:secret");
        assert_eq!(cmd.to_string(), "PASS [REDACTED]");
        assert!(!format!("{cmd:?}").contains("secret"));
    }

    #[test]
    fn test_classify_ping() {
        assert_eq!(
            classify("PING :tmi.twitch.tv"),
            Line::Ping {
                argument: Some(":tmi.twitch.tv")
            }
        );
        assert_eq!(classify("PING"), Line::Ping { argument: None });
    }

    #[test]
    fn test_classify_chat_message() {
        let line = ":alice!alice@alice.tmi.twitch.tv PRIVMSG #foo :hello";
        assert_eq!(classify(line), Line::ChatMessage(line));
    }

    #[test]
    fn test_classify_other() {
        let line = ":tmi.twitch.tv 001 alice :Welcome, GLHF!";
        assert_eq!(classify(line), Line::Other(line));
        // PING only counts at the start of a line
        let quoted = ":bob!bob@bob JOIN #PING";
        assert_eq!(classify(quoted), Line::Other(quoted));
    }

    #[test]
    fn test_decoder_splits_lines() {
        let mut decoder = LineDecoder::new();
        let lines = decoder.feed(b"PING :a\r\n:x!x@x PRIVMSG #c :hi\r\n");
        assert_eq!(lines, vec!["PING :a", ":x!x@x PRIVMSG #c :hi"]);
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_decoder_keeps_partial_line() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.feed(b":x!x@x PRIVMSG #c :hel").is_empty());
        assert_eq!(decoder.pending_len(), 22);

        let lines = decoder.feed(b"lo\r\nPI");
        assert_eq!(lines, vec![":x!x@x PRIVMSG #c :hello"]);

        let lines = decoder.feed(b"NG\n");
        assert_eq!(lines, vec!["PING"]);
    }

    #[test]
    fn test_decoder_handles_split_utf8() {
        let mut decoder = LineDecoder::new();
        let text = "héllo\r\n".as_bytes();
        // Split inside the two-byte 'é'
        assert!(decoder.feed(&text[..2]).is_empty());
        assert_eq!(decoder.feed(&text[2..]), vec!["héllo"]);
    }

    #[test]
    fn test_decoder_skips_blank_lines() {
        let mut decoder = LineDecoder::new();
        assert_eq!(decoder.feed(b"\r\n\nPING\r\n\r\n"), vec!["PING"]);
    }

    #[test]
    fn test_decoder_flushes_overlong_line() {
        let mut decoder = LineDecoder::new();
        let junk = vec![b'a'; MAX_LINE_LENGTH + 1];
        let lines = decoder.feed(&junk);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].len(), MAX_LINE_LENGTH + 1);
        assert_eq!(decoder.pending_len(), 0);
    }
}
