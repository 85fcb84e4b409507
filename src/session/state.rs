//! Session state and status signals.

use std::fmt;

use serde::Serialize;

use crate::channel::Channel;

/// Connection state of a session.
///
/// Stored as a `u8` in an atomic so the controller can read it while the
/// worker thread updates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SessionState {
    /// Created, worker not started.
    Idle = 0,
    /// Resolving and opening the TCP connection.
    Connecting = 1,
    /// Sending `PASS`/`NICK`/`JOIN`.
    Authenticating = 2,
    /// Receive loop running.
    Streaming = 3,
    /// Tearing the socket down.
    Closing = 4,
    /// Worker finished; terminal.
    Closed = 5,
}

impl SessionState {
    /// Whether the session holds, or is about to hold, a live socket.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionState::Connecting | SessionState::Authenticating | SessionState::Streaming
        )
    }

    /// Whether the session can no longer do anything.
    pub fn is_closed(self) -> bool {
        self == SessionState::Closed
    }
}

impl From<u8> for SessionState {
    fn from(value: u8) -> Self {
        match value {
            0 => SessionState::Idle,
            1 => SessionState::Connecting,
            2 => SessionState::Authenticating,
            3 => SessionState::Streaming,
            4 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Authenticating => "authenticating",
            SessionState::Streaming => "streaming",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Lifecycle notification sent to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusSignal {
    /// Handshake sent, receive loop running.
    Started {
        /// Channel of the session.
        channel: Channel,
    },
    /// Session ended because stop was requested.
    Stopped {
        /// Channel of the session.
        channel: Channel,
    },
    /// Session ended on a connection or socket error.
    Failed {
        /// Channel of the session.
        channel: Channel,
        /// Human-readable cause.
        reason: String,
    },
}

impl StatusSignal {
    /// Channel the signal refers to.
    pub fn channel(&self) -> &Channel {
        match self {
            StatusSignal::Started { channel }
            | StatusSignal::Stopped { channel }
            | StatusSignal::Failed { channel, .. } => channel,
        }
    }

    /// Whether the session is over.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StatusSignal::Started { .. })
    }
}
