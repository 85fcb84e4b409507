//! Application-wide constants for chatlog.
//!
//! Constants are grouped by domain with documentation explaining their
//! purpose.
//!
//! # Categories
//!
//! - **Server**: chat server endpoint and wire protocol tokens
//! - **Timeouts**: network and backoff timing
//! - **Buffers**: read buffer and queue sizing
//! - **Storage**: log directory and CSV layout

use std::time::Duration;

// ============================================================================
// Server
// ============================================================================

/// Default chat server host (plaintext IRC gateway).
pub const DEFAULT_SERVER_HOST: &str = "irc.chat.twitch.tv";

/// Default chat server port (plaintext, non-TLS).
pub const DEFAULT_SERVER_PORT: u16 = 6667;

/// Keep-alive challenge sent by the server.
pub const PING_TOKEN: &str = "PING";

/// Keep-alive response expected by the server.
pub const PONG_TOKEN: &str = "PONG";

/// Marker identifying a chat message line.
pub const PRIVMSG_TOKEN: &str = "PRIVMSG";

/// Line terminator for outbound commands.
pub const LINE_TERMINATOR: &str = "\r\n";

// ============================================================================
// Timeouts
// ============================================================================

/// Upper bound on establishing the TCP connection.
///
/// `stop()` cannot interrupt a pending connect, so this also bounds how long
/// a stop issued during `Connecting` can take to join the worker.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Base delay for reconnect backoff in seconds.
pub const BACKOFF_BASE_SECS: u64 = 2;

/// Maximum reconnect backoff delay in seconds.
pub const BACKOFF_MAX_SECS: u64 = 60;

/// Interval at which the command line front end drains the delivery queue.
pub const DISPLAY_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// Buffers
// ============================================================================

/// Size of a single socket read.
pub const READ_BUFFER_SIZE: usize = 2048;

/// Longest unterminated line kept before it is flushed as-is.
pub const MAX_LINE_LENGTH: usize = 8 * 1024;

/// Default capacity of the live-display delivery queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

// ============================================================================
// Storage
// ============================================================================

/// Subfolder of the documents directory holding the chat logs.
pub const LOG_SUBDIR: &str = "Twitch_Chats";

/// Header row of every chat log.
pub const LOG_HEADER: [&str; 3] = ["Username", "Time", "Message"];

/// `chrono` format of the `Time` column.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
