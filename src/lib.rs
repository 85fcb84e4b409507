//! chatlog - Twitch chat recorder.
//!
//! Joins one chat channel over the plaintext IRC gateway and appends every
//! chat message (author, local receipt time, text) to a per-channel CSV log,
//! optionally forwarding the same events to a live display.
//!
//! # Architecture
//!
//! - **Controller** - Front-end surface: start/stop, event and status draining
//! - **Session** - Owns the socket and the worker thread (connect, handshake,
//!   keep-alive, receive loop)
//! - **Protocol / Decoder** - Line reassembly, classification, message parsing
//! - **Sink** - Append-only CSV log plus bounded delivery queue
//!
//! # Modules
//!
//! - [`controller`] - Session ownership for front ends
//! - [`session`] - Connection lifecycle
//! - [`protocol`] - Wire commands and line codec
//! - [`decoder`] - `PRIVMSG` line to [`ChatEvent`]
//! - [`sink`] - CSV log and delivery queue
//! - [`config`] - Configuration loading/saving

// Library modules
pub mod channel;
pub mod controller;
pub mod credentials;
pub mod decoder;
pub mod error;
pub mod protocol;
pub mod session;
pub mod sink;

pub mod config;
pub mod constants;
pub mod env;

// Re-export commonly used types
pub use channel::Channel;
pub use config::Config;
pub use controller::{Backoff, Controller};
pub use credentials::{AccessToken, Credentials};
pub use decoder::ChatEvent;
pub use error::{ChannelError, StartError};
pub use session::{Session, SessionConfig, SessionState, StatusSignal};
pub use sink::{ChatLog, ChatSink};
