//! Errors surfaced to the controller.
//!
//! Internal plumbing uses `anyhow`; these typed errors exist only where a
//! caller is expected to react to the specific condition (for example a front
//! end showing a "missing information" warning).

use thiserror::Error;

/// Reasons a channel name is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The streamer name is empty after trimming.
    #[error("channel name is empty")]
    Empty,
    /// The streamer name contains a character that cannot appear in a
    /// channel login (whitespace, `,`, path separators, ...).
    #[error("channel name {name:?} contains invalid character {invalid:?}")]
    InvalidCharacter {
        /// The name as given.
        name: String,
        /// The first offending character.
        invalid: char,
    },
}

/// Reasons a session cannot be started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartError {
    /// One or more of channel, account and token were empty.
    #[error("missing information: {}", .0.join(", "))]
    MissingInformation(Vec<&'static str>),
    /// The channel name was present but malformed.
    #[error(transparent)]
    InvalidChannel(#[from] ChannelError),
    /// The worker thread could not be spawned.
    #[error("failed to start session worker: {0}")]
    Worker(String),
}
