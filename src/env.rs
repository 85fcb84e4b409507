//! Runtime environment detection.
//!
//! Determines the runtime environment (test, development, production) from
//! the `CHATLOG_ENV` environment variable.
//!
//! # Usage
//!
//! ```rust
//! use chatlog::env::{Environment, is_test_mode};
//!
//! if Environment::current().is_test() {
//!     // Keep config and logs inside the repository's tmp/ directory
//! }
//!
//! if is_test_mode() {
//!     // Test-specific behavior
//! }
//! ```
//!
//! # Environment Variable
//!
//! Set `CHATLOG_ENV` to one of:
//! - `test` - Test mode (config and chat logs go to the repository's `tmp/`)
//! - `development` or `dev` - Development mode
//! - (anything else or unset) - Production mode

/// Runtime environment for chatlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Production environment (default).
    Production,
    /// Development environment.
    Development,
    /// Test environment - keeps all files under the repository `tmp/`.
    Test,
}

impl Environment {
    /// Detect current environment from `CHATLOG_ENV`.
    #[must_use]
    pub fn current() -> Self {
        Self::from_name(std::env::var("CHATLOG_ENV").ok().as_deref())
    }

    /// Map an optional `CHATLOG_ENV` value to an environment.
    fn from_name(name: Option<&str>) -> Self {
        match name {
            Some("test") => Self::Test,
            Some("development" | "dev") => Self::Development,
            _ => Self::Production,
        }
    }

    /// Returns `true` if this is the test environment.
    #[must_use]
    pub fn is_test(self) -> bool {
        self == Self::Test
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Development => write!(f, "development"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// Convenience function to check if running in test mode.
///
/// Equivalent to `Environment::current().is_test()`.
#[must_use]
pub fn is_test_mode() -> bool {
    Environment::current().is_test()
}
