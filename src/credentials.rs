//! Account credentials for the chat server.
//!
//! The access token is a secret: it is never logged, never serialized to the
//! config file, and its memory is wiped when the last copy is dropped.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// An OAuth access token, sent verbatim in the `PASS` command.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wraps a token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for writing to the socket only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the token is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

/// Account name and token used for the `NICK`/`PASS` handshake.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Account login, sent in `NICK`.
    pub account: String,
    /// Access token, sent in `PASS`.
    pub token: AccessToken,
}

impl Credentials {
    /// Bundles an account name and token. The account is trimmed.
    pub fn new(account: &str, token: AccessToken) -> Self {
        Self {
            account: account.trim().to_string(),
            token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_debug_is_redacted() {
        let creds = Credentials::new("alice", AccessToken::new("oauth:supersecret"));
        let debug = format!("{creds:?}");
        assert!(!debug.contains("supersecret"));
        assert!(debug.contains("REDACTED"));
        assert!(debug.contains("alice"));
    }

    #[test]
    fn test_token_expose_and_blank() {
        let token = AccessToken::new("oauth:abc");
        assert_eq!(token.expose(), "oauth:abc");
        assert!(!token.is_blank());
        assert!(AccessToken::new("  ").is_blank());
        assert!(AccessToken::new("").is_blank());
    }

    #[test]
    fn test_account_is_trimmed() {
        let creds = Credentials::new("  bob \n", AccessToken::new("t"));
        assert_eq!(creds.account, "bob");
    }
}
