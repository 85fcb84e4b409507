//! Configuration loading and persistence.
//!
//! Handles reading and writing the chatlog configuration file. The access
//! token is never written to disk; it comes from `CHATLOG_TOKEN`.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{fs, path::PathBuf};

use crate::constants::{DEFAULT_QUEUE_CAPACITY, DEFAULT_SERVER_HOST, DEFAULT_SERVER_PORT};
use crate::credentials::AccessToken;

/// Configuration for chatlog.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    /// Chat server host.
    pub server_host: String,
    /// Chat server port.
    pub server_port: u16,
    /// Directory holding one CSV log per channel.
    pub log_dir: PathBuf,
    /// Account (nickname) used when none is given on the command line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// Pause between handshake commands in milliseconds.
    pub command_delay_ms: u64,
    /// Capacity of the live-display queue.
    pub queue_capacity: usize,
    /// Start a new session with backoff when one fails.
    pub reconnect: bool,
    /// Access token - NOT serialized to disk.
    #[serde(skip)]
    pub token: Option<AccessToken>,
}

impl Default for Config {
    fn default() -> Self {
        // Log directory: in test mode use project tmp/, otherwise the documents folder
        let log_dir = if crate::env::is_test_mode() {
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/chatlog-test/chats")
        } else {
            crate::sink::default_log_dir()
        };

        Self {
            server_host: DEFAULT_SERVER_HOST.to_string(),
            server_port: DEFAULT_SERVER_PORT,
            log_dir,
            account: None,
            command_delay_ms: 0,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            reconnect: false,
            token: None,
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `#[cfg(test)]` (unit tests): `tmp/chatlog-test`
    /// 2. `CHATLOG_CONFIG_DIR` env var: explicit override
    /// 3. `CHATLOG_ENV=test`: `tmp/chatlog-test` (integration tests)
    /// 4. Default: platform config dir (e.g. `~/.config/chatlog`)
    pub fn config_dir() -> Result<PathBuf> {
        let dir = {
            #[cfg(test)]
            {
                PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/chatlog-test")
            }

            #[cfg(not(test))]
            {
                if let Ok(custom_dir) = std::env::var("CHATLOG_CONFIG_DIR") {
                    PathBuf::from(custom_dir)
                } else if crate::env::is_test_mode() {
                    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/chatlog-test")
                } else {
                    dirs::config_dir()
                        .context("Could not determine config directory")?
                        .join("chatlog")
                }
            }
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::load_from_file() {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Using default config: {e:#}");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from_file() -> Result<Self> {
        let config_path = Self::config_dir()?.join("config.json");
        if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            bail!("Config file not found")
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("CHATLOG_SERVER_HOST") {
            self.server_host = host;
        }

        if let Ok(port) = std::env::var("CHATLOG_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server_port = port;
            }
        }

        if let Ok(log_dir) = std::env::var("CHATLOG_LOG_DIR") {
            self.log_dir = PathBuf::from(log_dir);
        }

        if let Ok(account) = std::env::var("CHATLOG_ACCOUNT") {
            self.account = Some(account);
        }

        // Token only ever comes from the environment
        if let Ok(token) = std::env::var("CHATLOG_TOKEN") {
            self.token = Some(AccessToken::new(token));
        }

        if let Ok(capacity) = std::env::var("CHATLOG_QUEUE_CAPACITY") {
            if let Ok(capacity) = capacity.parse::<usize>() {
                self.queue_capacity = capacity;
            }
        }
    }

    /// Persists the current configuration to disk.
    /// Note: the token is never saved.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_dir()?.join("config.json");
        fs::write(&config_path, serde_json::to_string_pretty(self)?)?;

        // Set restrictive permissions (owner read/write only)
        #[cfg(unix)]
        fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Set one field from its config-file key and a string value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "server_host" => self.server_host = value.to_string(),
            "server_port" => {
                self.server_port = value
                    .parse()
                    .with_context(|| format!("Invalid port: {value}"))?;
            }
            "log_dir" => self.log_dir = PathBuf::from(value),
            "account" => {
                self.account = (!value.trim().is_empty()).then(|| value.trim().to_string());
            }
            "command_delay_ms" => {
                self.command_delay_ms = value
                    .parse()
                    .with_context(|| format!("Invalid delay: {value}"))?;
            }
            "queue_capacity" => {
                self.queue_capacity = value
                    .parse()
                    .with_context(|| format!("Invalid capacity: {value}"))?;
            }
            "reconnect" => {
                self.reconnect = value
                    .parse()
                    .with_context(|| format!("Invalid boolean: {value}"))?;
            }
            "token" => bail!("The token is not stored in the config file; set CHATLOG_TOKEN"),
            _ => bail!("Unknown config key: {key}"),
        }
        Ok(())
    }
}
