//! Controller-facing surface.
//!
//! A front end (GUI, CLI, ...) holds one [`Controller`]. It supplies
//! channel, account and token, starts and stops the session, and polls for
//! decoded events and status changes on its own cadence. At most one session
//! runs at a time; starting a new one stops the previous one first.

use std::sync::mpsc as std_mpsc;
use std::time::Duration;

use crate::channel::Channel;
use crate::config::Config;
use crate::constants::{BACKOFF_BASE_SECS, BACKOFF_MAX_SECS};
use crate::credentials::{AccessToken, Credentials};
use crate::decoder::ChatEvent;
use crate::error::StartError;
use crate::session::{Session, SessionConfig, SessionState, StatusSignal};
use crate::sink::{delivery_queue, log_path, ChatSink, DeliveryQueue, DeliveryReceiver};

/// Owns the current session and the outputs it produces.
#[derive(Debug)]
pub struct Controller {
    config: Config,
    session: Option<Session>,
    queue: DeliveryQueue,
    events: DeliveryReceiver,
    status_tx: std_mpsc::Sender<StatusSignal>,
    status_rx: std_mpsc::Receiver<StatusSignal>,
}

impl Controller {
    /// Create a controller with no session.
    pub fn new(config: Config) -> Self {
        let (queue, events) = delivery_queue(config.queue_capacity);
        let (status_tx, status_rx) = std_mpsc::channel();
        Self {
            config,
            session: None,
            queue,
            events,
            status_tx,
            status_rx,
        }
    }

    /// The configuration sessions are started with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start recording `channel` as `account`.
    ///
    /// Returns immediately; connection progress is reported through
    /// [`Controller::drain_status`]. Empty inputs are rejected with
    /// [`StartError::MissingInformation`] and nothing is started. A running
    /// session is stopped first.
    pub fn start_session(
        &mut self,
        channel: &str,
        account: &str,
        token: AccessToken,
    ) -> Result<(), StartError> {
        let mut missing = Vec::new();
        if channel.trim().is_empty() {
            missing.push("channel");
        }
        if account.trim().is_empty() {
            missing.push("account");
        }
        if token.is_blank() {
            missing.push("token");
        }
        if !missing.is_empty() {
            return Err(StartError::MissingInformation(missing));
        }

        let channel = Channel::new(channel)?;
        self.stop_session();

        let sink = ChatSink::new(&self.config.log_dir, &channel).with_queue(self.queue.clone());
        let mut session = Session::new(
            channel,
            Credentials::new(account, token),
            SessionConfig::from(&self.config),
        );
        session
            .start(sink, self.status_tx.clone())
            .map_err(|e| StartError::Worker(format!("{e:#}")))?;
        self.session = Some(session);
        Ok(())
    }

    /// Stop the current session, if any, and wait for its worker.
    ///
    /// Idempotent; never fails.
    pub fn stop_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stop();
        }
    }

    /// State of the current session, `Idle` when there is none.
    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::Idle, Session::state)
    }

    /// Channel of the current session.
    pub fn channel(&self) -> Option<&Channel> {
        self.session.as_ref().map(Session::channel)
    }

    /// Decoded events waiting for display, oldest first. Never blocks.
    pub fn drain_events(&self) -> Vec<ChatEvent> {
        self.events.drain()
    }

    /// Status signals since the last call, oldest first. Never blocks.
    pub fn drain_status(&self) -> Vec<StatusSignal> {
        self.status_rx.try_iter().collect()
    }

    /// Wait up to `timeout` for the next status signal.
    pub fn wait_status(&self, timeout: Duration) -> Option<StatusSignal> {
        self.status_rx.recv_timeout(timeout).ok()
    }

    /// Events dropped from display because the queue was full.
    pub fn dropped_events(&self) -> u64 {
        self.events.dropped()
    }

    /// Where `channel`'s log is written.
    pub fn log_path(&self, channel: &Channel) -> std::path::PathBuf {
        log_path(&self.config.log_dir, channel)
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop_session();
    }
}

// ============================================================================
// Reconnect Backoff
// ============================================================================

/// Tracks consecutive failures and computes exponential backoff delays for
/// caller-initiated reconnects.
///
/// # Backoff Formula
///
/// delay = min(BASE * 2^(consecutive_failures - 1), MAX)
///
/// - After 1 failure: 2s
/// - After 2 failures: 4s
/// - After 3 failures: 8s
/// - After 6+ failures: 60s (capped)
#[derive(Debug, Default)]
pub struct Backoff {
    consecutive_failures: u32,
}

impl Backoff {
    /// Reset after a session reached `Streaming`.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Count one failed session.
    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    /// Delay before the next attempt.
    pub fn current_delay(&self) -> Duration {
        if self.consecutive_failures == 0 {
            return Duration::ZERO;
        }
        let exponent = self.consecutive_failures.saturating_sub(1).min(6);
        let multiplier = 1u64 << exponent;
        let delay_secs = BACKOFF_BASE_SECS
            .saturating_mul(multiplier)
            .min(BACKOFF_MAX_SECS);
        Duration::from_secs(delay_secs)
    }

    /// Whether any failure is outstanding.
    pub fn is_backing_off(&self) -> bool {
        self.consecutive_failures > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_controller(temp: &TempDir) -> Controller {
        let mut config = Config::default();
        config.log_dir = temp.path().to_path_buf();
        config.server_host = "127.0.0.1".to_string();
        Controller::new(config)
    }

    #[test]
    fn test_missing_information_is_reported() {
        let temp = TempDir::new().unwrap();
        let mut controller = test_controller(&temp);

        let err = controller
            .start_session("", "alice", AccessToken::new(""))
            .unwrap_err();
        assert_eq!(err, StartError::MissingInformation(vec!["channel", "token"]));

        let err = controller
            .start_session("foo", "  ", AccessToken::new("oauth:x"))
            .unwrap_err();
        assert_eq!(err, StartError::MissingInformation(vec!["account"]));

        assert_eq!(controller.state(), SessionState::Idle);
        assert!(controller.channel().is_none());
        assert!(controller.drain_status().is_empty());
    }

    #[test]
    fn test_invalid_channel_is_reported() {
        let temp = TempDir::new().unwrap();
        let mut controller = test_controller(&temp);
        let err = controller
            .start_session("foo bar", "alice", AccessToken::new("oauth:x"))
            .unwrap_err();
        assert!(matches!(err, StartError::InvalidChannel(_)));
        assert!(controller.channel().is_none());
    }

    #[test]
    fn test_stop_without_session_is_noop() {
        let temp = TempDir::new().unwrap();
        let mut controller = test_controller(&temp);
        controller.stop_session();
        controller.stop_session();
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(controller.drain_events().is_empty());
        assert_eq!(controller.dropped_events(), 0);
    }

    #[test]
    fn test_log_path_uses_configured_dir() {
        let temp = TempDir::new().unwrap();
        let controller = test_controller(&temp);
        let path = controller.log_path(&Channel::new("Foo").unwrap());
        assert_eq!(path, temp.path().join("foo.csv"));
    }

    #[test]
    fn test_backoff_progression() {
        let mut backoff = Backoff::default();
        assert_eq!(backoff.current_delay(), Duration::ZERO);
        assert!(!backoff.is_backing_off());

        let expected = [2, 4, 8, 16, 32, 60, 60, 60];
        for secs in expected {
            backoff.record_failure();
            assert_eq!(backoff.current_delay(), Duration::from_secs(secs));
        }
        assert!(backoff.is_backing_off());

        backoff.record_success();
        assert_eq!(backoff.current_delay(), Duration::ZERO);
    }
}
