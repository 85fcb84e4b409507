//! Chat session: one connection to one channel.
//!
//! A [`Session`] owns a dedicated worker thread that connects, sends the
//! handshake, and runs a blocking receive loop. Decoded messages go to the
//! session's [`ChatSink`]; lifecycle changes go out as [`StatusSignal`]s.
//!
//! # Architecture
//!
//! ```text
//! Controller thread                     Worker thread
//! ┌──────────────────┐                 ┌─────────────────────────┐
//! │ Session          │   Arc<Shared>   │ Worker                  │
//! │  start() ────────┼────spawn───────►│  connect + PASS/NICK/JOIN
//! │  stop()  ─┐      │                 │  loop read(2048):       │
//! │           │      │                 │    PING    → PONG       │
//! │   stop flag +    │                 │    PRIVMSG → decode     │
//! │   shutdown(Both) ┼────────────────►│              → sink     │
//! │   join()         │   read unblocks │  teardown → Closed      │
//! └──────────────────┘                 └─────────────────────────┘
//! ```
//!
//! # Cancellation
//!
//! `stop()` sets a flag and shuts the socket down through a second handle
//! kept in [`Shared`]. Shutdown (not just close) is what reliably wakes a
//! read blocked in another thread. The handle slot is a `Mutex<Option<_>>`
//! and is emptied with `take()`, so exactly one party performs the shutdown;
//! the worker keeps reading through its own handle, which stays a valid
//! descriptor until the worker drops it.
//!
//! A pending connect cannot be interrupted. When `stop()` finds the worker
//! still connecting it releases the thread instead of joining it, reports
//! `Stopped` itself, and the worker exits silently once the connect returns.

mod state;
mod worker;

use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};

pub use state::{SessionState, StatusSignal};

use crate::channel::Channel;
use crate::config::Config;
use crate::constants::CONNECT_TIMEOUT;
use crate::credentials::Credentials;
use crate::sink::ChatSink;
use worker::Worker;

/// Connection parameters for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Chat server host.
    pub server_host: String,
    /// Chat server port.
    pub server_port: u16,
    /// Bound on the TCP connect.
    pub connect_timeout: Duration,
    /// Pause between handshake commands. Zero sends them back-to-back.
    pub command_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            server_host: config.server_host.clone(),
            server_port: config.server_port,
            connect_timeout: CONNECT_TIMEOUT,
            command_delay: Duration::from_millis(config.command_delay_ms),
        }
    }
}

/// State shared between a [`Session`] and its worker thread.
#[derive(Debug)]
pub(crate) struct Shared {
    state: AtomicU8,
    stop_requested: AtomicBool,
    /// Set once the terminal status signal has been sent.
    finished: AtomicBool,
    /// Second handle to the live socket, used only to shut it down.
    socket: Mutex<Option<TcpStream>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(SessionState::Idle as u8),
            stop_requested: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            socket: Mutex::new(None),
        }
    }

    fn state(&self) -> SessionState {
        SessionState::from(self.state.load(Ordering::SeqCst))
    }

    /// Move to `state`. `Closed` is final and is never left.
    fn set_state(&self, state: SessionState) {
        let closed = SessionState::Closed as u8;
        let _ = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current != closed).then_some(state as u8)
            });
    }

    /// Enter `Closed` and send the terminal signal, only the first time.
    fn finish(&self, status_tx: &std_mpsc::Sender<StatusSignal>, signal: StatusSignal) -> bool {
        if self.finished.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.set_state(SessionState::Closed);
        let _ = status_tx.send(signal);
        true
    }

    fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Make the socket reachable by `stop()`.
    ///
    /// Returns `false` without publishing when stop was already requested;
    /// the check happens under the slot lock so a concurrent `stop()` either
    /// sees the handle or is seen here.
    fn publish_socket(&self, stream: &TcpStream) -> Result<bool> {
        let handle = stream
            .try_clone()
            .context("Failed to clone socket handle")?;
        let mut slot = self.socket.lock().unwrap_or_else(PoisonError::into_inner);
        if self.stop_requested() {
            return Ok(false);
        }
        *slot = Some(handle);
        Ok(true)
    }

    /// Shut down and release the published socket, if any. Best effort.
    fn shutdown_socket(&self) {
        let taken = self
            .socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(socket) = taken {
            match socket.shutdown(Shutdown::Both) {
                Ok(()) => log::debug!("[Session] Socket shut down"),
                // Peer already gone
                Err(e) if e.kind() == std::io::ErrorKind::NotConnected => {}
                Err(e) => log::warn!("[Session] Error shutting down socket: {e}"),
            }
        }
    }
}

/// One logical connection to one channel.
///
/// Single use: once stopped or failed, create a new session to reconnect.
pub struct Session {
    channel: Channel,
    credentials: Credentials,
    config: SessionConfig,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    status_tx: Option<std_mpsc::Sender<StatusSignal>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("channel", &self.channel)
            .field("account", &self.credentials.account)
            .field("server_host", &self.config.server_host)
            .field("server_port", &self.config.server_port)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create an idle session. Nothing happens until [`Session::start`].
    pub fn new(channel: Channel, credentials: Credentials, config: SessionConfig) -> Self {
        Self {
            channel,
            credentials,
            config,
            shared: Arc::new(Shared::new()),
            worker: None,
            status_tx: None,
        }
    }

    /// The session's channel.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Current connection state.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Launch the worker thread and return immediately.
    ///
    /// Returns `Ok(false)` if the session was already started or stopped.
    /// Fails only if the thread cannot be spawned.
    pub fn start(
        &mut self,
        sink: ChatSink,
        status_tx: std_mpsc::Sender<StatusSignal>,
    ) -> Result<bool> {
        if self.worker.is_some() || self.shared.stop_requested() {
            log::debug!("[Session] {} already started, ignoring start", self.channel);
            return Ok(false);
        }

        let worker = Worker::new(
            self.channel.clone(),
            self.credentials.clone(),
            self.config.clone(),
            Arc::clone(&self.shared),
            sink,
            status_tx.clone(),
        );
        let handle = thread::Builder::new()
            .name(format!("chat-{}", self.channel.streamer()))
            .spawn(move || worker.run())
            .context("Failed to spawn session worker")?;
        self.worker = Some(handle);
        self.status_tx = Some(status_tx);

        log::info!(
            "[Session] Starting {} as {}",
            self.channel,
            self.credentials.account
        );
        Ok(true)
    }

    /// Stop the session.
    ///
    /// Idempotent and safe in any state, including before `start`. Never
    /// fails: teardown problems are logged. Once connected the worker is
    /// joined; a worker still connecting is released and the session is
    /// `Closed` on return either way.
    pub fn stop(&mut self) {
        let first = !self.shared.stop_requested.swap(true, Ordering::SeqCst);
        if first && self.worker.is_some() {
            log::info!("[Session] Stopping {}", self.channel);
        }

        self.shared.shutdown_socket();

        let Some(handle) = self.worker.take() else {
            return;
        };

        let connecting = matches!(
            self.shared.state(),
            SessionState::Idle | SessionState::Connecting
        );
        if connecting && !handle.is_finished() {
            log::debug!(
                "[Session] Releasing {} worker blocked in connect",
                self.channel
            );
            if let Some(status_tx) = &self.status_tx {
                self.shared.finish(
                    status_tx,
                    StatusSignal::Stopped {
                        channel: self.channel.clone(),
                    },
                );
            }
            return;
        }

        if handle.join().is_err() {
            log::error!("[Session] Worker for {} panicked", self.channel);
            self.shared.set_state(SessionState::Closed);
        }
    }

    /// Whether the worker thread has exited or been released (or was never
    /// started).
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}
