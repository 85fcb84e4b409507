//! Session worker: connect, handshake, receive loop, teardown.
//!
//! Runs on the session's dedicated thread. The only blocking point is the
//! socket read; everything done per chunk (PONG, decode, append) is
//! synchronous and short.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

use super::{SessionConfig, SessionState, Shared, StatusSignal};
use crate::channel::Channel;
use crate::constants::READ_BUFFER_SIZE;
use crate::credentials::Credentials;
use crate::decoder::decode;
use crate::protocol::{classify, Command, Line, LineDecoder};
use crate::sink::ChatSink;

/// Everything the worker thread owns.
pub(super) struct Worker {
    channel: Channel,
    credentials: Credentials,
    config: SessionConfig,
    shared: Arc<Shared>,
    sink: ChatSink,
    status_tx: std_mpsc::Sender<StatusSignal>,
}

impl Worker {
    pub(super) fn new(
        channel: Channel,
        credentials: Credentials,
        config: SessionConfig,
        shared: Arc<Shared>,
        sink: ChatSink,
        status_tx: std_mpsc::Sender<StatusSignal>,
    ) -> Self {
        Self {
            channel,
            credentials,
            config,
            shared,
            sink,
            status_tx,
        }
    }

    /// Thread entry point. Always ends in `Closed`; the terminal signal is
    /// skipped if `stop()` already sent one for a released worker.
    pub(super) fn run(mut self) {
        let outcome = self.connect_and_stream();

        self.shared.set_state(SessionState::Closing);
        self.shared.shutdown_socket();

        let signal = match outcome {
            Ok(()) => {
                log::info!(
                    "[Session] {} stopped ({} messages logged)",
                    self.channel,
                    self.sink.persisted()
                );
                StatusSignal::Stopped {
                    channel: self.channel.clone(),
                }
            }
            Err(e) => {
                log::error!("[Session] {} failed: {e:#}", self.channel);
                StatusSignal::Failed {
                    channel: self.channel.clone(),
                    reason: format!("{e:#}"),
                }
            }
        };

        self.shared.finish(&self.status_tx, signal);
    }

    fn connect_and_stream(&mut self) -> Result<()> {
        self.shared.set_state(SessionState::Connecting);
        let mut stream = match self.connect() {
            Ok(Some(stream)) => stream,
            Ok(None) => {
                log::debug!("[Session] Stop requested before connecting to {}", self.channel);
                return Ok(());
            }
            Err(e) => return self.unless_stopping(e),
        };

        if !self.shared.publish_socket(&stream)? {
            log::debug!("[Session] Stop requested while connecting to {}", self.channel);
            return Ok(());
        }

        self.shared.set_state(SessionState::Authenticating);
        if let Err(e) = handshake(
            &mut stream,
            &self.credentials,
            &self.channel,
            self.config.command_delay,
        ) {
            return self.unless_stopping(e);
        }

        self.shared.set_state(SessionState::Streaming);
        log::info!("[Session] Joined {}", self.channel);
        let _ = self.status_tx.send(StatusSignal::Started {
            channel: self.channel.clone(),
        });

        self.receive_loop(&mut stream)
    }

    /// Resolve the server and connect to the first address that answers.
    ///
    /// Returns `None` once stop is requested; the flag is checked before
    /// every attempt.
    fn connect(&self) -> Result<Option<TcpStream>> {
        let host = self.config.server_host.as_str();
        let port = self.config.server_port;
        log::info!("[Session] Connecting to {host}:{port}");

        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .with_context(|| format!("Failed to resolve {host}:{port}"))?
            .collect();

        let mut last_error = None;
        for addr in addrs {
            if self.shared.stop_requested() {
                return Ok(None);
            }
            match TcpStream::connect_timeout(&addr, self.config.connect_timeout) {
                Ok(stream) => return Ok(Some(stream)),
                Err(e) => {
                    log::debug!("[Session] Connect to {addr} failed: {e}");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e).with_context(|| format!("Failed to connect to {host}:{port}")),
            None => bail!("{host}:{port} resolved to no addresses"),
        }
    }

    /// Read until stop, EOF, or a socket error.
    fn receive_loop(&mut self, stream: &mut TcpStream) -> Result<()> {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        let mut decoder = LineDecoder::new();

        loop {
            if self.shared.stop_requested() {
                return Ok(());
            }

            let n = match stream.read(&mut buf) {
                Ok(0) => {
                    return self.unless_stopping(anyhow!("connection closed by server"));
                }
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return self.unless_stopping(anyhow::Error::new(e).context("Socket read failed"));
                }
            };

            let lines = decoder.feed(&buf[..n]);
            if let Err(e) = process_chunk(stream, &lines, &self.channel, &mut self.sink) {
                return self.unless_stopping(e);
            }
        }
    }

    /// Socket errors caused by our own shutdown are a clean stop.
    fn unless_stopping(&self, error: anyhow::Error) -> Result<()> {
        if self.shared.stop_requested() {
            log::debug!("[Session] Ignoring error during stop: {error:#}");
            Ok(())
        } else {
            Err(error)
        }
    }
}

/// Send `PASS`, `NICK`, `JOIN` in order without waiting for replies.
pub(super) fn handshake<W: Write>(
    writer: &mut W,
    credentials: &Credentials,
    channel: &Channel,
    command_delay: Duration,
) -> Result<()> {
    let join_target = channel.irc_name();
    let commands = [
        Command::Pass(credentials.token.expose()),
        Command::Nick(&credentials.account),
        Command::Join(&join_target),
    ];

    for (i, command) in commands.iter().enumerate() {
        if i > 0 && !command_delay.is_zero() {
            thread::sleep(command_delay);
        }
        writer
            .write_all(&command.encode())
            .with_context(|| format!("Failed to send {command}"))?;
        log::debug!("[Session] > {command}");
    }
    writer.flush().context("Failed to flush handshake")?;
    Ok(())
}

/// What one chunk produced.
#[derive(Debug, Default, PartialEq, Eq)]
pub(super) struct ChunkOutcome {
    pub(super) pongs: usize,
    pub(super) messages: usize,
}

/// Handle the lines completed by one read.
///
/// Every PING of the chunk is answered before any chat line of the same
/// chunk is decoded, so keep-alive replies are never delayed by disk I/O.
/// Chat lines are then decoded and persisted in arrival order.
pub(super) fn process_chunk<W: Write>(
    writer: &mut W,
    lines: &[String],
    channel: &Channel,
    sink: &mut ChatSink,
) -> Result<ChunkOutcome> {
    let mut outcome = ChunkOutcome::default();

    for line in lines {
        if let Line::Ping { argument } = classify(line) {
            let pong = Command::Pong(argument);
            writer
                .write_all(&pong.encode())
                .with_context(|| format!("Failed to send {pong}"))?;
            outcome.pongs += 1;
        }
    }
    if outcome.pongs > 0 {
        writer.flush().context("Failed to flush PONG")?;
        log::debug!("[Session] Answered {} PING(s)", outcome.pongs);
    }

    for line in lines {
        match classify(line) {
            Line::ChatMessage(raw) => {
                if let Some(event) = decode(channel, raw) {
                    sink.persist(event);
                    outcome.messages += 1;
                }
            }
            Line::Other(raw) => log::trace!("[Session] < {raw}"),
            Line::Ping { .. } => {}
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::AccessToken;
    use crate::sink::delivery_queue;
    use tempfile::TempDir;

    fn foo() -> Channel {
        Channel::new("foo").unwrap()
    }

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| (*s).to_string()).collect()
    }

    /// Writer that fails every write.
    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(ErrorKind::BrokenPipe, "broken pipe"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_handshake_order() {
        let creds = Credentials::new("alice", AccessToken::new("oauth:abc"));
        let mut out = Vec::new();
        handshake(&mut out, &creds, &foo(), Duration::ZERO).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "PASS oauth:abc\r\nNICK alice\r\nJOIN #foo\r\n"
        );
    }

    #[test]
    fn test_handshake_write_error() {
        let creds = Credentials::new("alice", AccessToken::new("oauth:abc"));
        let err = handshake(&mut BrokenPipe, &creds, &foo(), Duration::ZERO).unwrap_err();
        let text = format!("{err:#}");
        assert!(text.contains("PASS [REDACTED]"));
        assert!(!text.contains("oauth:abc"));
    }

    #[test]
    fn test_ping_gets_exactly_one_pong() {
        let temp = TempDir::new().unwrap();
        let (queue, receiver) = delivery_queue(8);
        let mut sink = ChatSink::new(temp.path(), &foo()).with_queue(queue);
        let mut out = Vec::new();

        let outcome =
            process_chunk(&mut out, &lines(&["PING :tmi.twitch.tv"]), &foo(), &mut sink).unwrap();

        assert_eq!(outcome, ChunkOutcome { pongs: 1, messages: 0 });
        assert_eq!(String::from_utf8(out).unwrap(), "PONG :tmi.twitch.tv\r\n");
        assert!(receiver.drain().is_empty());
        assert!(!sink.log_path().exists());
    }

    #[test]
    fn test_pong_precedes_chat_in_same_chunk() {
        let temp = TempDir::new().unwrap();
        let (queue, receiver) = delivery_queue(8);
        let mut sink = ChatSink::new(temp.path(), &foo()).with_queue(queue);
        let mut out = Vec::new();

        let chunk = lines(&[
            ":alice!alice@alice.tmi.twitch.tv PRIVMSG #foo :first",
            "PING",
            ":bob!bob@bob.tmi.twitch.tv PRIVMSG #foo :second",
        ]);
        let outcome = process_chunk(&mut out, &chunk, &foo(), &mut sink).unwrap();

        assert_eq!(outcome, ChunkOutcome { pongs: 1, messages: 2 });
        assert_eq!(out, b"PONG\r\n");
        let order: Vec<_> = receiver.drain().into_iter().map(|e| e.message).collect();
        assert_eq!(order, vec!["first", "second"]);
    }

    #[test]
    fn test_other_lines_are_ignored() {
        let temp = TempDir::new().unwrap();
        let mut sink = ChatSink::new(temp.path(), &foo());
        let mut out = Vec::new();

        let chunk = lines(&[
            ":tmi.twitch.tv 001 alice :Welcome, GLHF!",
            ":alice!alice@alice.tmi.twitch.tv JOIN #foo",
        ]);
        let outcome = process_chunk(&mut out, &chunk, &foo(), &mut sink).unwrap();

        assert_eq!(outcome, ChunkOutcome::default());
        assert!(out.is_empty());
    }

    #[test]
    fn test_malformed_chat_line_is_dropped() {
        let temp = TempDir::new().unwrap();
        let mut sink = ChatSink::new(temp.path(), &foo());
        let mut out = Vec::new();

        let outcome =
            process_chunk(&mut out, &lines(&["PRIVMSG no colons"]), &foo(), &mut sink).unwrap();
        assert_eq!(outcome.messages, 0);
        assert_eq!(sink.persisted(), 0);
    }

    #[test]
    fn test_pong_write_failure_is_fatal() {
        let temp = TempDir::new().unwrap();
        let mut sink = ChatSink::new(temp.path(), &foo());
        let result = process_chunk(&mut BrokenPipe, &lines(&["PING"]), &foo(), &mut sink);
        assert!(result.is_err());
    }
}
