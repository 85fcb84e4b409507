//! chatlog CLI - records a Twitch channel's chat to CSV.
//!
//! This is the main binary entry point and a reference controller for the
//! `chatlog` library.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chatlog::constants::DISPLAY_POLL_INTERVAL;
use chatlog::env::Environment;
use chatlog::{Backoff, Channel, ChatEvent, Config, Controller, StartError, StatusSignal};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Global flag for signal-triggered shutdown (as Arc for signal-hook compatibility)
static SHUTDOWN_FLAG: std::sync::LazyLock<Arc<AtomicBool>> =
    std::sync::LazyLock::new(|| Arc::new(AtomicBool::new(false)));

// CLI
#[derive(Parser)]
#[command(name = "chatlog")]
#[command(version = VERSION)]
#[command(about = "Record a Twitch channel's chat to a CSV log")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join a channel and log its chat until interrupted
    Watch {
        /// Streamer whose channel to join
        streamer: String,
        /// Account to log in as (defaults to the configured account)
        #[arg(long)]
        account: Option<String>,
        /// Print events as JSON lines instead of text
        #[arg(long)]
        json: bool,
        /// Start a new session with backoff when the connection fails
        #[arg(long)]
        reconnect: bool,
    },
    /// Show the config, or set one key
    Config {
        key: Option<String>,
        value: Option<String>,
    },
    /// Print the CSV log path for a channel
    LogPath {
        /// Streamer name
        streamer: String,
    },
}

/// Runs one channel until a signal arrives or the session ends for good.
fn run_watch(streamer: &str, account: Option<String>, json: bool, reconnect: bool) -> Result<()> {
    let mut config = Config::load()?;
    config.reconnect |= reconnect;
    let account = account.or_else(|| config.account.clone()).unwrap_or_default();
    let Some(token) = config.token.clone() else {
        anyhow::bail!("Missing information: token (set CHATLOG_TOKEN)");
    };

    // Set up signal handlers
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::flag;
    flag::register(SIGINT, Arc::clone(&SHUTDOWN_FLAG))?;
    flag::register(SIGTERM, Arc::clone(&SHUTDOWN_FLAG))?;
    flag::register(SIGHUP, Arc::clone(&SHUTDOWN_FLAG))?;

    let reconnect = config.reconnect;
    let mut controller = Controller::new(config);
    match controller.start_session(streamer, &account, token.clone()) {
        Ok(()) => {}
        Err(StartError::MissingInformation(fields)) => {
            anyhow::bail!("Missing information: {}", fields.join(", "));
        }
        Err(e) => return Err(e.into()),
    }

    if let Some(channel) = controller.channel() {
        eprintln!(
            "Logging {} to {}",
            channel,
            controller.log_path(channel).display()
        );
    }
    log::info!(
        "chatlog v{} ({}) watching {}",
        VERSION,
        Environment::current(),
        streamer
    );

    let mut backoff = Backoff::default();
    let mut retry_at: Option<Instant> = None;
    let mut failure: Option<String> = None;

    while !SHUTDOWN_FLAG.load(Ordering::Relaxed) {
        print_events(&controller.drain_events(), json)?;

        for signal in controller.drain_status() {
            match signal {
                StatusSignal::Started { channel } => {
                    backoff.record_success();
                    eprintln!("Joined {channel}");
                }
                StatusSignal::Stopped { .. } => {
                    SHUTDOWN_FLAG.store(true, Ordering::Relaxed);
                }
                StatusSignal::Failed { channel, reason } if reconnect => {
                    backoff.record_failure();
                    let delay = backoff.current_delay();
                    eprintln!("{channel}: {reason}; reconnecting in {}s", delay.as_secs());
                    retry_at = Some(Instant::now() + delay);
                }
                StatusSignal::Failed { channel, reason } => {
                    failure = Some(format!("{channel}: {reason}"));
                    SHUTDOWN_FLAG.store(true, Ordering::Relaxed);
                }
            }
        }

        if retry_at.is_some_and(|at| Instant::now() >= at) {
            retry_at = None;
            log::info!("Reconnecting to {streamer}");
            controller.start_session(streamer, &account, token.clone())?;
        }

        std::thread::sleep(DISPLAY_POLL_INTERVAL);
    }

    controller.stop_session();
    print_events(&controller.drain_events(), json)?;
    if controller.dropped_events() > 0 {
        log::warn!(
            "{} events were logged but not displayed",
            controller.dropped_events()
        );
    }

    match failure {
        Some(reason) => anyhow::bail!("Session failed: {reason}"),
        None => Ok(()),
    }
}

fn print_events(events: &[ChatEvent], json: bool) -> Result<()> {
    for event in events {
        if json {
            println!("{}", serde_json::to_string(event)?);
        } else {
            println!(
                "[{}] {}: {}",
                event.formatted_time(),
                event.username,
                event.message
            );
        }
    }
    Ok(())
}

fn init_logging() -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();

    // CHATLOG_LOG_FILE sends logs to a file instead of stderr
    if let Ok(path) = std::env::var("CHATLOG_LOG_FILE") {
        let log_file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file at {path}"))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }

    builder.init();
    Ok(())
}

fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch {
            streamer,
            account,
            json,
            reconnect,
        } => {
            run_watch(&streamer, account, json, reconnect)?;
        }
        Commands::Config { key, value } => {
            let mut config = Config::load()?;
            match (key, value) {
                (None, _) => println!("{}", serde_json::to_string_pretty(&config)?),
                (Some(k), None) => {
                    let json = serde_json::to_value(&config)?;
                    match json.get(&k) {
                        Some(v) => println!("{v}"),
                        None => anyhow::bail!("Unknown config key: {k}"),
                    }
                }
                (Some(k), Some(v)) => {
                    config.set(&k, &v)?;
                    config.save()?;
                    println!("Set {k} = {v}");
                }
            }
        }
        Commands::LogPath { streamer } => {
            let config = Config::load()?;
            let channel = Channel::new(&streamer)?;
            println!(
                "{}",
                chatlog::sink::log_path(&config.log_dir, &channel).display()
            );
        }
    }

    Ok(())
}
