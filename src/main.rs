//! # Tactical Radio - Main Application Entry Point
//!
//! Console front panel for the push-to-talk radio client.
//!
//! ## Key Rust Concepts Used:
//! - **async/await**: capture, playback timers, the transport and the console
//!   all run as tasks on one tokio runtime
//! - **channels**: every input becomes a `ControllerEvent` on one queue
//! - **watch**: status changes are broadcast to the logger task
//!
//! ## Console Keys:
//! - `c` connect, `d` disconnect
//! - `t` press talk, `r` release talk
//! - `n` next channel, `ch <N>` pick channel N, `v <0-100>` volume
//! - `q` quit, `h` help

use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tactical_radio::config::AppConfig;
use tactical_radio::device;
use tactical_radio::radio::controller::SessionController;
use tactical_radio::radio::events::{self, ControllerEvent, EventSender};
use tactical_radio::radio::status::RadioStatus;
use tactical_radio::transport::live::LiveTransport;

const HELP: &str = "keys: c connect | d disconnect | t talk | r release | n next channel | ch <N> channel | v <0-100> volume | q quit";

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from radio.toml and environment variables
/// 2. **Sets up logging**
/// 3. **Builds the controller** with the audio host and live transport
/// 4. **Wires inputs**: console keys and shutdown signals become events
/// 5. **Runs the controller** until `q` or a signal
#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    dotenv::dotenv().ok();

    init_tracing()?;

    // TLS for wss:// links; fails only if a provider is already installed
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting tactical-radio v{}", env!("CARGO_PKG_VERSION"));
    info!(
        endpoint = %config.transport.endpoint,
        channels = config.channels.len(),
        volume = config.audio.volume,
        "Configuration loaded"
    );
    if config.transport.api_key.is_empty() {
        warn!("No service credential set (GEMINI_API_KEY or API_KEY)");
    }

    let (sender, receiver) = events::channel();
    let controller = SessionController::new(
        config,
        device::default_host(),
        Arc::new(LiveTransport::new()),
        sender.clone(),
    );

    spawn_status_logger(controller.subscribe());
    setup_signal_handlers(sender.clone());
    spawn_console(sender);

    println!("{}", HELP);
    controller.run(receiver).await;

    info!("Radio stopped");
    Ok(())
}

/// Initialize the tracing (logging) system.
///
/// ## Environment Variables:
/// - `RUST_LOG`: Controls what gets logged (e.g., "info", "tactical_radio=trace")
/// - If not set, defaults to "tactical_radio=debug"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tactical_radio=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Turn SIGTERM / SIGINT into a `Shutdown` event.
fn setup_signal_handlers(events: EventSender) {
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }

        let _ = events.send(ControllerEvent::Shutdown);
    });
}

/// Read console lines and forward them as controller events.
fn spawn_console(events: EventSender) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match parse_command(&line) {
                    Some(event) => {
                        if events.send(event).is_err() {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => println!("{}", HELP),
                },
                Ok(None) => {
                    info!("Console closed; use a signal to stop");
                    break;
                }
                Err(e) => {
                    error!("Console read failed: {}", e);
                    break;
                }
            }
        }
    });
}

fn spawn_status_logger(mut status: watch::Receiver<RadioStatus>) {
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let snapshot = status.borrow_and_update().clone();
            info!("{}", snapshot);
        }
    });
}

/// Map one console line to an event.
fn parse_command(line: &str) -> Option<ControllerEvent> {
    let mut words = line.split_whitespace();
    let command = words.next()?.to_ascii_lowercase();

    match command.as_str() {
        "c" | "connect" => Some(ControllerEvent::Connect),
        "d" | "disconnect" => Some(ControllerEvent::Disconnect),
        "t" | "talk" => Some(ControllerEvent::TalkPressed),
        "r" | "release" => Some(ControllerEvent::TalkReleased),
        "n" | "next" => Some(ControllerEvent::NextChannel),
        "ch" | "channel" => {
            // Channels are numbered from 1 on the panel
            let number: usize = words.next()?.parse().ok()?;
            number.checked_sub(1).map(ControllerEvent::SelectChannel)
        }
        "v" | "volume" => {
            let percent: u32 = words.next()?.parse().ok()?;
            Some(ControllerEvent::SetVolume(percent.min(100) as u8))
        }
        "q" | "quit" => Some(ControllerEvent::Shutdown),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_keys() {
        assert!(matches!(parse_command("c"), Some(ControllerEvent::Connect)));
        assert!(matches!(parse_command(" T "), Some(ControllerEvent::TalkPressed)));
        assert!(matches!(parse_command("release"), Some(ControllerEvent::TalkReleased)));
        assert!(matches!(parse_command("q"), Some(ControllerEvent::Shutdown)));
        assert!(parse_command("").is_none());
        assert!(parse_command("x").is_none());
    }

    #[test]
    fn test_parse_volume_and_channel() {
        assert!(matches!(parse_command("v 40"), Some(ControllerEvent::SetVolume(40))));
        assert!(matches!(parse_command("v 400"), Some(ControllerEvent::SetVolume(100))));
        assert!(parse_command("v loud").is_none());
        assert!(matches!(parse_command("ch 2"), Some(ControllerEvent::SelectChannel(1))));
        assert!(parse_command("ch 0").is_none());
    }
}
