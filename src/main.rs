use color_eyre::{eyre::eyre, Result};
use sipmq::bridge::BridgeHandle;
use sipmq::config::BridgeConfig;
use sipmq::host::{CommandError, CommandProcessor, HostEvent};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Demo command interface standing in for a real softphone core.
struct PhoneStatus {
    started: Instant,
}

impl PhoneStatus {
    fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl CommandProcessor for PhoneStatus {
    fn execute(&mut self, command_line: &[u8]) -> Result<Vec<u8>, CommandError> {
        match command_line {
            b"status" => Ok(b"registered, no active calls".to_vec()),
            b"uptime" => Ok(format!("up {}s", self.started.elapsed().as_secs()).into_bytes()),
            other => Err(CommandError::UnknownCommand(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = BridgeConfig::load_or_default().await;
    info!(
        "bridging softphone events to {}:{} on topic {}",
        config.broker_host, config.broker_port, config.topic
    );

    let (events, events_rx) = mpsc::channel(100);
    let mut bridge = BridgeHandle::spawn(config, events_rx, Box::new(PhoneStatus::new()))
        .await
        .map_err(|e| eyre!("Failed to start bridge: {}", e))?;

    let _feed = tokio::spawn(async move {
        demo_event_feed(events).await;
    });

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");

    bridge
        .shutdown()
        .await
        .map_err(|e| eyre!("Bridge shutdown failed: {}", e))?;
    Ok(())
}

/// Emits a handful of softphone-style events so the bridge has something
/// to publish when run against a local broker.
async fn demo_event_feed(events: mpsc::Sender<HostEvent>) {
    let samples = [
        ("register", "registered with sip provider"),
        ("call-incoming", "incoming call from <sip:alice@example.net>"),
        ("call-established", "call established"),
        ("call-closed", "call closed"),
    ];

    for (kind, text) in samples {
        if events.send(HostEvent::new(kind, text)).await.is_err() {
            break;
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    info!("demo event feed finished");
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
