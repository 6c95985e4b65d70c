//! Command-line front end for the frame relay.
//!
//! Reads frames from a file, relays them to a UDP, TCP or RTMP target
//! and prints status events as they arrive.

mod args;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{info, warn};

use relay_engine::{RelayConfig, StreamController};
use relay_feed::{FileFeed, FrameSource, VideoFeed};
use relay_ipc::{RelayCommand, RelayEvent, RelayState};

use crate::args::{Args, USAGE};

const START_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = run(&args) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(raw: &[String]) -> Result<()> {
    let args = Args::parse(raw).map_err(|e| anyhow!("{e}\n\n{USAGE}"))?;
    if args.help {
        println!("{USAGE}");
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };
    if let Some(chunk_size) = args.chunk_size {
        config.feed.chunk_size = chunk_size;
    }
    if let Some(interval_ms) = args.interval_ms {
        config.feed.interval_ms = interval_ms;
    }
    config.feed.looping |= args.looping;

    let (Some(target), Some(input)) = (args.target, args.input) else {
        bail!("{USAGE}");
    };

    info!(%target, input = %input.display(), "Starting frame relay");

    let feed = Arc::new(VideoFeed::new());
    let mut file_feed = FileFeed::open(&input, Arc::clone(&feed), config.feed.clone())
        .with_context(|| format!("failed to open {}", input.display()))?;

    // Create IPC channels
    let (command_tx, command_rx) = relay_ipc::command_channel();
    let (event_tx, event_rx) = relay_ipc::event_channel();

    // Spawn controller thread
    let source: Arc<dyn FrameSource> = feed.clone();
    let controller = thread::Builder::new()
        .name("relay-controller".to_string())
        .spawn(move || {
            info!("Controller thread starting");
            let mut controller = StreamController::new(command_rx, event_tx, source, config);
            controller.run();
            info!("Controller thread stopped");
        })
        .context("failed to spawn controller thread")?;

    command_tx
        .send(RelayCommand::Start { target })
        .context("controller is not running")?;
    wait_until_active(&event_rx)?;

    file_feed.start().context("failed to start file feed")?;
    while file_feed.is_running() {
        drain_events(&event_rx, Duration::from_millis(100));
    }
    let delivered = file_feed.wait().context("file feed failed")?;
    info!(delivered, "Input finished");

    command_tx.send(RelayCommand::GetMetrics).ok();
    command_tx.send(RelayCommand::Stop).ok();
    command_tx.send(RelayCommand::Shutdown).ok();
    wait_for_shutdown(&event_rx);

    feed.close();
    if controller.join().is_err() {
        warn!("Controller thread panicked");
    }
    Ok(())
}

fn load_config(path: &Path) -> Result<RelayConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

/// Print events until the relay goes active or the start is refused.
fn wait_until_active(events: &Receiver<RelayEvent>) -> Result<()> {
    let deadline = Instant::now() + START_TIMEOUT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let event = match events.recv_timeout(remaining) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => bail!("timed out waiting for the relay to start"),
            Err(RecvTimeoutError::Disconnected) => bail!("controller exited during start"),
        };
        print_event(&event);

        match event {
            RelayEvent::StateChanged {
                current: RelayState::Active,
                ..
            } => return Ok(()),
            RelayEvent::Error { message } => bail!("relay did not start: {message}"),
            _ => {}
        }
    }
}

fn drain_events(events: &Receiver<RelayEvent>, timeout: Duration) {
    if let Ok(event) = events.recv_timeout(timeout) {
        print_event(&event);
        for event in events.try_iter() {
            print_event(&event);
        }
    }
}

fn wait_for_shutdown(events: &Receiver<RelayEvent>) {
    let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(RelayEvent::Shutdown) => {
                print_event(&RelayEvent::Shutdown);
                return;
            }
            Ok(event) => print_event(&event),
            Err(_) => {
                warn!("Controller did not confirm shutdown");
                return;
            }
        }
    }
}

fn print_event(event: &RelayEvent) {
    println!("{}", event.status_message());
}
