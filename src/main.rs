//! Pedal Bridge
//!
//! Drive SooperLooper from a Behringer FCB1010 foot controller over OSC.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use pedal_bridge::config::{AppConfig, LoggingConfig, Overrides};
use pedal_bridge::controller::{discovery, Fcb1010};
use pedal_bridge::osc::UdpLink;
use pedal_bridge::{Bridge, BridgeEvent};

/// Capacity of the bridge event channel
const EVENT_QUEUE: usize = 1024;

/// Pedal Bridge - control SooperLooper from an FCB1010
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "PEDAL_BRIDGE_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available MIDI ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Controller input port (substring match)
    #[arg(long)]
    midi_in: Option<String>,

    /// Controller output port (substring match)
    #[arg(long)]
    midi_out: Option<String>,

    /// UDP port to receive looper messages on
    #[arg(long)]
    osc_in: Option<u16>,

    /// UDP port of the looper
    #[arg(long)]
    osc_out: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config_found = AppConfig::is_present(&args.config).await;
    let mut config = AppConfig::load(&args.config).await?;
    config.apply(Overrides {
        midi_in: args.midi_in.clone(),
        midi_out: args.midi_out.clone(),
        osc_in: args.osc_in,
        osc_out: args.osc_out,
    });
    config.validate().context("Invalid configuration")?;

    let _log_guard = init_logging(&args.log_level, &config.logging)?;

    if args.list_ports {
        discovery::list_ports_formatted(&config.midi.input_port, &config.midi.output_port)?;
        return Ok(());
    }

    info!("Starting Pedal Bridge v{}...", env!("CARGO_PKG_VERSION"));
    if config_found {
        info!("Configuration file: {}", args.config.display());
    } else {
        info!("No config file at {}, using defaults", args.config.display());
    }
    info!(
        "Looper at {}:{}, listening on {}",
        config.osc.looper_host, config.osc.looper_port, config.osc.listen_port
    );

    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);

    let osc_tx = event_tx.clone();
    let link = UdpLink::new(
        config.osc.looper_host.clone(),
        config.osc.looper_port,
        config.osc.listen_port,
        Arc::new(move |msg| {
            if osc_tx.try_send(BridgeEvent::Osc(msg)).is_err() {
                warn!("Event queue full, dropping OSC message");
            }
        }),
    );

    let midi_tx = event_tx.clone();
    let controller = Fcb1010::new(
        config.midi.input_port.clone(),
        config.midi.output_port.clone(),
        Arc::new(move |data: &[u8]| {
            // Don't block the MIDI thread
            if midi_tx.try_send(BridgeEvent::Controller(data.to_vec())).is_err() {
                warn!("Event queue full, dropping controller input");
            }
        }),
    )?;

    let ticker = tokio::spawn(run_ticker(event_tx, Duration::from_millis(config.bridge.tick_ms)));

    let bridge = Bridge::new(link, controller, &config);
    run_bridge(bridge, event_rx, shutdown_signal()).await;

    ticker.abort();
    info!("Pedal Bridge shutdown complete");
    Ok(())
}

/// Feed periodic ticks into the event queue
async fn run_ticker(tx: mpsc::Sender<BridgeEvent>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        if tx.send(BridgeEvent::Tick).await.is_err() {
            debug!("Event queue closed, stopping ticker");
            break;
        }
    }
}

async fn run_bridge<L, C>(
    mut bridge: Bridge<L, C>,
    mut events: mpsc::Receiver<BridgeEvent>,
    shutdown: impl std::future::Future<Output = ()>,
) where
    L: pedal_bridge::osc::LooperLink,
    C: pedal_bridge::controller::ControllerPort,
{
    info!("Ready to process pedal events!");

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                bridge.handle(event);
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping event loop");
                break;
            }
        }
    }

    bridge.shutdown();
}

fn init_logging(level: &str, config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let console = if config.json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    let (file, guard) = match &config.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "pedal-bridge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
