//! Synheart Stress Agent CLI
//!
//! Real-time heart-rate stress pipeline.

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use synheart_stress_agent::{
    clock::system_clock,
    config::Config,
    gateway::SessionUpload,
    source::{
        decode_measurement, Mode, NoopAdapter, SensorSource, SharedSource, SimMode,
        SyntheticSource,
    },
    stats::create_stats,
    store::{StressEvent, StressStore},
    StreamArbitrator, VERSION, WELLNESS_DISCLAIMER,
};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "synheart-stress")]
#[command(author = "Synheart")]
#[command(version = VERSION)]
#[command(about = "Real-time heart-rate stress pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a stress session
    Run {
        /// Source mode (sensor-only, synthetic-only, merge, auto)
        #[arg(long)]
        mode: Option<Mode>,

        /// Synthetic scenario (calm, normal, stressed, recovery)
        #[arg(long)]
        sim_mode: Option<SimMode>,

        /// Stop after this many seconds (default: until Ctrl+C)
        #[arg(long)]
        duration: Option<u64>,

        /// Collector base URL for session upload (requires gateway feature)
        #[arg(long)]
        gateway_url: Option<String>,

        /// Bearer token for the collector
        #[arg(long)]
        gateway_token: Option<String>,

        /// Upload interval in seconds
        #[arg(long)]
        sync_interval: Option<u64>,

        /// Export the session log as JSON when the session ends
        #[arg(long)]
        export: bool,
    },

    /// Decode a heart-rate measurement payload given as hex
    Decode {
        /// Payload bytes, e.g. 104BE803
        hex: String,
    },

    /// Show configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        init: bool,
    },

    /// Display wellness disclaimer
    Disclaimer,
}

struct RunOptions {
    mode: Option<Mode>,
    sim_mode: Option<SimMode>,
    duration: Option<u64>,
    gateway_url: Option<String>,
    gateway_token: Option<String>,
    sync_interval: Option<u64>,
    export: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            mode,
            sim_mode,
            duration,
            gateway_url,
            gateway_token,
            sync_interval,
            export,
        } => {
            cmd_run(RunOptions {
                mode,
                sim_mode,
                duration,
                gateway_url,
                gateway_token,
                sync_interval,
                export,
            })
            .await
        }
        Commands::Decode { hex } => cmd_decode(&hex),
        Commands::Config { init } => cmd_config(init),
        Commands::Disclaimer => {
            cmd_disclaimer();
            Ok(())
        }
    }
}

async fn cmd_run(options: RunOptions) -> anyhow::Result<()> {
    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config, using defaults: {e}");
        Config::default()
    });
    if let Some(mode) = options.mode {
        config.source_mode = mode;
    }
    if let Some(sim_mode) = options.sim_mode {
        config.sim_mode = sim_mode;
    }
    if let Some(secs) = options.sync_interval {
        config.upload_interval = Duration::from_secs(secs.max(1));
    }

    println!("Synheart Stress Agent v{VERSION}");
    println!();
    println!("Starting session...");
    println!("  Source mode: {}", config.source_mode);
    println!("  Synthetic scenario: {}", config.sim_mode);
    println!("  Sensor fallback after: {}ms", config.fallback_after_ms);
    println!("  Spike warm-up: {}ms", config.warmup_ms);

    let clock = system_clock();
    let stats = create_stats();

    // No radio backend is linked in; the sensor source scans on a link that
    // never finds a device, so auto mode falls back to synthetic data.
    let sensor: SharedSource = Arc::new(SensorSource::new(
        Arc::new(NoopAdapter),
        config.sensor.clone(),
        clock.clone(),
    ));
    let synthetic: SharedSource = Arc::new(SyntheticSource::fixed(
        config.sim_mode,
        config.synthetic_seed,
        clock.clone(),
    ));

    let (_mode_tx, mode_rx) = watch::channel(config.source_mode);
    let arbitrator = StreamArbitrator::new(
        Some(sensor),
        Some(synthetic),
        mode_rx,
        config.fallback_after_ms,
    );

    let store = Arc::new(StressStore::new(
        arbitrator,
        config.store_config(),
        clock.clone(),
        stats.clone(),
    ));

    let uploads = CancellationToken::new();
    let uploader = start_uploader(&options, &config, &store, &clock, &uploads).await;

    println!();
    match options.duration {
        Some(secs) => println!("Running for {secs}s (Ctrl+C to stop early)"),
        None => println!("Press Ctrl+C to stop"),
    }
    println!();

    let display = tokio::spawn(show_live(store.state(), store.subscribe_events()));

    store.set_logged_in(true);
    store.set_app_opened(true);
    if !store.try_start() {
        anyhow::bail!("session did not start");
    }

    let stop_after = options.duration.map(Duration::from_secs);
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Error waiting for Ctrl+C")?;
            println!();
            println!("Stopping...");
        }
        _ = async {
            match stop_after {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending().await,
            }
        } => {
            println!();
            println!("Duration reached, stopping...");
        }
    }

    store.shutdown().await;
    uploads.cancel();
    display.abort();

    if let Some(uploader) = uploader {
        uploader.finish(&store, &clock).await;
    }

    let summary = store.summary();
    println!();
    println!("Session Summary:");
    println!("  - Samples: {}", store.session_log().len());
    println!("  - Average heart rate: {:.1} bpm", summary.avg_hr);
    println!("  - Average stress: {:.1}", summary.avg_stress);
    println!("  - Average RMSSD: {:.1} ms", summary.avg_rmssd);
    println!("  - Peak stress: {:.0}", summary.max_stress);

    if options.export {
        export_session(&config, &store, clock.now_ms());
    }

    println!();
    println!("{}", stats.summary());
    Ok(())
}

async fn show_live(
    mut state: watch::Receiver<synheart_stress_agent::DerivedState>,
    mut events: broadcast::Receiver<StressEvent>,
) {
    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let s = state.borrow_and_update().clone();
                let hr = s
                    .heart_rate_bpm
                    .map(|hr| hr.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let hrv = s
                    .hrv
                    .map(|v| format!("{v:.1}ms"))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "[{}] hr: {} | rmssd: {} | stress: {} (conf {:.2})",
                    s.source, hr, hrv, s.stress_score, s.confidence
                );
            }
            event = events.recv() => match event {
                Ok(StressEvent::TriggerBreathing { confidence, diagnostic, .. }) => {
                    println!();
                    println!(">>> Stress spike: time for a breathing exercise (confidence {confidence:.2})");
                    println!("    {diagnostic}");
                    println!();
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::debug!("Missed {} breathing triggers", missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

fn export_session(config: &Config, store: &StressStore, now_ms: i64) {
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let export = SessionUpload {
        started_at_ms: store.session_started_at(),
        ended_at_ms: now_ms,
        samples: store.session_log(),
        summary: store.summary(),
    };
    let path = config.export_path.join(format!(
        "session_{}.json",
        Utc::now().format("%Y%m%d_%H%M%S")
    ));

    match serde_json::to_string_pretty(&export) {
        Ok(json) => match std::fs::write(&path, json) {
            Ok(()) => println!("Exported session to {path:?}"),
            Err(e) => eprintln!("Error writing export: {e}"),
        },
        Err(e) => eprintln!("Error serializing: {e}"),
    }
}

#[cfg(feature = "gateway")]
struct Uploader {
    client: Arc<synheart_stress_agent::GatewayClient>,
    task: tokio::task::JoinHandle<u64>,
}

#[cfg(feature = "gateway")]
impl Uploader {
    async fn finish(self, store: &StressStore, clock: &synheart_stress_agent::SharedClock) {
        match self.task.await {
            Ok(delivered) => println!("Uploaded {delivered} batch(es) during the session"),
            Err(e) => eprintln!("Warning: Upload task failed: {e}"),
        }
        match synheart_stress_agent::gateway::final_flush(store, self.client.as_ref(), clock).await
        {
            Ok(upload) => println!("Final upload: {} sample(s)", upload.samples.len()),
            Err(e) => eprintln!("Warning: Final upload failed: {e}"),
        }
    }
}

#[cfg(feature = "gateway")]
async fn start_uploader(
    options: &RunOptions,
    config: &Config,
    store: &Arc<StressStore>,
    clock: &synheart_stress_agent::SharedClock,
    cancel: &CancellationToken,
) -> Option<Uploader> {
    use synheart_stress_agent::{gateway::run_uploader, GatewayClient, GatewayConfig};

    let url = options.gateway_url.as_ref()?;
    let token = options.gateway_token.clone().unwrap_or_default();

    let client = match GatewayClient::new(GatewayConfig::new(url.as_str(), token)) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            eprintln!("Warning: Gateway initialization failed: {e}");
            eprintln!("Continuing without upload.");
            return None;
        }
    };

    println!(
        "  Upload: enabled (interval: {}s)",
        config.upload_interval.as_secs()
    );
    match client.ping().await {
        Ok(true) => println!("  Collector connection: OK"),
        Ok(false) => eprintln!("Warning: Collector health check failed"),
        Err(e) => eprintln!("Warning: Could not reach collector: {e}"),
    }

    let task = tokio::spawn(run_uploader(
        Arc::clone(store),
        client.clone(),
        clock.clone(),
        config.upload_interval,
        cancel.clone(),
    ));

    Some(Uploader { client, task })
}

#[cfg(not(feature = "gateway"))]
struct Uploader;

#[cfg(not(feature = "gateway"))]
impl Uploader {
    async fn finish(self, _store: &StressStore, _clock: &synheart_stress_agent::SharedClock) {}
}

#[cfg(not(feature = "gateway"))]
async fn start_uploader(
    options: &RunOptions,
    _config: &Config,
    _store: &Arc<StressStore>,
    _clock: &synheart_stress_agent::SharedClock,
    _cancel: &CancellationToken,
) -> Option<Uploader> {
    if options.gateway_url.is_some() || options.gateway_token.is_some() {
        eprintln!(
            "Warning: --gateway-url ignored (gateway feature not enabled at compile time)"
        );
    }
    None
}

fn cmd_decode(input: &str) -> anyhow::Result<()> {
    let cleaned: String = input
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();
    let bytes = hex::decode(&cleaned).with_context(|| format!("invalid hex payload '{input}'"))?;

    let measurement = decode_measurement(&bytes);
    println!("Payload: {} byte(s)", bytes.len());
    match measurement.heart_rate_bpm {
        Some(hr) => println!("  Heart rate: {hr} bpm"),
        None => println!("  Heart rate: (missing)"),
    }
    if measurement.rr_intervals_ms.is_empty() {
        println!("  RR intervals: none");
    } else {
        let rr: Vec<String> = measurement
            .rr_intervals_ms
            .iter()
            .map(|ms| format!("{ms}ms"))
            .collect();
        println!("  RR intervals: {}", rr.join(", "));
    }
    Ok(())
}

fn cmd_config(init: bool) -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();
    if init {
        config.save().context("could not write config file")?;
        println!("Wrote {:?}", Config::config_path());
        return Ok(());
    }

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
    Ok(())
}

fn cmd_disclaimer() {
    println!("{WELLNESS_DISCLAIMER}");
}
