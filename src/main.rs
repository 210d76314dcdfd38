//! framefeed: capture frames and feed them to a recognition engine

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::Result;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use framefeed::capture::TestPattern;
use framefeed::recognition::SimulatedEngine;
use framefeed::{Config, Pipeline, QueueEvent};

/// Run the capture pipeline against a synthetic source and a simulated engine
#[derive(Parser, Debug)]
#[command(name = "framefeed", version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override capture.target_fps
    #[arg(long)]
    fps: Option<u32>,

    /// Stop after this many seconds (runs until Ctrl-C when omitted)
    #[arg(long)]
    duration: Option<u64>,

    /// Test pattern width
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Test pattern height
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Time the simulated engine answers "not started"
    #[arg(long, default_value_t = 150)]
    warmup_ms: u64,

    /// Simulated recognition time per frame
    #[arg(long, default_value_t = 40)]
    latency_ms: u64,

    /// Reject every n-th frame in the simulated engine
    #[arg(long)]
    reject_every: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    init_tracing();

    let args = Args::parse();
    info!("framefeed launching...");

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(fps) = args.fps {
        config.capture.target_fps = fps;
    }
    config.validate()?;
    debug!(?config, "configuration loaded");

    let source = Arc::new(TestPattern::new(args.width, args.height));
    let mut engine = SimulatedEngine::new(
        Duration::from_millis(args.warmup_ms),
        Duration::from_millis(args.latency_ms),
    );
    if let Some(n) = args.reject_every {
        engine = engine.with_reject_every(n);
    }

    let pipeline = Pipeline::new(config, source, Arc::new(engine))?;
    let events = pipeline.subscribe();

    // Drain observer events so diagnostics show up in the log
    let _observer = tokio::spawn(async move {
        while let Ok(event) = events.recv_async().await {
            match event {
                QueueEvent::CaptureFailed(reason) => warn!(%reason, "capture failure"),
                QueueEvent::FrameEvicted { id } => debug!(id, "frame evicted"),
                QueueEvent::FrameQueued(_) | QueueEvent::QueueSizeChanged(_) => {}
            }
        }
    });

    pipeline.start()?;

    let deadline = args
        .duration
        .map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));
    let mut report = tokio::time::interval(Duration::from_secs(1));
    report.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
            _ = report.tick() => {
                let status = pipeline.status();
                let stats = pipeline.stats();
                info!(
                    fps = status.current_fps,
                    processed = status.processed_frames,
                    queue = status.queue_size,
                    captured = stats.captured_frames,
                    evicted = stats.evicted_frames,
                    failed = stats.failed_frames,
                    in_flight = stats.in_flight,
                    "pipeline status"
                );
                if deadline.is_some_and(|at| tokio::time::Instant::now() >= at) {
                    break;
                }
            }
        }
    }

    let final_status = pipeline.status();
    let final_stats = pipeline.stats();
    pipeline.stop();

    match pipeline.engine_status().await {
        Ok(engine) => info!(?engine, "engine status"),
        Err(err) => warn!(%err, "engine status unavailable"),
    }
    info!(?final_status, ?final_stats, "framefeed shutting down");
    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("framefeed=debug"));

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_timer(fmt::time::uptime()));

    #[cfg(feature = "profiling")]
    let registry = registry.with(tracing_tracy::TracyLayer::default());

    registry.init();
}
