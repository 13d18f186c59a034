//! RGB panel bring-up for 800x480 parallel RGB LCDs
//!
//! A Rust-based service that:
//! - Configures the panel timing generator and its external-memory frame buffer
//! - Switches the backlight on through the CH422G I/O expander
//! - Attaches a retained-mode scene rendered by a dedicated task
//! - Runs a validation pattern cycle or an animated demo until shutdown

mod app;
mod config;
mod display;
mod gfx;
mod render;

use app::{Demo, ValidationCycle};
use clap::Parser;
use config::Config;
use display::{MemoryPools, PanelController, SimulatedRgbPanel};
use render::RenderBridge;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "rgb-panel-bridge")]
#[command(about = "RGB LCD panel bring-up and render bridge")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Draw color bars and exit
    #[arg(long)]
    test: bool,

    /// Write the frame buffer to a PNG before exiting
    #[arg(long, value_name = "PNG")]
    snapshot: Option<PathBuf>,

    /// Run the validation pattern cycle this many times and exit (0 = until shutdown)
    #[arg(long, value_name = "N")]
    cycles: Option<u32>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let loaded = Config::load(&args.config);
    let verbose = args.verbose || loaded.as_ref().is_ok_and(|c| c.verbose);
    // Initialize logging
    init_logging(verbose);

    tracing::info!("Starting RGB panel bridge");

    let config = loaded.unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from {}: {}", args.config, e);
        tracing::info!("Using default configuration");
        Config::default()
    });

    // Enable backlight
    display::expander::try_enable_backlight(&config.backlight);

    // Initialize display controller
    let pools = MemoryPools::new(config.memory.internal_bytes, config.memory.external_bytes);
    let mut panel = PanelController::new(Box::new(SimulatedRgbPanel::new()), pools.clone());
    panel.init(config.display.clone())?;

    // Setup shutdown signal handling
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // One-shot commands
    if args.test {
        tracing::info!("Running test pattern...");
        panel.draw_test_pattern()?;
        write_snapshot(&panel, args.snapshot.as_ref())?;
        tracing::info!("Test pattern complete");
        return Ok(());
    }

    if let Some(cycles) = args.cycles {
        let limit = (cycles > 0).then_some(cycles);
        let mut shutdown = shutdown_tx.subscribe();
        let cycle = ValidationCycle::default();

        let run = cycle.run(&panel, limit, &mut shutdown);
        tokio::pin!(run);

        // On a signal, stop the cycle at its next wait and keep its count
        let completed = tokio::select! {
            result = &mut run => result?,
            result = wait_for_shutdown() => {
                result?;
                tracing::info!("Shutdown signal received");
                let _ = shutdown_tx.send(());
                run.await?
            }
        };
        tracing::info!("Validation finished after {} cycles", completed);
        write_snapshot(&panel, args.snapshot.as_ref())?;
        return Ok(());
    }

    // Attach the render bridge
    let mut bridge = RenderBridge::new(config.render.clone(), pools);
    bridge.attach(panel.handle(), config.render.lines_per_buffer)?;
    tracing::info!("Panel state: {}", panel.state());

    let lock = bridge
        .lock()
        .ok_or_else(|| anyhow::anyhow!("Render bridge did not attach"))?;
    let demo = Demo::new(
        lock,
        Duration::from_millis(50),
        Duration::from_millis(config.render.max_sleep_ms),
    );

    // Start foreground tasks
    let demo_handle = tokio::spawn(demo.run(shutdown_tx.subscribe()));
    let status_handle = tokio::spawn(app::run_status(
        bridge.stats_handle(),
        Duration::from_secs(config.status_interval_secs),
        shutdown_tx.subscribe(),
    ));

    // Wait for shutdown signal
    wait_for_shutdown().await?;
    tracing::info!("Shutdown signal received");

    let _ = shutdown_tx.send(());

    tokio::select! {
        result = demo_handle => {
            if let Ok(report) = result {
                tracing::info!("Demo applied {} updates, skipped {}", report.updates, report.skipped);
            }
        }
        _ = tokio::time::sleep(Duration::from_secs(5)) => {
            tracing::warn!("Demo shutdown timeout");
        }
    }
    let _ = status_handle.await;

    tracing::info!("Render totals: {}", bridge.stats());
    drop(bridge);
    write_snapshot(&panel, args.snapshot.as_ref())?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn write_snapshot(panel: &PanelController, path: Option<&PathBuf>) -> anyhow::Result<()> {
    if let Some(path) = path {
        panel.snapshot_png(path)?;
    }
    Ok(())
}

/// Initialize tracing/logging
///
/// Default level is "warn". Use --verbose for "debug".
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("rgb_panel_bridge={}", level).into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
async fn wait_for_shutdown() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
    Ok(())
}
