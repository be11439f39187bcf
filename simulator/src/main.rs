//! Trellis Simulator
//!
//! Load and scenario harness driving a live in-memory node.

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod metrics;
mod peer;
mod scenario;

use controller::SimulationController;
use scenario::Scenario;

/// Trellis Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "Trellis load and scenario simulation environment")]
struct Args {
    /// Number of simulated peers to create
    #[arg(short, long, default_value = "3")]
    peers: usize,

    /// Built-in scenario to run
    #[arg(short, long)]
    scenario: Option<String>,

    /// JSON scenario file to run
    #[arg(long)]
    scenario_file: Option<std::path::PathBuf>,

    /// Simulation speed multiplier
    #[arg(long, default_value = "1.0")]
    speed: f64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Run duration in seconds (0 = infinite)
    #[arg(long, default_value = "0")]
    duration: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting Trellis simulator");
    info!("Peers: {}", args.peers);
    info!("Speed: {}x", args.speed);

    // Create simulation controller
    let mut controller = SimulationController::new(args.peers, args.speed, args.seed);

    // Initialize simulated peers
    controller.initialize().await?;

    info!("Simulator initialized with {} peers", args.peers);

    let started = std::time::Instant::now();

    // Run scenario if specified
    if let Some(path) = &args.scenario_file {
        info!("Running scenario file: {}", path.display());

        let scenario = Scenario::from_file(path)?;
        controller.run_scenario(scenario).await?;
    } else if let Some(scenario_name) = &args.scenario {
        info!("Running scenario: {}", scenario_name);

        let scenario = Scenario::load(scenario_name)?;
        controller.run_scenario(scenario).await?;
    } else {
        // Continuous mode
        info!("Running in continuous mode");
        info!("Press Ctrl+C to stop");

        let duration = if args.duration > 0 {
            Some(std::time::Duration::from_secs(args.duration))
        } else {
            None
        };

        controller.run(duration).await?;
    }

    // Print metrics
    let metrics = controller.get_metrics();
    info!("Simulation complete");
    info!("Total payments: {}", metrics.total_payments);
    info!("Successful: {}", metrics.successful_payments);
    info!("Failed: {}", metrics.failed_payments);
    info!("Average latency: {}ms", metrics.average_latency_ms());
    info!("p50 latency: {}ms", metrics.p50_latency_ms());
    info!("p99 latency: {}ms", metrics.p99_latency_ms());
    info!("Success rate: {:.1}%", metrics.success_rate() * 100.0);
    info!(
        "Throughput: {:.1} payments/s",
        metrics.throughput(started.elapsed().as_secs())
    );

    controller.log_peer_activity().await;

    Ok(())
}
