//! `applevision` CLI: scenario runs, replay evaluation, default configuration.

use anyhow::Result;
use clap::{Parser, Subcommand};
use fusion_core::FusionConfig;
use sim::{evaluate, load_replay, save_replay, RunSummary, Scenario, ScenarioKind};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "applevision", about = "Apple-tracking fusion filter CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a named scenario, run it through the filter and report metrics.
    RunScenario {
        #[arg(value_enum)]
        scenario: ScenarioKind,
        /// Random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Filter configuration (TOML); defaults when omitted
        #[arg(long)]
        config: Option<PathBuf>,
        /// Output metrics to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
        /// Also save the recorded sensor log
        #[arg(long)]
        save_replay: Option<PathBuf>,
    },
    /// Run a previously recorded sensor log through the filter.
    Replay {
        /// Path to replay JSON file
        input: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the default configuration as TOML.
    DefaultConfig,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::RunScenario {
            scenario,
            seed,
            config,
            output,
            save_replay: save_path,
        } => {
            let config = load_config(config.as_deref())?;
            run_scenario(scenario, seed, &config, output.as_deref(), save_path.as_deref())?;
        }
        Commands::Replay {
            input,
            config,
            output,
        } => {
            let config = load_config(config.as_deref())?;
            run_replay(&input, &config, output.as_deref())?;
        }
        Commands::DefaultConfig => {
            print!("{}", FusionConfig::default().to_toml_string()?);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<FusionConfig> {
    match path {
        Some(path) => {
            let config = FusionConfig::load(path)?;
            info!(path = %path.display(), "configuration loaded");
            Ok(config)
        }
        None => Ok(FusionConfig::default()),
    }
}

fn run_scenario(
    kind: ScenarioKind,
    seed: u64,
    config: &FusionConfig,
    output_path: Option<&Path>,
    replay_path: Option<&Path>,
) -> Result<()> {
    let scenario = Scenario::build(kind, seed);
    println!(
        "Running scenario '{}' (seed={}, duration={:.0}s)...",
        scenario.name, seed, scenario.duration
    );

    let log = scenario.record(&config.camera.camera());
    let start = std::time::Instant::now();
    let summary = evaluate(&log, config)?;
    report(&summary, start.elapsed().as_secs_f64());

    if let Some(rpath) = replay_path {
        save_replay(&log, rpath)?;
        println!("Replay saved to {}", rpath.display());
    }
    if let Some(opath) = output_path {
        write_summary(&summary, opath)?;
    }
    Ok(())
}

fn run_replay(input: &Path, config: &FusionConfig, output_path: Option<&Path>) -> Result<()> {
    let log = load_replay(input)?;
    println!(
        "Replaying '{}' ({} inputs)...",
        log.scenario_name,
        log.inputs.len()
    );

    let start = std::time::Instant::now();
    let summary = evaluate(&log, config)?;
    report(&summary, start.elapsed().as_secs_f64());

    if let Some(opath) = output_path {
        write_summary(&summary, opath)?;
    }
    Ok(())
}

fn report(summary: &RunSummary, elapsed: f64) {
    let m = &summary.metrics;
    let s = &summary.stats;
    println!(
        "Done: {} estimates, {:.1}% TRACKING, elapsed={:.3}s",
        m.n_estimates,
        100.0 * m.tracking_fraction(),
        elapsed
    );
    println!(
        "RMSE position {:.4} m, velocity {:.4} m/s, max error {:.4} m",
        m.rmse_position(),
        m.rmse_velocity(),
        m.max_pos_err
    );
    if let Some(nees) = m.mean_position_nees() {
        println!("Mean position NEES {nees:.2} (3 for a consistent filter)");
    }
    println!(
        "Status: {} tracking, {} coasting, {} lost, {} uninitialized",
        m.n_tracking, m.n_coasting, m.n_lost, m.n_uninitialized
    );
    println!(
        "Inputs: {} accepted, {} gated, {} stale, {} invalid, {} range-stale, {} unprojectable",
        s.accepted_projections,
        s.gated_outliers,
        s.stale_inputs,
        s.invalid_inputs,
        s.range_stale_projections,
        s.unprojectable_detections
    );
    for t in &summary.transitions {
        println!("  t={:7.3}s  {} -> {}  ({:?})", t.at, t.from, t.to, t.reason);
    }
}

fn write_summary(summary: &RunSummary, path: &Path) -> Result<()> {
    let json = serde_json::json!({
        "scenario": summary.scenario,
        "seed": summary.seed,
        "rmse_position": summary.metrics.rmse_position(),
        "rmse_velocity": summary.metrics.rmse_velocity(),
        "tracking_fraction": summary.metrics.tracking_fraction(),
        "metrics": summary.metrics,
        "stats": summary.stats,
        "transitions": summary.transitions,
    });
    std::fs::write(path, serde_json::to_string_pretty(&json)?)?;
    println!("Metrics saved to {}", path.display());
    Ok(())
}
