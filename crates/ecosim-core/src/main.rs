//! Ecosystem Simulation Runner
//!
//! Headless driver: loads configuration, runs the population for a number of
//! ticks, and writes the event log and final export on request.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use ecosim_core::config::{SimConfig, DEFAULT_CONFIG_PATH};
use ecosim_core::events::EventLogger;
use ecosim_core::output::{format_stats_line, write_export};
use ecosim_core::{PopulationController, SimError};

/// Command line arguments for the simulation
#[derive(Parser, Debug)]
#[command(name = "ecosim")]
#[command(about = "A headless agent-based ecosystem simulation")]
struct Args {
    /// TOML configuration file (defaults to ecosim.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Random seed, overrides the config
    #[arg(long)]
    seed: Option<u64>,

    /// Number of ticks to simulate, overrides the config
    #[arg(long)]
    ticks: Option<u64>,

    /// Initial population, overrides the config
    #[arg(long)]
    population: Option<usize>,

    /// Ticks between printed statistics lines
    #[arg(long)]
    stats_interval: Option<u64>,

    /// Write every event to this JSONL file
    #[arg(long)]
    events: Option<PathBuf>,

    /// Write the final export snapshot to this JSON file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Enable external reasoning against this endpoint
    #[arg(long)]
    reasoning_url: Option<String>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "simulation aborted");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<SimConfig, SimError> {
    let mut config = match &args.config {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::load_or_default(),
    };
    let sim = &mut config.simulation;
    if let Some(seed) = args.seed {
        sim.seed = seed;
    }
    if let Some(ticks) = args.ticks {
        sim.max_ticks = ticks;
    }
    if let Some(population) = args.population {
        sim.initial_population = population;
        sim.max_population = sim.max_population.max(population + sim.player_count);
    }
    if let Some(interval) = args.stats_interval {
        sim.stats_interval = interval;
    }
    if let Some(url) = &args.reasoning_url {
        config.reasoning.enabled = true;
        config.reasoning.endpoint = url.clone();
    }
    config.validate()?;
    Ok(config)
}

fn run(args: Args) -> Result<(), SimError> {
    let config = load_config(&args)?;
    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let sim = &config.simulation;
    println!("Ecosystem Simulation");
    println!("====================");
    println!(
        "Config: {}",
        args.config
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| format!("{} (or defaults)", DEFAULT_CONFIG_PATH))
    );
    println!("Seed: {}", sim.seed);
    println!("Ticks: {}", sim.max_ticks);
    println!("Population: {} (cap {})", sim.initial_population, sim.max_population);
    println!(
        "Reasoning: {}",
        if config.reasoning.enabled {
            config.reasoning.endpoint.as_str()
        } else {
            "off"
        }
    );
    println!();

    let max_ticks = sim.max_ticks;
    let mut controller = PopulationController::new(config)?;
    if let Some(path) = &args.events {
        controller.attach_logger(EventLogger::new(path)?)?;
        println!("Logging events to {}", path.display());
    }

    let first = controller.stats();
    println!("{}", format_stats_line(&first));

    for _ in 0..max_ticks {
        let report = controller.step()?;
        // Events are kept by the logger; nothing else reads them here
        controller.drain_events();
        if let Some(stats) = &report.stats {
            println!("{}", format_stats_line(stats));
        }
        if report.population == 0 {
            println!();
            println!("Population extinct at tick {}", report.tick);
            break;
        }
    }

    let summary = controller.finish()?;
    println!();
    println!("Simulation complete");
    println!("  Ticks: {}", summary.total_ticks);
    println!("  Events: {}", summary.total_events);
    println!("  Peak population: {}", summary.peak_population);
    println!("  Peak infected: {}", summary.peak_infected);
    if let Some(stats) = &summary.final_stats {
        println!("  Births: {}  Deaths: {}", stats.births, stats.deaths);
    }
    if let Some(reasoning) = controller.reasoning_stats() {
        println!(
            "  Reasoning calls: {} ok, {} failed",
            reasoning.succeeded, reasoning.failed
        );
    }
    println!("  State digest: {:016x}", controller.state_digest());

    if let Some(path) = &args.export {
        write_export(&controller.full_snapshot(), path)?;
        println!("  Wrote export to {}", path.display());
    }
    Ok(())
}
