use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use granule::scenario::{self, BUILTIN_SCENARIOS, ScenarioDefinition, ScenarioExecutor};
use granule::{ExecutionReport, RunnerConfig};
use granule_core::MaterialCatalog;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario RON file to run
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Built-in scenario to run when no file is given
    #[arg(long, default_value = "sand_pile")]
    builtin: String,

    /// Override the world seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the worker thread count (0 = one per core)
    #[arg(long)]
    threads: Option<usize>,

    /// Extra ticks to run after the scenario's actions
    #[arg(long)]
    settle: Option<u64>,

    /// Directory to save the world in (deltas stay in memory otherwise)
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// World name under the save directory
    #[arg(long)]
    world: Option<String>,

    /// Delete the saved world before running
    #[arg(long)]
    regenerate: bool,

    /// RON material catalog replacing the built-in one
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Write the execution report as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    /// Log every action as it runs
    #[arg(long)]
    verbose: bool,

    /// List the loaded materials and exit
    #[arg(long)]
    list_materials: bool,

    /// List the built-in scenarios and exit
    #[arg(long)]
    list_scenarios: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    if args.list_scenarios {
        for (name, _) in BUILTIN_SCENARIOS {
            println!("{}", name);
        }
        return Ok(());
    }

    let mut config = RunnerConfig::load()?;
    apply_overrides(&mut config, &args);

    let catalog = Arc::new(load_catalog(&config)?);

    if args.list_materials {
        for material in catalog.materials().iter() {
            println!(
                "{:>4}  {:<12} {:?} density {}",
                material.id, material.name, material.category, material.density
            );
        }
        return Ok(());
    }

    if args.regenerate
        && let Some(save_dir) = &config.world.save_dir
    {
        let world_dir = save_dir.join(&config.world.name);
        if world_dir.exists() {
            std::fs::remove_dir_all(&world_dir)?;
            log::info!("Deleted world directory: {:?}", world_dir);
        }
    }

    let definition = match &args.scenario {
        Some(path) => ScenarioDefinition::from_file(path)?,
        None => scenario::builtin(&args.builtin)
            .with_context(|| format!("Unknown built-in scenario '{}'", args.builtin))??,
    };

    log::info!("Starting Granule: scenario '{}'", definition.name);
    let mut executor = ScenarioExecutor::new(config, catalog).verbose(args.verbose);
    let report = executor.execute_scenario(&definition)?;

    print_report(&report);
    if let Some(path) = &args.report {
        report.save_json(path)?;
        log::info!("Report written to {}", path.display());
    }

    if !report.passed {
        std::process::exit(1);
    }
    Ok(())
}

fn apply_overrides(config: &mut RunnerConfig, args: &Args) {
    if let Some(seed) = args.seed {
        config.sim.seed = seed;
    }
    if let Some(threads) = args.threads {
        config.sim.worker_threads = threads;
    }
    if let Some(settle) = args.settle {
        config.run.settle_ticks = settle;
    }
    if let Some(save_dir) = &args.save_dir {
        config.world.save_dir = Some(save_dir.clone());
    }
    if let Some(world) = &args.world {
        config.world.name = world.clone();
    }
    if let Some(catalog) = &args.catalog {
        config.world.catalog = Some(catalog.clone());
    }
}

fn load_catalog(config: &RunnerConfig) -> anyhow::Result<MaterialCatalog> {
    match &config.world.catalog {
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read catalog: {}", path.display()))?;
            MaterialCatalog::from_ron(&source)
                .with_context(|| format!("Invalid catalog: {}", path.display()))
        }
        None => Ok(MaterialCatalog::with_defaults()),
    }
}

fn print_report(report: &ExecutionReport) {
    println!("{}", report.summary());
    for (kind, count) in &report.events {
        println!("  {:<16} {}", kind, count);
    }
    for failure in &report.verification_failures {
        println!("  FAILED: {}", failure.message);
    }
}
