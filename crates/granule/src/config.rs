//! Runner configuration with layered loading
//!
//! Configuration is loaded from multiple sources (lowest to highest priority):
//! 1. Compiled defaults
//! 2. `granule.ron` file (if exists)
//! 3. Environment variables prefixed with `GRANULE_`
//!
//! Example environment variable: `GRANULE_SIM__WORKER_THREADS=4`
//!
//! Command-line flags are applied on top by `main`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use granule_core::SimConfig;
use serde::{Deserialize, Serialize};

/// Main runner configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunnerConfig {
    #[serde(default)]
    pub sim: SimConfig,

    #[serde(default)]
    pub world: WorldConfig,

    #[serde(default)]
    pub run: RunConfig,
}

/// Where and how often the world is saved
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// World directory name under `save_dir`
    pub name: String,
    /// Root directory for saved worlds; `None` keeps deltas in memory
    pub save_dir: Option<PathBuf>,
    /// Autosave every N ticks (0 = only at the end)
    pub autosave_interval_ticks: u64,
    /// Optional RON material catalog replacing the built-in set
    pub catalog: Option<PathBuf>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            save_dir: None,
            autosave_interval_ticks: 600,
            catalog: None,
        }
    }
}

/// Scenario run settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Extra ticks after the scenario's own actions, letting things settle
    pub settle_ticks: u64,
    /// Log a progress line every N ticks (0 = never)
    pub report_every: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            settle_ticks: 0,
            report_every: 60,
        }
    }
}

impl RunnerConfig {
    /// Load configuration with layered priority:
    /// 1. Compiled defaults (lowest priority)
    /// 2. `granule.ron` file (if exists)
    /// 3. Environment variables prefixed with `GRANULE_` (highest priority)
    pub fn load() -> Result<Self> {
        Self::load_from("granule")
    }

    /// Same as [`RunnerConfig::load`] with a different file stem
    pub fn load_from(file_stem: &str) -> Result<Self> {
        let sim = SimConfig::default();
        let builder = Config::builder()
            // Layer 1: Compiled defaults
            .set_default("sim.seed", sim.seed as i64)?
            .set_default("sim.worker_threads", sim.worker_threads as i64)?
            .set_default("sim.load_radius", sim.load_radius as i64)?
            .set_default("sim.tick_rate", sim.tick_rate as f64)?
            .set_default("sim.ambient_temperature", sim.ambient_temperature as f64)?
            .set_default("sim.pressure_threshold", sim.pressure_threshold as f64)?
            .set_default("world.name", "default")?
            .set_default("world.autosave_interval_ticks", 600_i64)?
            .set_default("run.settle_ticks", 0_i64)?
            .set_default("run.report_every", 60_i64)?
            // Layer 2: Config file (optional, won't error if missing)
            .add_source(
                File::with_name(file_stem)
                    .format(config::FileFormat::Ron)
                    .required(false),
            )
            // Layer 3: Environment variables (GRANULE_SIM__SEED, etc.)
            .add_source(Environment::with_prefix("GRANULE").separator("__"));

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
