//! Scenario execution engine

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use glam::IVec2;
use granule_core::world::{ChunkStore, DiskDeltaStore};
use granule_core::{MaterialCatalog, Simulation};

use super::definition::{ScenarioAction, ScenarioDefinition};
use super::results::ExecutionReport;
use super::verification::VerifyContext;
use crate::config::RunnerConfig;

/// Executes scenario actions against a simulation
pub struct ScenarioExecutor {
    config: RunnerConfig,
    catalog: Arc<MaterialCatalog>,

    /// Log every action as it runs
    verbose: bool,

    /// Action execution log
    log: Vec<String>,
}

/// Per-run bookkeeping threaded through the actions
struct RunState {
    points_of_interest: Vec<IVec2>,
    report: ExecutionReport,
}

impl ScenarioExecutor {
    pub fn new(config: RunnerConfig, catalog: Arc<MaterialCatalog>) -> Self {
        Self {
            config,
            catalog,
            verbose: false,
            log: Vec::new(),
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Where this run's world is saved, if anywhere
    pub fn world_dir(&self) -> Option<PathBuf> {
        self.config
            .world
            .save_dir
            .as_ref()
            .map(|dir| dir.join(&self.config.world.name))
    }

    /// Build the world a scenario runs in, resuming a saved one when the
    /// configured save directory already holds it
    pub fn build_simulation(&self, scenario: &ScenarioDefinition) -> Result<Simulation> {
        let mut sim = Simulation::new(self.config.sim.clone(), self.catalog.clone())
            .context("Failed to create simulation")?
            .with_terrain(scenario.terrain.build());

        if let Some(save_dir) = &self.config.world.save_dir {
            let store = DiskDeltaStore::open(save_dir, &self.config.world.name)
                .with_context(|| format!("Failed to open world in {}", save_dir.display()))?;
            sim = sim.with_delta_store(store);
            if sim.resume().context("Failed to read world metadata")? {
                log::info!(
                    "[LOAD] Continuing world '{}' at tick {}",
                    self.config.world.name,
                    sim.tick_count()
                );
            }
        }

        Ok(sim)
    }

    /// Build a world and run the scenario in it
    pub fn execute_scenario(&mut self, scenario: &ScenarioDefinition) -> Result<ExecutionReport> {
        let mut sim = self.build_simulation(scenario)?;
        self.run(scenario, &mut sim)
    }

    /// Run a scenario against an existing world
    pub fn run(
        &mut self,
        scenario: &ScenarioDefinition,
        sim: &mut Simulation,
    ) -> Result<ExecutionReport> {
        let start_time = Instant::now();
        self.log.clear();

        let mut state = RunState {
            points_of_interest: scenario
                .points_of_interest
                .iter()
                .map(|&(x, y)| IVec2::new(x, y))
                .collect(),
            report: ExecutionReport::new(scenario.name.clone()),
        };

        self.log(&format!("Starting scenario: {}", scenario.name));
        if !scenario.description.is_empty() {
            self.log(&format!("Description: {}", scenario.description));
        }
        if state.points_of_interest.is_empty() {
            self.log("No points of interest, only targeted chunks load");
        }

        // Execute setup actions
        if !scenario.setup.is_empty() {
            self.log(&format!("Running {} setup actions", scenario.setup.len()));
            for (idx, action) in scenario.setup.iter().enumerate() {
                if let Err(e) = self.execute_action(action, sim, &mut state) {
                    let msg = format!("Setup action {} failed: {}", idx, e);
                    self.log(&msg);
                    return Err(anyhow::anyhow!(msg));
                }
            }
        }

        // Execute main actions
        self.log(&format!("Running {} main actions", scenario.actions.len()));
        for (idx, action) in scenario.actions.iter().enumerate() {
            if let Err(e) = self.execute_action(action, sim, &mut state) {
                let msg = format!("Action {} failed: {}", idx, e);
                self.log(&msg);
                return Err(anyhow::anyhow!(msg));
            }
        }
        state.report.actions_executed = scenario.setup.len() + scenario.actions.len();

        let settle = self.config.run.settle_ticks;
        if settle > 0 {
            self.log(&format!("Settling for {} ticks", settle));
            self.run_ticks(settle, sim, &mut state);
        }

        if self.config.world.save_dir.is_some() {
            state.report.chunks_saved += sim.save_all().context("Final save failed")?;
        }

        // Run verifications
        let verify_start = Instant::now();
        if !scenario.verify.is_empty() {
            self.log(&format!("Running {} verifications", scenario.verify.len()));
            let ctx = VerifyContext {
                sim,
                events: &state.report.events,
                failed_chunks: state.report.stats.failed_chunks as usize,
            };
            let mut failures = Vec::new();
            for condition in &scenario.verify {
                let result = condition.evaluate(&ctx);
                self.log(&format!(
                    "  {} {}",
                    if result.passed { "✓" } else { "✗" },
                    result.message
                ));
                if !result.passed {
                    failures.push(result);
                }
            }
            state.report.verification_failures = failures;
        }

        let mut report = state.report;
        report.performance.verification_duration_ms =
            verify_start.elapsed().as_secs_f64() * 1000.0;
        report.performance.total_duration_ms = start_time.elapsed().as_secs_f64() * 1000.0;
        report.passed = report.success();

        self.log(&format!(
            "Scenario complete: {} ({} ticks, {:.1}ms)",
            if report.passed { "PASSED" } else { "FAILED" },
            report.performance.tick_count,
            report.performance.total_duration_ms
        ));
        self.log(&format!("  Performance: {}", report.performance.summary()));
        report.log = self.log.clone();

        Ok(report)
    }

    /// Execute a single action
    fn execute_action(
        &mut self,
        action: &ScenarioAction,
        sim: &mut Simulation,
        state: &mut RunState,
    ) -> Result<()> {
        if self.verbose {
            self.log(&format!("[Tick {}] {:?}", sim.tick_count(), action));
        }

        match action {
            ScenarioAction::Place { x, y, material } => {
                let id = self.material_id(material)?;
                let pos = IVec2::new(*x, *y);
                ensure_loaded(sim, pos, state);
                sim.commands().add_material(pos, id);
                self.log(&format!("  Placed {} at ({}, {})", material, x, y));
            }

            ScenarioAction::Fill { region, material } => {
                let id = self.material_id(material)?;
                let commands = sim.commands();
                let positions = region.positions();
                for &pos in &positions {
                    ensure_loaded(sim, pos, state);
                    commands.add_material(pos, id);
                }
                self.log(&format!(
                    "  Filled {} cells with {}",
                    positions.len(),
                    material
                ));
            }

            ScenarioAction::Remove { x, y } => {
                let pos = IVec2::new(*x, *y);
                ensure_loaded(sim, pos, state);
                sim.commands().remove_material(pos);
                self.log(&format!("  Removed cell at ({}, {})", x, y));
            }

            ScenarioAction::Destroy {
                x,
                y,
                radius,
                force,
            } => {
                let center = IVec2::new(*x, *y);
                ensure_loaded(sim, center, state);
                sim.commands().apply_destruction(center, *radius, *force);
                self.log(&format!(
                    "  Destroy at ({}, {}) r={} f={}",
                    x, y, radius, force
                ));
            }

            ScenarioAction::SetTemperature { x, y, temperature } => {
                let pos = IVec2::new(*x, *y);
                let Some(cell) = sim.get_cell(pos) else {
                    bail!("No cell at ({}, {}) to heat", x, y);
                };
                sim.store_mut()
                    .add_heat(pos, temperature - cell.temperature);
                self.log(&format!(
                    "  Set temperature at ({}, {}) to {}",
                    x, y, temperature
                ));
            }

            ScenarioAction::Tick { count } => {
                self.run_ticks(*count, sim, state);
                self.log(&format!("  Ran {} ticks", count));
            }

            ScenarioAction::Save => {
                let saved = sim.save_all().context("Save failed")?;
                state.report.chunks_saved += saved;
                self.log(&format!("  Saved {} chunks", saved));
            }

            ScenarioAction::Log { message } => {
                self.log(&format!("  [USER] {}", message));
            }
        }

        Ok(())
    }

    fn run_ticks(&mut self, count: u64, sim: &mut Simulation, state: &mut RunState) {
        let autosave = self.config.world.autosave_interval_ticks;
        let report_every = self.config.run.report_every;

        for _ in 0..count {
            let started = Instant::now();
            let tick = sim.tick(&state.points_of_interest);
            state
                .report
                .performance
                .record_tick(started.elapsed().as_secs_f64() * 1000.0);

            let stats = &mut state.report.stats;
            stats.add_counts(&tick.stats);
            stats.commands_applied += tick.commands_applied as u64;
            stats.commands_dropped += tick.commands_dropped as u64;
            stats.chunks_loaded += tick.lifecycle.loaded as u64;
            stats.chunks_unloaded += tick.lifecycle.unloaded as u64;
            stats.failed_chunks += tick.failed_chunks.len() as u64;
            tally_events(sim, &mut state.report.events);

            for chunk in &tick.failed_chunks {
                self.log(&format!(
                    "  Chunk ({}, {}) failed at tick {}",
                    chunk.x, chunk.y, tick.tick
                ));
            }

            if report_every > 0 && tick.tick % report_every == 0 {
                log::info!(
                    "Tick {}: {} chunks, {} moved, {} reactions",
                    tick.tick,
                    tick.chunks_updated,
                    tick.stats.cells_moved,
                    tick.stats.reactions
                );
            }

            if autosave > 0 && self.config.world.save_dir.is_some() && tick.tick % autosave == 0
            {
                match sim.save_all() {
                    Ok(saved) => state.report.chunks_saved += saved,
                    Err(e) => log::error!("[SAVE] Autosave failed at tick {}: {}", tick.tick, e),
                }
            }
        }
    }

    fn material_id(&self, name: &str) -> Result<u16> {
        match self.catalog.material_by_name(name) {
            Some(def) => Ok(def.id),
            None => bail!("Unknown material '{}'", name),
        }
    }

    fn log(&mut self, message: &str) {
        log::info!("{}", message);
        self.log.push(message.to_string());
    }
}

/// Commands drain before the lifecycle pass of the same tick, so the chunk
/// an action targets has to be resident when it is queued
fn ensure_loaded(sim: &mut Simulation, pos: IVec2, state: &mut RunState) {
    if sim.load_chunk(ChunkStore::chunk_coord(pos)) {
        state.report.stats.chunks_loaded += 1;
    }
}

fn tally_events(sim: &mut Simulation, events: &mut BTreeMap<String, usize>) {
    for event in sim.drain_events() {
        *events.entry(event.kind().to_string()).or_default() += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::definition::TerrainKind;
    use crate::scenario::verification::{Region, VerificationCondition};

    fn runner_config() -> RunnerConfig {
        let mut config = RunnerConfig::default();
        config.sim.worker_threads = 2;
        config.sim.load_radius = 1;
        config.run.report_every = 0;
        config
    }

    fn executor(config: RunnerConfig) -> ScenarioExecutor {
        ScenarioExecutor::new(config, Arc::new(MaterialCatalog::with_defaults()))
    }

    fn flat() -> TerrainKind {
        TerrainKind::Flat {
            surface_y: 48,
            dirt_depth: 8,
            bedrock_y: 512,
        }
    }

    fn sand_drop() -> ScenarioDefinition {
        ScenarioDefinition {
            name: "Sand drop".to_string(),
            description: String::new(),
            terrain: flat(),
            points_of_interest: vec![(10, 10)],
            setup: Vec::new(),
            actions: vec![
                ScenarioAction::Place {
                    x: 10,
                    y: 10,
                    material: "sand".to_string(),
                },
                ScenarioAction::Tick { count: 60 },
            ],
            verify: vec![
                VerificationCondition::MaterialAt {
                    x: 10,
                    y: 47,
                    material: Some("sand".to_string()),
                },
                VerificationCondition::NoFailedChunks,
            ],
        }
    }

    #[test]
    fn test_sand_lands_on_surface() {
        let report = executor(runner_config())
            .execute_scenario(&sand_drop())
            .unwrap();
        assert!(report.passed, "{:?}", report.verification_failures);
        assert_eq!(report.performance.tick_count, 60);
        assert_eq!(report.stats.commands_applied, 1);
        assert!(report.stats.cells_moved >= 37);
        assert_eq!(report.stats.chunks_loaded, 9);
    }

    #[test]
    fn test_builtin_scenarios_pass() {
        for (name, _) in crate::scenario::BUILTIN_SCENARIOS {
            let scenario = crate::scenario::builtin(name).unwrap().unwrap();
            let report = executor(runner_config())
                .execute_scenario(&scenario)
                .unwrap();
            assert!(
                report.passed,
                "{}: {:?}",
                name, report.verification_failures
            );
            assert_eq!(report.stats.failed_chunks, 0);
        }
    }

    #[test]
    fn test_failed_verification_is_reported() {
        let mut scenario = sand_drop();
        scenario.verify = vec![VerificationCondition::RegionEmpty {
            region: Region::Rect {
                min_x: 0,
                min_y: 40,
                max_x: 20,
                max_y: 47,
            },
        }];
        let report = executor(runner_config())
            .execute_scenario(&scenario)
            .unwrap();
        assert!(!report.passed);
        assert_eq!(report.verification_failures.len(), 1);
    }

    #[test]
    fn test_destroy_counts_events() {
        let scenario = ScenarioDefinition {
            name: "Blast".to_string(),
            description: String::new(),
            terrain: flat(),
            points_of_interest: vec![(32, 48)],
            setup: vec![ScenarioAction::Tick { count: 1 }],
            actions: vec![
                ScenarioAction::Destroy {
                    x: 32,
                    y: 52,
                    radius: 4.0,
                    force: 100.0,
                },
                ScenarioAction::Tick { count: 1 },
            ],
            verify: vec![
                VerificationCondition::EventCount {
                    kind: "exploded".to_string(),
                    min: 1,
                },
                VerificationCondition::EventCount {
                    kind: "cell_destroyed".to_string(),
                    min: 1,
                },
            ],
        };
        let report = executor(runner_config())
            .execute_scenario(&scenario)
            .unwrap();
        assert!(report.passed, "{:?}", report.verification_failures);
        assert_eq!(report.actions_executed, 3);
        assert!(report.stats.cells_destroyed > 0);
    }

    #[test]
    fn test_manual_mode_loads_on_demand() {
        let scenario = ScenarioDefinition {
            name: "Manual".to_string(),
            description: String::new(),
            terrain: TerrainKind::Empty,
            points_of_interest: Vec::new(),
            setup: Vec::new(),
            actions: vec![
                ScenarioAction::Place {
                    x: -5,
                    y: 3,
                    material: "stone".to_string(),
                },
                ScenarioAction::Tick { count: 1 },
                ScenarioAction::SetTemperature {
                    x: -5,
                    y: 3,
                    temperature: 300.0,
                },
            ],
            verify: vec![VerificationCondition::TemperatureRange {
                region: Region::Rect {
                    min_x: -5,
                    min_y: 3,
                    max_x: -5,
                    max_y: 3,
                },
                min: 299.0,
                max: 301.0,
            }],
        };
        let mut sim = executor(runner_config()).build_simulation(&scenario).unwrap();
        let report = executor(runner_config()).run(&scenario, &mut sim).unwrap();
        assert!(report.passed, "{:?}", report.verification_failures);
        assert_eq!(sim.store().len(), 1);
    }

    #[test]
    fn test_unknown_material_fails_action() {
        let mut scenario = sand_drop();
        scenario.actions[0] = ScenarioAction::Place {
            x: 1,
            y: 1,
            material: "unobtainium".to_string(),
        };
        let err = executor(runner_config())
            .execute_scenario(&scenario)
            .unwrap_err();
        assert!(err.to_string().contains("Action 0 failed"));
    }

    #[test]
    fn test_saved_world_resumes() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = runner_config();
        config.world.save_dir = Some(dir.path().to_path_buf());
        config.world.name = "resume".to_string();

        let first = executor(config.clone())
            .execute_scenario(&sand_drop())
            .unwrap();
        assert!(first.passed);
        assert!(first.chunks_saved >= 1);

        let mut rerun = sand_drop();
        rerun.actions = vec![ScenarioAction::Tick { count: 1 }];
        let exec = executor(config);
        let mut sim = exec.build_simulation(&rerun).unwrap();
        assert_eq!(sim.tick_count(), 60);
        sim.tick(&[IVec2::new(10, 10)]);
        assert_eq!(
            sim.get_material_at(IVec2::new(10, 47)),
            Some(granule_core::MaterialId::SAND)
        );
        assert!(exec.world_dir().unwrap().ends_with("resume"));
    }
}
