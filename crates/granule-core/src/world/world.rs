//! Simulation driver - owns the store and runs ticks
//!
//! A tick drains the command queue, runs the chunk lifecycle, then the two
//! physics phases. [`SharedSimulation`] puts the whole thing behind a
//! read/write lock so renderers only ever see completed ticks.

use std::sync::Arc;

use glam::IVec2;
use granule_simulation::{Cell, MaterialCatalog};
use parking_lot::RwLock;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;

use super::chunk_store::ChunkStore;
use super::generation::{EmptyTerrain, TerrainSource};
use super::lifecycle::{ChunkLifecycle, LifecycleReport};
use super::persistence::{DeltaStore, MemoryDeltaStore, WorldMetadata};
use super::stats::{CountingStats, SimStats};
use crate::commands::{CommandQueue, WorldCommand};
use crate::config::SimConfig;
use crate::error::SimError;
use crate::events::SimEvent;
use crate::simulation::{
    BoundaryPass, ChunkRenderData, ReactionProgress, StepParams, apply_destruction, run_parallel,
};

/// Summary of one tick
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    /// Tick number that just ran
    pub tick: u64,
    pub chunks_updated: usize,
    /// Chunks whose update failed and were rolled back
    pub failed_chunks: Vec<IVec2>,
    pub commands_applied: usize,
    pub commands_dropped: usize,
    pub lifecycle: LifecycleReport,
    pub stats: CountingStats,
}

/// The whole simulated world
pub struct Simulation {
    config: SimConfig,
    catalog: Arc<MaterialCatalog>,
    store: ChunkStore,
    lifecycle: ChunkLifecycle,
    terrain: Box<dyn TerrainSource>,
    deltas: Box<dyn DeltaStore>,
    commands: CommandQueue,
    pool: rayon::ThreadPool,

    /// Drives command destruction; chunk workers seed their own
    rng: Xoshiro256StarStar,

    /// Contact progress for pairs straddling a chunk border
    boundary_progress: ReactionProgress,
    events: Vec<SimEvent>,
    metadata: WorldMetadata,
    tick: u64,
}

impl Simulation {
    /// Build an empty world. Terrain defaults to [`EmptyTerrain`] and deltas
    /// are kept in memory until [`Simulation::with_delta_store`] says otherwise.
    pub fn new(config: SimConfig, catalog: Arc<MaterialCatalog>) -> Result<Self, SimError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|i| format!("granule-worker-{i}"))
            .build()?;

        log::info!(
            "Simulation created: seed {}, {} workers, load radius {}, {} materials",
            config.seed,
            pool.current_num_threads(),
            config.load_radius,
            catalog.materials().len()
        );

        Ok(Self {
            store: ChunkStore::new(catalog.clone(), config.ambient_temperature),
            lifecycle: ChunkLifecycle::new(config.load_radius),
            terrain: Box::new(EmptyTerrain),
            deltas: Box::new(MemoryDeltaStore::new()),
            commands: CommandQueue::new(),
            pool,
            rng: Xoshiro256StarStar::seed_from_u64(config.seed),
            boundary_progress: ReactionProgress::default(),
            events: Vec::new(),
            metadata: WorldMetadata::new(config.seed),
            tick: 0,
            catalog,
            config,
        })
    }

    pub fn with_terrain(mut self, terrain: impl TerrainSource + 'static) -> Self {
        self.terrain = Box::new(terrain);
        self
    }

    pub fn with_delta_store(mut self, deltas: impl DeltaStore + 'static) -> Self {
        self.deltas = Box::new(deltas);
        self
    }

    /// Pick up the tick counter and seed of a previously saved world.
    /// Returns false when the store holds no metadata.
    pub fn resume(&mut self) -> Result<bool, SimError> {
        let Some(meta) = self.deltas.load_metadata()? else {
            return Ok(false);
        };
        if meta.seed != self.config.seed {
            log::warn!(
                "[LOAD] Saved world uses seed {} (config says {}), keeping the saved seed",
                meta.seed,
                self.config.seed
            );
            self.config.seed = meta.seed;
            self.rng = Xoshiro256StarStar::seed_from_u64(meta.seed);
        }
        self.tick = meta.tick;
        log::info!(
            "[LOAD] Resumed world at tick {} (created {})",
            meta.tick,
            meta.created_at
        );
        self.metadata = meta;
        Ok(true)
    }

    /// Run one tick around the given points of interest (global cell
    /// positions). An empty slice leaves chunk loading to the caller.
    pub fn tick(&mut self, points_of_interest: &[IVec2]) -> TickReport {
        let mut counts = CountingStats::default();
        let report = self.step(points_of_interest, &mut counts);
        TickReport {
            stats: counts,
            ..report
        }
    }

    /// Like [`Simulation::tick`], also forwarding counts to `stats`
    pub fn tick_with_stats(
        &mut self,
        points_of_interest: &[IVec2],
        stats: &mut dyn SimStats,
    ) -> TickReport {
        let report = self.tick(points_of_interest);
        stats.merge_counts(&report.stats);
        report
    }

    fn step(&mut self, points_of_interest: &[IVec2], counts: &mut CountingStats) -> TickReport {
        let mut report = TickReport {
            tick: self.tick,
            ..Default::default()
        };

        for command in self.commands.drain() {
            match self.apply_command(command, counts) {
                Ok(()) => report.commands_applied += 1,
                Err(e) => {
                    report.commands_dropped += 1;
                    match e {
                        SimError::ChunkNotLoaded(_) => log::debug!("Dropped command: {}", e),
                        _ => log::warn!("Dropped command: {}", e),
                    }
                }
            }
        }

        report.lifecycle = self.lifecycle.update(
            &mut self.store,
            points_of_interest,
            self.terrain.as_ref(),
            self.deltas.as_ref(),
        );
        if report.lifecycle.loaded > 0 || report.lifecycle.unloaded > 0 {
            log::info!(
                "Tick {}: loaded {} chunks, unloaded {} ({} resident)",
                self.tick,
                report.lifecycle.loaded,
                report.lifecycle.unloaded,
                self.store.len()
            );
        }

        let params = StepParams {
            catalog: self.catalog.as_ref(),
            seed: self.config.seed,
            tick: self.tick,
            dt: self.config.dt(),
            ambient: self.config.ambient_temperature,
            pressure_threshold: self.config.pressure_threshold,
        };
        let outcomes = run_parallel(&mut self.store, &self.pool, &params);
        report.chunks_updated = outcomes.len();
        report.failed_chunks = outcomes
            .iter()
            .filter(|o| o.error.is_some())
            .map(|o| o.position)
            .collect();

        BoundaryPass {
            store: &mut self.store,
            progress: &mut self.boundary_progress,
            rng: &mut self.rng,
            events: &mut self.events,
            stats: counts,
            dt: self.config.dt(),
        }
        .resolve(outcomes);

        self.tick += 1;
        report
    }

    fn apply_command(
        &mut self,
        command: WorldCommand,
        counts: &mut CountingStats,
    ) -> Result<(), SimError> {
        match command {
            WorldCommand::Destroy {
                center,
                radius,
                force,
            } => {
                if !radius.is_finite() || radius < 0.0 {
                    return Err(SimError::InvalidCommand(format!(
                        "destroy radius {radius} at {center}"
                    )));
                }
                if !force.is_finite() || force < 0.0 {
                    return Err(SimError::InvalidCommand(format!(
                        "destroy force {force} at {center}"
                    )));
                }
                self.require_loaded(center)?;
                apply_destruction(
                    &mut self.store,
                    center,
                    radius,
                    force,
                    &mut self.rng,
                    &mut self.events,
                    counts,
                );
            }
            WorldCommand::AddMaterial {
                position,
                material_id,
            } => {
                if self.catalog.material(material_id).is_none() {
                    return Err(SimError::UnknownMaterial {
                        material: material_id,
                        position,
                    });
                }
                self.require_loaded(position)?;
                self.store.set_material(position, material_id);
            }
            WorldCommand::RemoveMaterial { position } => {
                self.require_loaded(position)?;
                self.store.remove_cell(position);
            }
        }
        Ok(())
    }

    fn require_loaded(&self, pos: IVec2) -> Result<(), SimError> {
        let chunk = ChunkStore::chunk_coord(pos);
        if self.store.is_loaded(chunk) {
            Ok(())
        } else {
            Err(SimError::ChunkNotLoaded(chunk))
        }
    }

    /// Flush every modified chunk and the world metadata
    pub fn save_all(&mut self) -> Result<usize, SimError> {
        let saved = self.store.save_all(self.deltas.as_ref())?;
        self.metadata.touch(self.tick);
        self.deltas.save_metadata(&self.metadata)?;
        log::info!("[SAVE] Saved {} chunks at tick {}", saved, self.tick);
        Ok(saved)
    }

    /// Load one chunk by chunk coordinate. False if it was already loaded.
    pub fn load_chunk(&mut self, chunk: IVec2) -> bool {
        self.store
            .load_chunk(chunk, self.terrain.as_ref(), self.deltas.as_ref())
    }

    /// Save (if needed) and drop one chunk. False if it wasn't loaded.
    pub fn unload_chunk(&mut self, chunk: IVec2) -> Result<bool, SimError> {
        Ok(self.store.unload_chunk(chunk, self.deltas.as_ref())?)
    }

    /// Material at a global position; `None` when empty or unloaded
    pub fn get_material_at(&self, pos: IVec2) -> Option<u16> {
        self.get_cell(pos).map(|cell| cell.material_id)
    }

    pub fn is_occupied(&self, pos: IVec2) -> bool {
        self.get_cell(pos).is_some()
    }

    /// Occupied cell at a global position
    pub fn get_cell(&self, pos: IVec2) -> Option<Cell> {
        self.store.try_get_cell(pos).filter(|cell| !cell.is_empty())
    }

    /// Color buffers for chunks changed since the last call, clearing their dirty flags
    pub fn take_dirty_chunks(&mut self) -> Vec<ChunkRenderData> {
        let catalog = self.catalog.clone();
        let mut dirty: Vec<ChunkRenderData> = self
            .store
            .chunk_map_mut()
            .values_mut()
            .filter_map(|chunk| {
                chunk
                    .take_dirty()
                    .then(|| ChunkRenderData::from_chunk(chunk, &catalog))
            })
            .collect();
        dirty.sort_by_key(|d| (d.position.y, d.position.x));
        dirty
    }

    /// Color buffers for every loaded chunk, leaving dirty flags alone
    pub fn render_all(&self) -> Vec<ChunkRenderData> {
        let mut all: Vec<ChunkRenderData> = self
            .store
            .chunks()
            .map(|chunk| ChunkRenderData::from_chunk(chunk, &self.catalog))
            .collect();
        all.sort_by_key(|d| (d.position.y, d.position.x));
        all
    }

    /// Events accumulated since the last drain
    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.events)
    }

    /// Handle for queueing mutations; clones share the queue
    pub fn commands(&self) -> CommandQueue {
        self.commands.clone()
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// Direct store access, bypassing the command queue
    pub fn store_mut(&mut self) -> &mut ChunkStore {
        &mut self.store
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn catalog(&self) -> &Arc<MaterialCatalog> {
        &self.catalog
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn metadata(&self) -> &WorldMetadata {
        &self.metadata
    }
}

/// Cloneable handle for a simulation shared with render or gameplay threads
///
/// A tick holds the write lock from start to finish, so any reader waits
/// for the tick in progress and never sees a half-applied one.
#[derive(Clone)]
pub struct SharedSimulation {
    inner: Arc<RwLock<Simulation>>,
    commands: CommandQueue,
}

impl SharedSimulation {
    pub fn new(simulation: Simulation) -> Self {
        let commands = simulation.commands();
        Self {
            inner: Arc::new(RwLock::new(simulation)),
            commands,
        }
    }

    pub fn tick(&self, points_of_interest: &[IVec2]) -> TickReport {
        self.inner.write().tick(points_of_interest)
    }

    /// Queue handle that never touches the simulation lock
    pub fn commands(&self) -> CommandQueue {
        self.commands.clone()
    }

    pub fn take_dirty_chunks(&self) -> Vec<ChunkRenderData> {
        self.inner.write().take_dirty_chunks()
    }

    pub fn render_snapshot(&self) -> Vec<ChunkRenderData> {
        self.inner.read().render_all()
    }

    pub fn drain_events(&self) -> Vec<SimEvent> {
        self.inner.write().drain_events()
    }

    pub fn read<R>(&self, f: impl FnOnce(&Simulation) -> R) -> R {
        f(&*self.inner.read())
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut Simulation) -> R) -> R {
        f(&mut *self.inner.write())
    }
}
