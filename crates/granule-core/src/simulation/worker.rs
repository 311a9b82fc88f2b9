//! Chunk worker - one chunk's share of a tick, run in parallel
//!
//! A worker owns its chunk mutably and sees its neighbours only through a
//! [`Halo`] captured before the phase starts. Its RNG is derived from
//! (seed, tick, chunk position), so the result doesn't depend on which
//! thread runs it or when.

use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};

use glam::IVec2;
use granule_simulation::{
    CHUNK_SIZE, Cell, MaterialCatalog, MaterialDef, PhysicalState, cell_flags,
};
use rand_xoshiro::Xoshiro256StarStar;
use rayon::ThreadPool;
use rayon::prelude::*;

use super::ca_update::{FlowCtx, update_movement};
use super::chemistry::{ReactionEnv, ReactionProgress, can_react, evaluate_pair, update_burning};
use super::grid::{CellGrid, ChunkGrid, Halo, Intent};
use super::pressure::{equalize_gas, update_hydrostatic};
use super::state_changes::StateChangeSystem;
use super::temperature::diffuse_chunk;
use crate::error::SimError;
use crate::events::SimEvent;
use crate::world::{Chunk, ChunkStore, CountingStats, SimStats, chunk_rng};

/// Per-tick settings shared by every worker
#[derive(Clone, Copy)]
pub(crate) struct StepParams<'a> {
    pub catalog: &'a MaterialCatalog,
    pub seed: u64,
    pub tick: u64,
    pub dt: f32,
    pub ambient: f32,
    pub pressure_threshold: f32,
}

/// What one chunk's update produced
#[derive(Debug)]
pub(crate) struct ChunkOutcome {
    pub position: IVec2,
    pub intents: Vec<Intent>,
    pub events: Vec<SimEvent>,
    pub stats: CountingStats,
    pub error: Option<SimError>,
}

struct ChunkWorker<'w, 'a> {
    grid: ChunkGrid<'w>,
    progress: ReactionProgress,
    rng: Xoshiro256StarStar,
    events: Vec<SimEvent>,
    stats: CountingStats,
    params: &'w StepParams<'a>,
}

impl<'w, 'a> ChunkWorker<'w, 'a> {
    fn new(chunk: &'w mut Chunk, halo: &'w Halo, params: &'w StepParams<'a>) -> Self {
        let progress = std::mem::take(&mut chunk.reaction_progress);
        let rng = chunk_rng(params.seed, params.tick, chunk.position);
        Self {
            grid: ChunkGrid::new(chunk, halo),
            progress,
            rng,
            events: Vec::new(),
            stats: CountingStats::default(),
            params,
        }
    }

    fn run(mut self) -> Result<ChunkOutcome, SimError> {
        let catalog = self.params.catalog;
        self.grid.chunk.clear_update_flags();
        self.grid.chunk.set_simulation_active(false);
        update_hydrostatic(&mut self.grid, catalog);

        let origin = self.grid.chunk.origin();
        // Bottom to top so falling material lands before the row above moves
        for y in (0..CHUNK_SIZE).rev() {
            // Alternate direction each row for symmetry
            let left_to_right = (y as u64 + self.params.tick) % 2 == 0;
            for i in 0..CHUNK_SIZE {
                let x = if left_to_right { i } else { CHUNK_SIZE - 1 - i };
                let cell = self.grid.chunk.get_cell(x, y);
                if cell.is_empty() || cell.has_flag(cell_flags::UPDATED) {
                    continue;
                }
                let pos = origin + IVec2::new(x as i32, y as i32);
                let def = catalog
                    .material(cell.material_id)
                    .ok_or(SimError::UnknownMaterial {
                        material: cell.material_id,
                        position: pos,
                    })?;
                self.update_cell(pos, cell, def);
            }
        }

        diffuse_chunk(&mut self.grid, catalog, self.params.ambient);
        self.progress.prune_unseen();

        let Self {
            grid,
            progress,
            events,
            stats,
            ..
        } = self;
        let chunk = grid.chunk;
        let lingering = !progress.is_empty()
            || !grid.intents.is_empty()
            || chunk
                .cells()
                .iter()
                .any(|c| c.lifetime.is_some() || c.has_flag(cell_flags::BURNING));
        if lingering {
            chunk.set_simulation_active(true);
        }
        chunk.reaction_progress = progress;

        Ok(ChunkOutcome {
            position: chunk.position,
            intents: grid.intents,
            events,
            stats,
            error: None,
        })
    }

    /// lifetime → movement → burning → reactions → state change
    fn update_cell(&mut self, pos: IVec2, cell: Cell, def: &MaterialDef) {
        let catalog = self.params.catalog;

        if !self.age(pos, cell, def) {
            return;
        }

        let from = pos;
        let Some(pos) = update_movement(
            &mut FlowCtx {
                grid: &mut self.grid,
                catalog,
                rng: &mut self.rng,
                stats: &mut self.stats,
                pressure_threshold: self.params.pressure_threshold,
            },
            from,
            cell,
            def,
        ) else {
            return;
        };
        self.progress.follow_move(from, pos);

        if cell.state == PhysicalState::Gas {
            equalize_gas(&mut self.grid, pos);
        }

        let mut env = ReactionEnv {
            catalog,
            dt: self.params.dt,
            rng: &mut self.rng,
            events: &mut self.events,
            stats: &mut self.stats,
        };
        if update_burning(&mut self.grid, &mut env, pos) {
            return;
        }

        // A pair is counted once per tick, whichever side reaches it first
        for partner in ChunkStore::neighbors4(pos) {
            if self.grid.is_writable(partner) {
                evaluate_pair(&mut self.grid, &mut self.progress, &mut env, pos, partner);
            } else if let (Some(a), Some(b)) = (self.grid.cell(pos), self.grid.cell(partner))
                && can_react(catalog, &a, &b)
            {
                self.grid.defer(Intent::Reaction { a: pos, b: partner });
            }
        }

        // A cell partway through a reaction keeps its phase until it fires
        if let Some(current) = self.grid.cell(pos)
            && !current.is_empty()
            && let Some(current_def) = catalog.material(current.material_id)
            && let Some(mut changed) =
                StateChangeSystem::check_state_change(&current, current_def, catalog)
            && !self.progress.is_reacting(pos)
        {
            changed.set_flag(cell_flags::UPDATED);
            self.grid.write(pos, changed);
            self.stats.record_state_change();
        }
    }

    /// Advance age and lifetime. Returns false when the cell decayed.
    fn age(&mut self, pos: IVec2, cell: Cell, def: &MaterialDef) -> bool {
        if let Some(remaining) = cell.lifetime
            && remaining <= 1
        {
            let remains = def
                .decays_to
                .and_then(|id| self.params.catalog.material(id))
                .map(Cell::from_material)
                .unwrap_or(Cell::EMPTY)
                .with_temperature(cell.temperature);
            self.grid.write(pos, remains);
            self.stats.record_state_change();
            return false;
        }

        if let Some(current) = self.grid.cell_mut(pos) {
            current.age = current.age.saturating_add(1);
            if let Some(remaining) = current.lifetime.as_mut() {
                *remaining -= 1;
            }
        }
        true
    }
}

/// Update one chunk, restoring it if the update fails or panics
pub(crate) fn run_isolated(
    chunk: &mut Chunk,
    halo: &Halo,
    params: &StepParams<'_>,
) -> ChunkOutcome {
    let position = chunk.position;
    let backup = chunk.clone();

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        ChunkWorker::new(chunk, halo, params).run()
    }));
    let error = match result {
        Ok(Ok(outcome)) => return outcome,
        Ok(Err(e)) => e,
        Err(payload) => SimError::ChunkPanicked {
            chunk: position,
            message: panic_message(payload.as_ref()),
        },
    };

    *chunk = backup;
    log::error!(
        "Chunk ({}, {}) update failed, skipped this tick: {}",
        position.x,
        position.y,
        error
    );
    ChunkOutcome {
        position,
        intents: Vec::new(),
        events: Vec::new(),
        stats: CountingStats::default(),
        error: Some(error),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Chunks to update this tick: every active chunk plus its loaded neighbours
pub(crate) fn chunks_to_update(store: &ChunkStore) -> HashSet<IVec2> {
    let mut positions = HashSet::new();
    for chunk in store.chunks().filter(|c| c.is_simulation_active()) {
        positions.insert(chunk.position);
        positions.extend(
            ChunkStore::neighbors8(chunk.position)
                .into_iter()
                .filter(|&n| store.is_loaded(n)),
        );
    }
    positions
}

/// Parallel phase: capture halos, then update each chunk on the pool.
/// Outcomes come back in row-major chunk order.
pub(crate) fn run_parallel(
    store: &mut ChunkStore,
    pool: &ThreadPool,
    params: &StepParams<'_>,
) -> Vec<ChunkOutcome> {
    let positions = chunks_to_update(store);
    if positions.is_empty() {
        return Vec::new();
    }

    pool.install(|| {
        let chunks = store.chunk_map();
        let halos: HashMap<IVec2, Halo> = positions
            .par_iter()
            .map(|&pos| (pos, Halo::capture(chunks, pos)))
            .collect();

        let mut outcomes: Vec<ChunkOutcome> = store
            .chunk_map_mut()
            .par_iter_mut()
            .filter_map(|(pos, chunk)| {
                halos
                    .get(pos)
                    .map(|halo| run_isolated(chunk, halo, params))
            })
            .collect();
        outcomes.sort_by_key(|o| (o.position.y, o.position.x));
        outcomes
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{EmptyTerrain, MemoryDeltaStore};
    use granule_simulation::MaterialId;
    use std::sync::Arc;

    fn params(catalog: &MaterialCatalog, tick: u64) -> StepParams<'_> {
        StepParams {
            catalog,
            seed: 9,
            tick,
            dt: 1.0 / 60.0,
            ambient: 20.0,
            pressure_threshold: 0.5,
        }
    }

    fn place(chunk: &mut Chunk, catalog: &MaterialCatalog, x: usize, y: usize, id: u16) {
        chunk.set_cell(x, y, Cell::from_material(catalog.material(id).unwrap()));
    }

    #[test]
    fn test_column_of_sand_falls_one_step() {
        let catalog = MaterialCatalog::with_defaults();
        let mut chunk = Chunk::new(IVec2::ZERO);
        for y in 10..13 {
            place(&mut chunk, &catalog, 5, y, MaterialId::SAND);
        }
        let halo = Halo::unloaded(IVec2::ZERO);

        let outcome = run_isolated(&mut chunk, &halo, &params(&catalog, 0));
        assert!(outcome.error.is_none());
        assert_eq!(outcome.stats.cells_moved, 3);
        for y in 11..14 {
            assert_eq!(chunk.get_material(5, y), MaterialId::SAND);
        }
        assert_eq!(chunk.get_material(5, 10), MaterialId::EMPTY);
        assert!(chunk.is_simulation_active());
    }

    #[test]
    fn test_settled_chunk_goes_inactive() {
        let catalog = MaterialCatalog::with_defaults();
        let mut chunk = Chunk::new(IVec2::ZERO);
        place(&mut chunk, &catalog, 5, 63, MaterialId::STONE);
        let halo = Halo::unloaded(IVec2::ZERO);

        let outcome = run_isolated(&mut chunk, &halo, &params(&catalog, 0));
        assert_eq!(outcome.stats.total(), 0);
        assert!(!chunk.is_simulation_active());
    }

    #[test]
    fn test_lifetime_decays() {
        let catalog = MaterialCatalog::with_defaults();
        let mut chunk = Chunk::new(IVec2::ZERO);
        // Boxed in so it can't rise
        place(&mut chunk, &catalog, 5, 5, MaterialId::SMOKE);
        for (x, y) in [(4, 4), (5, 4), (6, 4), (4, 5), (6, 5)] {
            place(&mut chunk, &catalog, x, y, MaterialId::STONE);
        }
        let mut smoke = chunk.get_cell(5, 5);
        smoke.lifetime = Some(2);
        chunk.set_cell(5, 5, smoke);
        let halo = Halo::unloaded(IVec2::ZERO);

        run_isolated(&mut chunk, &halo, &params(&catalog, 0));
        assert_eq!(chunk.get_cell(5, 5).lifetime, Some(1));
        assert_eq!(chunk.get_cell(5, 5).age, 1);

        run_isolated(&mut chunk, &halo, &params(&catalog, 1));
        assert_eq!(chunk.get_material(5, 5), MaterialId::EMPTY);
    }

    #[test]
    fn test_reacting_water_holds_off_boiling() {
        let catalog = MaterialCatalog::with_defaults();
        let mut chunk = Chunk::new(IVec2::ZERO);
        for (x, y) in [(4, 62), (6, 62), (4, 63), (6, 63)] {
            place(&mut chunk, &catalog, x, y, MaterialId::STONE);
        }
        place(&mut chunk, &catalog, 5, 63, MaterialId::LAVA);
        place(&mut chunk, &catalog, 5, 62, MaterialId::WATER);
        let hot = chunk.get_cell(5, 62).with_temperature(150.0);
        chunk.set_cell(5, 62, hot);
        let halo = Halo::unloaded(IVec2::ZERO);

        let outcome = run_isolated(&mut chunk, &halo, &params(&catalog, 0));
        assert_eq!(outcome.stats.state_changes, 0);
        assert_eq!(chunk.get_material(5, 62), MaterialId::WATER);
        assert!(chunk.is_simulation_active());

        let mut reactions = 0;
        for tick in 1..3 {
            reactions += run_isolated(&mut chunk, &halo, &params(&catalog, tick))
                .stats
                .reactions;
        }
        assert_eq!(reactions, 1);
        assert_eq!(chunk.get_material(5, 62), MaterialId::STEAM);
        assert_eq!(chunk.get_material(5, 63), MaterialId::STONE);
    }

    #[test]
    fn test_unknown_material_restores_chunk() {
        let catalog = MaterialCatalog::with_defaults();
        let mut chunk = Chunk::new(IVec2::ZERO);
        place(&mut chunk, &catalog, 5, 5, MaterialId::SAND);
        chunk.set_cell(
            20,
            20,
            Cell {
                material_id: 999,
                ..Cell::EMPTY
            },
        );
        let halo = Halo::unloaded(IVec2::ZERO);

        let outcome = run_isolated(&mut chunk, &halo, &params(&catalog, 0));
        assert!(matches!(
            outcome.error,
            Some(SimError::UnknownMaterial { material: 999, .. })
        ));
        // Sand at (5, 5) is scanned after row 20, so nothing moved
        assert_eq!(chunk.get_material(5, 5), MaterialId::SAND);
        assert_eq!(chunk.get_material(5, 6), MaterialId::EMPTY);
    }

    #[test]
    fn test_parallel_phase_is_deterministic() {
        let run = || {
            let catalog = Arc::new(MaterialCatalog::with_defaults());
            let mut store = ChunkStore::new(catalog.clone(), 20.0);
            let deltas = MemoryDeltaStore::new();
            for cx in 0..2 {
                store.load_chunk(IVec2::new(cx, 0), &EmptyTerrain, &deltas);
            }
            for x in 40..90 {
                store.set_material(IVec2::new(x, 10), MaterialId::WATER);
            }
            let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
            for tick in 0..5 {
                run_parallel(&mut store, &pool, &params(&catalog, tick));
            }
            (0..128)
                .flat_map(|x| (0..64).map(move |y| IVec2::new(x, y)))
                .map(|p| store.get_material(p))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_move_across_border_becomes_intent() {
        let catalog = Arc::new(MaterialCatalog::with_defaults());
        let mut store = ChunkStore::new(catalog.clone(), 20.0);
        let deltas = MemoryDeltaStore::new();
        store.load_chunk(IVec2::ZERO, &EmptyTerrain, &deltas);
        store.load_chunk(IVec2::new(0, 1), &EmptyTerrain, &deltas);
        store.set_material(IVec2::new(3, 63), MaterialId::SAND);

        let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
        let outcomes = run_parallel(&mut store, &pool, &params(&catalog, 0));
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].position, IVec2::ZERO);
        assert!(matches!(
            outcomes[0].intents[..],
            [Intent::Move { to, .. }] if to == IVec2::new(3, 64)
        ));
        // Not applied until the boundary pass
        assert_eq!(store.get_material(IVec2::new(3, 63)), MaterialId::SAND);
    }
}
