//! Boundary resolution - the serial pass after the parallel phase
//!
//! Applies the intents chunk workers couldn't apply themselves, in a fixed
//! order: moves, heat, spawns, cross-chunk reactions, explosions.

use std::collections::HashSet;

use glam::IVec2;
use granule_simulation::{Cell, cell_flags};

use super::chemistry::{ReactionEnv, ReactionProgress, evaluate_pair, pair_key};
use super::destruction::apply_destruction;
use super::grid::{Intent, StoreGrid};
use super::worker::ChunkOutcome;
use crate::events::SimEvent;
use crate::world::{ChunkStore, SimStats, WorldRng};

/// Mutable state the boundary pass works against
pub(crate) struct BoundaryPass<'a> {
    pub store: &'a mut ChunkStore,
    pub progress: &'a mut ReactionProgress,
    pub rng: &'a mut dyn WorldRng,
    pub events: &'a mut Vec<SimEvent>,
    pub stats: &'a mut dyn SimStats,
    pub dt: f32,
}

#[derive(Default)]
struct Sorted {
    moves: Vec<Intent>,
    heat: Vec<(IVec2, f32)>,
    spawns: Vec<(IVec2, u16, f32)>,
    reactions: Vec<(IVec2, IVec2)>,
    explosions: Vec<(IVec2, f32, f32)>,
}

impl Sorted {
    fn push(&mut self, intent: Intent) {
        match intent {
            Intent::Move { .. } => self.moves.push(intent),
            Intent::Heat { position, delta } => self.heat.push((position, delta)),
            Intent::Spawn {
                position,
                material_id,
                temperature,
            } => self.spawns.push((position, material_id, temperature)),
            Intent::Reaction { a, b } => self.reactions.push((a, b)),
            Intent::Explosion {
                center,
                radius,
                force,
            } => self.explosions.push((center, radius, force)),
        }
    }
}

impl BoundaryPass<'_> {
    /// Resolve every outcome's intents and fold in its events and counts.
    /// `outcomes` must already be in a deterministic order.
    pub fn resolve(&mut self, outcomes: Vec<ChunkOutcome>) {
        let mut sorted = Sorted::default();
        for outcome in outcomes {
            self.stats.merge_counts(&outcome.stats);
            self.events.extend(outcome.events);
            for intent in outcome.intents {
                sorted.push(intent);
            }
        }

        let Sorted {
            moves,
            heat,
            spawns,
            reactions,
            mut explosions,
        } = sorted;

        for intent in moves {
            self.apply_move(intent);
        }
        for (position, delta) in heat {
            self.store.add_heat(position, delta);
        }
        for (position, material_id, temperature) in spawns {
            self.apply_spawn(position, material_id, temperature);
        }
        explosions.extend(self.react(reactions));

        for (center, radius, force) in explosions {
            apply_destruction(
                &mut *self.store,
                center,
                radius,
                force,
                &mut *self.rng,
                &mut *self.events,
                &mut *self.stats,
            );
        }
    }

    /// Swap across a chunk border if both cells still hold what the worker saw
    fn apply_move(&mut self, intent: Intent) {
        let Intent::Move {
            from,
            to,
            material,
            expected,
        } = intent
        else {
            return;
        };
        let source = self.store.try_get_cell(from);
        let target = self.store.try_get_cell(to);
        let (Some(source), Some(target)) = (source, target) else {
            return;
        };
        if source.material_id != material
            || target.material_id != expected.material_id
            || target.state != expected.state
        {
            log::trace!(
                "Boundary move ({}, {}) -> ({}, {}) is stale, dropping it",
                from.x,
                from.y,
                to.x,
                to.y
            );
            return;
        }

        let mut moved = source;
        moved.set_flag(cell_flags::UPDATED);
        self.store.set_cell(to, moved);
        self.store.set_cell(from, target);
        self.stats.record_cell_moved();
    }

    fn apply_spawn(&mut self, position: IVec2, material_id: u16, temperature: f32) {
        if !self.store.try_get_cell(position).is_some_and(|c| c.is_empty()) {
            return;
        }
        let catalog = self.store.catalog().clone();
        if let Some(def) = catalog.material(material_id) {
            let cell = Cell::from_material(def).with_temperature(temperature);
            self.store.set_cell(position, cell);
        }
    }

    /// Evaluate each cross-chunk pair once. Returns explosions they set off.
    fn react(&mut self, pairs: Vec<(IVec2, IVec2)>) -> Vec<(IVec2, f32, f32)> {
        let catalog = self.store.catalog().clone();
        let mut grid = StoreGrid {
            store: &mut *self.store,
            deferred: Vec::new(),
        };
        let mut env = ReactionEnv {
            catalog: &catalog,
            dt: self.dt,
            rng: &mut *self.rng,
            events: &mut *self.events,
            stats: &mut *self.stats,
        };

        let mut seen = HashSet::new();
        for (a, b) in pairs {
            if seen.insert(pair_key(a, b)) {
                evaluate_pair(&mut grid, self.progress, &mut env, a, b);
            }
        }
        self.progress.prune_unseen();

        grid.deferred
            .into_iter()
            .filter_map(|intent| match intent {
                Intent::Explosion {
                    center,
                    radius,
                    force,
                } => Some((center, radius, force)),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{CountingStats, EmptyTerrain, MemoryDeltaStore};
    use granule_simulation::{MaterialCatalog, MaterialId};
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;
    use std::sync::Arc;

    fn store() -> ChunkStore {
        let mut store = ChunkStore::new(Arc::new(MaterialCatalog::with_defaults()), 20.0);
        let deltas = MemoryDeltaStore::new();
        store.load_chunk(IVec2::ZERO, &EmptyTerrain, &deltas);
        store.load_chunk(IVec2::new(0, 1), &EmptyTerrain, &deltas);
        store
    }

    fn outcome(intents: Vec<Intent>) -> ChunkOutcome {
        ChunkOutcome {
            position: IVec2::ZERO,
            intents,
            events: Vec::new(),
            stats: CountingStats::default(),
            error: None,
        }
    }

    fn resolve(
        store: &mut ChunkStore,
        outcomes: Vec<ChunkOutcome>,
    ) -> (Vec<SimEvent>, CountingStats) {
        let mut progress = ReactionProgress::default();
        let mut rng = Xoshiro256StarStar::seed_from_u64(5);
        let mut events = Vec::new();
        let mut stats = CountingStats::default();
        BoundaryPass {
            store,
            progress: &mut progress,
            rng: &mut rng,
            events: &mut events,
            stats: &mut stats,
            dt: 1.0 / 60.0,
        }
        .resolve(outcomes);
        (events, stats)
    }

    fn sand_move() -> Intent {
        Intent::Move {
            from: IVec2::new(3, 63),
            to: IVec2::new(3, 64),
            material: MaterialId::SAND,
            expected: Cell::EMPTY,
        }
    }

    #[test]
    fn test_move_is_applied() {
        let mut store = store();
        store.set_material(IVec2::new(3, 63), MaterialId::SAND);

        let (_, stats) = resolve(&mut store, vec![outcome(vec![sand_move()])]);
        assert_eq!(store.get_material(IVec2::new(3, 64)), MaterialId::SAND);
        assert_eq!(store.get_material(IVec2::new(3, 63)), MaterialId::EMPTY);
        assert_eq!(stats.cells_moved, 1);
    }

    #[test]
    fn test_stale_move_is_dropped() {
        let mut store = store();
        store.set_material(IVec2::new(3, 63), MaterialId::SAND);
        store.set_material(IVec2::new(3, 64), MaterialId::STONE);

        let (_, stats) = resolve(&mut store, vec![outcome(vec![sand_move()])]);
        assert_eq!(store.get_material(IVec2::new(3, 63)), MaterialId::SAND);
        assert_eq!(store.get_material(IVec2::new(3, 64)), MaterialId::STONE);
        assert_eq!(stats.cells_moved, 0);
    }

    #[test]
    fn test_competing_moves_into_one_cell() {
        let mut store = store();
        store.set_material(IVec2::new(3, 63), MaterialId::SAND);
        store.set_material(IVec2::new(4, 63), MaterialId::SAND);
        let second = Intent::Move {
            from: IVec2::new(4, 63),
            to: IVec2::new(3, 64),
            material: MaterialId::SAND,
            expected: Cell::EMPTY,
        };

        resolve(&mut store, vec![outcome(vec![sand_move(), second])]);
        assert_eq!(store.get_material(IVec2::new(3, 64)), MaterialId::SAND);
        assert_eq!(store.get_material(IVec2::new(4, 63)), MaterialId::SAND);
    }

    #[test]
    fn test_spawn_only_into_empty() {
        let mut store = store();
        store.set_material(IVec2::new(1, 64), MaterialId::STONE);
        let intents = vec![
            Intent::Spawn {
                position: IVec2::new(0, 64),
                material_id: MaterialId::SMOKE,
                temperature: 300.0,
            },
            Intent::Spawn {
                position: IVec2::new(1, 64),
                material_id: MaterialId::SMOKE,
                temperature: 300.0,
            },
        ];
        resolve(&mut store, vec![outcome(intents)]);
        assert_eq!(store.get_material(IVec2::new(0, 64)), MaterialId::SMOKE);
        assert_eq!(store.get_cell(IVec2::new(0, 64)).temperature, 300.0);
        assert_eq!(store.get_material(IVec2::new(1, 64)), MaterialId::STONE);
    }

    #[test]
    fn test_heat_applies_to_occupied_cells() {
        let mut store = store();
        store.set_material(IVec2::new(2, 70), MaterialId::STONE);
        let intents = vec![
            Intent::Heat {
                position: IVec2::new(2, 70),
                delta: 15.0,
            },
            Intent::Heat {
                position: IVec2::new(3, 70),
                delta: 15.0,
            },
        ];
        resolve(&mut store, vec![outcome(intents)]);
        assert_eq!(store.get_cell(IVec2::new(2, 70)).temperature, 35.0);
        assert_eq!(store.get_cell(IVec2::new(3, 70)).temperature, 20.0);
    }

    #[test]
    fn test_cross_chunk_reaction_dedup_and_fires() {
        let mut store = store();
        // Water above the border, lava below: fast quench reaction
        store.set_material(IVec2::new(5, 63), MaterialId::WATER);
        store.set_material(IVec2::new(5, 64), MaterialId::LAVA);
        let pair = Intent::Reaction {
            a: IVec2::new(5, 63),
            b: IVec2::new(5, 64),
        };
        let flipped = Intent::Reaction {
            a: IVec2::new(5, 64),
            b: IVec2::new(5, 63),
        };

        let mut progress = ReactionProgress::default();
        let mut rng = Xoshiro256StarStar::seed_from_u64(5);
        let mut events = Vec::new();
        let mut stats = CountingStats::default();
        for _ in 0..600 {
            if stats.reactions > 0 {
                break;
            }
            BoundaryPass {
                store: &mut store,
                progress: &mut progress,
                rng: &mut rng,
                events: &mut events,
                stats: &mut stats,
                dt: 1.0 / 60.0,
            }
            .resolve(vec![outcome(vec![pair.clone(), flipped.clone()])]);
        }
        assert_eq!(stats.reactions, 1);
        assert!(
            events
                .iter()
                .any(|e| matches!(e, SimEvent::Reacted { .. }))
        );
        assert!(progress.is_empty());
    }

    #[test]
    fn test_explosion_intent_destroys() {
        let mut store = store();
        for x in 0..10 {
            store.set_material(IVec2::new(x, 60), MaterialId::DIRT);
        }
        let intents = vec![Intent::Explosion {
            center: IVec2::new(5, 60),
            radius: 3.0,
            force: 50.0,
        }];
        let (events, stats) = resolve(&mut store, vec![outcome(intents)]);
        assert!(stats.cells_destroyed > 0);
        assert_eq!(store.get_material(IVec2::new(5, 60)), MaterialId::EMPTY);
        assert!(
            events
                .iter()
                .any(|e| matches!(e, SimEvent::Exploded { .. }))
        );
    }
}
