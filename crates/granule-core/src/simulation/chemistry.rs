//! Chemistry - pairwise reactions and burning
//!
//! Reaction rules are shared and immutable. Contact time and progress live
//! in [`ReactionProgress`], keyed by the positions of the two cells. Entries
//! follow their cells when movement relocates them and are dropped as soon
//! as a pair stops being evaluated.

use ahash::AHashMap;
use glam::IVec2;
use granule_simulation::{Cell, MaterialCatalog, MaterialId, ReactionRule, cell_flags};
use smallvec::SmallVec;

use super::grid::{CellGrid, Intent};
use crate::events::SimEvent;
use crate::world::{ChunkStore, SimStats, WorldRng};

/// Temperature fire cells are held at
pub const FIRE_TEMPERATURE: f32 = 900.0;

/// Heat fire pushes into each neighbour per tick
const FIRE_HEAT: f32 = 15.0;

/// Heat a burning cell gains per tick
const BURN_HEAT: f32 = 5.0;

/// Chance per tick that a burning cell lights an empty neighbour
const FIRE_SPREAD_CHANCE: f32 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq)]
struct PairProgress {
    materials: (u16, u16),
    contact_time: f32,
    progress: f32,
    seen: bool,
}

impl PairProgress {
    fn fresh(materials: (u16, u16)) -> Self {
        Self {
            materials,
            contact_time: 0.0,
            progress: 0.0,
            seen: false,
        }
    }
}

/// Per-pair contact time and progress
#[derive(Clone, Debug, Default)]
pub struct ReactionProgress {
    pairs: AHashMap<(IVec2, IVec2), PairProgress>,
}

impl ReactionProgress {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Progress toward completion for the pair at `a` and `b`, if tracked
    pub fn progress_of(&self, a: IVec2, b: IVec2) -> Option<f32> {
        self.pairs.get(&pair_key(a, b)).map(|p| p.progress)
    }

    /// Whether the cell at `pos` is partway through a reaction
    pub fn is_reacting(&self, pos: IVec2) -> bool {
        self.pairs
            .iter()
            .any(|(&(a, b), pair)| (a == pos || b == pos) && pair.progress > 0.0)
    }

    /// Re-key pairs after the cell at `from` moved to `to`, swapping with
    /// whatever occupied `to`
    pub fn follow_move(&mut self, from: IVec2, to: IVec2) {
        if from == to {
            return;
        }
        let moved: SmallVec<[(IVec2, IVec2); 8]> = self
            .pairs
            .keys()
            .filter(|&&(a, b)| a == from || a == to || b == from || b == to)
            .copied()
            .collect();

        let relocate = |p: IVec2| {
            if p == from {
                to
            } else if p == to {
                from
            } else {
                p
            }
        };
        let entries: SmallVec<[_; 8]> = moved
            .into_iter()
            .filter_map(|key| self.pairs.remove(&key).map(|pair| (key, pair)))
            .collect();
        for ((a, b), pair) in entries {
            self.pairs.insert(pair_key(relocate(a), relocate(b)), pair);
        }
    }

    /// Drop pairs not evaluated since the last prune (contact broken) and
    /// reset the seen marks of the rest
    pub fn prune_unseen(&mut self) {
        self.pairs.retain(|_, pair| std::mem::take(&mut pair.seen));
    }
}

pub(crate) fn pair_key(a: IVec2, b: IVec2) -> (IVec2, IVec2) {
    if (a.y, a.x) <= (b.y, b.x) { (a, b) } else { (b, a) }
}

/// Material pair independent of which cell is which
fn material_key(a: u16, b: u16) -> (u16, u16) {
    (a.min(b), a.max(b))
}

/// Shared state for evaluating reactions and burning
pub(crate) struct ReactionEnv<'a> {
    pub catalog: &'a MaterialCatalog,
    pub dt: f32,
    pub rng: &'a mut dyn WorldRng,
    pub events: &'a mut Vec<SimEvent>,
    pub stats: &'a mut dyn SimStats,
}

/// Whether two materials have any rule between them
pub(crate) fn can_react(catalog: &MaterialCatalog, a: &Cell, b: &Cell) -> bool {
    !a.is_empty()
        && !b.is_empty()
        && !catalog
            .reactions()
            .find_all(a.material_id, b.material_id)
            .is_empty()
}

/// Advance the pair at `a`/`b` by one tick. Returns true when the reaction fired.
pub(crate) fn evaluate_pair<G: CellGrid + ?Sized>(
    grid: &mut G,
    progress: &mut ReactionProgress,
    env: &mut ReactionEnv<'_>,
    a: IVec2,
    b: IVec2,
) -> bool {
    let (Some(cell_a), Some(cell_b)) = (grid.cell(a), grid.cell(b)) else {
        return false;
    };
    let catalog = env.catalog;
    if !can_react(catalog, &cell_a, &cell_b) {
        return false;
    }

    let key = pair_key(a, b);
    let materials = material_key(cell_a.material_id, cell_b.material_id);

    let entry = progress
        .pairs
        .entry(key)
        .or_insert_with(|| PairProgress::fresh(materials));
    if entry.materials != materials {
        *entry = PairProgress::fresh(materials);
    } else if entry.seen {
        return false;
    }
    entry.seen = true;

    let temperature = (cell_a.temperature + cell_b.temperature) * 0.5;
    let pressure = (cell_a.pressure + cell_b.pressure) * 0.5;
    let catalyst_present = |catalyst: u16| {
        ChunkStore::neighbors8(a)
            .into_iter()
            .chain(ChunkStore::neighbors8(b))
            .any(|n| grid.cell(n).is_some_and(|c| c.material_id == catalyst))
    };

    let Some(rule) = catalog.reactions().find_matching(
        cell_a.material_id,
        cell_b.material_id,
        temperature,
        pressure,
        catalyst_present,
    ) else {
        entry.contact_time = 0.0;
        entry.progress = 0.0;
        return false;
    };

    entry.contact_time += env.dt;
    if entry.contact_time < rule.min_contact_time {
        return false;
    }
    entry.progress += rule.rate_at(temperature, pressure) * env.dt;
    if entry.progress < 1.0 {
        return false;
    }

    progress.pairs.remove(&key);
    apply_reaction(grid, env, rule, (a, cell_a), (b, cell_b));
    true
}

fn apply_reaction<G: CellGrid + ?Sized>(
    grid: &mut G,
    env: &mut ReactionEnv<'_>,
    rule: &ReactionRule,
    (a, cell_a): (IVec2, Cell),
    (b, cell_b): (IVec2, Cell),
) {
    let catalog = env.catalog;
    let registry = catalog.reactions();
    let outputs = registry.oriented_outputs(rule, cell_a.material_id, cell_b.material_id);
    let consumption = registry.oriented_consumption(rule, cell_a.material_id);

    for (pos, original, product, chance) in [
        (a, cell_a, outputs.for_a, consumption[0]),
        (b, cell_b, outputs.for_b, consumption[1]),
    ] {
        let mut cell = original;
        let replaced = product != original.material_id && env.rng.check_probability(chance);
        match catalog.material(product) {
            Some(def) if replaced => {
                let floor = def.spawn_temperature.unwrap_or(f32::MIN);
                cell = Cell::from_material(def)
                    .with_temperature((original.temperature + rule.heat_delta).max(floor));
            }
            _ => cell.temperature += rule.heat_delta,
        }
        if !cell.is_empty() {
            cell.pressure += rule.pressure_delta;
        }
        cell.set_flag(cell_flags::UPDATED);
        if grid.is_writable(pos) {
            grid.write(pos, cell);
        }
    }

    let mut spawns: SmallVec<[u16; 4]> = outputs.extra.iter().copied().collect();
    spawns.extend(rule.gas_byproduct);
    if !spawns.is_empty() {
        let temperature = (cell_a.temperature + cell_b.temperature) * 0.5 + rule.heat_delta;
        spawn_near(grid, catalog, &[a, b], &spawns, temperature);
    }

    if let Some(explosion) = rule.explosion {
        grid.defer(Intent::Explosion {
            center: a,
            radius: explosion.radius,
            force: explosion.force,
        });
    }

    env.events.push(SimEvent::Reacted {
        position: a,
        reaction: rule.name.clone(),
    });
    env.stats.record_reaction();
}

/// Place products into empty cells next to any of `around`
fn spawn_near<G: CellGrid + ?Sized>(
    grid: &mut G,
    catalog: &MaterialCatalog,
    around: &[IVec2],
    materials: &[u16],
    temperature: f32,
) {
    let mut used: SmallVec<[IVec2; 8]> = SmallVec::new();
    let mut pending = materials.iter().copied();
    let mut next = pending.next();

    for &center in around {
        for candidate in ChunkStore::neighbors4(center) {
            let Some(material_id) = next else {
                return;
            };
            if around.contains(&candidate) || used.contains(&candidate) {
                continue;
            }
            if !grid.cell(candidate).is_some_and(|c| c.is_empty()) {
                continue;
            }
            let Some(def) = catalog.material(material_id) else {
                next = pending.next();
                continue;
            };

            let temperature = temperature.max(def.spawn_temperature.unwrap_or(f32::MIN));
            if grid.is_writable(candidate) {
                grid.write(candidate, Cell::from_material(def).with_temperature(temperature));
            } else {
                grid.defer(Intent::Spawn {
                    position: candidate,
                    material_id,
                    temperature,
                });
            }
            used.push(candidate);
            next = pending.next();
        }
    }
}

/// Add heat to non-empty neighbours, up to `cap`
fn heat_neighbors<G: CellGrid + ?Sized>(grid: &mut G, pos: IVec2, amount: f32, cap: f32) {
    for n in ChunkStore::neighbors4(pos) {
        let Some(mut neighbor) = grid.cell(n) else {
            continue;
        };
        if neighbor.is_empty() || neighbor.temperature >= cap {
            continue;
        }
        if grid.is_writable(n) {
            neighbor.temperature = (neighbor.temperature + amount).min(cap);
            grid.write(n, neighbor);
        } else {
            grid.defer(Intent::Heat {
                position: n,
                delta: amount,
            });
        }
    }
}

/// Fire heats its surroundings, flammable cells ignite and burn away.
/// Returns true when the cell at `pos` burned out.
pub(crate) fn update_burning<G: CellGrid + ?Sized>(
    grid: &mut G,
    env: &mut ReactionEnv<'_>,
    pos: IVec2,
) -> bool {
    let Some(mut cell) = grid.cell(pos) else {
        return false;
    };
    let Some(def) = env.catalog.material(cell.material_id) else {
        return false;
    };

    if cell.material_id == MaterialId::FIRE {
        if cell.temperature < FIRE_TEMPERATURE {
            cell.temperature = FIRE_TEMPERATURE;
            grid.write(pos, cell);
        }
        heat_neighbors(grid, pos, FIRE_HEAT, FIRE_TEMPERATURE);
        return false;
    }

    if !def.flammable {
        return false;
    }

    if !cell.has_flag(cell_flags::BURNING) {
        if !def.ignition_temp.is_some_and(|t| cell.temperature >= t) {
            return false;
        }
        cell.set_flag(cell_flags::BURNING);
        env.events.push(SimEvent::Ignited {
            position: pos,
            material_id: cell.material_id,
        });
    }

    cell.temperature += BURN_HEAT;
    let burn_temperature = cell.temperature;

    if env.rng.check_probability(FIRE_SPREAD_CHANCE)
        && let Some(fire) = env.catalog.material(MaterialId::FIRE)
    {
        for offset in [IVec2::NEG_Y, IVec2::X, IVec2::NEG_X, IVec2::Y] {
            let n = pos + offset;
            if grid.is_writable(n) && grid.cell(n).is_some_and(|c| c.is_empty()) {
                grid.write(n, Cell::from_material(fire));
                break;
            }
        }
    }

    if env.rng.check_probability(def.burn_rate) {
        let remains = def
            .burns_to
            .and_then(|id| env.catalog.material(id))
            .map(Cell::from_material)
            .unwrap_or(Cell::EMPTY)
            .with_temperature(burn_temperature);
        grid.write(pos, remains);
        env.stats.record_state_change();
        return true;
    }

    grid.write(pos, cell);
    heat_neighbors(grid, pos, BURN_HEAT, burn_temperature);
    false
}
