//! Destruction - circular, hardness-weighted cell removal
//!
//! Used by the destroy command and by explosive reactions. Cells are
//! visited in row-major order so a seeded RNG gives the same outcome
//! every run.

use glam::IVec2;
use granule_simulation::CHUNK_SIZE;

use crate::events::SimEvent;
use crate::world::{ChunkStore, SimStats, WorldRng};

/// Chance that a cell `distance` away from the center is removed
///
/// `force * (1 - distance / radius) / hardness`, clamped to [0, 1].
/// `None` hardness is indestructible, zero hardness breaks on any force.
pub fn destruction_probability(
    force: f32,
    radius: f32,
    distance: f32,
    hardness: Option<f32>,
) -> f32 {
    let Some(hardness) = hardness else {
        return 0.0;
    };
    if radius <= 0.0 {
        return 0.0;
    }

    let falloff = (1.0 - distance / radius).max(0.0);
    let impact = force * falloff;
    if hardness <= 0.0 {
        return if impact > 0.0 { 1.0 } else { 0.0 };
    }
    (impact / hardness).clamp(0.0, 1.0)
}

/// Remove cells around `center`. Returns how many were destroyed.
pub fn apply_destruction(
    store: &mut ChunkStore,
    center: IVec2,
    radius: f32,
    force: f32,
    rng: &mut dyn WorldRng,
    events: &mut Vec<SimEvent>,
    stats: &mut dyn SimStats,
) -> usize {
    let catalog = store.catalog().clone();
    let mut destroyed = 0;
    // Nothing loaded in reach gives an empty range
    let (min, max) = scan_bounds(store, center, radius).unwrap_or((IVec2::ONE, IVec2::ZERO));

    for y in min.y..=max.y {
        for x in min.x..=max.x {
            let pos = IVec2::new(x, y);
            let distance = (pos.as_dvec2() - center.as_dvec2()).length() as f32;
            if distance > radius {
                continue;
            }
            let Some(cell) = store.try_get_cell(pos) else {
                continue;
            };
            if cell.is_empty() {
                continue;
            }

            let hardness = catalog.material(cell.material_id).and_then(|def| def.hardness);
            let probability = destruction_probability(force, radius, distance, hardness);
            if probability > 0.0 && rng.check_probability(probability) {
                store.remove_cell(pos);
                events.push(SimEvent::CellDestroyed {
                    position: pos,
                    material_id: cell.material_id,
                });
                stats.record_cell_destroyed();
                destroyed += 1;
            }
        }
    }

    events.push(SimEvent::Exploded {
        center,
        radius,
        force,
    });
    log::debug!(
        "Destruction at ({}, {}) r={} f={} removed {} cells",
        center.x,
        center.y,
        radius,
        force,
        destroyed
    );
    destroyed
}

/// The blast's bounding box clipped to the loaded chunks it overlaps.
/// `None` when no loaded cell is in reach.
fn scan_bounds(store: &ChunkStore, center: IVec2, radius: f32) -> Option<(IVec2, IVec2)> {
    let reach = f64::from(radius).ceil() as i64;
    let (cx, cy) = (i64::from(center.x), i64::from(center.y));
    let size = CHUNK_SIZE as i64;

    let mut bounds: Option<(IVec2, IVec2)> = None;
    for chunk in store.chunks() {
        let origin = chunk.origin();
        let (ox, oy) = (i64::from(origin.x), i64::from(origin.y));
        let min_x = (cx - reach).max(ox);
        let max_x = (cx + reach).min(ox + size - 1);
        let min_y = (cy - reach).max(oy);
        let max_y = (cy + reach).min(oy + size - 1);
        if min_x > max_x || min_y > max_y {
            continue;
        }
        // Inside the chunk, so the casts can't truncate
        let lo = IVec2::new(min_x as i32, min_y as i32);
        let hi = IVec2::new(max_x as i32, max_y as i32);
        bounds = Some(match bounds {
            Some((a, b)) => (a.min(lo), b.max(hi)),
            None => (lo, hi),
        });
    }
    bounds
}
