//! Pressure bookkeeping
//!
//! Liquids and powders carry hydrostatic load: the summed density of the
//! contiguous liquid/powder column resting on them. Gas cells use `pressure`
//! as concentration instead.

use glam::IVec2;
use granule_simulation::{CHUNK_SIZE, Cell, MaterialCatalog, MaterialCategory, PhysicalState};

use super::grid::{CellGrid, ChunkGrid};

/// Upper bound on gas concentration in a single cell
pub const MAX_GAS_PRESSURE: f32 = 8.0;

/// Concentration above which a gas cell spills into an empty neighbour
pub const GAS_SPLIT_PRESSURE: f32 = 2.0;

fn bears_load(cell: &Cell, catalog: &MaterialCatalog) -> Option<f32> {
    let def = catalog.material(cell.material_id)?;
    let settles = cell.state == PhysicalState::Liquid
        || (cell.state == PhysicalState::Solid && def.category == MaterialCategory::Powder);
    settles.then_some(def.density)
}

/// Recompute hydrostatic load for every liquid/powder cell of the chunk,
/// seeding each column from the halo cell above it
pub(crate) fn update_hydrostatic(grid: &mut ChunkGrid<'_>, catalog: &MaterialCatalog) {
    let origin = grid.chunk.origin();

    for x in 0..CHUNK_SIZE {
        let top = origin + IVec2::new(x as i32, -1);
        let mut load = grid
            .cell(top)
            .and_then(|above| bears_load(&above, catalog).map(|d| above.pressure + d))
            .unwrap_or(0.0);

        for y in 0..CHUNK_SIZE {
            let cell = grid.chunk.cell_mut(x, y);
            match bears_load(cell, catalog) {
                Some(density) => {
                    cell.pressure = load;
                    load += density;
                }
                None => {
                    if cell.state != PhysicalState::Gas || cell.is_empty() {
                        cell.pressure = 0.0;
                    }
                    load = 0.0;
                }
            }
        }
    }
}

/// Even out concentration with same-gas neighbours, clamp it, and spill
/// into an empty neighbour when too dense
pub(crate) fn equalize_gas(grid: &mut ChunkGrid<'_>, pos: IVec2) {
    let Some(cell) = grid.cell(pos) else {
        return;
    };
    if cell.state != PhysicalState::Gas || cell.is_empty() {
        return;
    }

    let mut pressure = cell.pressure.min(MAX_GAS_PRESSURE);
    for offset in [IVec2::NEG_Y, IVec2::X, IVec2::Y, IVec2::NEG_X] {
        let n = pos + offset;
        if !grid.is_writable(n) {
            continue;
        }
        let Some(neighbor) = grid.cell_mut(n) else {
            continue;
        };
        if neighbor.material_id == cell.material_id && neighbor.state == PhysicalState::Gas {
            let average = ((pressure + neighbor.pressure) * 0.5).min(MAX_GAS_PRESSURE);
            neighbor.pressure = average;
            pressure = average;
        }
    }

    if pressure > GAS_SPLIT_PRESSURE {
        for offset in [IVec2::NEG_Y, IVec2::X, IVec2::NEG_X, IVec2::Y] {
            let n = pos + offset;
            if grid.is_writable(n) && grid.cell(n).is_some_and(|c| c.is_empty()) {
                pressure *= 0.5;
                let mut spilled = cell;
                spilled.pressure = pressure;
                grid.write(n, spilled);
                break;
            }
        }
    }

    if let Some(current) = grid.cell_mut(pos) {
        current.pressure = pressure;
    }
}
