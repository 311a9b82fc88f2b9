//! Temperature diffusion
//!
//! Each cell moves toward its 4-neighbours weighted by both conductivities.
//! Empty cells carry little heat and drift back to ambient. Unloaded
//! neighbours insulate.

use glam::IVec2;
use granule_simulation::{CHUNK_SIZE, Cell, MaterialCatalog};

use super::grid::{CellGrid, ChunkGrid};

/// How much of the weighted difference one neighbour contributes per tick
const DIFFUSION_RATE: f32 = 0.25;

/// Fraction of the gap to ambient an empty cell closes per tick
const AMBIENT_RELAXATION: f32 = 0.05;

/// Conductivity used for empty cells
pub const EMPTY_CONDUCTIVITY: f32 = 0.05;

fn conductivity(cell: &Cell, catalog: &MaterialCatalog) -> f32 {
    if cell.is_empty() {
        return EMPTY_CONDUCTIVITY;
    }
    catalog
        .material(cell.material_id)
        .map(|def| def.heat_conductivity)
        .unwrap_or(0.0)
}

/// New temperature for one cell given its neighbours
fn diffused(
    cell: &Cell,
    neighbors: impl Iterator<Item = Cell>,
    catalog: &MaterialCatalog,
    ambient: f32,
) -> f32 {
    let t = cell.temperature;
    if cell.is_empty() {
        return t + (ambient - t) * AMBIENT_RELAXATION;
    }

    let k = conductivity(cell, catalog);
    let delta: f32 = neighbors
        .map(|n| k * conductivity(&n, catalog) * (n.temperature - t) * DIFFUSION_RATE)
        .sum();
    t + delta
}

/// Diffuse heat across the worker's chunk. Reads all temperatures first so
/// the result doesn't depend on scan order.
pub(crate) fn diffuse_chunk(grid: &mut ChunkGrid<'_>, catalog: &MaterialCatalog, ambient: f32) {
    let origin = grid.chunk.origin();
    let mut next = Vec::with_capacity(CHUNK_SIZE * CHUNK_SIZE);

    for y in 0..CHUNK_SIZE {
        for x in 0..CHUNK_SIZE {
            let pos = origin + IVec2::new(x as i32, y as i32);
            let cell = grid.chunk.get_cell(x, y);
            let neighbors = [IVec2::NEG_Y, IVec2::X, IVec2::Y, IVec2::NEG_X]
                .into_iter()
                .filter_map(|offset| grid.cell(pos + offset));
            next.push(diffused(&cell, neighbors, catalog, ambient));
        }
    }

    for (idx, temperature) in next.into_iter().enumerate() {
        let (x, y) = (idx % CHUNK_SIZE, idx / CHUNK_SIZE);
        if grid.chunk.get_cell(x, y).temperature != temperature {
            grid.chunk.set_temperature(x, y, temperature);
        }
    }
}
