//! Per-chunk color buffers for the external renderer

use glam::IVec2;
use granule_simulation::{Cell, MaterialCatalog, PhysicalState};

use crate::world::Chunk;

/// Temperature where cells start to glow
const GLOW_START: f32 = 100.0;

/// Temperature of full glow
const GLOW_FULL: f32 = 1000.0;

const GLOW_COLOR: [f32; 3] = [255.0, 96.0, 32.0];

/// Display colors for one dirty chunk, row-major like the chunk's cells
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkRenderData {
    pub position: IVec2,
    pub colors: Vec<[u8; 4]>,
}

impl ChunkRenderData {
    pub fn from_chunk(chunk: &Chunk, catalog: &MaterialCatalog) -> Self {
        Self {
            position: chunk.position,
            colors: chunk
                .cells()
                .iter()
                .map(|cell| cell_color(cell, catalog))
                .collect(),
        }
    }
}

/// Convert a cell to RGBA
///
/// Base material color, shifted toward orange-red above 100 degrees,
/// a little darker when liquid and half as opaque when gaseous.
pub fn cell_color(cell: &Cell, catalog: &MaterialCatalog) -> [u8; 4] {
    if cell.is_empty() {
        return [0, 0, 0, 0];
    }
    let base = catalog.materials().get_color(cell.material_id);
    let mut rgb = [base[0] as f32, base[1] as f32, base[2] as f32];
    let mut alpha = base[3];

    if cell.temperature > GLOW_START {
        let t = ((cell.temperature - GLOW_START) / (GLOW_FULL - GLOW_START)).min(1.0);
        for (channel, glow) in rgb.iter_mut().zip(GLOW_COLOR) {
            *channel += (glow - *channel) * t;
        }
    }

    match cell.state {
        PhysicalState::Liquid => rgb.iter_mut().for_each(|c| *c *= 0.85),
        PhysicalState::Gas => alpha /= 2,
        PhysicalState::Solid => {}
    }

    [rgb[0] as u8, rgb[1] as u8, rgb[2] as u8, alpha]
}

#[cfg(test)]
mod tests {
    use super::*;
    use granule_simulation::{CHUNK_AREA, MaterialId};

    fn cell(catalog: &MaterialCatalog, id: u16) -> Cell {
        Cell::from_material(catalog.material(id).unwrap())
    }

    #[test]
    fn test_empty_is_transparent() {
        let catalog = MaterialCatalog::with_defaults();
        assert_eq!(cell_color(&Cell::EMPTY, &catalog), [0, 0, 0, 0]);
    }

    #[test]
    fn test_cool_solid_uses_base_color() {
        let catalog = MaterialCatalog::with_defaults();
        let stone = cell(&catalog, MaterialId::STONE);
        assert_eq!(cell_color(&stone, &catalog), [128, 128, 128, 255]);
    }

    #[test]
    fn test_hot_cell_glows() {
        let catalog = MaterialCatalog::with_defaults();
        let hot = cell(&catalog, MaterialId::STONE).with_temperature(1000.0);
        let color = cell_color(&hot, &catalog);
        assert_eq!(color, [255, 96, 32, 255]);
    }

    #[test]
    fn test_state_tints() {
        let catalog = MaterialCatalog::with_defaults();
        let mut molten = cell(&catalog, MaterialId::STONE);
        molten.state = PhysicalState::Liquid;
        assert_eq!(cell_color(&molten, &catalog), [108, 108, 108, 255]);

        let smoke = cell(&catalog, MaterialId::SMOKE);
        assert_eq!(cell_color(&smoke, &catalog)[3], 75);
    }

    #[test]
    fn test_buffer_covers_chunk() {
        let catalog = MaterialCatalog::with_defaults();
        let mut chunk = Chunk::new(IVec2::new(2, -1));
        chunk.set_cell(3, 0, cell(&catalog, MaterialId::SAND));

        let data = ChunkRenderData::from_chunk(&chunk, &catalog);
        assert_eq!(data.position, IVec2::new(2, -1));
        assert_eq!(data.colors.len(), CHUNK_AREA);
        assert_eq!(data.colors[3], [194, 178, 128, 255]);
        assert_eq!(data.colors[4], [0, 0, 0, 0]);
    }
}
