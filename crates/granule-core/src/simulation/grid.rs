//! Cell access for the step engine
//!
//! A chunk worker may only write its own chunk. Everything it reads outside
//! comes from a halo copied before the parallel phase, and anything it wants
//! to change there is recorded as an [`Intent`] for the boundary pass.

use std::collections::HashMap;

use glam::IVec2;
use granule_simulation::{CHUNK_SIZE, Cell};

use crate::world::{Chunk, ChunkStore};

const SIZE: i32 = CHUNK_SIZE as i32;
const RING: usize = 2 * (CHUNK_SIZE + 2) + 2 * CHUNK_SIZE;

/// Effect on a cell outside the worker's chunk, resolved serially after the
/// parallel phase
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Intent {
    /// Swap `from` with `to`, provided both still hold what the worker saw
    Move {
        from: IVec2,
        to: IVec2,
        material: u16,
        expected: Cell,
    },
    /// Add heat to a cell
    Heat { position: IVec2, delta: f32 },
    /// Place a fresh cell if the position is still empty
    Spawn {
        position: IVec2,
        material_id: u16,
        temperature: f32,
    },
    /// Evaluate a reacting pair that straddles two chunks
    Reaction { a: IVec2, b: IVec2 },
    Explosion {
        center: IVec2,
        radius: f32,
        force: f32,
    },
}

/// Read/write view over cells used by the shared movement and reaction code
pub(crate) trait CellGrid {
    /// Cell at a global position, `None` when unloaded or out of view
    fn cell(&self, pos: IVec2) -> Option<Cell>;

    /// Whether `write` may touch `pos` right now
    fn is_writable(&self, pos: IVec2) -> bool;

    /// Overwrite a cell. Only called for writable positions.
    fn write(&mut self, pos: IVec2, cell: Cell);

    /// Record an effect the grid can't apply directly
    fn defer(&mut self, intent: Intent);
}

/// Snapshot of the ring of cells surrounding a chunk
#[derive(Clone, Debug)]
pub struct Halo {
    origin: IVec2,
    cells: Vec<Option<Cell>>,
}

impl Halo {
    /// Copy the border cells of the chunks around `chunk_pos`
    pub fn capture(chunks: &HashMap<IVec2, Chunk>, chunk_pos: IVec2) -> Self {
        let origin = chunk_pos * SIZE;
        let mut cells = vec![None; RING];

        for lx in -1..=SIZE {
            for ly in [-1, SIZE] {
                if let Some(idx) = Self::ring_index(IVec2::new(lx, ly)) {
                    cells[idx] = Self::lookup(chunks, origin + IVec2::new(lx, ly));
                }
            }
        }
        for ly in 0..SIZE {
            for lx in [-1, SIZE] {
                if let Some(idx) = Self::ring_index(IVec2::new(lx, ly)) {
                    cells[idx] = Self::lookup(chunks, origin + IVec2::new(lx, ly));
                }
            }
        }

        Self { origin, cells }
    }

    /// Halo with every neighbour unloaded
    #[cfg(test)]
    pub(crate) fn unloaded(chunk_pos: IVec2) -> Self {
        Self {
            origin: chunk_pos * SIZE,
            cells: vec![None; RING],
        }
    }

    fn lookup(chunks: &HashMap<IVec2, Chunk>, pos: IVec2) -> Option<Cell> {
        let (chunk_pos, x, y) = ChunkStore::world_to_chunk_coords(pos);
        chunks.get(&chunk_pos).map(|chunk| chunk.get_cell(x, y))
    }

    /// Position in the ring for chunk-local coordinates just outside the chunk
    fn ring_index(local: IVec2) -> Option<usize> {
        let (lx, ly) = (local.x, local.y);
        if !(-1..=SIZE).contains(&lx) || !(-1..=SIZE).contains(&ly) {
            return None;
        }
        if ly == -1 {
            Some((lx + 1) as usize)
        } else if ly == SIZE {
            Some(CHUNK_SIZE + 2 + (lx + 1) as usize)
        } else if lx == -1 {
            Some(2 * (CHUNK_SIZE + 2) + ly as usize)
        } else if lx == SIZE {
            Some(2 * (CHUNK_SIZE + 2) + CHUNK_SIZE + ly as usize)
        } else {
            None
        }
    }

    /// Cell at a global position if it lies in the ring
    pub fn get(&self, pos: IVec2) -> Option<Cell> {
        Self::ring_index(pos - self.origin).and_then(|idx| self.cells[idx])
    }

    #[cfg(test)]
    pub(crate) fn set(&mut self, pos: IVec2, cell: Option<Cell>) {
        if let Some(idx) = Self::ring_index(pos - self.origin) {
            self.cells[idx] = cell;
        }
    }
}

/// Worker view: its own chunk writable, the halo read-only
pub(crate) struct ChunkGrid<'a> {
    pub chunk: &'a mut Chunk,
    pub halo: &'a Halo,
    pub intents: Vec<Intent>,
}

impl<'a> ChunkGrid<'a> {
    pub fn new(chunk: &'a mut Chunk, halo: &'a Halo) -> Self {
        Self {
            chunk,
            halo,
            intents: Vec::new(),
        }
    }

    #[inline]
    pub fn local(&self, pos: IVec2) -> Option<(usize, usize)> {
        self.chunk.local_coords(pos)
    }

    /// Mutable access to a cell of the own chunk without dirty tracking
    pub fn cell_mut(&mut self, pos: IVec2) -> Option<&mut Cell> {
        let (x, y) = self.local(pos)?;
        Some(self.chunk.cell_mut(x, y))
    }

    /// Swap two cells of the own chunk
    pub fn swap_local(&mut self, a: IVec2, b: IVec2) -> bool {
        match (self.local(a), self.local(b)) {
            (Some((ax, ay)), Some((bx, by))) => {
                self.chunk.swap_cells(ax, ay, bx, by);
                true
            }
            _ => false,
        }
    }
}

impl CellGrid for ChunkGrid<'_> {
    fn cell(&self, pos: IVec2) -> Option<Cell> {
        match self.local(pos) {
            Some((x, y)) => Some(self.chunk.get_cell(x, y)),
            None => self.halo.get(pos),
        }
    }

    fn is_writable(&self, pos: IVec2) -> bool {
        self.local(pos).is_some()
    }

    fn write(&mut self, pos: IVec2, cell: Cell) {
        if let Some((x, y)) = self.local(pos) {
            self.chunk.set_cell(x, y, cell);
        }
    }

    fn defer(&mut self, intent: Intent) {
        self.intents.push(intent);
    }
}

/// Serial view over the whole store, used by the boundary pass
pub(crate) struct StoreGrid<'a> {
    pub store: &'a mut ChunkStore,
    pub deferred: Vec<Intent>,
}

impl CellGrid for StoreGrid<'_> {
    fn cell(&self, pos: IVec2) -> Option<Cell> {
        self.store.try_get_cell(pos)
    }

    fn is_writable(&self, pos: IVec2) -> bool {
        self.store.try_get_cell(pos).is_some()
    }

    fn write(&mut self, pos: IVec2, cell: Cell) {
        self.store.set_cell(pos, cell);
    }

    fn defer(&mut self, intent: Intent) {
        self.deferred.push(intent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use granule_simulation::{MaterialCatalog, MaterialId};

    fn sand() -> Cell {
        let catalog = MaterialCatalog::with_defaults();
        Cell::from_material(catalog.material(MaterialId::SAND).unwrap())
    }

    #[test]
    fn test_ring_indices_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for lx in -1..=SIZE {
            for ly in -1..=SIZE {
                if let Some(idx) = Halo::ring_index(IVec2::new(lx, ly)) {
                    assert!(idx < RING);
                    assert!(seen.insert(idx));
                }
            }
        }
        assert_eq!(seen.len(), RING);
        assert_eq!(Halo::ring_index(IVec2::new(5, 5)), None);
    }

    #[test]
    fn test_capture_reads_neighbours() {
        let mut chunks = HashMap::new();
        let mut below = Chunk::new(IVec2::new(0, 1));
        below.set_cell(7, 0, sand());
        chunks.insert(IVec2::new(0, 1), below);
        chunks.insert(IVec2::ZERO, Chunk::new(IVec2::ZERO));

        let halo = Halo::capture(&chunks, IVec2::ZERO);
        assert_eq!(halo.get(IVec2::new(7, 64)).unwrap().material_id, MaterialId::SAND);
        assert!(halo.get(IVec2::new(8, 64)).unwrap().is_empty());
        // Chunk above isn't loaded
        assert!(halo.get(IVec2::new(7, -1)).is_none());
        // Inside the chunk is not part of the halo
        assert!(halo.get(IVec2::new(7, 7)).is_none());
    }

    #[test]
    fn test_chunk_grid_reads_halo_and_writes_own() {
        let mut chunk = Chunk::new(IVec2::ZERO);
        let mut halo = Halo::unloaded(IVec2::ZERO);
        halo.set(IVec2::new(64, 3), Some(sand()));

        let mut grid = ChunkGrid::new(&mut chunk, &halo);
        assert_eq!(grid.cell(IVec2::new(64, 3)).unwrap().material_id, MaterialId::SAND);
        assert!(grid.is_writable(IVec2::new(63, 3)));
        assert!(!grid.is_writable(IVec2::new(64, 3)));

        grid.write(IVec2::new(1, 1), sand());
        grid.write(IVec2::new(64, 3), Cell::EMPTY);
        assert_eq!(chunk.get_material(1, 1), MaterialId::SAND);
    }
}
