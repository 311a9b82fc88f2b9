//! Chunk store - sparse chunk storage, point lookups and load/unload

use std::collections::HashMap;
use std::sync::Arc;

use glam::IVec2;
use granule_simulation::{CHUNK_SIZE, Cell, MaterialCatalog, MaterialCategory};
use rstar::{AABB, RTree};
use smallvec::SmallVec;

use super::chunk::Chunk;
use super::generation::TerrainSource;
use super::persistence::{ChunkDelta, DeltaStore};
use crate::error::PersistenceError;

/// Wrapper for chunk position to implement R-tree traits
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct ChunkPos(IVec2);

impl rstar::Point for ChunkPos {
    type Scalar = i32;
    const DIMENSIONS: usize = 2;

    fn generate(mut generator: impl FnMut(usize) -> Self::Scalar) -> Self {
        ChunkPos(IVec2::new(generator(0), generator(1)))
    }

    fn nth(&self, index: usize) -> Self::Scalar {
        match index {
            0 => self.0.x,
            _ => self.0.y,
        }
    }

    fn nth_mut(&mut self, index: usize) -> &mut Self::Scalar {
        match index {
            0 => &mut self.0.x,
            _ => &mut self.0.y,
        }
    }
}

pub type Neighbors = SmallVec<[IVec2; 8]>;

/// Owns every loaded chunk
pub struct ChunkStore {
    catalog: Arc<MaterialCatalog>,
    ambient: f32,

    /// Loaded chunks, keyed by chunk coordinates
    chunks: HashMap<IVec2, Chunk>,

    /// Spatial index of loaded chunk positions, used by the unload sweep
    spatial_index: RTree<ChunkPos>,
}

impl ChunkStore {
    pub fn new(catalog: Arc<MaterialCatalog>, ambient: f32) -> Self {
        Self {
            catalog,
            ambient,
            chunks: HashMap::new(),
            spatial_index: RTree::new(),
        }
    }

    pub fn catalog(&self) -> &Arc<MaterialCatalog> {
        &self.catalog
    }

    pub fn ambient(&self) -> f32 {
        self.ambient
    }

    /// Convert world coordinates to chunk coordinates + local offset
    pub fn world_to_chunk_coords(pos: IVec2) -> (IVec2, usize, usize) {
        let size = CHUNK_SIZE as i32;
        let chunk = IVec2::new(pos.x.div_euclid(size), pos.y.div_euclid(size));
        let local_x = pos.x.rem_euclid(size) as usize;
        let local_y = pos.y.rem_euclid(size) as usize;
        (chunk, local_x, local_y)
    }

    pub fn chunk_coord(pos: IVec2) -> IVec2 {
        Self::world_to_chunk_coords(pos).0
    }

    /// Cell at a global position. Unloaded positions read as empty.
    pub fn get_cell(&self, pos: IVec2) -> Cell {
        self.try_get_cell(pos).unwrap_or(Cell::EMPTY)
    }

    /// Cell at a global position, or `None` when its chunk isn't loaded
    pub fn try_get_cell(&self, pos: IVec2) -> Option<Cell> {
        let (chunk_pos, x, y) = Self::world_to_chunk_coords(pos);
        self.chunks.get(&chunk_pos).map(|chunk| chunk.get_cell(x, y))
    }

    pub fn get_material(&self, pos: IVec2) -> u16 {
        self.get_cell(pos).material_id
    }

    /// Create or overwrite a cell. Returns false when the chunk isn't loaded.
    pub fn set_cell(&mut self, pos: IVec2, cell: Cell) -> bool {
        let (chunk_pos, x, y) = Self::world_to_chunk_coords(pos);
        match self.chunks.get_mut(&chunk_pos) {
            Some(chunk) => {
                chunk.set_cell(x, y, cell);
                true
            }
            None => false,
        }
    }

    /// Place a fresh cell of `material_id`. Unknown materials are rejected.
    pub fn set_material(&mut self, pos: IVec2, material_id: u16) -> bool {
        let Some(def) = self.catalog.material(material_id) else {
            return false;
        };
        let cell = Cell::from_material(def);
        self.set_cell(pos, cell)
    }

    /// Empty a position, returning what was there
    pub fn remove_cell(&mut self, pos: IVec2) -> Option<Cell> {
        let (chunk_pos, x, y) = Self::world_to_chunk_coords(pos);
        let chunk = self.chunks.get_mut(&chunk_pos)?;
        let previous = chunk.get_cell(x, y);
        if previous.is_empty() {
            return None;
        }
        chunk.set_cell(x, y, Cell::EMPTY.with_temperature(previous.temperature));
        Some(previous)
    }

    /// Swap two cells, possibly across chunks. Both chunks must be loaded.
    pub fn swap_cells(&mut self, a: IVec2, b: IVec2) -> bool {
        let (Some(cell_a), Some(cell_b)) = (self.try_get_cell(a), self.try_get_cell(b)) else {
            return false;
        };
        self.set_cell(a, cell_b);
        self.set_cell(b, cell_a);
        true
    }

    /// Add heat to a non-empty cell. Returns false for empty or unloaded positions.
    pub fn add_heat(&mut self, pos: IVec2, delta: f32) -> bool {
        let (chunk_pos, x, y) = Self::world_to_chunk_coords(pos);
        let Some(chunk) = self.chunks.get_mut(&chunk_pos) else {
            return false;
        };
        let cell = chunk.get_cell(x, y);
        if cell.is_empty() {
            return false;
        }
        chunk.set_temperature(x, y, cell.temperature + delta);
        true
    }

    /// Raise the render/activity flags on the chunk holding `pos`
    pub fn mark_dirty(&mut self, pos: IVec2) {
        let (chunk_pos, x, y) = Self::world_to_chunk_coords(pos);
        if let Some(chunk) = self.chunks.get_mut(&chunk_pos) {
            chunk.mark_dirty(x, y);
        }
    }

    /// Orthogonal neighbours: up, down, left, right
    pub fn neighbors4(pos: IVec2) -> Neighbors {
        SmallVec::from_slice(&[
            pos + IVec2::NEG_Y,
            pos + IVec2::Y,
            pos + IVec2::NEG_X,
            pos + IVec2::X,
        ])
    }

    /// Orthogonal plus diagonal neighbours
    pub fn neighbors8(pos: IVec2) -> Neighbors {
        let mut neighbors = Self::neighbors4(pos);
        neighbors.extend_from_slice(&[
            pos + IVec2::new(-1, -1),
            pos + IVec2::new(1, -1),
            pos + IVec2::new(-1, 1),
            pos + IVec2::new(1, 1),
        ]);
        neighbors
    }

    /// Neighbour set used for a material category (powders see diagonals)
    pub fn neighbors_for(pos: IVec2, category: MaterialCategory) -> Neighbors {
        match category {
            MaterialCategory::Powder => Self::neighbors8(pos),
            _ => Self::neighbors4(pos),
        }
    }

    /// Load a chunk from its terrain baseline plus any saved delta.
    /// Returns false if it was already loaded.
    pub fn load_chunk(
        &mut self,
        pos: IVec2,
        terrain: &dyn TerrainSource,
        deltas: &dyn DeltaStore,
    ) -> bool {
        if self.chunks.contains_key(&pos) {
            log::trace!(
                "[LOAD] Chunk ({}, {}) already loaded, skipping",
                pos.x,
                pos.y
            );
            return false;
        }

        let snapshot = terrain.generate(pos);
        let mut chunk = Chunk::from_snapshot(pos, &snapshot, &self.catalog, self.ambient);

        match deltas.load(pos) {
            Ok(Some(delta)) if delta.position() != pos => {
                log::warn!(
                    "[LOAD] Delta for chunk ({}, {}) claims position {:?}, using baseline",
                    pos.x,
                    pos.y,
                    delta.chunk
                );
            }
            Ok(Some(delta)) => {
                let skipped = delta.apply_to(&mut chunk, &self.catalog);
                if skipped > 0 {
                    log::warn!(
                        "[LOAD] Chunk ({}, {}) - skipped {} saved cells with unknown materials",
                        pos.x,
                        pos.y,
                        skipped
                    );
                }
                log::debug!(
                    "[LOAD] Chunk ({}, {}) from delta - {} changed cells",
                    pos.x,
                    pos.y,
                    delta.cells.len()
                );
            }
            Ok(None) => {
                log::debug!(
                    "[GEN] Chunk ({}, {}) generated - {} non-empty cells",
                    pos.x,
                    pos.y,
                    chunk.count_non_empty()
                );
            }
            Err(e) => {
                log::warn!(
                    "[LOAD] Failed to load chunk ({}, {}): {}, using baseline",
                    pos.x,
                    pos.y,
                    e
                );
            }
        }

        chunk.loaded = true;
        chunk.dirty = true;
        chunk.simulation_active = true;
        self.chunks.insert(pos, chunk);
        self.spatial_index.insert(ChunkPos(pos));
        true
    }

    /// Flush a chunk's delta (if modified) and drop it. Returns false if it
    /// wasn't loaded. On a failed save the chunk stays loaded.
    pub fn unload_chunk(
        &mut self,
        pos: IVec2,
        deltas: &dyn DeltaStore,
    ) -> Result<bool, PersistenceError> {
        let Some(chunk) = self.chunks.get(&pos) else {
            log::trace!("[UNLOAD] Chunk ({}, {}) not loaded, skipping", pos.x, pos.y);
            return Ok(false);
        };

        if chunk.modified {
            flush_chunk(chunk, &self.catalog, self.ambient, deltas)?;
        }

        self.chunks.remove(&pos);
        self.spatial_index.remove(&ChunkPos(pos));
        log::debug!("[UNLOAD] Chunk ({}, {})", pos.x, pos.y);
        Ok(true)
    }

    /// Flush every modified chunk, keeping them loaded. Returns how many were written.
    pub fn save_all(&mut self, deltas: &dyn DeltaStore) -> Result<usize, PersistenceError> {
        let mut saved = 0;
        for chunk in self.chunks.values_mut().filter(|c| c.modified) {
            flush_chunk(chunk, &self.catalog, self.ambient, deltas)?;
            chunk.modified = false;
            saved += 1;
        }
        Ok(saved)
    }

    pub fn is_loaded(&self, pos: IVec2) -> bool {
        self.chunks.contains_key(&pos)
    }

    /// Get chunk at chunk coordinates (not world coordinates)
    pub fn chunk(&self, pos: IVec2) -> Option<&Chunk> {
        self.chunks.get(&pos)
    }

    pub fn chunk_mut(&mut self, pos: IVec2) -> Option<&mut Chunk> {
        self.chunks.get_mut(&pos)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Loaded chunk positions in row-major order
    pub fn loaded_positions(&self) -> Vec<IVec2> {
        let mut positions: Vec<IVec2> = self.chunks.keys().copied().collect();
        positions.sort_by_key(|p| (p.y, p.x));
        positions
    }

    /// Loaded chunks within a square of `radius` chunks around `center`
    pub fn positions_within(&self, center: IVec2, radius: i32) -> Vec<IVec2> {
        let envelope = AABB::from_corners(
            ChunkPos(center - IVec2::splat(radius)),
            ChunkPos(center + IVec2::splat(radius)),
        );
        self.spatial_index
            .locate_in_envelope(&envelope)
            .map(|p| p.0)
            .collect()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }

    pub(crate) fn chunk_map(&self) -> &HashMap<IVec2, Chunk> {
        &self.chunks
    }

    pub(crate) fn chunk_map_mut(&mut self) -> &mut HashMap<IVec2, Chunk> {
        &mut self.chunks
    }
}

fn flush_chunk(
    chunk: &Chunk,
    catalog: &MaterialCatalog,
    ambient: f32,
    deltas: &dyn DeltaStore,
) -> Result<(), PersistenceError> {
    let delta = ChunkDelta::from_chunk(chunk, catalog, ambient);
    if delta.is_empty() {
        // Reverted to baseline, drop whatever was saved before
        deltas.remove(chunk.position)
    } else {
        log::debug!(
            "[SAVE] Chunk ({}, {}) - {} changed cells",
            chunk.position.x,
            chunk.position.y,
            delta.cells.len()
        );
        deltas.save(&delta)
    }
}
