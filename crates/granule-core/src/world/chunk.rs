//! Chunk - 64x64 region of cells

use glam::IVec2;
use granule_simulation::{CHUNK_AREA, CHUNK_SIZE, Cell, MaterialCatalog, MaterialId, cell_flags};

use super::generation::ChunkSnapshot;
use crate::simulation::ReactionProgress;

/// Temperature change below which a write doesn't count as activity
const TEMPERATURE_EPSILON: f32 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirtyRect {
    pub min_x: usize,
    pub min_y: usize,
    pub max_x: usize,
    pub max_y: usize,
}

impl DirtyRect {
    pub fn new(x: usize, y: usize) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    pub fn expand(&mut self, x: usize, y: usize) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }
}

/// A 64x64 region of the world
#[derive(Clone, Debug)]
pub struct Chunk {
    /// Chunk coordinates (in chunk space, not cell space)
    pub position: IVec2,

    /// Cell data, row-major order
    /// Index = y * CHUNK_SIZE + x
    cells: Vec<Cell>,

    /// Material layout the terrain source produced for this chunk
    baseline: Vec<u16>,

    pub loaded: bool,

    /// Changed since the renderer last consumed this chunk
    pub dirty: bool,

    /// Changed since the chunk was loaded or last saved
    pub modified: bool,

    /// Bounding rect of cells changed since the renderer last consumed this chunk
    pub dirty_rect: Option<DirtyRect>,

    /// Whether the chunk still has settling material that needs simulation.
    /// Kept apart from `dirty` because the renderer clears that one.
    pub simulation_active: bool,

    /// Progress of in-chunk reacting pairs
    pub(crate) reaction_progress: ReactionProgress,
}

impl Chunk {
    pub fn new(position: IVec2) -> Self {
        Self {
            position,
            cells: vec![Cell::EMPTY; CHUNK_AREA],
            baseline: vec![MaterialId::EMPTY; CHUNK_AREA],
            loaded: false,
            dirty: false,
            modified: false,
            dirty_rect: None,
            simulation_active: false,
            reaction_progress: ReactionProgress::default(),
        }
    }

    /// Build a chunk from a terrain snapshot. Ids the catalog doesn't know become empty.
    pub fn from_snapshot(
        position: IVec2,
        snapshot: &ChunkSnapshot,
        catalog: &MaterialCatalog,
        ambient: f32,
    ) -> Self {
        let mut chunk = Self::new(position);
        let mut unknown = 0;

        for (idx, &material_id) in snapshot.materials().iter().enumerate() {
            match catalog.material(material_id) {
                Some(def) if !def.is_empty() => {
                    chunk.cells[idx] = Cell::from_material(def).with_temperature(ambient);
                    chunk.baseline[idx] = material_id;
                }
                Some(_) => chunk.cells[idx] = Cell::EMPTY.with_temperature(ambient),
                None => {
                    chunk.cells[idx] = Cell::EMPTY.with_temperature(ambient);
                    unknown += 1;
                }
            }
        }

        if unknown > 0 {
            log::warn!(
                "[GEN] Chunk ({}, {}) - {} cells with unknown materials left empty",
                position.x,
                position.y,
                unknown
            );
        }
        chunk
    }

    #[inline]
    pub fn index(x: usize, y: usize) -> usize {
        debug_assert!(x < CHUNK_SIZE && y < CHUNK_SIZE);
        y * CHUNK_SIZE + x
    }

    /// Global position of the chunk's top-left cell
    pub fn origin(&self) -> IVec2 {
        self.position * CHUNK_SIZE as i32
    }

    /// Local coordinates of a global position, if it falls inside this chunk
    pub fn local_coords(&self, world: IVec2) -> Option<(usize, usize)> {
        let local = world - self.origin();
        let size = CHUNK_SIZE as i32;
        if (0..size).contains(&local.x) && (0..size).contains(&local.y) {
            Some((local.x as usize, local.y as usize))
        } else {
            None
        }
    }

    /// Get cell at local coordinates (0-63, 0-63)
    #[inline]
    pub fn get_cell(&self, x: usize, y: usize) -> Cell {
        self.cells[Self::index(x, y)]
    }

    /// Get material ID at local coordinates (helper method)
    #[inline]
    pub fn get_material(&self, x: usize, y: usize) -> u16 {
        self.get_cell(x, y).material_id
    }

    /// Material the terrain source put at local coordinates
    #[inline]
    pub fn baseline_material(&self, x: usize, y: usize) -> u16 {
        self.baseline[Self::index(x, y)]
    }

    /// Set cell at local coordinates
    #[inline]
    pub fn set_cell(&mut self, x: usize, y: usize, cell: Cell) {
        self.cells[Self::index(x, y)] = cell;
        self.mark_dirty(x, y);
    }

    /// Swap two cells (falling, flowing, rising)
    #[inline]
    pub fn swap_cells(&mut self, x1: usize, y1: usize, x2: usize, y2: usize) {
        self.cells.swap(Self::index(x1, y1), Self::index(x2, y2));
        self.mark_dirty(x1, y1);
        self.mark_dirty(x2, y2);
    }

    /// Write a temperature, marking the chunk only when the change is noticeable
    pub fn set_temperature(&mut self, x: usize, y: usize, temperature: f32) -> bool {
        let cell = &mut self.cells[Self::index(x, y)];
        let changed = (cell.temperature - temperature).abs() > TEMPERATURE_EPSILON;
        cell.temperature = temperature;
        if changed {
            self.mark_dirty(x, y);
        }
        changed
    }

    /// Mutable access that skips dirty tracking, for bookkeeping fields
    /// such as flags and hydrostatic pressure
    #[inline]
    pub(crate) fn cell_mut(&mut self, x: usize, y: usize) -> &mut Cell {
        &mut self.cells[Self::index(x, y)]
    }

    /// Count non-empty cells (for debugging save/load)
    pub fn count_non_empty(&self) -> usize {
        self.cells.iter().filter(|c| !c.is_empty()).count()
    }

    /// Raw cell slice for rendering and persistence
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn baseline(&self) -> &[u16] {
        &self.baseline
    }

    /// Clear all "updated this tick" flags from cells
    pub fn clear_update_flags(&mut self) {
        for cell in &mut self.cells {
            cell.clear_flag(cell_flags::UPDATED);
        }
    }

    pub fn set_simulation_active(&mut self, active: bool) {
        self.simulation_active = active;
    }

    pub fn is_simulation_active(&self) -> bool {
        self.simulation_active
    }

    /// Hand the render-dirty state to the caller and reset it
    pub fn take_dirty(&mut self) -> bool {
        self.dirty_rect = None;
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self, x: usize, y: usize) {
        self.dirty = true;
        self.modified = true;
        self.simulation_active = true;
        match &mut self.dirty_rect {
            Some(rect) => rect.expand(x, y),
            None => self.dirty_rect = Some(DirtyRect::new(x, y)),
        }
    }
}
