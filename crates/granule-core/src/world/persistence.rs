//! Chunk delta persistence
//!
//! Only cells that differ from the terrain baseline are written. A chunk is
//! rebuilt on load by regenerating its baseline and applying the delta.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use glam::IVec2;
use granule_simulation::{CHUNK_AREA, CHUNK_SIZE, Cell, MaterialCatalog, PhysicalState};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::chunk::Chunk;
use crate::error::PersistenceError;

/// Current on-disk delta format
pub const DELTA_VERSION: u32 = 1;

/// Degrees a cell may drift from ambient before it counts as changed
const TEMPERATURE_TOLERANCE: f32 = 0.5;

/// One cell that differs from the chunk baseline
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedCell {
    pub index: u16,
    pub material_id: u16,
    pub temperature: f32,
    pub state: PhysicalState,
}

/// Everything needed to restore a chunk on top of its baseline
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkDelta {
    pub version: u32,
    pub chunk: (i32, i32),
    pub cells: Vec<SavedCell>,
}

impl ChunkDelta {
    /// Collect the cells of `chunk` that differ from its baseline
    pub fn from_chunk(chunk: &Chunk, catalog: &MaterialCatalog, ambient: f32) -> Self {
        let cells = chunk
            .cells()
            .iter()
            .zip(chunk.baseline())
            .enumerate()
            .filter(|(_, (cell, baseline))| {
                differs_from_baseline(cell, **baseline, catalog, ambient)
            })
            .map(|(index, (cell, _))| SavedCell {
                index: index as u16,
                material_id: cell.material_id,
                temperature: cell.temperature,
                state: cell.state,
            })
            .collect();

        Self {
            version: DELTA_VERSION,
            chunk: (chunk.position.x, chunk.position.y),
            cells,
        }
    }

    pub fn position(&self) -> IVec2 {
        IVec2::new(self.chunk.0, self.chunk.1)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Write the saved cells into a baseline chunk. Returns how many entries
    /// were skipped because their material or index is unknown.
    pub fn apply_to(&self, chunk: &mut Chunk, catalog: &MaterialCatalog) -> usize {
        let mut skipped = 0;
        for saved in &self.cells {
            let index = saved.index as usize;
            let Some(def) = catalog.material(saved.material_id) else {
                skipped += 1;
                continue;
            };
            if index >= CHUNK_AREA {
                skipped += 1;
                continue;
            }

            let mut cell = Cell::from_material(def).with_temperature(saved.temperature);
            cell.state = saved.state;
            let (x, y) = (index % CHUNK_SIZE, index / CHUNK_SIZE);
            *chunk.cell_mut(x, y) = cell;
        }
        skipped
    }
}

fn differs_from_baseline(
    cell: &Cell,
    baseline: u16,
    catalog: &MaterialCatalog,
    ambient: f32,
) -> bool {
    if cell.material_id != baseline {
        return true;
    }
    let default_state = catalog
        .material(cell.material_id)
        .map(|def| def.default_state())
        .unwrap_or(PhysicalState::Gas);
    cell.state != default_state || (cell.temperature - ambient).abs() > TEMPERATURE_TOLERANCE
}

/// Serialize with bincode and compress with lz4
pub fn encode_delta(delta: &ChunkDelta) -> Result<Vec<u8>, PersistenceError> {
    let serialized = bincode_next::serde::encode_to_vec(delta, bincode_next::config::standard())
        .map_err(|e| PersistenceError::Encode(format!("{e:?}")))?;
    Ok(lz4_flex::compress_prepend_size(&serialized))
}

pub fn decode_delta(bytes: &[u8]) -> Result<ChunkDelta, PersistenceError> {
    let serialized = lz4_flex::decompress_size_prepended(bytes)?;
    let (delta, _): (ChunkDelta, _) =
        bincode_next::serde::decode_from_slice(&serialized, bincode_next::config::standard())
            .map_err(|e| PersistenceError::Decode(format!("{e:?}")))?;

    if delta.version != DELTA_VERSION {
        return Err(PersistenceError::Version {
            found: delta.version,
            expected: DELTA_VERSION,
        });
    }
    Ok(delta)
}

/// World metadata stored in world.meta file (RON format)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldMetadata {
    pub version: u32,
    pub seed: u64,
    pub tick: u64,
    pub created_at: String,
    pub last_saved: String,
}

impl WorldMetadata {
    pub fn new(seed: u64) -> Self {
        let now = chrono::Local::now().to_rfc3339();
        Self {
            version: DELTA_VERSION,
            seed,
            tick: 0,
            created_at: now.clone(),
            last_saved: now,
        }
    }

    /// Stamp the save time and current tick
    pub fn touch(&mut self, tick: u64) {
        self.tick = tick;
        self.last_saved = chrono::Local::now().to_rfc3339();
    }
}

/// Backing storage for chunk deltas
pub trait DeltaStore: Send + Sync {
    fn save(&self, delta: &ChunkDelta) -> Result<(), PersistenceError>;

    /// `Ok(None)` when nothing was ever saved for the chunk
    fn load(&self, chunk: IVec2) -> Result<Option<ChunkDelta>, PersistenceError>;

    /// Forget a chunk's delta; missing entries are not an error
    fn remove(&self, chunk: IVec2) -> Result<(), PersistenceError>;

    fn save_metadata(&self, meta: &WorldMetadata) -> Result<(), PersistenceError>;

    fn load_metadata(&self) -> Result<Option<WorldMetadata>, PersistenceError>;
}

impl<T: DeltaStore + ?Sized> DeltaStore for std::sync::Arc<T> {
    fn save(&self, delta: &ChunkDelta) -> Result<(), PersistenceError> {
        (**self).save(delta)
    }

    fn load(&self, chunk: IVec2) -> Result<Option<ChunkDelta>, PersistenceError> {
        (**self).load(chunk)
    }

    fn remove(&self, chunk: IVec2) -> Result<(), PersistenceError> {
        (**self).remove(chunk)
    }

    fn save_metadata(&self, meta: &WorldMetadata) -> Result<(), PersistenceError> {
        (**self).save_metadata(meta)
    }

    fn load_metadata(&self) -> Result<Option<WorldMetadata>, PersistenceError> {
        (**self).load_metadata()
    }
}

/// Keeps encoded deltas in memory. Used by tests and throwaway worlds.
#[derive(Default)]
pub struct MemoryDeltaStore {
    chunks: Mutex<HashMap<IVec2, Vec<u8>>>,
    metadata: Mutex<Option<WorldMetadata>>,
}

impl MemoryDeltaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw bytes for a chunk, bypassing encoding
    pub fn insert_raw(&self, chunk: IVec2, bytes: Vec<u8>) {
        self.chunks.lock().insert(chunk, bytes);
    }

    pub fn contains(&self, chunk: IVec2) -> bool {
        self.chunks.lock().contains_key(&chunk)
    }

    pub fn len(&self) -> usize {
        self.chunks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.lock().is_empty()
    }
}

impl DeltaStore for MemoryDeltaStore {
    fn save(&self, delta: &ChunkDelta) -> Result<(), PersistenceError> {
        let bytes = encode_delta(delta)?;
        self.chunks.lock().insert(delta.position(), bytes);
        Ok(())
    }

    fn load(&self, chunk: IVec2) -> Result<Option<ChunkDelta>, PersistenceError> {
        match self.chunks.lock().get(&chunk) {
            Some(bytes) => decode_delta(bytes).map(Some),
            None => Ok(None),
        }
    }

    fn remove(&self, chunk: IVec2) -> Result<(), PersistenceError> {
        self.chunks.lock().remove(&chunk);
        Ok(())
    }

    fn save_metadata(&self, meta: &WorldMetadata) -> Result<(), PersistenceError> {
        *self.metadata.lock() = Some(meta.clone());
        Ok(())
    }

    fn load_metadata(&self) -> Result<Option<WorldMetadata>, PersistenceError> {
        Ok(self.metadata.lock().clone())
    }
}

/// Deltas on disk under `<root>/<world>/chunks/chunk_<x>_<y>.bin`
pub struct DiskDeltaStore {
    world_dir: PathBuf,
}

impl DiskDeltaStore {
    /// Open (or create) a world directory
    pub fn open(root: impl AsRef<Path>, world_name: &str) -> Result<Self, PersistenceError> {
        let world_dir = root.as_ref().join(world_name);
        std::fs::create_dir_all(world_dir.join("chunks"))?;
        log::debug!("[SAVE] Opened world directory {:?}", world_dir);
        Ok(Self { world_dir })
    }

    pub fn world_dir(&self) -> &Path {
        &self.world_dir
    }

    fn chunk_path(&self, chunk: IVec2) -> PathBuf {
        self.world_dir
            .join("chunks")
            .join(format!("chunk_{}_{}.bin", chunk.x, chunk.y))
    }

    fn metadata_path(&self) -> PathBuf {
        self.world_dir.join("world.meta")
    }
}

impl DeltaStore for DiskDeltaStore {
    fn save(&self, delta: &ChunkDelta) -> Result<(), PersistenceError> {
        let path = self.chunk_path(delta.position());
        let compressed = encode_delta(delta)?;

        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &compressed)?;
        std::fs::rename(&temp_path, &path)?;

        log::debug!(
            "[SAVE] Chunk ({}, {}) - {} changed cells ({} bytes compressed)",
            delta.chunk.0,
            delta.chunk.1,
            delta.cells.len(),
            compressed.len()
        );
        Ok(())
    }

    fn load(&self, chunk: IVec2) -> Result<Option<ChunkDelta>, PersistenceError> {
        let path = self.chunk_path(chunk);
        let compressed = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        decode_delta(&compressed).map(Some)
    }

    fn remove(&self, chunk: IVec2) -> Result<(), PersistenceError> {
        match std::fs::remove_file(self.chunk_path(chunk)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn save_metadata(&self, meta: &WorldMetadata) -> Result<(), PersistenceError> {
        let serialized = ron::ser::to_string_pretty(meta, Default::default())?;
        std::fs::write(self.metadata_path(), serialized)?;
        Ok(())
    }

    fn load_metadata(&self) -> Result<Option<WorldMetadata>, PersistenceError> {
        let contents = match std::fs::read_to_string(self.metadata_path()) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(ron::from_str(&contents)?))
    }
}
