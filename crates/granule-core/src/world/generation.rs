//! Terrain input for freshly loaded chunks
//!
//! The generator itself lives outside the engine; it hands the store a
//! dense material layout per chunk. Two simple sources ship for tests and
//! the headless runner.

use glam::IVec2;
use granule_simulation::{CHUNK_AREA, CHUNK_SIZE, MaterialId};

/// Material layout of one chunk as produced by a terrain source
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkSnapshot {
    materials: Vec<u16>,
}

impl ChunkSnapshot {
    pub fn empty() -> Self {
        Self {
            materials: vec![MaterialId::EMPTY; CHUNK_AREA],
        }
    }

    /// Wrap a row-major material array. Short arrays are padded with empty.
    pub fn from_materials(mut materials: Vec<u16>) -> Self {
        materials.resize(CHUNK_AREA, MaterialId::EMPTY);
        Self { materials }
    }

    pub fn set(&mut self, x: usize, y: usize, material_id: u16) {
        self.materials[y * CHUNK_SIZE + x] = material_id;
    }

    pub fn get(&self, x: usize, y: usize) -> u16 {
        self.materials[y * CHUNK_SIZE + x]
    }

    pub fn materials(&self) -> &[u16] {
        &self.materials
    }
}

/// Produces the baseline contents of a chunk
pub trait TerrainSource: Send + Sync {
    fn generate(&self, chunk: IVec2) -> ChunkSnapshot;
}

impl<T: TerrainSource + ?Sized> TerrainSource for Box<T> {
    fn generate(&self, chunk: IVec2) -> ChunkSnapshot {
        (**self).generate(chunk)
    }
}

/// Nothing but air
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyTerrain;

impl TerrainSource for EmptyTerrain {
    fn generate(&self, _chunk: IVec2) -> ChunkSnapshot {
        ChunkSnapshot::empty()
    }
}

/// Horizontal layers: air above `surface_y`, then dirt, stone and bedrock
/// going down (y grows downward)
#[derive(Clone, Copy, Debug)]
pub struct FlatTerrain {
    pub surface_y: i32,
    pub dirt_depth: i32,
    pub bedrock_y: i32,
}

impl Default for FlatTerrain {
    fn default() -> Self {
        Self {
            surface_y: 48,
            dirt_depth: 8,
            bedrock_y: 512,
        }
    }
}

impl FlatTerrain {
    pub fn material_at(&self, world_y: i32) -> u16 {
        if world_y < self.surface_y {
            MaterialId::EMPTY
        } else if world_y >= self.bedrock_y {
            MaterialId::BEDROCK
        } else if world_y < self.surface_y + self.dirt_depth {
            MaterialId::DIRT
        } else {
            MaterialId::STONE
        }
    }
}

impl TerrainSource for FlatTerrain {
    fn generate(&self, chunk: IVec2) -> ChunkSnapshot {
        let mut snapshot = ChunkSnapshot::empty();
        let origin_y = chunk.y * CHUNK_SIZE as i32;

        for local_y in 0..CHUNK_SIZE {
            let material = self.material_at(origin_y + local_y as i32);
            if material == MaterialId::EMPTY {
                continue;
            }
            for local_x in 0..CHUNK_SIZE {
                snapshot.set(local_x, local_y, material);
            }
        }
        snapshot
    }
}
