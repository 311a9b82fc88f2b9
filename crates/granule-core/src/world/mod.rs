//! World management - chunks, loading, saving

mod chunk;
mod chunk_store;
pub mod generation;
mod lifecycle;
pub mod persistence;
pub mod rng_trait;
pub mod stats;
#[allow(clippy::module_inception)]
mod world;

pub use chunk::{Chunk, DirtyRect};
pub use chunk_store::{ChunkStore, Neighbors};
pub use generation::{ChunkSnapshot, EmptyTerrain, FlatTerrain, TerrainSource};
pub use lifecycle::{ChunkLifecycle, LifecycleReport};
pub use persistence::{
    ChunkDelta, DELTA_VERSION, DeltaStore, DiskDeltaStore, MemoryDeltaStore, SavedCell,
    WorldMetadata, decode_delta, encode_delta,
};
pub use rng_trait::{WorldRng, chunk_rng};
pub use stats::{CountingStats, NoopStats, SimStats};
pub use world::{SharedSimulation, Simulation, TickReport};
