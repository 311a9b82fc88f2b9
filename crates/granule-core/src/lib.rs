//! Granule core - chunked falling-sand simulation
//!
//! The world is split into 64x64 chunks that load around points of
//! interest. Each tick updates chunks in parallel, resolves whatever
//! crossed a chunk border, and leaves dirty chunks for the renderer.

pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod simulation;
pub mod world;

pub use commands::{CommandQueue, WorldCommand};
pub use config::SimConfig;
pub use error::{PersistenceError, SimError};
pub use events::SimEvent;
pub use simulation::ChunkRenderData;
pub use world::{SharedSimulation, Simulation, TickReport};

pub use granule_simulation::{
    CHUNK_AREA, CHUNK_SIZE, Cell, MaterialCatalog, MaterialCategory, MaterialDef, MaterialId,
    PhysicalState,
};
