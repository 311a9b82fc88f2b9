//! # Granule - headless runner for the falling-sand simulation
//!
//! Loads layered configuration, builds a [`granule_core::Simulation`] and
//! drives it through RON scenarios, producing a JSON-serializable report.

pub mod config;
pub mod scenario;

pub use config::RunnerConfig;
pub use scenario::{ExecutionReport, ScenarioDefinition, ScenarioExecutor};

/// Common imports for internal use
pub mod prelude {
    pub use glam::IVec2;
    pub use granule_core::{
        CHUNK_SIZE, Cell, MaterialCatalog, MaterialId, SharedSimulation, SimConfig, Simulation,
    };
}
