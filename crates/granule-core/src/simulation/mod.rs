//! Simulation systems - movement, chemistry, temperature, pressure
//!
//! Each tick runs in two phases. Chunk workers update their own chunk in
//! parallel and emit intents for anything that crosses a chunk border,
//! then the boundary pass applies those intents serially.

mod boundary;
pub mod ca_update;
mod chemistry;
pub mod destruction;
mod grid;
mod pressure;
pub mod render;
pub mod state_changes;
mod temperature;
mod worker;

pub(crate) use boundary::BoundaryPass;
pub(crate) use worker::{StepParams, run_parallel};

pub use ca_update::FlowBehavior;
pub use chemistry::{FIRE_TEMPERATURE, ReactionProgress};
pub use destruction::{apply_destruction, destruction_probability};
pub use pressure::{GAS_SPLIT_PRESSURE, MAX_GAS_PRESSURE};
pub use render::{ChunkRenderData, cell_color};
pub use state_changes::StateChangeSystem;
pub use temperature::EMPTY_CONDUCTIVITY;
