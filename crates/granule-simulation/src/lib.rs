//! Material simulation data and reactions for Granule
//!
//! This crate provides the foundational data types for material simulation:
//! - Material definitions (MaterialId, MaterialDef, Materials)
//! - Material categories (MaterialCategory)
//! - Chemical reactions (ReactionRule, ReactionRegistry)
//! - The read-only catalog combining both (MaterialCatalog)
//! - Cell types (Cell, PhysicalState, cell_flags, CHUNK_SIZE)

mod catalog;
mod cell;
mod materials;
mod reactions;

pub use catalog::{CatalogError, CatalogFile, MaterialCatalog};
pub use cell::{AMBIENT_TEMPERATURE, CHUNK_AREA, CHUNK_SIZE, Cell, PhysicalState, cell_flags};
pub use materials::{MaterialCategory, MaterialDef, MaterialId, Materials};
pub use reactions::{Explosion, OrientedOutputs, ReactionOutput, ReactionRegistry, ReactionRule};
