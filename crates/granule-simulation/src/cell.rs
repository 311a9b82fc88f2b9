//! Cell types and constants
//!
//! Foundational types for the cell-based simulation.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::{MaterialDef, MaterialId};

/// Size of a chunk in cells (64x64)
pub const CHUNK_SIZE: usize = 64;

/// Total cells in a chunk
pub const CHUNK_AREA: usize = CHUNK_SIZE * CHUNK_SIZE;

/// Temperature new cells start at (Celsius)
pub const AMBIENT_TEMPERATURE: f32 = 20.0;

/// Physical state of a cell, independent of its material category
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhysicalState {
    #[default]
    Solid,
    Liquid,
    Gas,
}

/// A single cell in the world
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Material type (0 = empty)
    pub material_id: u16,
    pub state: PhysicalState,
    /// Celsius
    pub temperature: f32,
    /// Gas concentration / hydrostatic load
    pub pressure: f32,
    pub velocity: Vec2,
    /// Remaining ticks before decay (None = lives forever)
    pub lifetime: Option<u16>,
    /// Ticks since placement
    pub age: u16,
    /// State flags (updated this tick, burning, etc.)
    pub flags: u16,
}

impl Default for Cell {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Cell {
    pub const EMPTY: Cell = Cell {
        material_id: MaterialId::EMPTY,
        state: PhysicalState::Gas,
        temperature: AMBIENT_TEMPERATURE,
        pressure: 0.0,
        velocity: Vec2::ZERO,
        lifetime: None,
        age: 0,
        flags: 0,
    };

    /// Fresh cell of the given material at its spawn (or ambient) temperature
    pub fn from_material(material: &MaterialDef) -> Self {
        if material.is_empty() {
            return Self::EMPTY;
        }
        Self {
            material_id: material.id,
            state: material.default_state(),
            temperature: material.spawn_temperature.unwrap_or(AMBIENT_TEMPERATURE),
            lifetime: material.lifetime,
            flags: cell_flags::ACTIVE,
            ..Self::EMPTY
        }
    }

    /// Same cell with a different temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.material_id == MaterialId::EMPTY
    }

    #[inline]
    pub fn has_flag(&self, flag: u16) -> bool {
        self.flags & flag != 0
    }

    #[inline]
    pub fn set_flag(&mut self, flag: u16) {
        self.flags |= flag;
    }

    #[inline]
    pub fn clear_flag(&mut self, flag: u16) {
        self.flags &= !flag;
    }
}

/// Flag bits for cell state
pub mod cell_flags {
    pub const UPDATED: u16 = 1 << 0; // Already updated this tick
    pub const BURNING: u16 = 1 << 1; // Currently on fire
    pub const ACTIVE: u16 = 1 << 2; // Participates in simulation
}
