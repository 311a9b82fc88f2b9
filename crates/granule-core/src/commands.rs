//! Command queue - mutations requested by gameplay between ticks

use std::collections::VecDeque;
use std::sync::Arc;

use glam::IVec2;
use parking_lot::Mutex;

/// A mutation applied at the start of the next tick
#[derive(Clone, Debug, PartialEq)]
pub enum WorldCommand {
    Destroy { center: IVec2, radius: f32, force: f32 },
    AddMaterial { position: IVec2, material_id: u16 },
    RemoveMaterial { position: IVec2 },
}

/// Cloneable handle to the pending command list. Any number of callers may
/// push; the tick drains.
#[derive(Clone, Default)]
pub struct CommandQueue {
    inner: Arc<Mutex<VecDeque<WorldCommand>>>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, command: WorldCommand) {
        self.inner.lock().push_back(command);
    }

    pub fn apply_destruction(&self, center: IVec2, radius: f32, force: f32) {
        self.push(WorldCommand::Destroy {
            center,
            radius,
            force,
        });
    }

    pub fn add_material(&self, position: IVec2, material_id: u16) {
        self.push(WorldCommand::AddMaterial {
            position,
            material_id,
        });
    }

    pub fn remove_material(&self, position: IVec2) {
        self.push(WorldCommand::RemoveMaterial { position });
    }

    /// Take every pending command in FIFO order
    pub fn drain(&self) -> Vec<WorldCommand> {
        self.inner.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
