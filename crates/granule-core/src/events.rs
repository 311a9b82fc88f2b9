//! Hook points for audio/particle layers

use glam::IVec2;

/// Something noteworthy that happened during a tick
#[derive(Clone, Debug, PartialEq)]
pub enum SimEvent {
    /// Destruction removed a cell
    CellDestroyed { position: IVec2, material_id: u16 },
    /// An explosion (command or reaction) went off
    Exploded {
        center: IVec2,
        radius: f32,
        force: f32,
    },
    /// A reaction completed between the cell at `position` and a neighbour
    Reacted { position: IVec2, reaction: String },
    /// A flammable cell caught fire
    Ignited { position: IVec2, material_id: u16 },
}

impl SimEvent {
    /// Where the event happened
    pub fn position(&self) -> IVec2 {
        match self {
            SimEvent::CellDestroyed { position, .. }
            | SimEvent::Reacted { position, .. }
            | SimEvent::Ignited { position, .. } => *position,
            SimEvent::Exploded { center, .. } => *center,
        }
    }

    /// Short stable name, used for tallies and reports
    pub fn kind(&self) -> &'static str {
        match self {
            SimEvent::CellDestroyed { .. } => "cell_destroyed",
            SimEvent::Exploded { .. } => "exploded",
            SimEvent::Reacted { .. } => "reacted",
            SimEvent::Ignited { .. } => "ignited",
        }
    }
}
