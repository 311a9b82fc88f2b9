//! Simulation statistics collection trait

/// Trait for collecting simulation statistics
///
/// Lets callers observe the step engine without the engine depending on
/// any particular metrics backend.
pub trait SimStats {
    /// Record that a cell moved (fall, flow, rise, swap)
    fn record_cell_moved(&mut self);

    /// Record that a state change occurred (e.g., melting, freezing)
    fn record_state_change(&mut self);

    /// Record that a chemical reaction fired
    fn record_reaction(&mut self);

    /// Record that destruction removed a cell
    fn record_cell_destroyed(&mut self);

    /// Fold counts gathered by a chunk worker into this collector
    fn merge_counts(&mut self, counts: &CountingStats) {
        for _ in 0..counts.cells_moved {
            self.record_cell_moved();
        }
        for _ in 0..counts.state_changes {
            self.record_state_change();
        }
        for _ in 0..counts.reactions {
            self.record_reaction();
        }
        for _ in 0..counts.cells_destroyed {
            self.record_cell_destroyed();
        }
    }
}

/// A no-op implementation for when stats collection is not needed
#[derive(Default)]
pub struct NoopStats;

impl SimStats for NoopStats {
    fn record_cell_moved(&mut self) {}
    fn record_state_change(&mut self) {}
    fn record_reaction(&mut self) {}
    fn record_cell_destroyed(&mut self) {}
    fn merge_counts(&mut self, _counts: &CountingStats) {}
}

/// Plain counters, used per chunk worker and by the runner's report
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CountingStats {
    pub cells_moved: u64,
    pub state_changes: u64,
    pub reactions: u64,
    pub cells_destroyed: u64,
}

impl CountingStats {
    pub fn total(&self) -> u64 {
        self.cells_moved + self.state_changes + self.reactions + self.cells_destroyed
    }
}

impl SimStats for CountingStats {
    fn record_cell_moved(&mut self) {
        self.cells_moved += 1;
    }

    fn record_state_change(&mut self) {
        self.state_changes += 1;
    }

    fn record_reaction(&mut self) {
        self.reactions += 1;
    }

    fn record_cell_destroyed(&mut self) {
        self.cells_destroyed += 1;
    }

    fn merge_counts(&mut self, counts: &CountingStats) {
        self.cells_moved += counts.cells_moved;
        self.state_changes += counts.state_changes;
        self.reactions += counts.reactions;
        self.cells_destroyed += counts.cells_destroyed;
    }
}
