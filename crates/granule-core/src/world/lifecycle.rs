//! Chunk lifecycle - load/unload around points of interest

use std::collections::HashSet;

use glam::IVec2;

use super::chunk_store::ChunkStore;
use super::generation::TerrainSource;
use super::persistence::DeltaStore;

/// Outcome of one lifecycle pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LifecycleReport {
    pub loaded: usize,
    pub unloaded: usize,
    pub failed_unloads: usize,
}

/// Keeps chunks loaded within `load_radius` of every point of interest and
/// unloads them once they are farther than `load_radius + 1`
#[derive(Clone, Copy, Debug)]
pub struct ChunkLifecycle {
    pub load_radius: i32,
}

impl ChunkLifecycle {
    pub fn new(load_radius: i32) -> Self {
        Self {
            load_radius: load_radius.max(0),
        }
    }

    /// Run one pass. `points` are global cell positions. An empty list
    /// leaves the loaded set untouched.
    pub fn update(
        &self,
        store: &mut ChunkStore,
        points: &[IVec2],
        terrain: &dyn TerrainSource,
        deltas: &dyn DeltaStore,
    ) -> LifecycleReport {
        let mut report = LifecycleReport::default();
        if points.is_empty() {
            return report;
        }

        let centers: Vec<IVec2> = points.iter().map(|&p| ChunkStore::chunk_coord(p)).collect();
        let r = self.load_radius;

        for center in &centers {
            for cy in (center.y - r)..=(center.y + r) {
                for cx in (center.x - r)..=(center.x + r) {
                    if store.load_chunk(IVec2::new(cx, cy), terrain, deltas) {
                        report.loaded += 1;
                    }
                }
            }
        }

        // Hysteresis band: anything within radius + 1 of some point stays
        let keep: HashSet<IVec2> = centers
            .iter()
            .flat_map(|&center| store.positions_within(center, r + 1))
            .collect();

        for pos in store.loaded_positions() {
            if keep.contains(&pos) {
                continue;
            }
            match store.unload_chunk(pos, deltas) {
                Ok(true) => report.unloaded += 1,
                Ok(false) => {}
                Err(e) => {
                    report.failed_unloads += 1;
                    log::warn!(
                        "[UNLOAD] Failed to save chunk ({}, {}): {}, keeping it loaded",
                        pos.x,
                        pos.y,
                        e
                    );
                }
            }
        }

        if report.loaded > 0 || report.unloaded > 0 {
            log::info!(
                "Chunk lifecycle: loaded {}, unloaded {}, {} resident",
                report.loaded,
                report.unloaded,
                store.len()
            );
        }
        report
    }
}
