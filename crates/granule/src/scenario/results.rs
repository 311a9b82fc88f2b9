//! Execution results and reporting

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use granule_core::world::CountingStats;
use serde::{Deserialize, Serialize};

use super::verification::VerificationResult;

/// Performance metrics for a scenario execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Total wall-clock time (milliseconds)
    pub total_duration_ms: f64,

    /// Verification phase duration (milliseconds)
    pub verification_duration_ms: f64,

    /// Average time per tick (milliseconds)
    pub avg_tick_ms: f64,

    /// Slowest tick (milliseconds)
    pub peak_tick_ms: f64,

    /// Number of simulation ticks
    pub tick_count: u64,
}

impl PerformanceMetrics {
    /// Fold one tick's duration into the running figures
    pub fn record_tick(&mut self, tick_ms: f64) {
        let total = self.avg_tick_ms * self.tick_count as f64 + tick_ms;
        self.tick_count += 1;
        self.avg_tick_ms = total / self.tick_count as f64;
        self.peak_tick_ms = self.peak_tick_ms.max(tick_ms);
    }

    /// Generate human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "Total: {:.1}ms | Avg tick: {:.2}ms | Peak: {:.2}ms | Ticks: {}",
            self.total_duration_ms, self.avg_tick_ms, self.peak_tick_ms, self.tick_count
        )
    }
}

/// Counters summed over the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatTotals {
    pub cells_moved: u64,
    pub state_changes: u64,
    pub reactions: u64,
    pub cells_destroyed: u64,
    pub commands_applied: u64,
    pub commands_dropped: u64,
    pub chunks_loaded: u64,
    pub chunks_unloaded: u64,
    pub failed_chunks: u64,
}

impl StatTotals {
    pub fn add_counts(&mut self, counts: &CountingStats) {
        self.cells_moved += counts.cells_moved;
        self.state_changes += counts.state_changes;
        self.reactions += counts.reactions;
        self.cells_destroyed += counts.cells_destroyed;
    }
}

/// Report from scenario execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Scenario name
    pub scenario_name: String,

    /// Timestamp (RFC 3339)
    pub timestamp: String,

    /// Overall pass/fail status
    pub passed: bool,

    /// Number of actions executed
    pub actions_executed: usize,

    /// Verification failures (empty if all passed)
    pub verification_failures: Vec<VerificationResult>,

    /// Execution log messages
    pub log: Vec<String>,

    pub stats: StatTotals,

    /// Event counts by kind
    pub events: BTreeMap<String, usize>,

    /// Chunks written by saves during the run
    pub chunks_saved: usize,

    /// Performance metrics (timing, throughput)
    pub performance: PerformanceMetrics,
}

impl ExecutionReport {
    /// Create new execution report
    pub fn new(scenario_name: String) -> Self {
        Self {
            scenario_name,
            timestamp: chrono::Utc::now().to_rfc3339(),
            passed: false,
            actions_executed: 0,
            verification_failures: Vec::new(),
            log: Vec::new(),
            stats: StatTotals::default(),
            events: BTreeMap::new(),
            chunks_saved: 0,
            performance: PerformanceMetrics::default(),
        }
    }

    /// Check if all verifications passed
    pub fn success(&self) -> bool {
        self.verification_failures.is_empty()
    }

    /// One-line outcome for the console
    pub fn summary(&self) -> String {
        format!(
            "{} [{}] moved {} | reactions {} | destroyed {} | {}",
            self.scenario_name,
            if self.passed { "PASS" } else { "FAIL" },
            self.stats.cells_moved,
            self.stats.reactions,
            self.stats.cells_destroyed,
            self.performance.summary()
        )
    }

    /// Save report to JSON file
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize execution report to JSON")?;

        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        std::fs::write(path.as_ref(), json).with_context(|| {
            format!(
                "Failed to write execution report: {}",
                path.as_ref().display()
            )
        })?;

        Ok(())
    }

    /// Load report from JSON file
    pub fn from_json(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read report file: {}", path.as_ref().display()))?;

        let report = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON report: {}", path.as_ref().display()))?;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_report_json() {
        let mut report = ExecutionReport::new("Test Scenario".to_string());
        report.passed = true;
        report.actions_executed = 5;
        report.stats.reactions = 3;
        report.events.insert("reacted".to_string(), 3);
        report.log.push("Test log message".to_string());

        let json = serde_json::to_string_pretty(&report).unwrap();
        assert!(json.contains("Test Scenario"));
        assert!(json.contains("\"actions_executed\": 5"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("run.json");
        report.save_json(&path).unwrap();
        let loaded = ExecutionReport::from_json(&path).unwrap();
        assert_eq!(loaded.scenario_name, report.scenario_name);
        assert_eq!(loaded.stats, report.stats);
        assert_eq!(loaded.events.get("reacted"), Some(&3));
    }

    #[test]
    fn test_success_check() {
        let mut report = ExecutionReport::new("Test".to_string());
        assert!(report.success(), "Should succeed with no failures");

        report.verification_failures.push(VerificationResult {
            passed: false,
            message: "Test failure".to_string(),
            actual_value: None,
        });
        assert!(!report.success(), "Should fail with verification failures");
    }

    #[test]
    fn test_tick_metrics() {
        let mut metrics = PerformanceMetrics::default();
        metrics.record_tick(2.0);
        metrics.record_tick(4.0);
        assert_eq!(metrics.tick_count, 2);
        assert_eq!(metrics.avg_tick_ms, 3.0);
        assert_eq!(metrics.peak_tick_ms, 4.0);
    }
}
