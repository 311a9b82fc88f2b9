//! Scripted, headless simulation runs
//!
//! A scenario names a terrain, a list of actions (placements, blasts, ticks,
//! saves) and the conditions the world must satisfy afterwards. Scenarios are
//! RON files so they can be written and tweaked without recompiling.

pub mod definition;
pub mod executor;
pub mod results;
pub mod verification;

pub use definition::{ScenarioAction, ScenarioDefinition, TerrainKind};
pub use executor::ScenarioExecutor;
pub use results::{ExecutionReport, PerformanceMetrics, StatTotals};
pub use verification::{Region, VerificationCondition, VerificationResult, VerifyContext};

/// Scenarios compiled into the binary, by name
pub const BUILTIN_SCENARIOS: &[(&str, &str)] = &[
    ("sand_pile", include_str!("../../scenarios/sand_pile.ron")),
    ("lava_quench", include_str!("../../scenarios/lava_quench.ron")),
    ("blast", include_str!("../../scenarios/blast.ron")),
];

/// Look up and parse a built-in scenario
pub fn builtin(name: &str) -> Option<anyhow::Result<ScenarioDefinition>> {
    BUILTIN_SCENARIOS
        .iter()
        .find(|(builtin, _)| *builtin == name)
        .map(|(_, source)| ScenarioDefinition::from_ron(source))
}
