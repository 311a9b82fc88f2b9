//! Scenario definition and RON file loading

use anyhow::{Context, Result};
use granule_core::world::{EmptyTerrain, FlatTerrain, TerrainSource};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::verification::{Region, VerificationCondition};

/// Top-level scenario definition loaded from RON files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    /// Scenario name
    pub name: String,

    /// Description
    pub description: String,

    /// Baseline terrain the chunks are generated from
    #[serde(default)]
    pub terrain: TerrainKind,

    /// Points chunks are kept loaded around (global cell positions)
    #[serde(default)]
    pub points_of_interest: Vec<(i32, i32)>,

    /// Initial setup actions (run before main scenario)
    #[serde(default)]
    pub setup: Vec<ScenarioAction>,

    /// Main scenario actions
    pub actions: Vec<ScenarioAction>,

    /// Verification checks to run after scenario
    #[serde(default)]
    pub verify: Vec<VerificationCondition>,
}

/// Terrain choices a scenario can ask for
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TerrainKind {
    /// Nothing but air
    #[default]
    Empty,
    /// Air above `surface_y`, then dirt, stone and bedrock
    Flat {
        surface_y: i32,
        dirt_depth: i32,
        bedrock_y: i32,
    },
}

impl TerrainKind {
    pub fn build(&self) -> Box<dyn TerrainSource> {
        match *self {
            TerrainKind::Empty => Box::new(EmptyTerrain),
            TerrainKind::Flat {
                surface_y,
                dirt_depth,
                bedrock_y,
            } => Box::new(FlatTerrain {
                surface_y,
                dirt_depth,
                bedrock_y,
            }),
        }
    }
}

/// One step of a scenario. Materials are referenced by catalog name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScenarioAction {
    /// Queue a single cell placement
    Place { x: i32, y: i32, material: String },

    /// Queue placements for every cell of a region
    Fill { region: Region, material: String },

    /// Queue a cell removal
    Remove { x: i32, y: i32 },

    /// Queue a destruction blast
    Destroy {
        x: i32,
        y: i32,
        radius: f32,
        force: f32,
    },

    /// Set the temperature of an occupied cell directly
    SetTemperature { x: i32, y: i32, temperature: f32 },

    /// Run ticks
    Tick { count: u64 },

    /// Flush modified chunks to the delta store
    Save,

    /// Write a message to the execution log
    Log { message: String },
}

impl ScenarioDefinition {
    /// Load scenario from RON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario file: {}", path.display()))?;

        Self::from_ron(&content)
            .with_context(|| format!("Failed to parse RON scenario: {}", path.display()))
    }

    pub fn from_ron(source: &str) -> Result<Self> {
        Ok(ron::from_str(source)?)
    }

    /// Save scenario to RON file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let ron = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .context("Failed to serialize scenario to RON")?;

        std::fs::write(path.as_ref(), ron).with_context(|| {
            format!("Failed to write scenario file: {}", path.as_ref().display())
        })?;

        Ok(())
    }

    /// Ticks the scenario's actions will run
    pub fn total_ticks(&self) -> u64 {
        self.setup
            .iter()
            .chain(&self.actions)
            .map(|action| match action {
                ScenarioAction::Tick { count } => *count,
                _ => 0,
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ScenarioDefinition {
        ScenarioDefinition {
            name: "Test Scenario".to_string(),
            description: "A test scenario".to_string(),
            terrain: TerrainKind::Flat {
                surface_y: 48,
                dirt_depth: 8,
                bedrock_y: 512,
            },
            points_of_interest: vec![(0, 0)],
            setup: vec![ScenarioAction::Tick { count: 1 }],
            actions: vec![
                ScenarioAction::Place {
                    x: 3,
                    y: 4,
                    material: "sand".to_string(),
                },
                ScenarioAction::Tick { count: 60 },
                ScenarioAction::Log {
                    message: "Test message".to_string(),
                },
            ],
            verify: vec![VerificationCondition::MaterialAt {
                x: 3,
                y: 47,
                material: Some("sand".to_string()),
            }],
        }
    }

    #[test]
    fn test_scenario_serialization() {
        let scenario = sample();

        let ron = ron::ser::to_string_pretty(&scenario, ron::ser::PrettyConfig::default()).unwrap();
        assert!(ron.contains("Test Scenario"));
        assert!(ron.contains("Place"));

        let deserialized = ScenarioDefinition::from_ron(&ron).unwrap();
        assert_eq!(deserialized.name, scenario.name);
        assert_eq!(deserialized.actions.len(), scenario.actions.len());
        assert_eq!(deserialized.total_ticks(), 61);
    }

    #[test]
    fn test_optional_sections_default() {
        let scenario = ScenarioDefinition::from_ron(
            r#"(name: "bare", description: "", actions: [(type: "Tick", count: 5)])"#,
        )
        .unwrap();
        assert!(matches!(scenario.terrain, TerrainKind::Empty));
        assert!(scenario.setup.is_empty());
        assert!(scenario.verify.is_empty());
        assert_eq!(scenario.total_ticks(), 5);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.ron");
        sample().to_file(&path).unwrap();

        let loaded = ScenarioDefinition::from_file(&path).unwrap();
        assert_eq!(loaded.points_of_interest, vec![(0, 0)]);
        assert!(ScenarioDefinition::from_file(dir.path().join("missing.ron")).is_err());
    }
}
