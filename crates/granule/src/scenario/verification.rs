//! Verification conditions and state checks for scenarios

use std::collections::BTreeMap;

use glam::IVec2;
use granule_core::Simulation;
use serde::{Deserialize, Serialize};

/// Conditions that can be verified against world state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VerificationCondition {
    // === MATERIAL CHECKS ===
    /// Assert the material at a cell (`None` = empty)
    MaterialAt {
        x: i32,
        y: i32,
        material: Option<String>,
    },

    /// Assert material count within range
    MaterialCount {
        material: String,
        region: Region,
        min: usize,
        max: usize,
    },

    /// Assert no material in region
    RegionEmpty { region: Region },

    // === PHYSICS CHECKS ===
    /// Assert every occupied cell in the region lies within a temperature range
    TemperatureRange { region: Region, min: f32, max: f32 },

    /// Assert at least `min` events of a kind were raised during the run
    EventCount { kind: String, min: usize },

    /// Assert no chunk update failed during the run
    NoFailedChunks,

    // === LOGICAL OPERATORS ===
    /// All conditions must pass
    All {
        conditions: Vec<VerificationCondition>,
    },

    /// Any condition must pass
    Any {
        conditions: Vec<VerificationCondition>,
    },

    /// Condition must NOT pass
    Not {
        condition: Box<VerificationCondition>,
    },
}

/// Spatial region for verification and fills
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Region {
    /// Rectangular region, bounds inclusive
    Rect {
        min_x: i32,
        min_y: i32,
        max_x: i32,
        max_y: i32,
    },

    /// Circular region
    Circle {
        center_x: i32,
        center_y: i32,
        radius: u32,
    },
}

impl Region {
    /// Every cell position in the region, row by row
    pub fn positions(&self) -> Vec<IVec2> {
        match *self {
            Region::Rect {
                min_x,
                min_y,
                max_x,
                max_y,
            } => (min_y..=max_y)
                .flat_map(|y| (min_x..=max_x).map(move |x| IVec2::new(x, y)))
                .collect(),
            Region::Circle {
                center_x,
                center_y,
                radius,
            } => {
                let r = radius as i32;
                let center = IVec2::new(center_x, center_y);
                ((center_y - r)..=(center_y + r))
                    .flat_map(|y| {
                        ((center_x - r)..=(center_x + r)).map(move |x| IVec2::new(x, y))
                    })
                    .filter(|p| (*p - center).length_squared() <= r * r)
                    .collect()
            }
        }
    }
}

/// What a condition is checked against
pub struct VerifyContext<'a> {
    pub sim: &'a Simulation,
    /// Event counts by [`granule_core::SimEvent::kind`]
    pub events: &'a BTreeMap<String, usize>,
    pub failed_chunks: usize,
}

/// Result of a verification check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub passed: bool,
    pub message: String,
    pub actual_value: Option<String>, // For debugging
}

impl VerificationResult {
    fn unknown_material(name: &str) -> Self {
        VerificationResult {
            passed: false,
            message: format!("Unknown material '{}'", name),
            actual_value: None,
        }
    }
}

impl VerificationCondition {
    /// Evaluate condition against world state
    pub fn evaluate(&self, ctx: &VerifyContext<'_>) -> VerificationResult {
        let sim = ctx.sim;
        match self {
            VerificationCondition::MaterialAt { x, y, material } => {
                let expected = match material {
                    Some(name) => match material_id(sim, name) {
                        Some(id) => Some(id),
                        None => return VerificationResult::unknown_material(name),
                    },
                    None => None,
                };
                let actual = sim.get_material_at(IVec2::new(*x, *y));
                let passed = actual == expected;

                VerificationResult {
                    passed,
                    message: format!(
                        "Material at ({}, {}): expected {}, got {}",
                        x,
                        y,
                        material_name(sim, expected),
                        material_name(sim, actual)
                    ),
                    actual_value: Some(material_name(sim, actual)),
                }
            }

            VerificationCondition::MaterialCount {
                material,
                region,
                min,
                max,
            } => {
                let Some(id) = material_id(sim, material) else {
                    return VerificationResult::unknown_material(material);
                };
                let actual = region
                    .positions()
                    .into_iter()
                    .filter(|&p| sim.get_material_at(p) == Some(id))
                    .count();
                let passed = actual >= *min && actual <= *max;

                VerificationResult {
                    passed,
                    message: format!(
                        "Material {} count in {:?}: expected {}-{}, got {}",
                        material, region, min, max, actual
                    ),
                    actual_value: Some(actual.to_string()),
                }
            }

            VerificationCondition::RegionEmpty { region } => {
                let positions = region.positions();
                let occupied = positions.iter().filter(|&&p| sim.is_occupied(p)).count();

                VerificationResult {
                    passed: occupied == 0,
                    message: format!(
                        "Region {:?} empty: {} occupied / {} total cells",
                        region,
                        occupied,
                        positions.len()
                    ),
                    actual_value: Some(format!("{}/{}", occupied, positions.len())),
                }
            }

            VerificationCondition::TemperatureRange { region, min, max } => {
                let temperatures: Vec<f32> = region
                    .positions()
                    .into_iter()
                    .filter_map(|p| sim.get_cell(p))
                    .map(|cell| cell.temperature)
                    .collect();
                let lowest = temperatures.iter().copied().fold(f32::INFINITY, f32::min);
                let highest = temperatures.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                let passed = temperatures.iter().all(|t| (*min..=*max).contains(t));

                VerificationResult {
                    passed,
                    message: format!(
                        "Temperature in {:?}: expected {}-{}, got {:.1}-{:.1} over {} cells",
                        region,
                        min,
                        max,
                        lowest,
                        highest,
                        temperatures.len()
                    ),
                    actual_value: Some(format!("{:.1}-{:.1}", lowest, highest)),
                }
            }

            VerificationCondition::EventCount { kind, min } => {
                let actual = ctx.events.get(kind).copied().unwrap_or(0);

                VerificationResult {
                    passed: actual >= *min,
                    message: format!(
                        "Events '{}': expected at least {}, got {}",
                        kind, min, actual
                    ),
                    actual_value: Some(actual.to_string()),
                }
            }

            VerificationCondition::NoFailedChunks => VerificationResult {
                passed: ctx.failed_chunks == 0,
                message: format!("Failed chunk updates: {}", ctx.failed_chunks),
                actual_value: Some(ctx.failed_chunks.to_string()),
            },

            VerificationCondition::All { conditions } => {
                let mut all_passed = true;
                let mut messages = Vec::new();

                for cond in conditions {
                    let result = cond.evaluate(ctx);
                    if !result.passed {
                        all_passed = false;
                    }
                    messages.push(format!("  - {}", result.message));
                }

                VerificationResult {
                    passed: all_passed,
                    message: format!("All conditions:\n{}", messages.join("\n")),
                    actual_value: None,
                }
            }

            VerificationCondition::Any { conditions } => {
                let mut any_passed = false;
                let mut messages = Vec::new();

                for cond in conditions {
                    let result = cond.evaluate(ctx);
                    if result.passed {
                        any_passed = true;
                    }
                    messages.push(format!("  - {}", result.message));
                }

                VerificationResult {
                    passed: any_passed,
                    message: format!("Any condition:\n{}", messages.join("\n")),
                    actual_value: None,
                }
            }

            VerificationCondition::Not { condition } => {
                let result = condition.evaluate(ctx);
                VerificationResult {
                    passed: !result.passed,
                    message: format!("NOT ({})", result.message),
                    actual_value: result.actual_value,
                }
            }
        }
    }
}

fn material_id(sim: &Simulation, name: &str) -> Option<u16> {
    sim.catalog().material_by_name(name).map(|def| def.id)
}

fn material_name(sim: &Simulation, id: Option<u16>) -> String {
    match id {
        None => "empty".to_string(),
        Some(id) => sim
            .catalog()
            .material(id)
            .map(|def| def.name.clone())
            .unwrap_or_else(|| format!("#{}", id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use granule_core::{MaterialCatalog, MaterialId, SimConfig};
    use std::sync::Arc;

    fn world() -> Simulation {
        let mut sim = Simulation::new(
            SimConfig {
                worker_threads: 1,
                ..Default::default()
            },
            Arc::new(MaterialCatalog::with_defaults()),
        )
        .unwrap();
        sim.load_chunk(IVec2::ZERO);
        sim.store_mut().set_material(IVec2::new(2, 2), MaterialId::SAND);
        sim.store_mut().set_material(IVec2::new(3, 2), MaterialId::SAND);
        sim
    }

    fn check(sim: &Simulation, condition: VerificationCondition) -> VerificationResult {
        let events = BTreeMap::from([("exploded".to_string(), 2)]);
        let ctx = VerifyContext {
            sim,
            events: &events,
            failed_chunks: 0,
        };
        condition.evaluate(&ctx)
    }

    fn rect(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Region {
        Region::Rect {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    #[test]
    fn test_region_positions() {
        assert_eq!(rect(0, 0, 2, 1).positions().len(), 6);
        let circle = Region::Circle {
            center_x: 0,
            center_y: 0,
            radius: 1,
        };
        assert_eq!(circle.positions().len(), 5);
    }

    #[test]
    fn test_material_checks() {
        let sim = world();
        let at = |x, material: Option<&str>| VerificationCondition::MaterialAt {
            x,
            y: 2,
            material: material.map(str::to_string),
        };
        assert!(check(&sim, at(2, Some("sand"))).passed);
        assert!(check(&sim, at(4, None)).passed);
        assert!(!check(&sim, at(4, Some("sand"))).passed);
        assert!(!check(&sim, at(2, Some("no_such_material"))).passed);

        let count = VerificationCondition::MaterialCount {
            material: "sand".to_string(),
            region: rect(0, 0, 10, 10),
            min: 2,
            max: 2,
        };
        assert!(check(&sim, count).passed);

        let empty = |region| VerificationCondition::RegionEmpty { region };
        assert!(check(&sim, empty(rect(5, 5, 9, 9))).passed);
        assert!(!check(&sim, empty(rect(0, 0, 9, 9))).passed);
    }

    #[test]
    fn test_temperature_and_events() {
        let sim = world();
        let range = VerificationCondition::TemperatureRange {
            region: rect(0, 0, 10, 10),
            min: 0.0,
            max: 50.0,
        };
        assert!(check(&sim, range).passed);

        let events = VerificationCondition::EventCount {
            kind: "exploded".to_string(),
            min: 2,
        };
        assert!(check(&sim, events).passed);
        let reacted = VerificationCondition::EventCount {
            kind: "reacted".to_string(),
            min: 1,
        };
        assert!(!check(&sim, reacted).passed);
    }

    #[test]
    fn test_logical_operators() {
        let sim = world();
        let yes = || VerificationCondition::NoFailedChunks;
        let no = || VerificationCondition::Not {
            condition: Box::new(VerificationCondition::NoFailedChunks),
        };

        assert!(!check(&sim, no()).passed);
        assert!(
            check(
                &sim,
                VerificationCondition::Any {
                    conditions: vec![no(), yes()]
                }
            )
            .passed
        );
        assert!(
            !check(
                &sim,
                VerificationCondition::All {
                    conditions: vec![yes(), no()]
                }
            )
            .passed
        );
    }
}
