//! Chemical reaction rules
//!
//! Handles interactions between different materials when they come into contact.
//! Examples: water + lava → steam + stone, gunpowder + fire → explosion.
//!
//! Rules are immutable. Per-pair progress lives in the simulation, keyed by the
//! positions of the two reacting cells, so two distant pairs matching the same
//! rule never share counters.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{AMBIENT_TEMPERATURE, CatalogError, MaterialId};

/// What the two reactants turn into
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ReactionOutput {
    /// Each input becomes exactly one output
    Transform { output_a: u16, output_b: u16 },
    /// The inputs are replaced by the first two products; the rest spawn in
    /// free cells next to the pair
    Products(Vec<u16>),
}

impl Default for ReactionOutput {
    fn default() -> Self {
        ReactionOutput::Transform {
            output_a: MaterialId::EMPTY,
            output_b: MaterialId::EMPTY,
        }
    }
}

/// Explosion triggered when a reaction completes
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Explosion {
    pub radius: f32,
    pub force: f32,
}

/// Definition of a chemical reaction between two materials
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactionRule {
    /// Human-readable name
    pub name: String,

    // Input materials
    pub input_a: u16,
    pub input_b: u16,

    // Conditions, checked against the average of both cells
    pub min_temperature: Option<f32>,
    pub max_temperature: Option<f32>,
    pub min_pressure: Option<f32>,
    pub max_pressure: Option<f32>,
    /// Material that must touch either reactant (not consumed)
    pub catalyst: Option<u16>,

    pub output: ReactionOutput,
    /// Probability each reactant is replaced when the reaction fires
    pub consumption: [f32; 2],

    /// Heat added to both cells (negative = endothermic)
    pub heat_delta: f32,
    /// Pressure added to both cells
    pub pressure_delta: f32,
    pub explosion: Option<Explosion>,
    /// Gas spawned into a free neighbor cell
    pub gas_byproduct: Option<u16>,

    /// Progress per second once conditions hold; 1.0 progress completes
    pub rate: f32,
    /// Rate multiplier gained per degree above the minimum temperature
    pub temperature_factor: f32,
    /// Rate multiplier gained per unit of pressure above the minimum
    pub pressure_factor: f32,
    /// Seconds of continuous contact before progress starts
    pub min_contact_time: f32,
}

impl Default for ReactionRule {
    fn default() -> Self {
        Self {
            name: "unnamed".to_string(),
            input_a: MaterialId::EMPTY,
            input_b: MaterialId::EMPTY,
            min_temperature: None,
            max_temperature: None,
            min_pressure: None,
            max_pressure: None,
            catalyst: None,
            output: ReactionOutput::default(),
            consumption: [1.0, 1.0],
            heat_delta: 0.0,
            pressure_delta: 0.0,
            explosion: None,
            gas_byproduct: None,
            rate: 1.0,
            temperature_factor: 0.0,
            pressure_factor: 0.0,
            min_contact_time: 0.0,
        }
    }
}

impl ReactionRule {
    /// Whether temperature and pressure sit inside the rule's window
    pub fn conditions_met(&self, temperature: f32, pressure: f32) -> bool {
        if let Some(min_t) = self.min_temperature
            && temperature < min_t
        {
            return false;
        }
        if let Some(max_t) = self.max_temperature
            && temperature > max_t
        {
            return false;
        }
        if let Some(min_p) = self.min_pressure
            && pressure < min_p
        {
            return false;
        }
        if let Some(max_p) = self.max_pressure
            && pressure > max_p
        {
            return false;
        }
        true
    }

    /// Effective progress per second at the given ambient conditions
    pub fn rate_at(&self, temperature: f32, pressure: f32) -> f32 {
        let temp_base = self.min_temperature.unwrap_or(AMBIENT_TEMPERATURE);
        let pressure_base = self.min_pressure.unwrap_or(0.0);
        let temp_scale = 1.0 + self.temperature_factor * (temperature - temp_base).max(0.0);
        let pressure_scale = 1.0 + self.pressure_factor * (pressure - pressure_base).max(0.0);
        (self.rate * temp_scale * pressure_scale).max(0.0)
    }

    /// Every material id this rule refers to
    pub(crate) fn referenced_ids(&self) -> Vec<u16> {
        let mut ids = vec![self.input_a, self.input_b];
        match &self.output {
            ReactionOutput::Transform { output_a, output_b } => {
                ids.push(*output_a);
                ids.push(*output_b);
            }
            ReactionOutput::Products(products) => ids.extend(products),
        }
        ids.extend(self.catalyst);
        ids.extend(self.gas_byproduct);
        ids
    }
}

/// Replacement materials for a fired reaction, oriented to the caller's pair
#[derive(Clone, Debug, PartialEq)]
pub struct OrientedOutputs<'a> {
    pub for_a: u16,
    pub for_b: u16,
    /// Extra products that need free cells
    pub extra: &'a [u16],
}

/// Registry of all possible reactions with O(1) lookup via HashMap
/// Key: (material_a, material_b) where material_a <= material_b (normalized order)
/// Value: Vec of reactions possible between these materials
#[derive(Debug, Default)]
pub struct ReactionRegistry {
    reactions: HashMap<(u16, u16), Vec<ReactionRule>>,
}

fn pair_key(mat_a: u16, mat_b: u16) -> (u16, u16) {
    if mat_a <= mat_b {
        (mat_a, mat_b)
    } else {
        (mat_b, mat_a)
    }
}

impl ReactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new reaction. Rule names must be unique.
    pub fn register(&mut self, reaction: ReactionRule) -> Result<(), CatalogError> {
        if self.iter().any(|r| r.name == reaction.name) {
            return Err(CatalogError::DuplicateReaction(reaction.name));
        }
        let key = pair_key(reaction.input_a, reaction.input_b);
        self.reactions.entry(key).or_default().push(reaction);
        Ok(())
    }

    /// First rule registered for a pair, trying both orderings
    pub fn find(&self, mat_a: u16, mat_b: u16) -> Option<&ReactionRule> {
        self.find_all(mat_a, mat_b).first()
    }

    /// All rules registered for a pair, trying both orderings
    pub fn find_all(&self, mat_a: u16, mat_b: u16) -> &[ReactionRule] {
        self.reactions
            .get(&pair_key(mat_a, mat_b))
            .map_or(&[], Vec::as_slice)
    }

    /// First rule for a pair whose temperature/pressure/catalyst conditions hold
    pub fn find_matching(
        &self,
        mat_a: u16,
        mat_b: u16,
        temperature: f32,
        pressure: f32,
        catalyst_present: impl Fn(u16) -> bool,
    ) -> Option<&ReactionRule> {
        self.find_all(mat_a, mat_b).iter().find(|rule| {
            rule.conditions_met(temperature, pressure)
                && rule.catalyst.is_none_or(|catalyst| catalyst_present(catalyst))
        })
    }

    /// All rules that consume, produce or catalyze a material
    pub fn rules_for(&self, material: u16) -> Vec<&ReactionRule> {
        self.iter()
            .filter(|rule| rule.referenced_ids().contains(&material))
            .collect()
    }

    pub fn has_reactions(&self, material: u16) -> bool {
        self.reactions
            .keys()
            .any(|&(a, b)| a == material || b == material)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReactionRule> {
        self.reactions.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.reactions.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.reactions.is_empty()
    }

    /// Get output materials for a reaction, accounting for which input is which
    pub fn oriented_outputs<'a>(
        &self,
        reaction: &'a ReactionRule,
        mat_a: u16,
        _mat_b: u16,
    ) -> OrientedOutputs<'a> {
        let swapped = reaction.input_a != mat_a;
        match &reaction.output {
            ReactionOutput::Transform { output_a, output_b } => {
                let (for_a, for_b) = if swapped {
                    (*output_b, *output_a)
                } else {
                    (*output_a, *output_b)
                };
                OrientedOutputs {
                    for_a,
                    for_b,
                    extra: &[],
                }
            }
            ReactionOutput::Products(products) => {
                let first = products.first().copied().unwrap_or(MaterialId::EMPTY);
                let second = products.get(1).copied().unwrap_or(MaterialId::EMPTY);
                let (for_a, for_b) = if swapped {
                    (second, first)
                } else {
                    (first, second)
                };
                OrientedOutputs {
                    for_a,
                    for_b,
                    extra: products.get(2..).unwrap_or(&[]),
                }
            }
        }
    }

    /// Oriented consumption probabilities for (mat_a, mat_b)
    pub fn oriented_consumption(&self, reaction: &ReactionRule, mat_a: u16) -> [f32; 2] {
        if reaction.input_a != mat_a {
            [reaction.consumption[1], reaction.consumption[0]]
        } else {
            reaction.consumption
        }
    }
}

pub(crate) fn default_reactions() -> Vec<ReactionRule> {
    vec![
        // Water + Lava → Steam + Stone
        ReactionRule {
            name: "water_lava_quench".to_string(),
            input_a: MaterialId::WATER,
            input_b: MaterialId::LAVA,
            output: ReactionOutput::Transform {
                output_a: MaterialId::STEAM,
                output_b: MaterialId::STONE,
            },
            heat_delta: -100.0,
            pressure_delta: 2.0,
            rate: 20.0,
            ..Default::default()
        },
        // Ice + Lava → Water + Stone
        ReactionRule {
            name: "ice_lava_cool".to_string(),
            input_a: MaterialId::ICE,
            input_b: MaterialId::LAVA,
            output: ReactionOutput::Transform {
                output_a: MaterialId::WATER,
                output_b: MaterialId::STONE,
            },
            heat_delta: -80.0,
            rate: 15.0,
            ..Default::default()
        },
        // Acid + Metal → Empty + Rust, releasing hydrogen
        ReactionRule {
            name: "acid_metal_corrode".to_string(),
            input_a: MaterialId::ACID,
            input_b: MaterialId::METAL,
            output: ReactionOutput::Transform {
                output_a: MaterialId::EMPTY,
                output_b: MaterialId::RUST,
            },
            consumption: [1.0, 0.5],
            gas_byproduct: Some(MaterialId::HYDROGEN),
            heat_delta: 15.0,
            rate: 2.0,
            temperature_factor: 0.02,
            ..Default::default()
        },
        // Acid + Stone → Acid + Empty
        ReactionRule {
            name: "acid_stone_dissolve".to_string(),
            input_a: MaterialId::ACID,
            input_b: MaterialId::STONE,
            output: ReactionOutput::Transform {
                output_a: MaterialId::ACID,
                output_b: MaterialId::EMPTY,
            },
            rate: 0.5,
            min_contact_time: 0.25,
            ..Default::default()
        },
        // Salt + Water → Brine, needs a moment of contact to dissolve
        ReactionRule {
            name: "salt_dissolve".to_string(),
            input_a: MaterialId::SALT,
            input_b: MaterialId::WATER,
            output: ReactionOutput::Transform {
                output_a: MaterialId::EMPTY,
                output_b: MaterialId::BRINE,
            },
            heat_delta: -2.0,
            rate: 1.0,
            min_contact_time: 0.5,
            temperature_factor: 0.01,
            ..Default::default()
        },
        // Water + Metal → Rust, only with salt nearby
        ReactionRule {
            name: "salt_water_rust".to_string(),
            input_a: MaterialId::WATER,
            input_b: MaterialId::METAL,
            catalyst: Some(MaterialId::SALT),
            output: ReactionOutput::Transform {
                output_a: MaterialId::WATER,
                output_b: MaterialId::RUST,
            },
            rate: 0.2,
            min_contact_time: 2.0,
            ..Default::default()
        },
        // Gunpowder + Fire → Smoke + Fire + blast
        ReactionRule {
            name: "gunpowder_detonate".to_string(),
            input_a: MaterialId::GUNPOWDER,
            input_b: MaterialId::FIRE,
            output: ReactionOutput::Products(vec![
                MaterialId::SMOKE,
                MaterialId::FIRE,
                MaterialId::SMOKE,
                MaterialId::SMOKE,
            ]),
            heat_delta: 400.0,
            pressure_delta: 10.0,
            explosion: Some(Explosion {
                radius: 4.0,
                force: 6.0,
            }),
            rate: 60.0,
            ..Default::default()
        },
        // Hydrogen + Fire → Steam, violently above ignition temperature
        ReactionRule {
            name: "hydrogen_combust".to_string(),
            input_a: MaterialId::HYDROGEN,
            input_b: MaterialId::FIRE,
            min_temperature: Some(100.0),
            output: ReactionOutput::Transform {
                output_a: MaterialId::STEAM,
                output_b: MaterialId::FIRE,
            },
            heat_delta: 250.0,
            explosion: Some(Explosion {
                radius: 2.5,
                force: 3.0,
            }),
            rate: 30.0,
            temperature_factor: 0.01,
            ..Default::default()
        },
        // Sand + Lava → Glass + Lava at high temperature
        ReactionRule {
            name: "sand_vitrify".to_string(),
            input_a: MaterialId::SAND,
            input_b: MaterialId::LAVA,
            min_temperature: Some(900.0),
            output: ReactionOutput::Transform {
                output_a: MaterialId::GLASS,
                output_b: MaterialId::LAVA,
            },
            heat_delta: -30.0,
            rate: 0.5,
            temperature_factor: 0.005,
            ..Default::default()
        },
        // Steam + cold Stone → Water + Stone (condensation)
        ReactionRule {
            name: "steam_condense".to_string(),
            input_a: MaterialId::STEAM,
            input_b: MaterialId::STONE,
            max_temperature: Some(80.0),
            output: ReactionOutput::Transform {
                output_a: MaterialId::WATER,
                output_b: MaterialId::STONE,
            },
            heat_delta: 15.0,
            rate: 1.0,
            ..Default::default()
        },
        // Steam under pressure + Ash → Dirt
        ReactionRule {
            name: "ash_compact".to_string(),
            input_a: MaterialId::STEAM,
            input_b: MaterialId::ASH,
            min_pressure: Some(5.0),
            output: ReactionOutput::Transform {
                output_a: MaterialId::EMPTY,
                output_b: MaterialId::DIRT,
            },
            rate: 0.5,
            pressure_factor: 0.1,
            ..Default::default()
        },
    ]
}
