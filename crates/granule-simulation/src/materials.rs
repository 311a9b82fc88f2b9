//! Material definitions and registry

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::CatalogError;
use crate::cell::PhysicalState;

/// Built-in material IDs
pub struct MaterialId;

impl MaterialId {
    pub const EMPTY: u16 = 0;
    pub const STONE: u16 = 1;
    pub const SAND: u16 = 2;
    pub const WATER: u16 = 3;
    pub const WOOD: u16 = 4;
    pub const FIRE: u16 = 5;
    pub const SMOKE: u16 = 6;
    pub const STEAM: u16 = 7;
    pub const LAVA: u16 = 8;
    pub const OIL: u16 = 9;
    pub const ACID: u16 = 10;
    pub const ICE: u16 = 11;
    pub const GLASS: u16 = 12;
    pub const METAL: u16 = 13;
    pub const BEDROCK: u16 = 14;
    pub const DIRT: u16 = 15;
    pub const ASH: u16 = 16;
    pub const GUNPOWDER: u16 = 17;
    pub const SALT: u16 = 18;
    pub const BRINE: u16 = 19;
    pub const RUST: u16 = 20;
    pub const HYDROGEN: u16 = 21;
}

/// How a material behaves physically
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaterialCategory {
    /// Doesn't move (stone, wood, metal)
    Solid,
    /// Falls, piles up (sand, dirt, ash)
    Powder,
    /// Flows, seeks level (water, oil, lava)
    Liquid,
    /// Rises, disperses (steam, smoke)
    Gas,
}

impl MaterialCategory {
    /// Physical state a freshly placed cell of this category starts in
    pub fn default_state(self) -> PhysicalState {
        match self {
            MaterialCategory::Solid | MaterialCategory::Powder => PhysicalState::Solid,
            MaterialCategory::Liquid => PhysicalState::Liquid,
            MaterialCategory::Gas => PhysicalState::Gas,
        }
    }
}

/// Definition of a material's properties
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialDef {
    pub id: u16,
    pub name: String,
    pub category: MaterialCategory,

    /// Base color (RGBA)
    pub color: [u8; 4],

    /// Density (g/cm³) - affects sinking/floating
    pub density: f32,

    // Mechanical properties
    /// Sliding coefficient (powders)
    pub friction: f32,
    /// Bounciness when thrown by an explosion
    pub restitution: f32,
    /// Resistance to flow (liquids, 0.0 - 1.0), thins the lateral spread
    /// allowed by `flow_rate`
    pub viscosity: f32,
    /// Lateral cells a liquid may spread per tick
    pub flow_rate: u8,
    /// Destruction resistance (None = indestructible)
    pub hardness: Option<f32>,

    // Thermal properties
    /// Temperature at which this melts (Celsius)
    pub melting_point: Option<f32>,
    /// Temperature at which this freezes
    pub freezing_point: Option<f32>,
    /// Temperature at which this boils/evaporates
    pub boiling_point: Option<f32>,
    /// Temperature at which this ignites
    pub ignition_temp: Option<f32>,
    /// Temperature a freshly placed cell starts at (None = ambient)
    pub spawn_temperature: Option<f32>,
    /// Heat conductivity (0.0 - 1.0)
    pub heat_conductivity: f32,
    /// Electrical conductivity (0.0 - 1.0)
    pub electrical_conductivity: f32,

    // State transitions
    /// What this becomes when melted
    pub melts_to: Option<u16>,
    /// What this becomes when frozen
    pub freezes_to: Option<u16>,
    /// What this becomes when boiled
    pub boils_to: Option<u16>,
    /// What this becomes when burned
    pub burns_to: Option<u16>,
    /// How fast this burns (probability per tick, 0.0 - 1.0)
    pub burn_rate: f32,
    pub flammable: bool,

    /// Ticks a cell of this material survives before decaying
    pub lifetime: Option<u16>,
    /// What this becomes when its lifetime runs out (None = empty)
    pub decays_to: Option<u16>,
}

impl Default for MaterialDef {
    fn default() -> Self {
        Self {
            id: 0,
            name: "unknown".to_string(),
            category: MaterialCategory::Solid,
            color: [255, 0, 255, 255], // Magenta for missing materials
            density: 1.0,
            friction: 0.5,
            restitution: 0.1,
            viscosity: 0.5,
            flow_rate: 1,
            hardness: Some(1.0),
            melting_point: None,
            freezing_point: None,
            boiling_point: None,
            ignition_temp: None,
            spawn_temperature: None,
            heat_conductivity: 0.5,
            electrical_conductivity: 0.0,
            melts_to: None,
            freezes_to: None,
            boils_to: None,
            burns_to: None,
            burn_rate: 0.0,
            flammable: false,
            lifetime: None,
            decays_to: None,
        }
    }
}

impl MaterialDef {
    pub fn is_empty(&self) -> bool {
        self.id == MaterialId::EMPTY
    }

    pub fn default_state(&self) -> PhysicalState {
        self.category.default_state()
    }

    /// Every material id this definition refers to
    pub(crate) fn referenced_ids(&self) -> impl Iterator<Item = u16> + '_ {
        [
            self.melts_to,
            self.freezes_to,
            self.boils_to,
            self.burns_to,
            self.decays_to,
        ]
        .into_iter()
        .flatten()
    }
}

/// Registry of all materials
#[derive(Debug, Default)]
pub struct Materials {
    materials: Vec<Option<MaterialDef>>,
    by_name: HashMap<String, u16>,
}

impl Materials {
    /// Empty registry holding only the `empty` material
    pub fn new() -> Self {
        let empty = MaterialDef {
            id: MaterialId::EMPTY,
            name: "empty".to_string(),
            category: MaterialCategory::Gas,
            color: [0, 0, 0, 0],
            density: 0.0,
            hardness: None,
            heat_conductivity: 0.05,
            ..Default::default()
        };
        Self {
            by_name: HashMap::from([(empty.name.clone(), empty.id)]),
            materials: vec![Some(empty)],
        }
    }

    /// Registry with the built-in material set
    pub fn with_defaults() -> Self {
        let mut materials = Self::new();
        for def in default_materials() {
            if let Err(e) = materials.register(def) {
                log::error!("Built-in material rejected: {}", e);
            }
        }
        materials
    }

    /// Register a material. Ids and names must be unique.
    pub fn register(&mut self, material: MaterialDef) -> Result<(), CatalogError> {
        let id = material.id as usize;

        if self.get(material.id).is_some() {
            return Err(CatalogError::DuplicateMaterial(material.id.to_string()));
        }
        if self.by_name.contains_key(&material.name) {
            return Err(CatalogError::DuplicateMaterial(material.name));
        }

        if self.materials.len() <= id {
            self.materials.resize(id + 1, None);
        }

        self.by_name.insert(material.name.clone(), material.id);
        self.materials[id] = Some(material);
        Ok(())
    }

    /// Get material definition by ID
    pub fn get(&self, id: u16) -> Option<&MaterialDef> {
        self.materials.get(id as usize).and_then(Option::as_ref)
    }

    /// Get material definition by name
    pub fn by_name(&self, name: &str) -> Option<&MaterialDef> {
        self.by_name.get(name).and_then(|&id| self.get(id))
    }

    pub fn contains(&self, id: u16) -> bool {
        self.get(id).is_some()
    }

    /// Get color for a material (transparent for unknown ids)
    pub fn get_color(&self, id: u16) -> [u8; 4] {
        self.get(id).map_or([0, 0, 0, 0], |m| m.color)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MaterialDef> {
        self.materials.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

fn default_materials() -> Vec<MaterialDef> {
    vec![
        MaterialDef {
            id: MaterialId::STONE,
            name: "stone".to_string(),
            category: MaterialCategory::Solid,
            color: [128, 128, 128, 255],
            density: 2.5,
            hardness: Some(5.0),
            melting_point: Some(1200.0),
            melts_to: Some(MaterialId::LAVA),
            ..Default::default()
        },
        MaterialDef {
            id: MaterialId::SAND,
            name: "sand".to_string(),
            category: MaterialCategory::Powder,
            color: [194, 178, 128, 255],
            density: 1.5,
            hardness: Some(1.0),
            friction: 0.3,
            melting_point: Some(1700.0),
            melts_to: Some(MaterialId::GLASS),
            ..Default::default()
        },
        MaterialDef {
            id: MaterialId::WATER,
            name: "water".to_string(),
            category: MaterialCategory::Liquid,
            color: [64, 164, 223, 200],
            density: 1.0,
            hardness: Some(0.5),
            viscosity: 0.1,
            flow_rate: 3,
            boiling_point: Some(100.0),
            boils_to: Some(MaterialId::STEAM),
            freezing_point: Some(0.0),
            freezes_to: Some(MaterialId::ICE),
            heat_conductivity: 0.6,
            electrical_conductivity: 0.3,
            ..Default::default()
        },
        MaterialDef {
            id: MaterialId::WOOD,
            name: "wood".to_string(),
            category: MaterialCategory::Solid,
            color: [139, 90, 43, 255],
            density: 0.6,
            hardness: Some(2.0),
            flammable: true,
            ignition_temp: Some(300.0),
            burns_to: Some(MaterialId::ASH),
            burn_rate: 0.02,
            heat_conductivity: 0.2,
            ..Default::default()
        },
        MaterialDef {
            id: MaterialId::FIRE,
            name: "fire".to_string(),
            category: MaterialCategory::Gas,
            color: [255, 100, 0, 255],
            density: 0.0001,
            hardness: None,
            lifetime: Some(40),
            decays_to: Some(MaterialId::SMOKE),
            spawn_temperature: Some(900.0),
            heat_conductivity: 0.9,
            ..Default::default()
        },
        MaterialDef {
            id: MaterialId::SMOKE,
            name: "smoke".to_string(),
            category: MaterialCategory::Gas,
            color: [60, 60, 60, 150],
            density: 0.001,
            hardness: None,
            lifetime: Some(240),
            ..Default::default()
        },
        MaterialDef {
            id: MaterialId::STEAM,
            name: "steam".to_string(),
            category: MaterialCategory::Gas,
            color: [200, 200, 200, 100],
            density: 0.0006,
            hardness: None,
            // Condenses below boiling point
            freezing_point: Some(95.0),
            freezes_to: Some(MaterialId::WATER),
            spawn_temperature: Some(110.0),
            ..Default::default()
        },
        MaterialDef {
            id: MaterialId::LAVA,
            name: "lava".to_string(),
            category: MaterialCategory::Liquid,
            color: [255, 80, 0, 255],
            density: 3.0,
            hardness: Some(3.0),
            viscosity: 0.8,
            flow_rate: 1,
            freezing_point: Some(700.0),
            freezes_to: Some(MaterialId::STONE),
            spawn_temperature: Some(1200.0),
            heat_conductivity: 0.8,
            ..Default::default()
        },
        MaterialDef {
            id: MaterialId::OIL,
            name: "oil".to_string(),
            category: MaterialCategory::Liquid,
            color: [50, 40, 30, 255],
            density: 0.8,
            hardness: Some(0.5),
            viscosity: 0.3,
            flow_rate: 2,
            flammable: true,
            ignition_temp: Some(200.0),
            burns_to: Some(MaterialId::SMOKE),
            burn_rate: 0.05,
            ..Default::default()
        },
        MaterialDef {
            id: MaterialId::ACID,
            name: "acid".to_string(),
            category: MaterialCategory::Liquid,
            color: [0, 255, 0, 200],
            density: 1.1,
            hardness: Some(0.5),
            viscosity: 0.2,
            flow_rate: 2,
            ..Default::default()
        },
        MaterialDef {
            id: MaterialId::ICE,
            name: "ice".to_string(),
            category: MaterialCategory::Solid,
            color: [200, 230, 255, 200],
            density: 0.9,
            hardness: Some(2.0),
            melting_point: Some(0.0),
            melts_to: Some(MaterialId::WATER),
            ..Default::default()
        },
        MaterialDef {
            id: MaterialId::GLASS,
            name: "glass".to_string(),
            category: MaterialCategory::Solid,
            color: [200, 220, 255, 150],
            density: 2.5,
            hardness: Some(3.0),
            restitution: 0.05,
            melting_point: Some(1400.0),
            melts_to: Some(MaterialId::LAVA),
            ..Default::default()
        },
        MaterialDef {
            id: MaterialId::METAL,
            name: "metal".to_string(),
            category: MaterialCategory::Solid,
            color: [180, 180, 190, 255],
            density: 7.8,
            hardness: Some(7.0),
            melting_point: Some(1500.0),
            melts_to: Some(MaterialId::LAVA),
            heat_conductivity: 0.9,
            electrical_conductivity: 1.0,
            ..Default::default()
        },
        MaterialDef {
            id: MaterialId::BEDROCK,
            name: "bedrock".to_string(),
            category: MaterialCategory::Solid,
            color: [40, 40, 50, 255],
            density: 100.0,
            hardness: None,
            heat_conductivity: 0.1,
            ..Default::default()
        },
        MaterialDef {
            id: MaterialId::DIRT,
            name: "dirt".to_string(),
            category: MaterialCategory::Powder,
            color: [101, 67, 33, 255],
            density: 1.3,
            hardness: Some(1.0),
            friction: 0.4,
            heat_conductivity: 0.3,
            ..Default::default()
        },
        MaterialDef {
            id: MaterialId::ASH,
            name: "ash".to_string(),
            category: MaterialCategory::Powder,
            color: [128, 128, 128, 200],
            density: 0.5,
            hardness: Some(0.5),
            friction: 0.1,
            ..Default::default()
        },
        MaterialDef {
            id: MaterialId::GUNPOWDER,
            name: "gunpowder".to_string(),
            category: MaterialCategory::Powder,
            color: [64, 64, 64, 255],
            density: 1.7,
            hardness: Some(1.0),
            friction: 0.2,
            flammable: true,
            ignition_temp: Some(150.0),
            burns_to: Some(MaterialId::SMOKE),
            burn_rate: 0.9,
            ..Default::default()
        },
        MaterialDef {
            id: MaterialId::SALT,
            name: "salt".to_string(),
            category: MaterialCategory::Powder,
            color: [240, 240, 240, 255],
            density: 2.1,
            hardness: Some(1.0),
            friction: 0.3,
            melting_point: Some(800.0),
            ..Default::default()
        },
        MaterialDef {
            id: MaterialId::BRINE,
            name: "brine".to_string(),
            category: MaterialCategory::Liquid,
            color: [90, 170, 210, 210],
            density: 1.2,
            hardness: Some(0.5),
            viscosity: 0.15,
            flow_rate: 3,
            boiling_point: Some(108.0),
            boils_to: Some(MaterialId::STEAM),
            freezing_point: Some(-20.0),
            freezes_to: Some(MaterialId::ICE),
            heat_conductivity: 0.6,
            electrical_conductivity: 0.8,
            ..Default::default()
        },
        MaterialDef {
            id: MaterialId::RUST,
            name: "rust".to_string(),
            category: MaterialCategory::Powder,
            color: [150, 70, 30, 255],
            density: 5.2,
            hardness: Some(1.5),
            friction: 0.6,
            ..Default::default()
        },
        MaterialDef {
            id: MaterialId::HYDROGEN,
            name: "hydrogen".to_string(),
            category: MaterialCategory::Gas,
            color: [220, 220, 255, 60],
            density: 0.00009,
            hardness: None,
            flammable: true,
            ignition_temp: Some(500.0),
            burns_to: Some(MaterialId::STEAM),
            burn_rate: 0.5,
            ..Default::default()
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_registered() {
        let materials = Materials::with_defaults();
        assert_eq!(materials.get(MaterialId::WATER).unwrap().name, "water");
        assert_eq!(
            materials.by_name("lava").unwrap().category,
            MaterialCategory::Liquid
        );
        assert!(materials.get(MaterialId::EMPTY).unwrap().is_empty());
    }

    #[test]
    fn test_lookup_miss_returns_none() {
        let materials = Materials::with_defaults();
        assert!(materials.get(9999).is_none());
        assert!(materials.by_name("unobtainium").is_none());
        assert_eq!(materials.get_color(9999), [0, 0, 0, 0]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut materials = Materials::with_defaults();
        let result = materials.register(MaterialDef {
            id: MaterialId::SAND,
            name: "other_sand".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(CatalogError::DuplicateMaterial(_))));
        // Original definition untouched
        assert_eq!(materials.get(MaterialId::SAND).unwrap().name, "sand");
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut materials = Materials::with_defaults();
        let result = materials.register(MaterialDef {
            id: 200,
            name: "water".to_string(),
            ..Default::default()
        });
        assert!(result.is_err());
        assert!(materials.get(200).is_none());
    }

    #[test]
    fn test_sparse_ids() {
        let mut materials = Materials::new();
        materials
            .register(MaterialDef {
                id: 40,
                name: "mercury".to_string(),
                category: MaterialCategory::Liquid,
                density: 13.5,
                ..Default::default()
            })
            .unwrap();
        assert!(materials.get(39).is_none());
        assert_eq!(materials.get(40).unwrap().density, 13.5);
        assert_eq!(materials.len(), 2);
    }

    #[test]
    fn test_new_registry_holds_only_empty() {
        let mut materials = Materials::new();
        assert_eq!(materials.len(), 1);
        assert_eq!(materials.by_name("empty").unwrap().id, MaterialId::EMPTY);
        let result = materials.register(MaterialDef {
            id: MaterialId::EMPTY,
            name: "void".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(CatalogError::DuplicateMaterial(_))));
    }

    #[test]
    fn test_default_state_from_category() {
        assert_eq!(MaterialCategory::Powder.default_state(), PhysicalState::Solid);
        assert_eq!(MaterialCategory::Liquid.default_state(), PhysicalState::Liquid);
        assert_eq!(MaterialCategory::Gas.default_state(), PhysicalState::Gas);
    }
}
