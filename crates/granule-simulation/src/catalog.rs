//! Material catalog - the read-only registry shared by every simulation worker

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::reactions::default_reactions;
use crate::{MaterialDef, Materials, ReactionRegistry, ReactionRule};

/// Errors raised while building a catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("duplicate material: {0}")]
    DuplicateMaterial(String),

    #[error("duplicate reaction rule: {0}")]
    DuplicateReaction(String),

    #[error("{owner} references unknown material {material}")]
    UnknownMaterial { owner: String, material: u16 },

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

/// On-disk catalog layout (RON)
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogFile {
    /// Start from the built-in materials and reactions
    pub include_defaults: bool,
    pub materials: Vec<MaterialDef>,
    pub reactions: Vec<ReactionRule>,
}

/// Materials plus the pairwise reaction rules between them.
///
/// Built once at startup, then wrapped in an `Arc` and handed to the store and
/// the step engine. Nothing mutates it afterwards, so workers read it without
/// locking.
#[derive(Debug)]
pub struct MaterialCatalog {
    materials: Materials,
    reactions: ReactionRegistry,
}

impl Default for MaterialCatalog {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl MaterialCatalog {
    /// Catalog containing only the `empty` material
    pub fn new() -> Self {
        Self {
            materials: Materials::new(),
            reactions: ReactionRegistry::new(),
        }
    }

    /// Catalog with the built-in materials and reactions
    pub fn with_defaults() -> Self {
        let mut catalog = Self {
            materials: Materials::with_defaults(),
            reactions: ReactionRegistry::new(),
        };
        for rule in default_reactions() {
            if let Err(e) = catalog.register_reaction(rule) {
                log::error!("Built-in reaction rejected: {}", e);
            }
        }
        catalog
    }

    /// Parse a RON catalog document
    pub fn from_ron(source: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = ron::from_str(source)?;
        let mut catalog = if file.include_defaults {
            Self::with_defaults()
        } else {
            Self::new()
        };

        for material in file.materials {
            catalog.register_material(material)?;
        }
        for rule in file.reactions {
            catalog.register_reaction(rule)?;
        }
        catalog.validate()?;

        log::info!(
            "Loaded catalog: {} materials, {} reactions",
            catalog.materials.len(),
            catalog.reactions.len()
        );
        Ok(catalog)
    }

    pub fn register_material(&mut self, material: MaterialDef) -> Result<(), CatalogError> {
        self.materials.register(material)
    }

    /// Register a reaction rule; every material it names must already exist
    pub fn register_reaction(&mut self, rule: ReactionRule) -> Result<(), CatalogError> {
        if let Some(material) = rule
            .referenced_ids()
            .into_iter()
            .find(|&id| !self.materials.contains(id))
        {
            return Err(CatalogError::UnknownMaterial {
                owner: rule.name,
                material,
            });
        }
        self.reactions.register(rule)
    }

    /// Check that every state transition target is a registered material
    pub fn validate(&self) -> Result<(), CatalogError> {
        for material in self.materials.iter() {
            if let Some(target) = material
                .referenced_ids()
                .find(|&id| !self.materials.contains(id))
            {
                return Err(CatalogError::UnknownMaterial {
                    owner: material.name.clone(),
                    material: target,
                });
            }
        }
        Ok(())
    }

    pub fn material(&self, id: u16) -> Option<&MaterialDef> {
        self.materials.get(id)
    }

    pub fn material_by_name(&self, name: &str) -> Option<&MaterialDef> {
        self.materials.by_name(name)
    }

    /// Rule for a material pair, trying both orderings
    pub fn reaction(&self, mat_a: u16, mat_b: u16) -> Option<&ReactionRule> {
        self.reactions.find(mat_a, mat_b)
    }

    /// Every rule referencing the material
    pub fn reactions_for(&self, material: u16) -> Vec<&ReactionRule> {
        self.reactions.rules_for(material)
    }

    pub fn materials(&self) -> &Materials {
        &self.materials
    }

    pub fn reactions(&self) -> &ReactionRegistry {
        &self.reactions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MaterialCategory, MaterialId, ReactionOutput};

    #[test]
    fn test_defaults_are_consistent() {
        let catalog = MaterialCatalog::with_defaults();
        catalog.validate().unwrap();
        assert!(catalog.reactions().len() >= 10);
        assert!(catalog.reaction(MaterialId::LAVA, MaterialId::WATER).is_some());
    }

    #[test]
    fn test_reaction_with_unknown_material_rejected() {
        let mut catalog = MaterialCatalog::with_defaults();
        let result = catalog.register_reaction(ReactionRule {
            name: "bogus".to_string(),
            input_a: MaterialId::WATER,
            input_b: 999,
            ..Default::default()
        });
        assert!(matches!(
            result,
            Err(CatalogError::UnknownMaterial { material: 999, .. })
        ));
        assert!(catalog.reactions_for(999).is_empty());
    }

    #[test]
    fn test_from_ron() {
        let source = r#"(
            include_defaults: false,
            materials: [
                (id: 1, name: "mud", category: Liquid, density: 1.6, viscosity: 0.9),
                (id: 2, name: "clay", category: Powder, density: 1.8, hardness: Some(2.0)),
            ],
            reactions: [
                (
                    name: "mud_settle",
                    input_a: 1,
                    input_b: 2,
                    output: Transform(output_a: 2, output_b: 2),
                    rate: 0.5,
                    min_contact_time: 1.0,
                ),
            ],
        )"#;

        let catalog = MaterialCatalog::from_ron(source).unwrap();
        let mud = catalog.material_by_name("mud").unwrap();
        assert_eq!(mud.category, MaterialCategory::Liquid);
        assert_eq!(mud.viscosity, 0.9);

        let rule = catalog.reaction(2, 1).unwrap();
        assert_eq!(rule.name, "mud_settle");
        assert_eq!(
            rule.output,
            ReactionOutput::Transform {
                output_a: 2,
                output_b: 2
            }
        );
        // Unspecified fields fall back to defaults
        assert_eq!(rule.consumption, [1.0, 1.0]);
    }

    #[test]
    fn test_from_ron_extends_defaults() {
        let source = r#"(
            include_defaults: true,
            materials: [(id: 100, name: "slime", category: Liquid)],
        )"#;
        let catalog = MaterialCatalog::from_ron(source).unwrap();
        assert!(catalog.material(MaterialId::WATER).is_some());
        assert!(catalog.material(100).is_some());
    }

    #[test]
    fn test_from_ron_rejects_garbage() {
        let result = MaterialCatalog::from_ron("(materials: [oops");
        assert!(matches!(result, Err(CatalogError::Parse(_))));
    }

    #[test]
    fn test_from_ron_rejects_dangling_transition() {
        let source = r#"(materials: [(id: 5, name: "frost", melts_to: Some(77))])"#;
        let result = MaterialCatalog::from_ron(source);
        assert!(matches!(
            result,
            Err(CatalogError::UnknownMaterial { material: 77, .. })
        ));
    }
}
