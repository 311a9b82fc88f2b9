//! State change system
//!
//! Handles phase transitions based on temperature:
//! - Melting (solid → liquid)
//! - Boiling (liquid → gas)
//! - Freezing (liquid → solid)
//! - Condensing (gas → liquid)
//!
//! When the material names a target (`melts_to`, ...) the cell becomes that
//! material. Otherwise only its physical state changes, and it returns to
//! the material's default state once the temperature falls back.

use granule_simulation::{Cell, MaterialCatalog, MaterialDef, PhysicalState};

/// System for checking state changes
pub struct StateChangeSystem;

impl StateChangeSystem {
    /// The cell after any transition its temperature calls for, or `None`
    /// when it stays as it is
    pub fn check_state_change(
        cell: &Cell,
        material: &MaterialDef,
        catalog: &MaterialCatalog,
    ) -> Option<Cell> {
        let t = cell.temperature;
        let default = material.default_state();

        if cell.state != default {
            return Self::reverts(material, cell.state, t).then(|| Cell {
                state: default,
                ..*cell
            });
        }

        let above = |point: Option<f32>| point.is_some_and(|p| t > p);
        let below = |point: Option<f32>| point.is_some_and(|p| t < p);

        let (target, state) = match cell.state {
            PhysicalState::Solid if above(material.melting_point) => {
                (material.melts_to, PhysicalState::Liquid)
            }
            PhysicalState::Liquid if material.boiling_point.is_some_and(|b| t >= b) => {
                (material.boils_to, PhysicalState::Gas)
            }
            PhysicalState::Liquid if below(material.freezing_point) => {
                (material.freezes_to, PhysicalState::Solid)
            }
            PhysicalState::Gas if below(material.freezing_point) => {
                (material.freezes_to, PhysicalState::Liquid)
            }
            _ => return None,
        };

        match target {
            Some(id) => catalog
                .material(id)
                .map(|def| Cell::from_material(def).with_temperature(t)),
            None => Some(Cell { state, ..*cell }),
        }
    }

    /// Whether a cell held away from its default state should return to it
    fn reverts(material: &MaterialDef, state: PhysicalState, t: f32) -> bool {
        use PhysicalState::*;
        match (material.default_state(), state) {
            (Solid, Liquid | Gas) => material.melting_point.is_none_or(|m| t <= m),
            (Liquid, Gas) => material.boiling_point.is_none_or(|b| t < b),
            (Liquid | Gas, Solid) | (Gas, Liquid) => {
                material.freezing_point.is_none_or(|f| t >= f)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use granule_simulation::{MaterialCategory, MaterialId};

    fn cell_at(catalog: &MaterialCatalog, id: u16, temperature: f32) -> Cell {
        Cell::from_material(catalog.material(id).unwrap()).with_temperature(temperature)
    }

    fn check(catalog: &MaterialCatalog, cell: &Cell) -> Option<Cell> {
        let def = catalog.material(cell.material_id).unwrap();
        StateChangeSystem::check_state_change(cell, def, catalog)
    }

    #[test]
    fn test_melting() {
        let catalog = MaterialCatalog::with_defaults();

        // Ice at the melting point stays ice
        assert!(check(&catalog, &cell_at(&catalog, MaterialId::ICE, 0.0)).is_none());

        let melted = check(&catalog, &cell_at(&catalog, MaterialId::ICE, 5.0)).unwrap();
        assert_eq!(melted.material_id, MaterialId::WATER);
        assert_eq!(melted.state, PhysicalState::Liquid);
        assert_eq!(melted.temperature, 5.0);
    }

    #[test]
    fn test_boiling() {
        let catalog = MaterialCatalog::with_defaults();
        assert!(check(&catalog, &cell_at(&catalog, MaterialId::WATER, 50.0)).is_none());

        let steam = check(&catalog, &cell_at(&catalog, MaterialId::WATER, 100.0)).unwrap();
        assert_eq!(steam.material_id, MaterialId::STEAM);
        assert_eq!(steam.state, PhysicalState::Gas);
        // Keeps the temperature it boiled at, not steam's spawn temperature
        assert_eq!(steam.temperature, 100.0);
    }

    #[test]
    fn test_freezing() {
        let catalog = MaterialCatalog::with_defaults();
        let ice = check(&catalog, &cell_at(&catalog, MaterialId::WATER, -3.0)).unwrap();
        assert_eq!(ice.material_id, MaterialId::ICE);
        assert_eq!(ice.state, PhysicalState::Solid);
    }

    #[test]
    fn test_condensing() {
        let catalog = MaterialCatalog::with_defaults();
        assert!(check(&catalog, &cell_at(&catalog, MaterialId::STEAM, 96.0)).is_none());
        let water = check(&catalog, &cell_at(&catalog, MaterialId::STEAM, 90.0)).unwrap();
        assert_eq!(water.material_id, MaterialId::WATER);
    }

    #[test]
    fn test_lava_cools_to_stone() {
        let catalog = MaterialCatalog::with_defaults();
        assert!(check(&catalog, &cell_at(&catalog, MaterialId::LAVA, 900.0)).is_none());
        let stone = check(&catalog, &cell_at(&catalog, MaterialId::LAVA, 600.0)).unwrap();
        assert_eq!(stone.material_id, MaterialId::STONE);
    }

    #[test]
    fn test_state_only_transition_and_reversion() {
        let mut catalog = MaterialCatalog::with_defaults();
        catalog
            .register_material(MaterialDef {
                id: 120,
                name: "wax".to_string(),
                category: MaterialCategory::Solid,
                melting_point: Some(60.0),
                ..Default::default()
            })
            .unwrap();

        let molten = check(&catalog, &cell_at(&catalog, 120, 80.0)).unwrap();
        assert_eq!(molten.material_id, 120);
        assert_eq!(molten.state, PhysicalState::Liquid);

        // Still hot: stays liquid
        assert!(check(&catalog, &molten).is_none());

        let cooled = molten.with_temperature(40.0);
        let solid = check(&catalog, &cooled).unwrap();
        assert_eq!(solid.material_id, 120);
        assert_eq!(solid.state, PhysicalState::Solid);
        assert_eq!(solid.temperature, 40.0);
    }
}
