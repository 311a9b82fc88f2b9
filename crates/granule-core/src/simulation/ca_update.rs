//! Cellular automata movement - falling, flowing and rising
//!
//! Each cell picks a [`FlowBehavior`] from its material category and current
//! physical state, and the behavior indexes a table of movement functions.

use glam::IVec2;
use granule_simulation::{
    Cell, MaterialCatalog, MaterialCategory, MaterialDef, PhysicalState, cell_flags,
};

use super::grid::{CellGrid, ChunkGrid, Intent};
use crate::world::{SimStats, WorldRng};

/// How a cell moves this tick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowBehavior {
    Static = 0,
    Powder = 1,
    Liquid = 2,
    Gas = 3,
}

impl FlowBehavior {
    /// Physical state wins over category, so molten stone flows and
    /// boiled water rises
    pub fn select(category: MaterialCategory, state: PhysicalState) -> Self {
        match (state, category) {
            (PhysicalState::Gas, _) => FlowBehavior::Gas,
            (PhysicalState::Liquid, _) => FlowBehavior::Liquid,
            (PhysicalState::Solid, MaterialCategory::Powder) => FlowBehavior::Powder,
            (PhysicalState::Solid, _) => FlowBehavior::Static,
        }
    }
}

/// Everything a movement function may touch
pub(crate) struct FlowCtx<'g, 'a> {
    pub grid: &'g mut ChunkGrid<'a>,
    pub catalog: &'g MaterialCatalog,
    pub rng: &'g mut dyn WorldRng,
    pub stats: &'g mut dyn SimStats,
    pub pressure_threshold: f32,
}

/// Returns where the cell ended up, or `None` if it was handed to the
/// boundary pass
type FlowFn = fn(&mut FlowCtx<'_, '_>, IVec2, Cell, &MaterialDef) -> Option<IVec2>;

const FLOW_TABLE: [FlowFn; 4] = [flow_static, flow_powder, flow_liquid, flow_gas];

pub(crate) fn update_movement(
    ctx: &mut FlowCtx<'_, '_>,
    pos: IVec2,
    cell: Cell,
    def: &MaterialDef,
) -> Option<IVec2> {
    let behavior = FlowBehavior::select(def.category, cell.state);
    FLOW_TABLE[behavior as usize](ctx, pos, cell, def)
}

enum Step {
    Moved(IVec2),
    Deferred,
    Blocked,
}

/// Try to swap `from` into `to` if the target accepts the moving cell
fn try_move(
    ctx: &mut FlowCtx<'_, '_>,
    from: IVec2,
    to: IVec2,
    moving: &Cell,
    can_enter: impl Fn(&Cell, &MaterialDef) -> bool,
) -> Step {
    let Some(target) = ctx.grid.cell(to) else {
        return Step::Blocked;
    };
    let Some(target_def) = ctx.catalog.material(target.material_id) else {
        return Step::Blocked;
    };
    if !can_enter(&target, target_def) {
        return Step::Blocked;
    }

    if ctx.grid.is_writable(to) {
        ctx.grid.swap_local(from, to);
        if let Some(cell) = ctx.grid.cell_mut(to) {
            cell.set_flag(cell_flags::UPDATED);
        }
        ctx.stats.record_cell_moved();
        Step::Moved(to)
    } else {
        ctx.grid.defer(Intent::Move {
            from,
            to,
            material: moving.material_id,
            expected: target,
        });
        if let Some(cell) = ctx.grid.cell_mut(from) {
            cell.set_flag(cell_flags::UPDATED);
        }
        Step::Deferred
    }
}

fn is_open(target: &Cell, _def: &MaterialDef) -> bool {
    target.is_empty() || target.state == PhysicalState::Gas
}

fn random_side(rng: &mut dyn WorldRng) -> i32 {
    if rng.gen_bool() { -1 } else { 1 }
}

fn flow_static(
    _ctx: &mut FlowCtx<'_, '_>,
    pos: IVec2,
    _cell: Cell,
    _def: &MaterialDef,
) -> Option<IVec2> {
    Some(pos)
}

/// Falls into empty, gas or lighter liquid; otherwise slides diagonally,
/// bottom-left first
fn flow_powder(
    ctx: &mut FlowCtx<'_, '_>,
    pos: IVec2,
    cell: Cell,
    def: &MaterialDef,
) -> Option<IVec2> {
    let density = def.density;
    let falls_into = |target: &Cell, target_def: &MaterialDef| {
        is_open(target, target_def)
            || (target.state == PhysicalState::Liquid && target_def.density < density)
    };

    match try_move(ctx, pos, pos + IVec2::Y, &cell, falls_into) {
        Step::Moved(to) => return Some(to),
        Step::Deferred => return None,
        Step::Blocked => {}
    }

    for dx in [-1, 1] {
        match try_move(ctx, pos, pos + IVec2::new(dx, 1), &cell, is_open) {
            Step::Moved(to) => return Some(to),
            Step::Deferred => return None,
            Step::Blocked => {}
        }
    }
    Some(pos)
}

/// Cells a liquid may spread sideways per tick: `flow_rate` thinned by
/// viscosity, never less than one
fn spread_reach(def: &MaterialDef) -> u8 {
    let scaled = f32::from(def.flow_rate) * (1.0 - def.viscosity.clamp(0.0, 1.0));
    (scaled.ceil() as u8).max(1)
}

/// Falls, sinks below lighter liquids, spreads sideways up to its reach,
/// and when walled in on both sides lets hydrostatic load push it under a
/// lighter neighbour
fn flow_liquid(
    ctx: &mut FlowCtx<'_, '_>,
    pos: IVec2,
    cell: Cell,
    def: &MaterialDef,
) -> Option<IVec2> {
    let density = def.density;
    let material = cell.material_id;
    let sinks_into = |target: &Cell, target_def: &MaterialDef| {
        is_open(target, target_def)
            || (target.state == PhysicalState::Liquid
                && target.material_id != material
                && target_def.density < density)
    };

    match try_move(ctx, pos, pos + IVec2::Y, &cell, sinks_into) {
        Step::Moved(to) => return Some(to),
        Step::Deferred => return None,
        Step::Blocked => {}
    }

    let dir = random_side(ctx.rng);

    for dx in [dir, -dir] {
        match try_move(ctx, pos, pos + IVec2::new(dx, 1), &cell, is_open) {
            Step::Moved(to) => return Some(to),
            Step::Deferred => return None,
            Step::Blocked => {}
        }
    }

    for dx in [dir, -dir] {
        let mut current = pos;
        for _ in 0..spread_reach(def) {
            match try_move(ctx, current, current + IVec2::new(dx, 0), &cell, is_open) {
                Step::Moved(to) => current = to,
                Step::Deferred => return None,
                Step::Blocked => break,
            }
        }
        if current != pos {
            return Some(current);
        }
    }

    // Both sides blocked: pressure-driven displacement
    let threshold = ctx.pressure_threshold;
    for dx in [dir, -dir] {
        let side = pos + IVec2::new(dx, 0);
        let Some(neighbor) = ctx.grid.cell(side) else {
            continue;
        };
        let pushes = |target: &Cell, target_def: &MaterialDef| {
            target.state == PhysicalState::Liquid
                && target.material_id != material
                && target_def.density < density
                && cell.pressure - neighbor.pressure > threshold
        };
        match try_move(ctx, pos, side, &cell, pushes) {
            Step::Moved(to) => return Some(to),
            Step::Deferred => return None,
            Step::Blocked => {}
        }
    }
    Some(pos)
}

/// Rises into empty cells or through denser gases, then drifts diagonally
/// up and sideways
fn flow_gas(ctx: &mut FlowCtx<'_, '_>, pos: IVec2, cell: Cell, def: &MaterialDef) -> Option<IVec2> {
    let density = def.density;
    let material = cell.material_id;
    let rises_into = |target: &Cell, target_def: &MaterialDef| {
        target.is_empty()
            || (target.state == PhysicalState::Gas
                && target.material_id != material
                && target_def.density > density)
    };
    let free = |target: &Cell, _: &MaterialDef| target.is_empty();

    match try_move(ctx, pos, pos + IVec2::NEG_Y, &cell, rises_into) {
        Step::Moved(to) => return Some(to),
        Step::Deferred => return None,
        Step::Blocked => {}
    }

    let dir = random_side(ctx.rng);
    for offset in [
        IVec2::new(dir, -1),
        IVec2::new(-dir, -1),
        IVec2::new(dir, 0),
        IVec2::new(-dir, 0),
    ] {
        match try_move(ctx, pos, pos + offset, &cell, free) {
            Step::Moved(to) => return Some(to),
            Step::Deferred => return None,
            Step::Blocked => {}
        }
    }
    Some(pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::grid::Halo;
    use crate::world::{Chunk, CountingStats};
    use granule_simulation::MaterialId;

    /// Test RNG that returns deterministic values
    struct TestRng {
        bool_value: bool,
    }

    impl WorldRng for TestRng {
        fn gen_bool(&mut self) -> bool {
            self.bool_value
        }

        fn gen_f32(&mut self) -> f32 {
            0.5
        }
    }

    struct Fixture {
        catalog: MaterialCatalog,
        chunk: Chunk,
        halo: Halo,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                catalog: MaterialCatalog::with_defaults(),
                chunk: Chunk::new(IVec2::ZERO),
                halo: Halo::unloaded(IVec2::ZERO),
            }
        }

        fn place(&mut self, x: usize, y: usize, material: u16) {
            let cell = Cell::from_material(self.catalog.material(material).unwrap());
            self.chunk.set_cell(x, y, cell);
        }

        /// Run movement for the cell at (x, y); returns its new position and intents
        fn step(&mut self, x: usize, y: usize, left_first: bool) -> (Option<IVec2>, Vec<Intent>) {
            let cell = self.chunk.get_cell(x, y);
            let def = self.catalog.material(cell.material_id).unwrap().clone();
            let mut rng = TestRng {
                bool_value: left_first,
            };
            let mut stats = CountingStats::default();
            let mut grid = ChunkGrid::new(&mut self.chunk, &self.halo);
            let mut ctx = FlowCtx {
                grid: &mut grid,
                catalog: &self.catalog,
                rng: &mut rng,
                stats: &mut stats,
                pressure_threshold: 0.5,
            };
            let result = update_movement(&mut ctx, IVec2::new(x as i32, y as i32), cell, &def);
            (result, grid.intents)
        }
    }

    #[test]
    fn test_select_behavior() {
        use MaterialCategory::*;
        use PhysicalState as S;
        assert_eq!(FlowBehavior::select(Powder, S::Solid), FlowBehavior::Powder);
        assert_eq!(FlowBehavior::select(Solid, S::Solid), FlowBehavior::Static);
        assert_eq!(FlowBehavior::select(Solid, S::Liquid), FlowBehavior::Liquid);
        assert_eq!(FlowBehavior::select(Liquid, S::Gas), FlowBehavior::Gas);
    }

    #[test]
    fn test_powder_falls_down() {
        let mut f = Fixture::new();
        f.place(32, 10, MaterialId::SAND);

        let (pos, _) = f.step(32, 10, true);
        assert_eq!(pos, Some(IVec2::new(32, 11)));
        assert!(f.chunk.get_cell(32, 10).is_empty());
        assert_eq!(f.chunk.get_material(32, 11), MaterialId::SAND);
    }

    #[test]
    fn test_powder_slides_bottom_right_when_left_blocked() {
        let mut f = Fixture::new();
        f.place(32, 10, MaterialId::SAND);
        f.place(32, 11, MaterialId::STONE);
        f.place(31, 11, MaterialId::STONE);

        let (pos, _) = f.step(32, 10, true);
        assert_eq!(pos, Some(IVec2::new(33, 11)));
        assert_eq!(f.chunk.get_material(33, 11), MaterialId::SAND);
    }

    #[test]
    fn test_powder_stops_on_solid() {
        let mut f = Fixture::new();
        f.place(32, 10, MaterialId::SAND);
        for x in 31..=33 {
            f.place(x, 11, MaterialId::STONE);
        }
        let (pos, _) = f.step(32, 10, true);
        assert_eq!(pos, Some(IVec2::new(32, 10)));
    }

    #[test]
    fn test_powder_sinks_in_water() {
        let mut f = Fixture::new();
        f.place(5, 5, MaterialId::SAND);
        f.place(5, 6, MaterialId::WATER);
        f.step(5, 5, true);
        assert_eq!(f.chunk.get_material(5, 6), MaterialId::SAND);
        assert_eq!(f.chunk.get_material(5, 5), MaterialId::WATER);
    }

    #[test]
    fn test_liquid_sinks_below_lighter_liquid() {
        let mut f = Fixture::new();
        f.place(5, 5, MaterialId::WATER);
        f.place(5, 6, MaterialId::OIL);
        f.step(5, 5, true);
        assert_eq!(f.chunk.get_material(5, 6), MaterialId::WATER);
        assert_eq!(f.chunk.get_material(5, 5), MaterialId::OIL);
    }

    #[test]
    fn test_liquid_spreads_sideways() {
        let mut f = Fixture::new();
        f.place(10, 10, MaterialId::WATER);
        for x in 8..=12 {
            f.place(x, 11, MaterialId::STONE);
        }
        let (pos, _) = f.step(10, 10, false);
        let pos = pos.unwrap();
        assert_eq!(pos.y, 10);
        assert!(pos.x > 10);
        assert_eq!(f.chunk.get_material(pos.x as usize, 10), MaterialId::WATER);
    }

    #[test]
    fn test_viscosity_shortens_spread() {
        let mut f = Fixture::new();
        f.catalog
            .register_material(MaterialDef {
                id: 150,
                name: "syrup".to_string(),
                category: MaterialCategory::Liquid,
                density: 1.4,
                viscosity: 0.75,
                flow_rate: 4,
                ..Default::default()
            })
            .unwrap();
        f.place(10, 10, 150);
        for x in 5..=15 {
            f.place(x, 11, MaterialId::STONE);
        }

        let (pos, _) = f.step(10, 10, false);
        assert_eq!(pos, Some(IVec2::new(11, 10)));
        assert_eq!(f.chunk.get_material(11, 10), 150);
    }

    #[test]
    fn test_spread_reach() {
        let catalog = MaterialCatalog::with_defaults();
        let reach = |id| spread_reach(catalog.material(id).unwrap());
        assert_eq!(reach(MaterialId::WATER), 3);
        assert_eq!(reach(MaterialId::LAVA), 1);
        let stiff = MaterialDef {
            flow_rate: 5,
            viscosity: 1.0,
            ..Default::default()
        };
        assert_eq!(spread_reach(&stiff), 1);
    }

    #[test]
    fn test_gas_rises() {
        let mut f = Fixture::new();
        f.place(20, 20, MaterialId::STEAM);
        let (pos, _) = f.step(20, 20, true);
        assert_eq!(pos, Some(IVec2::new(20, 19)));
    }

    #[test]
    fn test_gas_rises_through_denser_gas() {
        let mut f = Fixture::new();
        f.place(20, 20, MaterialId::HYDROGEN);
        f.place(20, 19, MaterialId::SMOKE);
        f.step(20, 20, true);
        assert_eq!(f.chunk.get_material(20, 19), MaterialId::HYDROGEN);
        assert_eq!(f.chunk.get_material(20, 20), MaterialId::SMOKE);
    }

    #[test]
    fn test_move_into_halo_is_deferred() {
        let mut f = Fixture::new();
        f.halo.set(IVec2::new(7, 64), Some(Cell::EMPTY));
        f.place(7, 63, MaterialId::SAND);

        let (pos, intents) = f.step(7, 63, true);
        assert_eq!(pos, None);
        assert_eq!(intents.len(), 1);
        assert!(matches!(
            intents[0],
            Intent::Move { to, material, .. } if to == IVec2::new(7, 64) && material == MaterialId::SAND
        ));
        // Stays put until the boundary pass
        assert_eq!(f.chunk.get_material(7, 63), MaterialId::SAND);
        assert!(f.chunk.get_cell(7, 63).has_flag(cell_flags::UPDATED));
    }

    #[test]
    fn test_unloaded_neighbor_blocks() {
        let mut f = Fixture::new();
        f.place(7, 63, MaterialId::SAND);
        let (pos, intents) = f.step(7, 63, true);
        assert_eq!(pos, Some(IVec2::new(7, 63)));
        assert!(intents.is_empty());
    }
}
