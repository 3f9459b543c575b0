//! Procedural zone terrain

use colony_logic::types::{Pos, ZoneId, ZONE_SIZE};
use colony_logic::world::{Terrain, TerrainGrid};
use rand::Rng;

/// Tiles left plain around each kept position.
const CLEARANCE: u8 = 2;

/// Scatters wall clumps and swamp patches, leaving the kept positions and
/// the zone border open.
pub fn random_terrain(
    rng: &mut impl Rng,
    zone: ZoneId,
    wall_density: f32,
    swamp_density: f32,
    keep: &[Pos],
) -> TerrainGrid {
    let mut grid = TerrainGrid::open();
    for y in 1..ZONE_SIZE - 1 {
        for x in 1..ZONE_SIZE - 1 {
            let roll: f32 = rng.gen();
            let terrain = if roll < wall_density {
                Terrain::Wall
            } else if roll < wall_density + swamp_density {
                Terrain::Swamp
            } else {
                continue;
            };
            grid.set(x, y, terrain);
            // Walls and swamps come in clumps.
            if rng.gen_bool(0.5) && x + 1 < ZONE_SIZE - 1 {
                grid.set(x + 1, y, terrain);
            }
        }
    }
    for pos in keep.iter().filter(|p| p.zone == zone) {
        clear_around(&mut grid, pos);
    }
    grid
}

fn clear_around(grid: &mut TerrainGrid, pos: &Pos) {
    let lo = |v: u8| v.saturating_sub(CLEARANCE);
    let hi = |v: u8| (v + CLEARANCE).min(ZONE_SIZE - 1);
    for y in lo(pos.y)..=hi(pos.y) {
        for x in lo(pos.x)..=hi(pos.x) {
            grid.set(x, y, Terrain::Plain);
        }
    }
}

/// A tile at least `margin` from every edge.
pub fn interior_tile(rng: &mut impl Rng, zone: ZoneId, margin: u8) -> Pos {
    Pos::new(
        zone,
        rng.gen_range(margin..ZONE_SIZE - margin),
        rng.gen_range(margin..ZONE_SIZE - margin),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_kept_tiles_and_border_stay_open() {
        let zone = ZoneId::new(0, 0);
        let keep = [Pos::new(zone, 10, 10), Pos::new(zone, 40, 5)];
        let mut rng = StdRng::seed_from_u64(7);
        let grid = random_terrain(&mut rng, zone, 0.3, 0.2, &keep);
        for p in &keep {
            for n in p.neighbors() {
                assert!(grid.at(&n).is_passable());
            }
        }
        for i in 0..ZONE_SIZE {
            assert!(grid.get(i, 0).is_passable());
            assert!(grid.get(0, i).is_passable());
        }
        assert!(grid.count(Terrain::Wall) > 0);
    }

    #[test]
    fn test_same_seed_same_terrain() {
        let zone = ZoneId::new(2, 1);
        let a = random_terrain(&mut StdRng::seed_from_u64(3), zone, 0.1, 0.1, &[]);
        let b = random_terrain(&mut StdRng::seed_from_u64(3), zone, 0.1, 0.1, &[]);
        assert_eq!(a, b);
    }
}
