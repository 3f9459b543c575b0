//! Terrain profile classification.
//!
//! A zone is sampled from a handful of interior points. From each point a
//! short ray is cast in the four cardinal directions and the number of
//! passable/impassable alternations along it is counted. Many alternations
//! mean corridors and pockets (labyrinthine); a high wall share with few
//! alternations means large solid blocks (obstructed).
//!
//! | Profile | Plain | Swamp | Replan every |
//! |---------|-------|-------|--------------|
//! | `Open` | 1 | 5 | 50 ticks |
//! | `HighFriction` | 1 | 3 | 20 ticks |
//! | `Obstructed` | 2 | 10 | 15 ticks |
//! | `Labyrinthine` | 2 | 10 | 5 ticks |
//! | `Mixed` | 2 | 10 | 25 ticks |
//!
//! Sample points come from an RNG seeded by the zone id, so a zone always
//! classifies the same way.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::MovementWeights;
use crate::types::{ZoneId, ZONE_SIZE};
use crate::world::{Terrain, TerrainGrid};

/// Sample points are kept this far from the zone edge.
const SAMPLE_MARGIN: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerrainProfile {
    Open,
    HighFriction,
    Obstructed,
    Labyrinthine,
    Mixed,
}

/// Default path weighting for a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileSettings {
    pub plain_cost: u8,
    pub swamp_cost: u8,
    pub replan_interval: u32,
}

impl TerrainProfile {
    pub fn settings(self) -> ProfileSettings {
        let (plain_cost, swamp_cost, replan_interval) = match self {
            TerrainProfile::Open => (1, 5, 50),
            TerrainProfile::HighFriction => (1, 3, 20),
            TerrainProfile::Obstructed => (2, 10, 15),
            TerrainProfile::Labyrinthine => (2, 10, 5),
            TerrainProfile::Mixed => (2, 10, 25),
        };
        ProfileSettings {
            plain_cost,
            swamp_cost,
            replan_interval,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerrainStats {
    pub wall_fraction: f32,
    pub swamp_fraction: f32,
    /// Average passable/impassable alternations per sampled ray.
    pub mean_transitions: f32,
}

/// Average alternations per ray over the seeded sample points.
pub fn mean_transitions(grid: &TerrainGrid, zone: ZoneId, weights: &MovementWeights) -> f32 {
    let mut rng = StdRng::seed_from_u64(zone.seed());
    let lo = SAMPLE_MARGIN;
    let hi = ZONE_SIZE - SAMPLE_MARGIN;
    let mut total = 0u32;
    let mut rays = 0u32;
    for _ in 0..weights.sample_points {
        let x = rng.gen_range(lo..hi);
        let y = rng.gen_range(lo..hi);
        for (dx, dy) in [(0i16, -1i16), (1, 0), (0, 1), (-1, 0)] {
            total += ray_transitions(grid, x, y, dx, dy, weights.ray_length);
            rays += 1;
        }
    }
    if rays == 0 {
        return 0.0;
    }
    total as f32 / rays as f32
}

fn ray_transitions(grid: &TerrainGrid, x: u8, y: u8, dx: i16, dy: i16, length: u8) -> u32 {
    let mut prev = grid.get(x, y).is_passable();
    let mut transitions = 0;
    for step in 1..=i16::from(length) {
        let nx = i16::from(x) + dx * step;
        let ny = i16::from(y) + dy * step;
        if nx < 0 || ny < 0 || nx >= i16::from(ZONE_SIZE) || ny >= i16::from(ZONE_SIZE) {
            break;
        }
        let passable = grid.get(nx as u8, ny as u8).is_passable();
        if passable != prev {
            transitions += 1;
        }
        prev = passable;
    }
    transitions
}

pub fn classify(
    grid: &TerrainGrid,
    zone: ZoneId,
    weights: &MovementWeights,
) -> (TerrainProfile, TerrainStats) {
    let stats = TerrainStats {
        wall_fraction: grid.fraction(Terrain::Wall),
        swamp_fraction: grid.fraction(Terrain::Swamp),
        mean_transitions: mean_transitions(grid, zone, weights),
    };
    let profile = if stats.mean_transitions >= weights.labyrinth_threshold {
        TerrainProfile::Labyrinthine
    } else if stats.wall_fraction >= weights.obstructed_wall_fraction {
        TerrainProfile::Obstructed
    } else if stats.swamp_fraction >= weights.friction_swamp_fraction {
        TerrainProfile::HighFriction
    } else if stats.wall_fraction < weights.open_fraction
        && stats.swamp_fraction < weights.open_fraction
    {
        TerrainProfile::Open
    } else {
        TerrainProfile::Mixed
    };
    (profile, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_with(f: impl Fn(u8, u8) -> Terrain) -> TerrainGrid {
        let mut grid = TerrainGrid::open();
        for y in 0..ZONE_SIZE {
            for x in 0..ZONE_SIZE {
                grid.set(x, y, f(x, y));
            }
        }
        grid
    }

    #[test]
    fn test_open_zone() {
        let (profile, stats) = classify(
            &TerrainGrid::open(),
            ZoneId::new(0, 0),
            &MovementWeights::default(),
        );
        assert_eq!(profile, TerrainProfile::Open);
        assert_eq!(stats.mean_transitions, 0.0);
    }

    #[test]
    fn test_striped_walls_are_labyrinthine() {
        let grid = grid_with(|x, _| {
            if x % 2 == 0 {
                Terrain::Wall
            } else {
                Terrain::Plain
            }
        });
        let (profile, stats) = classify(&grid, ZoneId::new(3, 4), &MovementWeights::default());
        assert_eq!(profile, TerrainProfile::Labyrinthine);
        // Horizontal rays flip every tile, vertical rays never do.
        assert!(stats.mean_transitions > 2.0 && stats.mean_transitions <= 5.0);
    }

    #[test]
    fn test_solid_wall_block_is_obstructed_not_labyrinthine() {
        let grid = grid_with(|_, y| if y < 20 { Terrain::Wall } else { Terrain::Plain });
        let (profile, stats) = classify(&grid, ZoneId::new(1, 0), &MovementWeights::default());
        assert!(stats.mean_transitions < 2.0);
        assert_eq!(profile, TerrainProfile::Obstructed);
    }

    #[test]
    fn test_swamp_zone_is_high_friction() {
        let grid = grid_with(|x, _| if x < 25 { Terrain::Swamp } else { Terrain::Plain });
        let (profile, _) = classify(&grid, ZoneId::new(0, 2), &MovementWeights::default());
        assert_eq!(profile, TerrainProfile::HighFriction);
    }

    #[test]
    fn test_moderate_mix() {
        let grid = grid_with(|x, y| {
            if y < 10 {
                Terrain::Wall
            } else if x < 10 {
                Terrain::Swamp
            } else {
                Terrain::Plain
            }
        });
        let (profile, _) = classify(&grid, ZoneId::new(0, 0), &MovementWeights::default());
        assert_eq!(profile, TerrainProfile::Mixed);
    }

    #[test]
    fn test_classification_is_deterministic_per_zone() {
        let grid = grid_with(|x, y| {
            if (x / 3 + y / 4) % 3 == 0 {
                Terrain::Wall
            } else {
                Terrain::Plain
            }
        });
        let w = MovementWeights::default();
        let a = mean_transitions(&grid, ZoneId::new(7, -2), &w);
        let b = mean_transitions(&grid, ZoneId::new(7, -2), &w);
        assert_eq!(a, b);
    }

    #[test]
    fn test_labyrinth_profile_replans_most_often() {
        let labyrinth = TerrainProfile::Labyrinthine.settings().replan_interval;
        for p in [
            TerrainProfile::Open,
            TerrainProfile::HighFriction,
            TerrainProfile::Obstructed,
            TerrainProfile::Mixed,
        ] {
            assert!(p.settings().replan_interval > labyrinth);
        }
        assert!(
            TerrainProfile::Open.settings().replan_interval
                > TerrainProfile::Mixed.settings().replan_interval
        );
    }
}
