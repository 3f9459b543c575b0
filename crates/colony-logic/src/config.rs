//! Controller configuration.
//!
//! All tuning constants live in [`ColonyConfig`]. Every section has a
//! `Default` and is `#[serde(default)]`, so a JSON file only needs to name
//! the values it overrides:
//!
//! ```
//! use colony_logic::config::ColonyConfig;
//!
//! let config = ColonyConfig::from_json_str(r#"{ "task_age_ceiling": 150 }"#).unwrap();
//! assert_eq!(config.task_age_ceiling, 150);
//! assert_eq!(config.max_transitions_per_tick, 2);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::ConfigError;
use crate::roles::RoleTag;
use crate::task::TaskKind;

/// Highest zone level the population table is keyed by.
pub const MAX_LEVEL: u8 = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColonyConfig {
    /// Tasks older than this many ticks are removed by cleanup.
    pub task_age_ceiling: u64,
    /// Zones unseen for this long are forgotten.
    pub zone_prune_ttl: u64,
    /// Expiry of a zone's cached terrain classification.
    pub terrain_cache_ttl: u64,
    /// How long scouting intel about a non-visible zone is trusted.
    pub intel_ttl: u64,
    /// Chained state transitions allowed per agent per tick.
    pub max_transitions_per_tick: u32,
    pub population: PopulationTable,
    pub planner: PlannerConfig,
    pub tasks: TaskLimits,
    pub movement: MovementWeights,
    pub duties: DutyCycles,
    pub expansion: ExpansionConfig,
}

impl Default for ColonyConfig {
    fn default() -> Self {
        Self {
            task_age_ceiling: 300,
            zone_prune_ttl: 20_000,
            terrain_cache_ttl: 500,
            intel_ttl: 5_000,
            max_transitions_per_tick: 2,
            population: PopulationTable::default(),
            planner: PlannerConfig::default(),
            tasks: TaskLimits::default(),
            movement: MovementWeights::default(),
            duties: DutyCycles::default(),
            expansion: ExpansionConfig::default(),
        }
    }
}

impl ColonyConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.task_age_ceiling == 0 {
            return Err(ConfigError::Invalid("task_age_ceiling must be positive".into()));
        }
        if self.terrain_cache_ttl == 0 {
            return Err(ConfigError::Invalid("terrain_cache_ttl must be positive".into()));
        }
        let fraction = self.planner.repair_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "repair_fraction {fraction} outside (0, 1]"
            )));
        }
        for (name, cycle) in self.duties.entries() {
            if cycle == 0 {
                return Err(ConfigError::Invalid(format!("duty {name} has zero cycle")));
            }
        }
        if self.movement.sample_points == 0 || self.movement.ray_length == 0 {
            return Err(ConfigError::Invalid(
                "terrain sampling needs points and rays".into(),
            ));
        }
        Ok(())
    }
}

/// Desired agent counts per role, indexed by zone level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationTable {
    pub desired: BTreeMap<RoleTag, Vec<u32>>,
}

impl Default for PopulationTable {
    fn default() -> Self {
        let mut desired = BTreeMap::new();
        //                                         level: 0  1  2  3  4  5  6  7  8
        desired.insert(RoleTag::Harvester, vec![0, 2, 2, 2, 2, 2, 2, 2, 2]);
        desired.insert(RoleTag::Hauler, vec![0, 1, 2, 2, 2, 2, 2, 2, 2]);
        desired.insert(RoleTag::Builder, vec![0, 1, 2, 2, 2, 1, 1, 1, 1]);
        desired.insert(RoleTag::Upgrader, vec![0, 1, 1, 2, 2, 2, 2, 1, 1]);
        desired.insert(RoleTag::Repairer, vec![0, 0, 1, 1, 1, 1, 1, 1, 1]);
        desired.insert(RoleTag::Defender, vec![0, 1, 1, 1, 2, 2, 2, 2, 2]);
        desired.insert(RoleTag::Healer, vec![0, 0, 0, 0, 1, 1, 1, 1, 1]);
        desired.insert(RoleTag::Claimer, vec![0, 0, 0, 1, 1, 1, 1, 1, 1]);
        desired.insert(RoleTag::Scout, vec![0, 0, 1, 1, 1, 1, 1, 1, 1]);
        Self { desired }
    }
}

impl PopulationTable {
    /// Desired count for a role at a level. Levels past the end of a row
    /// use the row's last entry.
    pub fn desired(&self, role: RoleTag, level: u8) -> u32 {
        match self.desired.get(&role) {
            Some(row) => row
                .get(level as usize)
                .or_else(|| row.last())
                .copied()
                .unwrap_or(0),
            None => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Structures below this health fraction are repair targets.
    pub repair_fraction: f32,
    /// Fortifications are repaired only while below this many hits.
    pub fortification_floor: u32,
    /// Ground resources below this amount are not worth a trip.
    pub min_pickup_amount: u32,
    /// Controller downgrade timer below which upgrading becomes urgent.
    pub controller_downgrade_alert: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            repair_fraction: 0.75,
            fortification_floor: 100_000,
            min_pickup_amount: 50,
            controller_downgrade_alert: 5_000,
        }
    }
}

/// Maximum assignees per task kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskLimits {
    pub max_assignees: BTreeMap<TaskKind, u32>,
}

impl Default for TaskLimits {
    fn default() -> Self {
        let max_assignees = TaskKind::ALL
            .iter()
            .map(|kind| {
                let limit = match kind {
                    TaskKind::Harvest => 1,
                    TaskKind::Upgrade => 4,
                    TaskKind::Build => 3,
                    TaskKind::Repair => 1,
                    TaskKind::Transfer => 1,
                    TaskKind::Withdraw => 2,
                    TaskKind::Pickup => 1,
                    TaskKind::Attack => 4,
                    TaskKind::RangedAttack => 4,
                    TaskKind::Heal => 2,
                    TaskKind::Dismantle => 2,
                    TaskKind::ClaimController => 1,
                    TaskKind::ReserveController => 1,
                };
                (*kind, limit)
            })
            .collect();
        Self { max_assignees }
    }
}

impl TaskLimits {
    pub fn limit(&self, kind: TaskKind) -> u32 {
        self.max_assignees.get(&kind).copied().unwrap_or(1).max(1)
    }
}

/// Weights and thresholds of the movement cost model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementWeights {
    /// Added on tiles occupied by own agents.
    pub ally_penalty: u8,
    /// Peak penalty next to a hostile agent; decays to zero at the radius.
    pub hostile_penalty: u8,
    pub hostile_radius: u8,
    /// Added around sources and minerals unless the goal is that node.
    pub exclusion_penalty: u8,
    pub exclusion_radius: u8,
    /// Added on tiles holding walkable construction sites.
    pub construction_penalty: u8,
    /// Added on zone edge tiles unless the path leaves the zone.
    pub border_penalty: u8,
    pub road_cost: u8,
    /// Goals within this range are "near": ally congestion counts double.
    pub near_goal_range: u32,
    /// Goals beyond this range are "far": plain tiles cost one more so
    /// roads win.
    pub far_goal_range: u32,
    pub base_ops: u32,
    pub ops_per_tile: u32,
    /// Average ray transitions at or above which a zone is labyrinthine.
    pub labyrinth_threshold: f32,
    pub obstructed_wall_fraction: f32,
    pub friction_swamp_fraction: f32,
    /// Wall and swamp fractions both below this make a zone open.
    pub open_fraction: f32,
    pub sample_points: u32,
    pub ray_length: u8,
    /// Upper bound on swamp cost scaling from agent fatigue.
    pub fatigue_swamp_cap: f32,
}

impl Default for MovementWeights {
    fn default() -> Self {
        Self {
            ally_penalty: 4,
            hostile_penalty: 60,
            hostile_radius: 3,
            exclusion_penalty: 10,
            exclusion_radius: 1,
            construction_penalty: 2,
            border_penalty: 20,
            road_cost: 1,
            near_goal_range: 5,
            far_goal_range: 25,
            base_ops: 2_000,
            ops_per_tile: 40,
            labyrinth_threshold: 2.0,
            obstructed_wall_fraction: 0.35,
            friction_swamp_fraction: 0.4,
            open_fraction: 0.1,
            sample_points: 9,
            ray_length: 10,
            fatigue_swamp_cap: 4.0,
        }
    }
}

/// Cycle lengths (in ticks) of the scheduled duties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DutyCycles {
    pub scout_sweep: u64,
    pub expansion_review: u64,
    pub zone_prune: u64,
    pub store_prune: u64,
}

impl Default for DutyCycles {
    fn default() -> Self {
        Self {
            scout_sweep: 25,
            expansion_review: 250,
            zone_prune: 1_000,
            store_prune: 500,
        }
    }
}

impl DutyCycles {
    pub fn entries(&self) -> [(&'static str, u64); 4] {
        [
            ("scout_sweep", self.scout_sweep),
            ("expansion_review", self.expansion_review),
            ("zone_prune", self.zone_prune),
            ("store_prune", self.store_prune),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    /// Farthest zone (in zones) considered for expansion.
    pub max_distance: u32,
    /// Zones we may own beyond the ones we started with.
    pub max_claimed_zones: u32,
    /// Length of the expansion target list.
    pub max_targets: usize,
    /// Minimum home level before claimers are spawned for expansion.
    pub min_home_level: u8,
    /// Reservation ticks at which a reserve task counts as done.
    pub reserve_target: u32,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            max_distance: 2,
            max_claimed_zones: 1,
            max_targets: 3,
            min_home_level: 3,
            reserve_target: 4_000,
        }
    }
}
