//! Versioned agent memory and its migrations.
//!
//! Agent memory is stored as JSON stamped with [`MEMORY_VERSION`]. Older
//! records are upgraded once, when the agent is first loaded, by chaining
//! the registered [`Migrations`] from the record's version to the current
//! one. Anything that cannot be decoded or migrated is replaced with the
//! role's default memory by the roster.
//!
//! | From | To | Change |
//! |------|----|--------|
//! | 1 | 2 | boolean `working` flag replaced by an explicit `state` tag |
//! | 2 | 3 | `zone` renamed to `home`; idle and stuck counters added |

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::MemoryError;
use crate::roles::RoleTag;
use crate::store::Record;
use crate::types::{EntityId, Pos, ZoneId};

pub const MEMORY_VERSION: u32 = 3;

/// FSM state tags. Each role uses a subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StateTag {
    Harvesting,
    Collecting,
    Delivering,
    Building,
    Repairing,
    Upgrading,
    Patrolling,
    Engaging,
    Healing,
    Claiming,
    Scouting,
    /// Any tag this build does not know.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateFamily {
    /// Acquiring: resources, or targets to act on.
    Collecting,
    /// Spending what was acquired, or acting on a target.
    Spending,
    /// Not a working state.
    Special,
}

impl StateTag {
    pub fn family(self) -> StateFamily {
        match self {
            StateTag::Harvesting | StateTag::Collecting | StateTag::Patrolling => {
                StateFamily::Collecting
            }
            StateTag::Delivering
            | StateTag::Building
            | StateTag::Repairing
            | StateTag::Upgrading
            | StateTag::Engaging
            | StateTag::Healing
            | StateTag::Claiming
            | StateTag::Scouting => StateFamily::Spending,
            StateTag::Unknown => StateFamily::Special,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMemory {
    pub role: RoleTag,
    pub state: StateTag,
    /// Colony zone the agent serves.
    pub home: ZoneId,
    /// Current non-task target (harvest node, delivery sink, patrol foe).
    #[serde(default)]
    pub target: Option<EntityId>,
    /// Zone an agent is travelling to, for remote work.
    #[serde(default)]
    pub target_zone: Option<ZoneId>,
    #[serde(default)]
    pub rally: Option<Pos>,
    #[serde(default)]
    pub idle_ticks: u32,
    #[serde(default)]
    pub last_pos: Option<Pos>,
    #[serde(default)]
    pub stuck_ticks: u32,
}

impl AgentMemory {
    pub fn new(role: RoleTag, state: StateTag, home: ZoneId) -> Self {
        Self {
            role,
            state,
            home,
            target: None,
            target_zone: None,
            rally: None,
            idle_ticks: 0,
            last_pos: None,
            stuck_ticks: 0,
        }
    }

    /// Moves to `state`, dropping the per-state target.
    pub fn transition(&mut self, state: StateTag) {
        if self.state != state {
            self.state = state;
            self.target = None;
        }
    }

    /// Tracks how long the agent has stood still.
    pub fn observe_position(&mut self, pos: Pos) {
        if self.last_pos == Some(pos) {
            self.stuck_ticks = self.stuck_ticks.saturating_add(1);
        } else {
            self.stuck_ticks = 0;
        }
        self.last_pos = Some(pos);
    }
}

pub type MigrationFn = fn(Value) -> Result<Value, String>;

/// Migration functions keyed by `(from, to)` version pairs.
///
/// From any version the step reaching furthest without passing the current
/// version is taken, so a direct `(1, 3)` step wins over `(1, 2)`.
pub struct Migrations {
    steps: BTreeMap<(u32, u32), MigrationFn>,
    current: u32,
}

impl Default for Migrations {
    fn default() -> Self {
        Self::standard()
    }
}

impl Migrations {
    pub fn empty(current: u32) -> Self {
        Self {
            steps: BTreeMap::new(),
            current,
        }
    }

    /// The migrations shipped with this version of the memory layout.
    pub fn standard() -> Self {
        let mut m = Self::empty(MEMORY_VERSION);
        m.register(1, 2, working_flag_to_state);
        m.register(2, 3, zone_to_home);
        m
    }

    /// Registers the step for `(from, to)`. Steps that do not advance are
    /// ignored.
    pub fn register(&mut self, from: u32, to: u32, apply: MigrationFn) {
        if to <= from {
            log::warn!("migration {from} -> {to} does not advance, ignored");
            return;
        }
        self.steps.insert((from, to), apply);
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn has_step(&self, from: u32, to: u32) -> bool {
        self.steps.contains_key(&(from, to))
    }

    /// Chains steps from `version` up to the current version.
    pub fn migrate(&self, mut version: u32, mut value: Value) -> Result<Value, MemoryError> {
        if version > self.current {
            return Err(MemoryError::FromFuture {
                found: version,
                current: self.current,
            });
        }
        while version < self.current {
            let (&(_, to), apply) = self
                .steps
                .range((version, version + 1)..=(version, self.current))
                .next_back()
                .ok_or(MemoryError::NoMigration { from: version })?;
            value = apply(value).map_err(|reason| MemoryError::Migration {
                from: version,
                reason,
            })?;
            version = to;
        }
        Ok(value)
    }
}

/// Decodes a stored memory record, migrating it if it is stale. Returns
/// the memory and whether a migration ran.
pub fn decode_memory(
    record: &Record,
    migrations: &Migrations,
) -> Result<(AgentMemory, bool), MemoryError> {
    let value: Value = serde_json::from_slice(&record.data)?;
    let migrated = record.version != migrations.current();
    let value = migrations.migrate(record.version, value)?;
    let memory = serde_json::from_value(value)?;
    Ok((memory, migrated))
}

pub fn encode_memory(memory: &AgentMemory) -> Result<Record, MemoryError> {
    Ok(Record {
        version: MEMORY_VERSION,
        data: serde_json::to_vec(memory)?,
    })
}

/// State a version-1 agent was in, given its role and `working` flag.
fn legacy_state(role: RoleTag, working: bool) -> StateTag {
    match (role, working) {
        (RoleTag::Harvester, false) => StateTag::Harvesting,
        (RoleTag::Harvester, true) | (RoleTag::Hauler, true) => StateTag::Delivering,
        (RoleTag::Builder, true) => StateTag::Building,
        (RoleTag::Upgrader, true) => StateTag::Upgrading,
        (RoleTag::Repairer, true) => StateTag::Repairing,
        (RoleTag::Defender, true) => StateTag::Engaging,
        (RoleTag::Healer, true) => StateTag::Healing,
        (RoleTag::Claimer, _) => StateTag::Claiming,
        (RoleTag::Scout, _) => StateTag::Scouting,
        (RoleTag::Defender, false) | (RoleTag::Healer, false) => StateTag::Patrolling,
        (_, false) => StateTag::Collecting,
    }
}

fn working_flag_to_state(mut value: Value) -> Result<Value, String> {
    let obj = value.as_object_mut().ok_or("memory is not an object")?;
    let role: RoleTag = obj
        .get("role")
        .cloned()
        .ok_or("memory has no role")
        .and_then(|r| serde_json::from_value(r).map_err(|_| "unknown role"))?;
    let working = obj
        .remove("working")
        .and_then(|w| w.as_bool())
        .unwrap_or(false);
    let state = serde_json::to_value(legacy_state(role, working)).map_err(|e| e.to_string())?;
    obj.insert("state".into(), state);
    Ok(value)
}

fn zone_to_home(mut value: Value) -> Result<Value, String> {
    let obj = value.as_object_mut().ok_or("memory is not an object")?;
    let zone = obj.remove("zone").ok_or("memory has no zone")?;
    obj.insert("home".into(), zone);
    obj.entry("idle_ticks").or_insert(Value::from(0));
    obj.entry("stuck_ticks").or_insert(Value::from(0));
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(version: u32, value: Value) -> Record {
        Record {
            version,
            data: serde_json::to_vec(&value).unwrap(),
        }
    }

    #[test]
    fn test_current_version_decodes_without_migration() {
        let memory = AgentMemory::new(RoleTag::Hauler, StateTag::Collecting, ZoneId::new(1, 2));
        let rec = encode_memory(&memory).unwrap();
        let (decoded, migrated) = decode_memory(&rec, &Migrations::standard()).unwrap();
        assert_eq!(decoded, memory);
        assert!(!migrated);
    }

    #[test]
    fn test_v1_memory_is_migrated_to_current() {
        let v1 = json!({
            "role": "Harvester",
            "working": true,
            "zone": { "x": 3, "y": -1 },
            "target": 44
        });
        let (memory, migrated) = decode_memory(&record(1, v1), &Migrations::standard()).unwrap();
        assert!(migrated);
        assert_eq!(memory.state, StateTag::Delivering);
        assert_eq!(memory.home, ZoneId::new(3, -1));
        assert_eq!(memory.target, Some(EntityId(44)));
        assert_eq!(memory.stuck_ticks, 0);
    }

    #[test]
    fn test_missing_step_is_reported() {
        let migrations = Migrations::empty(MEMORY_VERSION);
        let err = migrations.migrate(1, json!({})).unwrap_err();
        assert!(matches!(err, MemoryError::NoMigration { from: 1 }));
    }

    #[test]
    fn test_steps_are_keyed_by_version_pair() {
        fn to_two(mut v: Value) -> Result<Value, String> {
            v["path"] = json!("1-2");
            Ok(v)
        }
        fn two_to_three(v: Value) -> Result<Value, String> {
            Ok(v)
        }
        fn direct(mut v: Value) -> Result<Value, String> {
            v["path"] = json!("1-3");
            Ok(v)
        }
        fn too_far(_: Value) -> Result<Value, String> {
            Err("beyond current".into())
        }

        let mut m = Migrations::empty(3);
        m.register(1, 2, to_two);
        m.register(2, 3, two_to_three);
        m.register(1, 3, direct);
        m.register(1, 4, too_far);
        m.register(2, 2, too_far);
        assert!(m.has_step(1, 2) && m.has_step(1, 3) && m.has_step(1, 4));
        assert!(!m.has_step(2, 2));

        assert_eq!(m.migrate(1, json!({})).unwrap()["path"], "1-3");
        assert_eq!(m.migrate(2, json!({ "path": "kept" })).unwrap()["path"], "kept");
    }

    #[test]
    fn test_future_version_is_rejected() {
        let err = Migrations::standard()
            .migrate(MEMORY_VERSION + 1, json!({}))
            .unwrap_err();
        assert!(matches!(err, MemoryError::FromFuture { .. }));
    }

    #[test]
    fn test_unknown_state_tag_decodes_as_unknown() {
        let v3 = json!({
            "role": "Builder",
            "state": "Dancing",
            "home": { "x": 0, "y": 0 }
        });
        let (memory, _) = decode_memory(&record(3, v3), &Migrations::standard()).unwrap();
        assert_eq!(memory.state, StateTag::Unknown);
    }

    #[test]
    fn test_memory_without_role_fails_to_decode() {
        let v3 = json!({ "state": "Building", "home": { "x": 0, "y": 0 } });
        assert!(decode_memory(&record(3, v3), &Migrations::standard()).is_err());
    }

    #[test]
    fn test_transition_clears_target() {
        let mut m = AgentMemory::new(RoleTag::Harvester, StateTag::Harvesting, ZoneId::new(0, 0));
        m.target = Some(EntityId(9));
        m.transition(StateTag::Harvesting);
        assert_eq!(m.target, Some(EntityId(9)));
        m.transition(StateTag::Delivering);
        assert_eq!(m.target, None);
    }
}
