//! Zone records.
//!
//! A record is created the first time a zone is seen and refreshed every
//! tick it stays visible. Zones out of sight for longer than the prune TTL
//! are forgotten, along with their stored record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::planner::colony_level;
use crate::roles::RoleTag;
use crate::store::{load_json, save_json, Scope, StateStore};
use crate::terrain::TerrainProfile;
use crate::types::ZoneId;
use crate::world::WorldView;

pub const ZONE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRecord {
    pub zone: ZoneId,
    pub first_seen: u64,
    pub last_seen: u64,
    /// Own controller level; 0 when the zone is not ours.
    pub level: u8,
    pub counts: BTreeMap<RoleTag, u32>,
    pub profile: Option<TerrainProfile>,
    pub profile_at: Option<u64>,
}

impl ZoneRecord {
    pub fn new(zone: ZoneId, tick: u64) -> Self {
        Self {
            zone,
            first_seen: tick,
            last_seen: tick,
            level: 0,
            counts: BTreeMap::new(),
            profile: None,
            profile_at: None,
        }
    }

    pub fn is_colony(&self) -> bool {
        self.level > 0
    }

    pub fn count(&self, role: RoleTag) -> u32 {
        self.counts.get(&role).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZoneRegistry {
    zones: BTreeMap<ZoneId, ZoneRecord>,
}

impl ZoneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refreshes every visible zone. Returns the zones seen for the first
    /// time.
    pub fn observe(&mut self, world: &dyn WorldView) -> Vec<ZoneId> {
        let tick = world.tick();
        let mut sighted = Vec::new();
        for zone in world.zones() {
            let record = self.zones.entry(zone).or_insert_with(|| {
                log::info!("{zone}: first sighted at tick {tick}");
                sighted.push(zone);
                ZoneRecord::new(zone, tick)
            });
            record.last_seen = tick;
            record.level = colony_level(world, zone).unwrap_or(0);
        }
        sighted
    }

    /// Replaces per-role counts. Zones without agents get empty counts.
    pub fn set_counts(&mut self, counts: &BTreeMap<ZoneId, BTreeMap<RoleTag, u32>>) {
        for (zone, record) in self.zones.iter_mut() {
            record.counts = counts.get(zone).cloned().unwrap_or_default();
        }
    }

    pub fn set_profile(&mut self, zone: ZoneId, profile: TerrainProfile, tick: u64) {
        if let Some(record) = self.zones.get_mut(&zone) {
            record.profile = Some(profile);
            record.profile_at = Some(tick);
        }
    }

    pub fn get(&self, zone: ZoneId) -> Option<&ZoneRecord> {
        self.zones.get(&zone)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ZoneRecord> {
        self.zones.values()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Colony zones with their levels.
    pub fn colonies(&self) -> Vec<(ZoneId, u8)> {
        self.zones
            .values()
            .filter(|r| r.is_colony())
            .map(|r| (r.zone, r.level))
            .collect()
    }

    /// Forgets zones unseen for `ttl` ticks and removes their stored
    /// records. Returns the pruned zones.
    pub fn prune(&mut self, tick: u64, ttl: u64, store: &mut dyn StateStore) -> Vec<ZoneId> {
        let stale: Vec<ZoneId> = self
            .zones
            .values()
            .filter(|r| tick.saturating_sub(r.last_seen) >= ttl)
            .map(|r| r.zone)
            .collect();
        for zone in &stale {
            self.zones.remove(zone);
            store.remove(&Scope::Zone(*zone));
            log::info!("{zone}: pruned after {ttl} ticks out of sight");
        }
        stale
    }

    pub fn persist(&self, store: &mut dyn StateStore) -> Result<(), StoreError> {
        for record in self.zones.values() {
            save_json(store, Scope::Zone(record.zone), ZONE_VERSION, record)?;
        }
        Ok(())
    }

    /// Loads every zone record. Unreadable records are skipped and logged.
    pub fn load(store: &dyn StateStore) -> Self {
        let mut registry = Self::new();
        for scope in store.scopes() {
            let Scope::Zone(zone) = scope else {
                continue;
            };
            match load_json::<ZoneRecord>(store, &scope, ZONE_VERSION) {
                Ok(Some(record)) => {
                    registry.zones.insert(zone, record);
                }
                Ok(None) => {}
                Err(e) => log::warn!("{zone}: record dropped: {e}"),
            }
        }
        registry
    }
}
