//! Persisted registries: scouting intel and expansion targets.
//!
//! Both change rarely and cannot be rebuilt from a single snapshot (a zone
//! out of sight has no entities), so they live across ticks and are saved
//! to the store's global registries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::ColonyConfig;
use crate::error::StoreError;
use crate::store::{load_json, save_json, Registry, Scope, StateStore};
use crate::terrain::TerrainProfile;
use crate::types::{EntityId, Pos, ZoneId};
use crate::world::{Category, EntityKind, Owner, WorldView};

pub const INTEL_VERSION: u32 = 1;
pub const EXPANSION_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerIntel {
    pub id: EntityId,
    pub pos: Pos,
    /// `None` when unowned.
    pub owner: Option<Owner>,
    pub level: u8,
    pub reserved_by: Option<Owner>,
}

/// What was last seen of a zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneIntel {
    pub zone: ZoneId,
    pub last_seen: u64,
    pub controller: Option<ControllerIntel>,
    pub sources: u32,
    pub minerals: u32,
    pub hostiles: u32,
    pub hostile_structures: u32,
    pub profile: Option<TerrainProfile>,
}

impl ZoneIntel {
    /// Reads a visible zone.
    pub fn observe(world: &dyn WorldView, zone: ZoneId) -> Self {
        let controller = world
            .query(zone, Category::Controllers)
            .into_iter()
            .find_map(|e| match &e.kind {
                EntityKind::Controller(c) => Some(ControllerIntel {
                    id: e.id,
                    pos: e.pos,
                    owner: (c.level > 0).then_some(e.owner),
                    level: c.level,
                    reserved_by: c.reservation.as_ref().map(|r| r.owner),
                }),
                _ => None,
            });
        Self {
            zone,
            last_seen: world.tick(),
            controller,
            sources: world.query(zone, Category::Sources).len() as u32,
            minerals: world.query(zone, Category::Minerals).len() as u32,
            hostiles: world.query(zone, Category::HostileAgents).len() as u32,
            hostile_structures: world.query(zone, Category::HostileStructures).len() as u32,
            profile: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoutRegistry {
    zones: BTreeMap<ZoneId, ZoneIntel>,
}

impl ScoutRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records intel for a visible zone; ignored when the zone is out of
    /// sight.
    pub fn record(&mut self, world: &dyn WorldView, zone: ZoneId) -> bool {
        if !world.is_visible(zone) {
            return false;
        }
        let mut intel = ZoneIntel::observe(world, zone);
        if let Some(prev) = self.zones.get(&zone) {
            intel.profile = intel.profile.or(prev.profile);
        } else {
            log::debug!("{zone}: scouted for the first time");
        }
        self.zones.insert(zone, intel);
        true
    }

    /// Records every visible zone. Returns how many were refreshed.
    pub fn sweep(&mut self, world: &dyn WorldView) -> usize {
        world
            .zones()
            .into_iter()
            .filter(|z| self.record(world, *z))
            .count()
    }

    /// Stamps a zone that could not be reached so it is not retried until
    /// the entry goes stale.
    pub fn mark_unreachable(&mut self, zone: ZoneId, tick: u64) {
        log::debug!("{zone}: unreachable at tick {tick}");
        let intel = self.zones.entry(zone).or_insert_with(|| ZoneIntel {
            zone,
            last_seen: tick,
            controller: None,
            sources: 0,
            minerals: 0,
            hostiles: 0,
            hostile_structures: 0,
            profile: None,
        });
        intel.last_seen = tick;
    }

    pub fn set_profile(&mut self, zone: ZoneId, profile: TerrainProfile) {
        if let Some(intel) = self.zones.get_mut(&zone) {
            intel.profile = Some(profile);
        }
    }

    pub fn get(&self, zone: ZoneId) -> Option<&ZoneIntel> {
        self.zones.get(&zone)
    }

    pub fn is_fresh(&self, zone: ZoneId, tick: u64, ttl: u64) -> bool {
        self.zones
            .get(&zone)
            .is_some_and(|i| tick.saturating_sub(i.last_seen) < ttl)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ZoneIntel> {
        self.zones.values()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Closest zone within `max_distance` of `home` whose intel is missing
    /// or stale. Ties go to the lowest zone id.
    pub fn next_to_scout(
        &self,
        home: ZoneId,
        tick: u64,
        ttl: u64,
        max_distance: u32,
    ) -> Option<ZoneId> {
        let r = max_distance as i32;
        let mut best: Option<(u32, ZoneId)> = None;
        for dy in -r..=r {
            for dx in -r..=r {
                let zone = ZoneId::new(home.x + dx, home.y + dy);
                if zone == home || self.is_fresh(zone, tick, ttl) {
                    continue;
                }
                let key = (home.distance(zone), zone);
                if best.map_or(true, |b| key < b) {
                    best = Some(key);
                }
            }
        }
        best.map(|(_, z)| z)
    }

    /// Forgets intel older than `ttl`.
    pub fn prune(&mut self, tick: u64, ttl: u64) -> usize {
        let before = self.zones.len();
        self.zones
            .retain(|_, i| tick.saturating_sub(i.last_seen) < ttl);
        before - self.zones.len()
    }

    pub fn load(store: &dyn StateStore) -> Result<Self, StoreError> {
        let list: Vec<ZoneIntel> =
            load_json(store, &Scope::Global(Registry::ScoutedZones), INTEL_VERSION)?
                .unwrap_or_default();
        Ok(Self {
            zones: list.into_iter().map(|i| (i.zone, i)).collect(),
        })
    }

    pub fn save(&self, store: &mut dyn StateStore) -> Result<(), StoreError> {
        let list: Vec<&ZoneIntel> = self.zones.values().collect();
        save_json(
            store,
            Scope::Global(Registry::ScoutedZones),
            INTEL_VERSION,
            &list,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpansionKind {
    Claim,
    Reserve,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpansionTarget {
    pub zone: ZoneId,
    /// Colony zone that services the target.
    pub home: ZoneId,
    pub controller: EntityId,
    pub controller_pos: Pos,
    pub kind: ExpansionKind,
    pub score: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpansionRegistry {
    targets: Vec<ExpansionTarget>,
    reviewed_at: Option<u64>,
}

impl ExpansionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn targets(&self) -> &[ExpansionTarget] {
        &self.targets
    }

    pub fn targets_for(&self, home: ZoneId) -> impl Iterator<Item = &ExpansionTarget> {
        self.targets.iter().filter(move |t| t.home == home)
    }

    pub fn reviewed_at(&self) -> Option<u64> {
        self.reviewed_at
    }

    /// Rebuilds the target list from fresh intel.
    ///
    /// Candidates are zones with an unowned controller, no hostile presence
    /// and no foreign reservation, within `max_distance` of a home zone of
    /// sufficient level. Scored by sources and distance; the best ones are
    /// claimed until the claim cap is used up and reserved afterwards.
    pub fn review(
        &mut self,
        intel: &ScoutRegistry,
        homes: &[(ZoneId, u8)],
        tick: u64,
        config: &ColonyConfig,
    ) {
        let exp = &config.expansion;
        let owned = homes.len() as u32;
        let mut claims_left = exp.max_claimed_zones.saturating_sub(owned.saturating_sub(1));

        let mut candidates: Vec<ExpansionTarget> = intel
            .iter()
            .filter(|i| intel.is_fresh(i.zone, tick, config.intel_ttl))
            .filter(|i| i.hostiles == 0 && i.hostile_structures == 0)
            .filter(|i| homes.iter().all(|(h, _)| *h != i.zone))
            .filter_map(|i| {
                let c = i.controller.as_ref()?;
                if c.owner.is_some() || matches!(c.reserved_by, Some(o) if o != Owner::Mine) {
                    return None;
                }
                let (home, distance) = homes
                    .iter()
                    .filter(|(_, level)| *level >= exp.min_home_level)
                    .map(|(h, _)| (*h, h.distance(i.zone)))
                    .filter(|(_, d)| *d <= exp.max_distance)
                    .min_by_key(|(h, d)| (*d, *h))?;
                Some(ExpansionTarget {
                    zone: i.zone,
                    home,
                    controller: c.id,
                    controller_pos: c.pos,
                    kind: ExpansionKind::Reserve,
                    score: i.sources as i32 * 10 - distance as i32 * 5,
                })
            })
            .collect();

        candidates.sort_by(|a, b| b.score.cmp(&a.score).then(a.zone.cmp(&b.zone)));
        candidates.truncate(exp.max_targets);
        for t in &mut candidates {
            if claims_left > 0 {
                t.kind = ExpansionKind::Claim;
                claims_left -= 1;
            }
        }
        if candidates != self.targets {
            log::info!("expansion targets: {} at tick {tick}", candidates.len());
        }
        self.targets = candidates;
        self.reviewed_at = Some(tick);
    }

    pub fn load(store: &dyn StateStore) -> Result<Self, StoreError> {
        Ok(load_json(
            store,
            &Scope::Global(Registry::ExpansionTargets),
            EXPANSION_VERSION,
        )?
        .unwrap_or_default())
    }

    pub fn save(&self, store: &mut dyn StateStore) -> Result<(), StoreError> {
        save_json(
            store,
            Scope::Global(Registry::ExpansionTargets),
            EXPANSION_VERSION,
            self,
        )
    }
}
