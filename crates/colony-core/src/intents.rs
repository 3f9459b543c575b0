//! Intent recording: the reference world's [`ActionSink`].
//!
//! Calls are validated against the tick's snapshot and recorded as
//! [`Orders`]; nothing mutates until the engine applies them after the
//! controller returns. A target that changed between validation and
//! application is clamped then, not rejected.

use std::collections::HashMap;

use colony_logic::action::{ActionResult, ActionSink, FailReason, PrimitiveAction};
use colony_logic::capability::{Body, CapabilityUnit};
use colony_logic::cost::CostSurface;
use colony_logic::roles::RoleTag;
use colony_logic::types::{AgentId, EntityId, Pos, ResourceKind, ZoneId};
use colony_logic::world::{AgentInfo, Entity, EntityKind, Owner, Snapshot, StructureKind, WorldView};

use crate::pathing;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnOrder {
    pub spawn: EntityId,
    pub role: RoleTag,
    pub body: Body,
}

/// Everything the controller asked for during one tick.
#[derive(Debug, Clone, Default)]
pub struct Orders {
    pub actions: Vec<(AgentId, PrimitiveAction)>,
    /// One step per agent; a later request replaces an earlier one.
    pub moves: Vec<(AgentId, Pos)>,
    pub spawns: Vec<SpawnOrder>,
}

impl Orders {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.moves.is_empty() && self.spawns.is_empty()
    }
}

pub struct IntentSink<'a> {
    world: &'a Snapshot,
    orders: Orders,
    /// Spawn energy already promised this tick, per zone.
    committed: HashMap<ZoneId, u32>,
}

impl<'a> IntentSink<'a> {
    pub fn new(world: &'a Snapshot) -> Self {
        Self {
            world,
            orders: Orders::default(),
            committed: HashMap::new(),
        }
    }

    pub fn into_orders(self) -> Orders {
        self.orders
    }

    fn own_agent(&self, agent: AgentId) -> Result<(&'a Entity, &'a AgentInfo), FailReason> {
        let (entity, info) = self.world.agent(agent).ok_or(FailReason::InvalidTarget)?;
        if !entity.is_mine() {
            return Err(FailReason::NotOwner);
        }
        if info.spawning {
            return Err(FailReason::Busy);
        }
        Ok((entity, info))
    }

    fn check(&self, agent: AgentId, action: &PrimitiveAction) -> Result<(), ActionResult> {
        let fail = ActionResult::Failed;
        let (me, info) = self.own_agent(agent).map_err(fail)?;
        if info.body.count(action.required_unit()) == 0 {
            return Err(fail(FailReason::MissingCapability));
        }
        let target = self
            .world
            .resolve(action.target())
            .ok_or(fail(FailReason::InvalidTarget))?;
        if target.pos.zone != me.pos.zone || !me.pos.in_range(&target.pos, action.range()) {
            return Err(ActionResult::NotInRange);
        }
        check_target(info, target, action).map_err(fail)
    }
}

fn check_target(me: &AgentInfo, target: &Entity, action: &PrimitiveAction) -> Result<(), FailReason> {
    use FailReason::*;
    let energy = me.store.get(ResourceKind::Energy);
    match (action, &target.kind) {
        (PrimitiveAction::Gather { .. }, EntityKind::Source(s)) => {
            if me.store.is_full() {
                Err(Full)
            } else if s.energy == 0 {
                Err(NotEnoughResources)
            } else {
                Ok(())
            }
        }
        (PrimitiveAction::Gather { .. }, EntityKind::Mineral(m)) => {
            if me.store.is_full() {
                Err(Full)
            } else if m.amount == 0 {
                Err(NotEnoughResources)
            } else {
                Ok(())
            }
        }
        (PrimitiveAction::Build { .. }, EntityKind::Site(_)) => need(energy),
        (PrimitiveAction::Repair { .. }, EntityKind::Structure(s)) => {
            if s.hits >= s.hits_max {
                Err(Full)
            } else {
                need(energy)
            }
        }
        (PrimitiveAction::Upgrade { .. }, EntityKind::Controller(c)) => {
            if !target.is_mine() || c.level == 0 {
                Err(NotOwner)
            } else {
                need(energy)
            }
        }
        (PrimitiveAction::Dismantle { .. }, EntityKind::Structure(_)) => Ok(()),
        (PrimitiveAction::Transfer { resource, .. }, _) => {
            let store = target.store().ok_or(InvalidTarget)?;
            if me.store.get(*resource) == 0 {
                Err(NotEnoughResources)
            } else if store.free() == 0 {
                Err(Full)
            } else {
                Ok(())
            }
        }
        (PrimitiveAction::Withdraw { resource, .. }, _) => {
            let store = target.store().ok_or(InvalidTarget)?;
            if matches!(target.kind, EntityKind::Agent(_)) {
                Err(InvalidTarget)
            } else if store.get(*resource) == 0 {
                Err(NotEnoughResources)
            } else if me.store.is_full() {
                Err(Full)
            } else {
                Ok(())
            }
        }
        (PrimitiveAction::Pickup { .. }, EntityKind::Dropped(_)) => {
            if me.store.is_full() {
                Err(Full)
            } else {
                Ok(())
            }
        }
        (
            PrimitiveAction::MeleeAttack { .. } | PrimitiveAction::RangedAttack { .. },
            EntityKind::Agent(_) | EntityKind::Structure(_),
        ) => {
            if target.is_mine() {
                Err(InvalidTarget)
            } else {
                Ok(())
            }
        }
        (PrimitiveAction::Heal { .. }, EntityKind::Agent(a)) => {
            if !target.is_mine() {
                Err(InvalidTarget)
            } else if a.hits >= a.hits_max {
                Err(Full)
            } else {
                Ok(())
            }
        }
        (PrimitiveAction::Claim { .. }, EntityKind::Controller(c)) => {
            if target.owner != Owner::Neutral || c.level > 0 {
                Err(NotOwner)
            } else {
                Ok(())
            }
        }
        (PrimitiveAction::Reserve { .. }, EntityKind::Controller(c)) => {
            if target.owner == Owner::Hostile || c.level > 0 {
                Err(NotOwner)
            } else {
                Ok(())
            }
        }
        _ => Err(InvalidTarget),
    }
}

fn need(energy: u32) -> Result<(), FailReason> {
    if energy == 0 {
        Err(FailReason::NotEnoughResources)
    } else {
        Ok(())
    }
}

impl ActionSink for IntentSink<'_> {
    fn perform(&mut self, agent: AgentId, action: &PrimitiveAction) -> ActionResult {
        if let Err(result) = self.check(agent, action) {
            log::trace!("{agent}: {action} -> {result:?}");
            return result;
        }
        self.orders.actions.push((agent, *action));
        ActionResult::Ok
    }

    fn move_intent(
        &mut self,
        agent: AgentId,
        goal: Pos,
        range: u32,
        surface: &CostSurface,
    ) -> ActionResult {
        let (me, info) = match self.own_agent(agent) {
            Ok(found) => found,
            Err(reason) => return ActionResult::Failed(reason),
        };
        if info.body.count(CapabilityUnit::Move) == 0 {
            return ActionResult::Failed(FailReason::MissingCapability);
        }
        if info.fatigue > 0 {
            return ActionResult::Failed(FailReason::Tired);
        }
        if me.pos.zone == goal.zone && me.pos.in_range(&goal, range) {
            return ActionResult::Ok;
        }
        if surface.zone != me.pos.zone {
            return ActionResult::Failed(FailReason::InvalidTarget);
        }
        match pathing::next_step(surface, me.pos, goal, range) {
            Some(step) => {
                self.orders.moves.retain(|(a, _)| *a != agent);
                self.orders.moves.push((agent, step));
                ActionResult::Ok
            }
            None => ActionResult::Failed(FailReason::InvalidTarget),
        }
    }

    fn spawn(&mut self, spawn: EntityId, role: RoleTag, body: &Body) -> ActionResult {
        let Some(entity) = self.world.resolve(spawn) else {
            return ActionResult::Failed(FailReason::InvalidTarget);
        };
        let Some(info) = entity.as_structure() else {
            return ActionResult::Failed(FailReason::InvalidTarget);
        };
        if info.kind != StructureKind::Spawn {
            return ActionResult::Failed(FailReason::InvalidTarget);
        }
        if !entity.is_mine() {
            return ActionResult::Failed(FailReason::NotOwner);
        }
        if info.busy || self.orders.spawns.iter().any(|o| o.spawn == spawn) {
            return ActionResult::Failed(FailReason::Busy);
        }
        if body.is_empty() {
            return ActionResult::Failed(FailReason::InvalidTarget);
        }
        let zone = entity.pos.zone;
        let available = spawn_energy(self.world, zone)
            .saturating_sub(self.committed.get(&zone).copied().unwrap_or(0));
        if body.cost() > available {
            return ActionResult::Failed(FailReason::NotEnoughResources);
        }
        *self.committed.entry(zone).or_insert(0) += body.cost();
        self.orders.spawns.push(SpawnOrder {
            spawn,
            role,
            body: body.clone(),
        });
        ActionResult::Ok
    }
}

/// Energy held by our spawns and extensions in a zone.
fn spawn_energy(world: &Snapshot, zone: ZoneId) -> u32 {
    world
        .entities(zone)
        .iter()
        .filter(|e| e.is_mine())
        .filter_map(|e| e.as_structure())
        .filter(|s| matches!(s.kind, StructureKind::Spawn | StructureKind::Extension))
        .filter_map(|s| s.store.as_ref())
        .map(|s| s.get(ResourceKind::Energy))
        .sum()
}
