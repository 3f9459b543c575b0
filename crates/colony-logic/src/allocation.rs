//! Task allocation engine.
//!
//! The [`TaskBoard`] owns the task table and the agent → task index. Per
//! tick it is driven in a fixed order by the colony loop:
//!
//! 1. [`TaskBoard::sync_live`] with the roster's agents
//! 2. [`TaskBoard::cleanup`] retires expired, lost, satisfied and abandoned
//!    tasks and prunes dead assignees
//! 3. [`TaskBoard::allocate`] turns the planner's demand into tasks and
//!    hands out work to agents without a task
//! 4. state handlers call [`TaskBoard::execute_task`], which drives one
//!    primitive action through the agent's action guard
//!
//! Matching is capability-gated and deterministic: priority descending,
//! then lowest task id.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::action::{ActionResult, ActionSink, FailReason, PrimitiveAction};
use crate::agent::{AgentRecord, AgentRoster};
use crate::capability::CapabilityUnit;
use crate::config::{ColonyConfig, TaskLimits};
use crate::error::{StoreError, TaskError};
use crate::intel::ScoutRegistry;
use crate::planner::ZoneDemand;
use crate::roles::RoleRegistry;
use crate::store::{load_json, save_json, Registry, Scope, StateStore};
use crate::task::{NewTask, Task, TaskKind, TaskOrigin, TaskStatus};
use crate::types::{AgentId, EntityId, Pos, ResourceKind, TaskId, ZoneId};
use crate::world::{Entity, EntityKind, Owner, WorldView};

pub const BOARD_VERSION: u32 = 1;

/// Cumulative counters fed by task execution and allocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    pub created: u64,
    pub removed: u64,
    pub completed: u64,
    pub failed: u64,
    /// Agents that asked for work and got none.
    pub idle: u64,
    pub in_progress: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RemovalReason {
    Expired,
    TargetLost,
    Satisfied,
    Abandoned,
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RemovalReason::Expired => "expired",
            RemovalReason::TargetLost => "target lost",
            RemovalReason::Satisfied => "satisfied",
            RemovalReason::Abandoned => "abandoned",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<(TaskId, RemovalReason)>,
    /// Dead agent ids dropped from assignee lists.
    pub pruned_assignees: u32,
}

impl CleanupReport {
    pub fn count(&self, reason: RemovalReason) -> usize {
        self.removed.iter().filter(|(_, r)| *r == reason).count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationReport {
    pub created: Vec<TaskId>,
    pub assigned: Vec<(AgentId, TaskId)>,
    pub idle: Vec<AgentId>,
}

/// Outcome of one [`TaskBoard::execute_task`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskExecution {
    pub status: TaskStatus,
    /// `None` when the action guard dropped the call.
    pub result: Option<ActionResult>,
}

impl TaskExecution {
    fn new(status: TaskStatus, result: Option<ActionResult>) -> Self {
        Self { status, result }
    }

    pub fn needs_approach(&self) -> bool {
        self.result == Some(ActionResult::NotInRange)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct BoardState {
    next_id: u64,
    tasks: Vec<Task>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskBoard {
    tasks: BTreeMap<TaskId, Task>,
    agent_tasks: BTreeMap<AgentId, TaskId>,
    live: BTreeSet<AgentId>,
    next_id: u64,
    stats: TaskStats,
}

impl TaskBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the set of live agents. Assignments to agents outside it
    /// are pruned by the next cleanup.
    pub fn sync_live(&mut self, agents: impl IntoIterator<Item = AgentId>) {
        self.live = agents.into_iter().collect();
    }

    pub fn add_live(&mut self, agent: AgentId) {
        self.live.insert(agent);
    }

    pub fn is_live(&self, agent: AgentId) -> bool {
        self.live.contains(&agent)
    }

    pub fn stats(&self) -> TaskStats {
        self.stats
    }

    pub fn record_idle(&mut self) {
        self.stats.idle += 1;
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn tasks_in(&self, zone: ZoneId) -> impl Iterator<Item = &Task> {
        self.tasks.values().filter(move |t| t.zone == zone)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task_of(&self, agent: AgentId) -> Option<&Task> {
        self.agent_tasks.get(&agent).and_then(|id| self.tasks.get(id))
    }

    pub fn has_task(&self, kind: TaskKind, target: EntityId) -> bool {
        self.tasks
            .values()
            .any(|t| t.kind == kind && t.target == target)
    }

    /// Creates a task on a target that resolves in the snapshot.
    pub fn create_task(
        &mut self,
        world: &dyn WorldView,
        new: NewTask,
        limits: &TaskLimits,
    ) -> Result<TaskId, TaskError> {
        let pos = world
            .resolve(new.target)
            .map(|e| e.pos)
            .ok_or(TaskError::InvalidTarget(new.target))?;
        Ok(self.insert(new, pos, world.tick(), limits))
    }

    /// Creates a task on a target out of sight, trusted at its last known
    /// position.
    pub fn create_remote_task(
        &mut self,
        new: NewTask,
        target_pos: Pos,
        tick: u64,
        limits: &TaskLimits,
    ) -> TaskId {
        self.insert(new, target_pos, tick, limits)
    }

    fn insert(&mut self, new: NewTask, target_pos: Pos, tick: u64, limits: &TaskLimits) -> TaskId {
        self.next_id += 1;
        let id = TaskId(self.next_id);
        let task = Task {
            id,
            kind: new.kind,
            target: new.target,
            target_pos,
            priority: new.priority,
            assigned: Vec::new(),
            zone: new.zone,
            created_at: tick,
            resource: new.resource,
            amount: new.amount,
            origin: new.origin,
            max_assignees: limits.limit(new.kind),
        };
        log::debug!(
            "{id}: {} on {} in {} (priority {})",
            task.kind,
            task.target,
            task.zone,
            task.priority
        );
        self.tasks.insert(id, task);
        self.stats.created += 1;
        id
    }

    /// Removes a task and clears its assignees' references.
    pub fn remove(&mut self, id: TaskId) -> Option<Task> {
        let task = self.tasks.remove(&id)?;
        for agent in &task.assigned {
            if self.agent_tasks.get(agent) == Some(&id) {
                self.agent_tasks.remove(agent);
            }
        }
        self.stats.removed += 1;
        Some(task)
    }

    /// Assigns `agent` to `task`, dropping any previous assignment first.
    /// Assigning an agent to the task it already holds is a no-op.
    pub fn assign(&mut self, agent: AgentId, task: TaskId) -> Result<(), TaskError> {
        if !self.tasks.contains_key(&task) {
            return Err(TaskError::UnknownTask(task));
        }
        if !self.live.contains(&agent) {
            return Err(TaskError::UnknownAgent(agent));
        }
        if self.agent_tasks.get(&agent) == Some(&task) {
            return Ok(());
        }
        self.unassign(agent);
        if let Some(t) = self.tasks.get_mut(&task) {
            t.assigned.push(agent);
        }
        self.agent_tasks.insert(agent, task);
        Ok(())
    }

    /// Drops the agent's assignment, if any. Idempotent.
    pub fn unassign(&mut self, agent: AgentId) -> Option<TaskId> {
        let previous = self.agent_tasks.remove(&agent)?;
        if let Some(t) = self.tasks.get_mut(&previous) {
            t.assigned.retain(|a| *a != agent);
        }
        Some(previous)
    }

    /// Best task in the agent's home zone it is able to do.
    pub fn find_best_task(&self, agent: &AgentRecord) -> Option<&Task> {
        self.find_best_matching(agent, &TaskKind::ALL)
    }

    /// Like [`find_best_task`](Self::find_best_task), restricted to `kinds`.
    pub fn find_best_matching(&self, agent: &AgentRecord, kinds: &[TaskKind]) -> Option<&Task> {
        let home = agent.home();
        self.tasks
            .values()
            .filter(|t| t.zone == home)
            .filter(|t| kinds.contains(&t.kind))
            .filter(|t| agent.has(t.kind.required_unit()))
            .filter(|t| !t.is_full() || t.assigned.contains(&agent.id))
            .max_by_key(|t| (t.priority, Reverse(t.id)))
    }

    /// Drives one step of `task` for `agent` through its action guard.
    ///
    /// Task-pool membership is never changed here; the status only feeds
    /// the analytics counters and the caller's state logic.
    pub fn execute_task(
        &mut self,
        world: &dyn WorldView,
        agent: &mut AgentRecord,
        sink: &mut dyn ActionSink,
        task_id: TaskId,
        config: &ColonyConfig,
    ) -> Result<TaskExecution, TaskError> {
        let task = self
            .tasks
            .get(&task_id)
            .ok_or(TaskError::UnknownTask(task_id))?;
        let kind = task.kind;

        let Some(target) = world.resolve(task.target) else {
            if world.is_visible(task.target_pos.zone) {
                self.stats.failed += 1;
                return Ok(TaskExecution::new(TaskStatus::Failed, None));
            }
            // Out of sight: travel there; the guard is untouched.
            return Ok(TaskExecution::new(
                TaskStatus::InProgress,
                Some(ActionResult::NotInRange),
            ));
        };

        let action = action_for(task, agent);
        let Some(result) = agent.guard.perform(sink, agent.id, &action) else {
            return Ok(TaskExecution::new(TaskStatus::InProgress, None));
        };
        let status = status_after(kind, result, agent, target, config);
        match status {
            TaskStatus::Completed => self.stats.completed += 1,
            TaskStatus::Failed => self.stats.failed += 1,
            TaskStatus::InProgress => self.stats.in_progress += 1,
        }
        Ok(TaskExecution::new(status, Some(result)))
    }

    /// Retires tasks that must not be handed out again.
    pub fn cleanup(
        &mut self,
        world: &dyn WorldView,
        config: &ColonyConfig,
        intel: &ScoutRegistry,
    ) -> CleanupReport {
        let tick = world.tick();
        let mut report = CleanupReport::default();
        let mut doomed = Vec::new();

        for task in self.tasks.values_mut() {
            let before = task.assigned.len();
            let live = &self.live;
            task.assigned.retain(|a| live.contains(a));
            report.pruned_assignees += (before - task.assigned.len()) as u32;

            if task.age(tick) >= config.task_age_ceiling {
                doomed.push((task.id, RemovalReason::Expired));
                continue;
            }
            let target = if world.is_visible(task.target_pos.zone) {
                match world.resolve(task.target) {
                    Some(e) => Some(e),
                    None => {
                        doomed.push((task.id, RemovalReason::TargetLost));
                        continue;
                    }
                }
            } else if intel.is_fresh(task.target_pos.zone, tick, config.intel_ttl) {
                None
            } else {
                doomed.push((task.id, RemovalReason::TargetLost));
                continue;
            };
            if let Some(entity) = target {
                if is_satisfied(task, entity, config) {
                    doomed.push((task.id, RemovalReason::Satisfied));
                    continue;
                }
            }
            let keep_unassigned = match task.origin {
                TaskOrigin::Deficit(_) => true,
                TaskOrigin::AdHoc => false,
                TaskOrigin::Opportunity => target.map_or(true, |e| is_live(task, e, config)),
            };
            if task.assigned.is_empty() && !keep_unassigned {
                doomed.push((task.id, RemovalReason::Abandoned));
            }
        }

        let live = &self.live;
        self.agent_tasks.retain(|a, _| live.contains(a));
        for (id, reason) in doomed {
            if let Some(task) = self.remove(id) {
                log::debug!("{id}: {} on {} removed, {reason}", task.kind, task.target);
                report.removed.push((id, reason));
            }
        }
        report
    }

    /// Turns planner demand into tasks, then gives every agent without a
    /// task the best one its current state accepts.
    pub fn allocate(
        &mut self,
        world: &dyn WorldView,
        demands: &[ZoneDemand],
        roster: &AgentRoster,
        roles: &RoleRegistry,
        config: &ColonyConfig,
    ) -> AllocationReport {
        let tick = world.tick();
        let limits = &config.tasks;
        let mut report = AllocationReport::default();

        for demand in demands {
            for (&role, &deficit) in &demand.deficits {
                let Some(kind) = roles.lookup(role).ok().and_then(|s| s.deficit_task()) else {
                    continue;
                };
                let targets = demand.deficit_targets(kind);
                if targets.is_empty() {
                    continue;
                }
                let existing = self
                    .tasks_in(demand.zone)
                    .filter(|t| t.origin == TaskOrigin::Deficit(role))
                    .count();
                let needed = (deficit as usize).saturating_sub(existing);
                for i in 0..needed {
                    let c = targets[(existing + i) % targets.len()];
                    let new = c.to_task(demand.zone, TaskOrigin::Deficit(role));
                    let id = if world.resolve(c.target).is_some() {
                        self.create_task(world, new, limits).ok()
                    } else {
                        Some(self.create_remote_task(new, c.pos, tick, limits))
                    };
                    report.created.extend(id);
                }
            }

            for c in demand.opportunities() {
                if self.has_task(c.kind, c.target) {
                    continue;
                }
                let new = c.to_task(demand.zone, TaskOrigin::Opportunity);
                let id = if world.resolve(c.target).is_some() {
                    self.create_task(world, new, limits).ok()
                } else {
                    Some(self.create_remote_task(new, c.pos, tick, limits))
                };
                report.created.extend(id);
            }
        }

        for agent in roster.iter() {
            if agent.spawning || self.agent_tasks.contains_key(&agent.id) {
                continue;
            }
            let Ok(strategy) = roles.lookup(agent.role()) else {
                continue;
            };
            let kinds = strategy.task_kinds(agent.memory.state);
            if kinds.is_empty() {
                continue;
            }
            match self.find_best_matching(agent, kinds).map(|t| t.id) {
                Some(task) => {
                    if self.assign(agent.id, task).is_ok() {
                        report.assigned.push((agent.id, task));
                    }
                }
                None => {
                    self.stats.idle += 1;
                    report.idle.push(agent.id);
                }
            }
        }
        report
    }

    pub fn load(store: &dyn StateStore) -> Result<Self, StoreError> {
        let state: Option<BoardState> =
            load_json(store, &Scope::Global(Registry::TaskTable), BOARD_VERSION)?;
        let mut board = Self::new();
        if let Some(state) = state {
            board.next_id = state.next_id;
            for task in state.tasks {
                for agent in &task.assigned {
                    board.agent_tasks.insert(*agent, task.id);
                }
                board.next_id = board.next_id.max(task.id.0);
                board.tasks.insert(task.id, task);
            }
        }
        Ok(board)
    }

    pub fn save(&self, store: &mut dyn StateStore) -> Result<(), StoreError> {
        let state = BoardState {
            next_id: self.next_id,
            tasks: self.tasks.values().cloned().collect(),
        };
        save_json(store, Scope::Global(Registry::TaskTable), BOARD_VERSION, &state)
    }
}

fn action_for(task: &Task, agent: &AgentRecord) -> PrimitiveAction {
    let target = task.target;
    match task.kind {
        TaskKind::Harvest => PrimitiveAction::Gather { target },
        TaskKind::Upgrade => PrimitiveAction::Upgrade { target },
        TaskKind::Build => PrimitiveAction::Build { target },
        TaskKind::Repair => PrimitiveAction::Repair { target },
        TaskKind::Dismantle => PrimitiveAction::Dismantle { target },
        TaskKind::Transfer => PrimitiveAction::Transfer {
            target,
            resource: task
                .resource
                .or_else(|| agent.store.dominant())
                .unwrap_or(ResourceKind::Energy),
            amount: task.amount.map(|a| a.min(agent.store.used())),
        },
        TaskKind::Withdraw => PrimitiveAction::Withdraw {
            target,
            resource: task.resource.unwrap_or(ResourceKind::Energy),
            amount: task.amount.map(|a| a.min(agent.store.free())),
        },
        TaskKind::Pickup => PrimitiveAction::Pickup { target },
        TaskKind::Attack => PrimitiveAction::MeleeAttack { target },
        TaskKind::RangedAttack => PrimitiveAction::RangedAttack { target },
        TaskKind::Heal => PrimitiveAction::Heal { target },
        TaskKind::ClaimController => PrimitiveAction::Claim { target },
        TaskKind::ReserveController => PrimitiveAction::Reserve { target },
    }
}

/// Energy a single work action moves per work unit.
const WORK_RATE: u32 = 1;
/// Energy a gather action yields per work unit.
const GATHER_RATE: u32 = 2;

fn status_after(
    kind: TaskKind,
    result: ActionResult,
    agent: &AgentRecord,
    target: &Entity,
    config: &ColonyConfig,
) -> TaskStatus {
    let works = agent.body.count(CapabilityUnit::Work);
    match result {
        ActionResult::NotInRange => TaskStatus::InProgress,
        ActionResult::Failed(FailReason::Tired | FailReason::Busy) => TaskStatus::InProgress,
        ActionResult::Failed(FailReason::Full)
            if kind.fills_store() || kind == TaskKind::Transfer =>
        {
            TaskStatus::Completed
        }
        ActionResult::Failed(FailReason::NotEnoughResources) if kind.consumes_energy() => {
            TaskStatus::Completed
        }
        ActionResult::Failed(_) => TaskStatus::Failed,
        ActionResult::Ok => match kind {
            TaskKind::Transfer
            | TaskKind::Withdraw
            | TaskKind::Pickup
            | TaskKind::ClaimController => TaskStatus::Completed,
            TaskKind::Harvest | TaskKind::Dismantle => {
                if agent.store.capacity > 0 && agent.store.free() <= works * GATHER_RATE {
                    TaskStatus::Completed
                } else {
                    TaskStatus::InProgress
                }
            }
            TaskKind::Build | TaskKind::Repair | TaskKind::Upgrade => {
                let energy = agent.store.get(ResourceKind::Energy);
                let finished = match &target.kind {
                    EntityKind::Site(site) => {
                        site.progress + works * WORK_RATE * 5 >= site.progress_total
                    }
                    _ => false,
                };
                if finished || energy <= works * WORK_RATE {
                    TaskStatus::Completed
                } else {
                    TaskStatus::InProgress
                }
            }
            TaskKind::ReserveController => {
                // The accepted action adds one tick per claim unit.
                let claims = agent.body.count(CapabilityUnit::Claim);
                if reserved_ticks(target) + claims >= config.expansion.reserve_target {
                    TaskStatus::Completed
                } else {
                    TaskStatus::InProgress
                }
            }
            TaskKind::Attack | TaskKind::RangedAttack | TaskKind::Heal => TaskStatus::InProgress,
        },
    }
}

/// Whether the task's success condition already holds.
fn is_satisfied(task: &Task, entity: &Entity, config: &ColonyConfig) -> bool {
    let resource = task.resource.unwrap_or(ResourceKind::Energy);
    match (&task.kind, &entity.kind) {
        (TaskKind::Harvest, EntityKind::Source(s)) => s.energy == 0,
        (TaskKind::Build, EntityKind::Site(site)) => site.is_complete(),
        (TaskKind::Repair, EntityKind::Structure(s)) => {
            if s.kind.is_fortification() {
                s.hits >= config.planner.fortification_floor.min(s.hits_max)
            } else {
                s.hits >= s.hits_max
            }
        }
        (TaskKind::Transfer, _) => entity.store().map_or(true, |st| st.free() == 0),
        (TaskKind::Withdraw, _) => entity.store().map_or(true, |st| st.get(resource) == 0),
        (TaskKind::Pickup, EntityKind::Dropped(d)) => d.amount == 0,
        (TaskKind::Heal, EntityKind::Agent(a)) => a.hits >= a.hits_max,
        (TaskKind::Attack | TaskKind::RangedAttack, _) => !entity.is_hostile(),
        (TaskKind::ClaimController, EntityKind::Controller(c)) => {
            entity.owner == Owner::Mine && c.level > 0
        }
        (TaskKind::ReserveController, EntityKind::Controller(c)) => {
            c.level > 0 || reserved_ticks(entity) >= config.expansion.reserve_target
        }
        (TaskKind::Upgrade, EntityKind::Controller(_)) => entity.owner != Owner::Mine,
        (TaskKind::Dismantle, _) => entity.is_mine(),
        // Target is of the wrong kind for the task.
        _ => true,
    }
}

/// Ticks of our own reservation on a controller; zero for anything else.
fn reserved_ticks(entity: &Entity) -> u32 {
    match &entity.kind {
        EntityKind::Controller(c) => c
            .reservation
            .filter(|r| r.owner == Owner::Mine)
            .map_or(0, |r| r.ticks),
        _ => 0,
    }
}

/// Whether an unassigned opportunity task still represents open work.
fn is_live(task: &Task, entity: &Entity, config: &ColonyConfig) -> bool {
    let planner = &config.planner;
    match &entity.kind {
        EntityKind::Structure(s) if task.kind == TaskKind::Repair => {
            if s.kind.is_fortification() {
                s.hits < planner.fortification_floor
            } else {
                s.health_fraction() < planner.repair_fraction
            }
        }
        EntityKind::Dropped(d) if task.kind == TaskKind::Pickup => {
            d.amount >= planner.min_pickup_amount
        }
        EntityKind::Source(s) => s.energy > 0,
        // Everything else stays open until its success condition holds.
        _ => true,
    }
}
