//! Role strategies.
//!
//! Roles are a closed set ([`RoleTag`]); each maps to a [`RoleStrategy`]
//! implementation resolved once through the [`RoleRegistry`]. A strategy
//! owns body composition, default memory, the task kinds an idle agent in a
//! given state may be handed, and one handler per FSM state.
//!
//! | Role | States | Deficit task |
//! |------|--------|--------------|
//! | Harvester | Harvesting ↔ Delivering | Harvest |
//! | Hauler | Collecting ↔ Delivering | Withdraw |
//! | Builder | Collecting ↔ Building | Build |
//! | Upgrader | Collecting ↔ Upgrading | Upgrade |
//! | Repairer | Collecting ↔ Repairing | Repair |
//! | Defender | Patrolling ↔ Engaging | Attack |
//! | Healer | Patrolling ↔ Healing | Heal |
//! | Claimer | Patrolling ↔ Claiming | ClaimController |
//! | Scout | Scouting ↔ Patrolling | none |

mod builder;
mod claimer;
mod common;
mod defender;
mod harvester;
mod hauler;
mod healer;
mod repairer;
mod scout;
mod upgrader;

pub use builder::BuilderStrategy;
pub use claimer::ClaimerStrategy;
pub use defender::DefenderStrategy;
pub use harvester::HarvesterStrategy;
pub use hauler::HaulerStrategy;
pub use healer::HealerStrategy;
pub use repairer::RepairerStrategy;
pub use scout::ScoutStrategy;
pub use upgrader::UpgraderStrategy;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::action::ActionResult;
use crate::capability::{Body, CapabilitySet, CapabilityUnit};
use crate::error::{DispatchError, RegistryError};
use crate::fsm::AgentCtx;
use crate::memory::{AgentMemory, StateTag};
use crate::task::TaskKind;
use crate::types::ZoneId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RoleTag {
    Harvester,
    Hauler,
    Builder,
    Upgrader,
    Repairer,
    Defender,
    Healer,
    Claimer,
    Scout,
}

impl RoleTag {
    pub const ALL: [RoleTag; 9] = [
        RoleTag::Harvester,
        RoleTag::Hauler,
        RoleTag::Builder,
        RoleTag::Upgrader,
        RoleTag::Repairer,
        RoleTag::Defender,
        RoleTag::Healer,
        RoleTag::Claimer,
        RoleTag::Scout,
    ];

    /// Spawn order when several roles are short: lower spawns first.
    pub fn spawn_rank(self) -> u8 {
        match self {
            RoleTag::Harvester => 0,
            RoleTag::Hauler => 1,
            RoleTag::Defender => 2,
            RoleTag::Upgrader => 3,
            RoleTag::Builder => 4,
            RoleTag::Healer => 5,
            RoleTag::Repairer => 6,
            RoleTag::Claimer => 7,
            RoleTag::Scout => 8,
        }
    }

    /// Best guess at a role from capabilities alone, for agents whose role
    /// was lost.
    pub fn infer(caps: CapabilitySet) -> RoleTag {
        use CapabilityUnit::*;
        if caps.contains(Claim) {
            RoleTag::Claimer
        } else if caps.contains(Heal) {
            RoleTag::Healer
        } else if caps.contains(Attack) || caps.contains(RangedAttack) {
            RoleTag::Defender
        } else if caps.contains(Work) && caps.contains(Carry) {
            RoleTag::Harvester
        } else if caps.contains(Carry) {
            RoleTag::Hauler
        } else if caps.contains(Work) {
            RoleTag::Upgrader
        } else {
            RoleTag::Scout
        }
    }
}

impl fmt::Display for RoleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoleTag::Harvester => "harvester",
            RoleTag::Hauler => "hauler",
            RoleTag::Builder => "builder",
            RoleTag::Upgrader => "upgrader",
            RoleTag::Repairer => "repairer",
            RoleTag::Defender => "defender",
            RoleTag::Healer => "healer",
            RoleTag::Claimer => "claimer",
            RoleTag::Scout => "scout",
        };
        f.write_str(name)
    }
}

/// What a state handler did this invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing attempted (typically a pure transition).
    None,
    /// A primitive action reached the sink.
    Acted(ActionResult),
    /// Only a movement intent was issued.
    Moved,
    /// No work available; the agent fell back to its idle behavior.
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateOutcome {
    pub outcome: Outcome,
    pub next: Option<StateTag>,
}

impl StateOutcome {
    pub fn stay(outcome: Outcome) -> Self {
        Self {
            outcome,
            next: None,
        }
    }

    pub fn go(next: StateTag) -> Self {
        Self {
            outcome: Outcome::None,
            next: Some(next),
        }
    }

    pub fn then(mut self, next: StateTag) -> Self {
        self.next = Some(next);
        self
    }
}

/// Behavior policy of one role.
pub trait RoleStrategy: Send + Sync {
    fn role(&self) -> RoleTag;

    /// Units the role's work depends on.
    fn capabilities(&self) -> CapabilitySet;

    /// Ordered body for a spawn. Must never cost more than `budget`; empty
    /// when nothing useful fits.
    fn body(&self, budget: u32, level: u8) -> Body;

    fn initial_state(&self) -> StateTag;

    /// Every state this role has a handler for.
    fn states(&self) -> &'static [StateTag];

    fn default_memory(&self, home: ZoneId) -> AgentMemory {
        AgentMemory::new(self.role(), self.initial_state(), home)
    }

    /// Task kinds the allocator may hand an idle agent in `state`.
    fn task_kinds(&self, state: StateTag) -> &'static [TaskKind];

    /// Task kind a population deficit of this role turns into.
    fn deficit_task(&self) -> Option<TaskKind> {
        None
    }

    fn on_state(
        &self,
        state: StateTag,
        ctx: &mut AgentCtx<'_>,
    ) -> Result<StateOutcome, DispatchError>;
}

/// Role tag → strategy table, built once at startup.
#[derive(Default)]
pub struct RoleRegistry {
    strategies: BTreeMap<RoleTag, Box<dyn RoleStrategy>>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in strategy.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(HarvesterStrategy));
        registry.register(Box::new(HaulerStrategy));
        registry.register(Box::new(BuilderStrategy));
        registry.register(Box::new(UpgraderStrategy));
        registry.register(Box::new(RepairerStrategy));
        registry.register(Box::new(DefenderStrategy));
        registry.register(Box::new(HealerStrategy));
        registry.register(Box::new(ClaimerStrategy));
        registry.register(Box::new(ScoutStrategy));
        registry
    }

    /// Registers a strategy under its own role, replacing any previous one.
    pub fn register(&mut self, strategy: Box<dyn RoleStrategy>) {
        self.strategies.insert(strategy.role(), strategy);
    }

    pub fn lookup(&self, role: RoleTag) -> Result<&dyn RoleStrategy, RegistryError> {
        self.strategies
            .get(&role)
            .map(|s| s.as_ref())
            .ok_or(RegistryError::UnknownRole(role))
    }

    pub fn contains(&self, role: RoleTag) -> bool {
        self.strategies.contains_key(&role)
    }

    pub fn roles(&self) -> impl Iterator<Item = RoleTag> + '_ {
        self.strategies.keys().copied()
    }
}

/// Repeat cap for worker bodies: grows with zone level.
pub(crate) fn level_repeats(level: u8, base: u32, cap: u32) -> u32 {
    (base + u32::from(level)).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::StateFamily;

    #[test]
    fn test_lookup_unknown_role() {
        let mut registry = RoleRegistry::new();
        registry.register(Box::new(HarvesterStrategy));
        assert!(registry.lookup(RoleTag::Harvester).is_ok());
        assert_eq!(
            registry.lookup(RoleTag::Scout).err(),
            Some(RegistryError::UnknownRole(RoleTag::Scout))
        );
    }

    #[test]
    fn test_standard_registry_covers_every_role() {
        let registry = RoleRegistry::standard();
        for role in RoleTag::ALL {
            let strategy = registry.lookup(role).unwrap();
            assert_eq!(strategy.role(), role);
            assert!(strategy.states().contains(&strategy.initial_state()));
        }
    }

    #[test]
    fn test_bodies_never_exceed_budget() {
        let registry = RoleRegistry::standard();
        for role in RoleTag::ALL {
            let strategy = registry.lookup(role).unwrap();
            for budget in [0, 50, 200, 300, 550, 800, 1300, 2300, 5600] {
                for level in 0..=8 {
                    let body = strategy.body(budget, level);
                    assert!(
                        body.cost() <= budget,
                        "{role} at budget {budget} level {level} costs {}",
                        body.cost()
                    );
                }
            }
        }
    }

    #[test]
    fn test_affordable_bodies_carry_role_capabilities() {
        let registry = RoleRegistry::standard();
        for role in RoleTag::ALL {
            let strategy = registry.lookup(role).unwrap();
            let body = strategy.body(5_000, 8);
            let caps = body.capabilities();
            for unit in strategy.capabilities().iter() {
                assert!(caps.contains(unit), "{role} body lacks {unit}");
            }
            assert!(caps.contains(CapabilityUnit::Move), "{role} cannot move");
        }
    }

    #[test]
    fn test_every_role_has_collecting_and_spending_states() {
        let registry = RoleRegistry::standard();
        for role in RoleTag::ALL {
            let states = registry.lookup(role).unwrap().states();
            assert!(
                states.iter().any(|s| s.family() == StateFamily::Collecting),
                "{role} has no collecting state"
            );
            assert!(
                states.iter().any(|s| s.family() == StateFamily::Spending),
                "{role} has no spending state"
            );
            assert!(states.iter().all(|s| s.family() != StateFamily::Special));
        }
        assert_eq!(StateTag::Unknown.family(), StateFamily::Special);
    }

    #[test]
    fn test_infer_role_from_capabilities() {
        use CapabilityUnit::*;
        assert_eq!(RoleTag::infer(CapabilitySet::of(&[Claim, Move])), RoleTag::Claimer);
        assert_eq!(RoleTag::infer(CapabilitySet::of(&[Heal, Move])), RoleTag::Healer);
        assert_eq!(
            RoleTag::infer(CapabilitySet::of(&[RangedAttack, Move])),
            RoleTag::Defender
        );
        assert_eq!(
            RoleTag::infer(CapabilitySet::of(&[Work, Carry, Move])),
            RoleTag::Harvester
        );
        assert_eq!(RoleTag::infer(CapabilitySet::of(&[Carry, Move])), RoleTag::Hauler);
        assert_eq!(RoleTag::infer(CapabilitySet::of(&[Move])), RoleTag::Scout);
    }

    #[test]
    fn test_deficit_tasks_need_role_capabilities() {
        let registry = RoleRegistry::standard();
        for role in RoleTag::ALL {
            let strategy = registry.lookup(role).unwrap();
            if let Some(kind) = strategy.deficit_task() {
                assert!(strategy.capabilities().contains(kind.required_unit()));
            }
        }
    }
}
