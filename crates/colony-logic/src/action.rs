//! Primitive action surface and the per-tick Action Guard.
//!
//! Every world-mutating call an agent can make is a [`PrimitiveAction`]
//! routed through an [`ActionSink`]. The [`ActionGuard`] latch allows one
//! such call per agent per tick; later calls in the same tick are dropped
//! without touching the sink. Movement intents bypass the guard.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::capability::{Body, CapabilityUnit};
use crate::cost::CostSurface;
use crate::roles::RoleTag;
use crate::types::{AgentId, EntityId, Pos, ResourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveAction {
    Gather {
        target: EntityId,
    },
    Build {
        target: EntityId,
    },
    Repair {
        target: EntityId,
    },
    Upgrade {
        target: EntityId,
    },
    Dismantle {
        target: EntityId,
    },
    /// `amount: None` moves as much as fits.
    Transfer {
        target: EntityId,
        resource: ResourceKind,
        amount: Option<u32>,
    },
    Withdraw {
        target: EntityId,
        resource: ResourceKind,
        amount: Option<u32>,
    },
    Pickup {
        target: EntityId,
    },
    MeleeAttack {
        target: EntityId,
    },
    RangedAttack {
        target: EntityId,
    },
    Heal {
        target: EntityId,
    },
    Claim {
        target: EntityId,
    },
    Reserve {
        target: EntityId,
    },
}

impl PrimitiveAction {
    pub fn target(&self) -> EntityId {
        match *self {
            PrimitiveAction::Gather { target }
            | PrimitiveAction::Build { target }
            | PrimitiveAction::Repair { target }
            | PrimitiveAction::Upgrade { target }
            | PrimitiveAction::Dismantle { target }
            | PrimitiveAction::Transfer { target, .. }
            | PrimitiveAction::Withdraw { target, .. }
            | PrimitiveAction::Pickup { target }
            | PrimitiveAction::MeleeAttack { target }
            | PrimitiveAction::RangedAttack { target }
            | PrimitiveAction::Heal { target }
            | PrimitiveAction::Claim { target }
            | PrimitiveAction::Reserve { target } => target,
        }
    }

    pub fn required_unit(&self) -> CapabilityUnit {
        match self {
            PrimitiveAction::Gather { .. }
            | PrimitiveAction::Build { .. }
            | PrimitiveAction::Repair { .. }
            | PrimitiveAction::Upgrade { .. }
            | PrimitiveAction::Dismantle { .. } => CapabilityUnit::Work,
            PrimitiveAction::Transfer { .. }
            | PrimitiveAction::Withdraw { .. }
            | PrimitiveAction::Pickup { .. } => CapabilityUnit::Carry,
            PrimitiveAction::MeleeAttack { .. } => CapabilityUnit::Attack,
            PrimitiveAction::RangedAttack { .. } => CapabilityUnit::RangedAttack,
            PrimitiveAction::Heal { .. } => CapabilityUnit::Heal,
            PrimitiveAction::Claim { .. } | PrimitiveAction::Reserve { .. } => {
                CapabilityUnit::Claim
            }
        }
    }

    /// Maximum Chebyshev range at which the action succeeds.
    pub fn range(&self) -> u32 {
        match self {
            PrimitiveAction::Build { .. }
            | PrimitiveAction::Repair { .. }
            | PrimitiveAction::Upgrade { .. }
            | PrimitiveAction::RangedAttack { .. } => 3,
            _ => 1,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveAction::Gather { .. } => "gather",
            PrimitiveAction::Build { .. } => "build",
            PrimitiveAction::Repair { .. } => "repair",
            PrimitiveAction::Upgrade { .. } => "upgrade",
            PrimitiveAction::Dismantle { .. } => "dismantle",
            PrimitiveAction::Transfer { .. } => "transfer",
            PrimitiveAction::Withdraw { .. } => "withdraw",
            PrimitiveAction::Pickup { .. } => "pickup",
            PrimitiveAction::MeleeAttack { .. } => "melee_attack",
            PrimitiveAction::RangedAttack { .. } => "ranged_attack",
            PrimitiveAction::Heal { .. } => "heal",
            PrimitiveAction::Claim { .. } => "claim",
            PrimitiveAction::Reserve { .. } => "reserve",
        }
    }
}

impl fmt::Display for PrimitiveAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name(), self.target())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailReason {
    InvalidTarget,
    NotEnoughResources,
    Full,
    MissingCapability,
    NotOwner,
    Busy,
    Tired,
}

/// Tri-state result of every primitive call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionResult {
    Ok,
    /// Move toward the target and retry next tick.
    NotInRange,
    Failed(FailReason),
}

impl ActionResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, ActionResult::Ok)
    }
}

/// The world's mutating surface.
pub trait ActionSink {
    fn perform(&mut self, agent: AgentId, action: &PrimitiveAction) -> ActionResult;

    /// Requests movement toward `goal` until within `range`. The sink plans
    /// the path over `surface`.
    fn move_intent(
        &mut self,
        agent: AgentId,
        goal: Pos,
        range: u32,
        surface: &CostSurface,
    ) -> ActionResult;

    fn spawn(&mut self, spawn: EntityId, role: RoleTag, body: &Body) -> ActionResult;
}

/// Per-agent, per-tick latch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionGuard {
    spent: bool,
    blocked: u32,
}

impl ActionGuard {
    pub fn reset(&mut self) {
        self.spent = false;
        self.blocked = 0;
    }

    pub fn is_spent(&self) -> bool {
        self.spent
    }

    /// Calls dropped since the last reset.
    pub fn blocked(&self) -> u32 {
        self.blocked
    }

    /// Consumes the latch. Returns false, and counts the attempt, when it
    /// was already consumed this tick.
    pub fn try_consume(&mut self) -> bool {
        if self.spent {
            self.blocked += 1;
            false
        } else {
            self.spent = true;
            true
        }
    }

    /// Routes `action` to the sink if the latch is free. `None` means the
    /// call was dropped.
    pub fn perform(
        &mut self,
        sink: &mut dyn ActionSink,
        agent: AgentId,
        action: &PrimitiveAction,
    ) -> Option<ActionResult> {
        if !self.try_consume() {
            log::trace!("{agent}: dropped {action}, action already taken this tick");
            return None;
        }
        Some(sink.perform(agent, action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;

    #[test]
    fn test_guard_accepts_exactly_one_action() {
        let mut sink = RecordingSink::default();
        let mut guard = ActionGuard::default();
        let agent = AgentId(1);
        let action = PrimitiveAction::Gather {
            target: EntityId(5),
        };
        assert_eq!(
            guard.perform(&mut sink, agent, &action),
            Some(ActionResult::Ok)
        );
        for _ in 0..5 {
            assert_eq!(guard.perform(&mut sink, agent, &action), None);
        }
        assert_eq!(sink.performed.len(), 1);
        assert_eq!(guard.blocked(), 5);

        guard.reset();
        assert!(!guard.is_spent());
        assert!(guard.perform(&mut sink, agent, &action).is_some());
        assert_eq!(sink.performed.len(), 2);
    }

    #[test]
    fn test_failed_action_still_spends_guard() {
        let mut sink = RecordingSink::default();
        sink.script(ActionResult::Failed(FailReason::Full));
        let mut guard = ActionGuard::default();
        let action = PrimitiveAction::Pickup {
            target: EntityId(3),
        };
        let r = guard.perform(&mut sink, AgentId(2), &action);
        assert_eq!(r, Some(ActionResult::Failed(FailReason::Full)));
        assert!(guard.is_spent());
    }

    #[test]
    fn test_action_ranges_and_units() {
        let t = EntityId(1);
        assert_eq!(PrimitiveAction::Build { target: t }.range(), 3);
        assert_eq!(PrimitiveAction::Gather { target: t }.range(), 1);
        assert_eq!(
            PrimitiveAction::Reserve { target: t }.required_unit(),
            CapabilityUnit::Claim
        );
        assert_eq!(
            PrimitiveAction::Pickup { target: t }.required_unit(),
            CapabilityUnit::Carry
        );
    }
}
