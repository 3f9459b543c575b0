use crate::capability::{scale_pattern, Body, CapabilitySet, CapabilityUnit::*};
use crate::error::DispatchError;
use crate::fsm::AgentCtx;
use crate::memory::StateTag;
use crate::roles::common::{carried_energy, collect_then, repair_damaged, upgrade_controller};
use crate::roles::{level_repeats, RoleStrategy, RoleTag, StateOutcome};
use crate::task::TaskKind;

/// Keeps structures above the repair threshold, most damaged first.
pub struct RepairerStrategy;

const COLLECT: &[TaskKind] = &[TaskKind::Withdraw, TaskKind::Pickup];
const SPEND: &[TaskKind] = &[TaskKind::Repair];

impl RoleStrategy for RepairerStrategy {
    fn role(&self) -> RoleTag {
        RoleTag::Repairer
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::of(&[Work, Carry])
    }

    fn body(&self, budget: u32, level: u8) -> Body {
        scale_pattern(&[], &[Work, Carry, Move], budget, level_repeats(level, 1, 4))
    }

    fn initial_state(&self) -> StateTag {
        StateTag::Collecting
    }

    fn states(&self) -> &'static [StateTag] {
        &[StateTag::Collecting, StateTag::Repairing]
    }

    fn task_kinds(&self, state: StateTag) -> &'static [TaskKind] {
        match state {
            StateTag::Collecting => COLLECT,
            StateTag::Repairing => SPEND,
            _ => &[],
        }
    }

    fn deficit_task(&self) -> Option<TaskKind> {
        Some(TaskKind::Repair)
    }

    fn on_state(
        &self,
        state: StateTag,
        ctx: &mut AgentCtx<'_>,
    ) -> Result<StateOutcome, DispatchError> {
        match state {
            StateTag::Collecting => collect_then(ctx, COLLECT, StateTag::Repairing),
            StateTag::Repairing => repair(ctx),
            other => Err(DispatchError::UnhandledState {
                role: self.role(),
                state: other,
            }),
        }
    }
}

fn repair(ctx: &mut AgentCtx<'_>) -> Result<StateOutcome, DispatchError> {
    if carried_energy(ctx) == 0 {
        return Ok(StateOutcome::go(StateTag::Collecting));
    }
    if let Some(run) = ctx.run_task(SPEND)? {
        return Ok(StateOutcome::stay(run.outcome()));
    }
    let outcome = repair_damaged(ctx)
        .or_else(|| upgrade_controller(ctx))
        .unwrap_or_else(|| ctx.idle());
    Ok(StateOutcome::stay(outcome))
}
