use crate::capability::{scale_pattern, Body, CapabilitySet, CapabilityUnit::*};
use crate::error::DispatchError;
use crate::fsm::AgentCtx;
use crate::memory::StateTag;
use crate::roles::common::{carried_energy, collect_then, upgrade_controller};
use crate::roles::{level_repeats, RoleStrategy, RoleTag, StateOutcome};
use crate::task::TaskKind;

pub struct UpgraderStrategy;

const COLLECT: &[TaskKind] = &[TaskKind::Withdraw, TaskKind::Pickup];
const SPEND: &[TaskKind] = &[TaskKind::Upgrade];

impl RoleStrategy for UpgraderStrategy {
    fn role(&self) -> RoleTag {
        RoleTag::Upgrader
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::of(&[Work, Carry])
    }

    fn body(&self, budget: u32, level: u8) -> Body {
        scale_pattern(&[], &[Work, Work, Carry, Move], budget, level_repeats(level, 1, 4))
    }

    fn initial_state(&self) -> StateTag {
        StateTag::Collecting
    }

    fn states(&self) -> &'static [StateTag] {
        &[StateTag::Collecting, StateTag::Upgrading]
    }

    fn task_kinds(&self, state: StateTag) -> &'static [TaskKind] {
        match state {
            StateTag::Collecting => COLLECT,
            StateTag::Upgrading => SPEND,
            _ => &[],
        }
    }

    fn deficit_task(&self) -> Option<TaskKind> {
        Some(TaskKind::Upgrade)
    }

    fn on_state(
        &self,
        state: StateTag,
        ctx: &mut AgentCtx<'_>,
    ) -> Result<StateOutcome, DispatchError> {
        match state {
            StateTag::Collecting => collect_then(ctx, COLLECT, StateTag::Upgrading),
            StateTag::Upgrading => upgrade(ctx),
            other => Err(DispatchError::UnhandledState {
                role: self.role(),
                state: other,
            }),
        }
    }
}

fn upgrade(ctx: &mut AgentCtx<'_>) -> Result<StateOutcome, DispatchError> {
    if carried_energy(ctx) == 0 {
        return Ok(StateOutcome::go(StateTag::Collecting));
    }
    if let Some(run) = ctx.run_task(SPEND)? {
        return Ok(StateOutcome::stay(run.outcome()));
    }
    let outcome = upgrade_controller(ctx).unwrap_or_else(|| ctx.idle());
    Ok(StateOutcome::stay(outcome))
}
