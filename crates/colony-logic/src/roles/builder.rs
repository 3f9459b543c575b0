use crate::capability::{scale_pattern, Body, CapabilitySet, CapabilityUnit::*};
use crate::error::DispatchError;
use crate::fsm::AgentCtx;
use crate::memory::StateTag;
use crate::roles::common::{build_nearest, carried_energy, collect_then, upgrade_controller};
use crate::roles::{level_repeats, RoleStrategy, RoleTag, StateOutcome};
use crate::task::TaskKind;

/// Turns construction sites into structures; upgrades when there are none.
pub struct BuilderStrategy;

const COLLECT: &[TaskKind] = &[TaskKind::Withdraw, TaskKind::Pickup];
const SPEND: &[TaskKind] = &[TaskKind::Build, TaskKind::Repair];

impl RoleStrategy for BuilderStrategy {
    fn role(&self) -> RoleTag {
        RoleTag::Builder
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::of(&[Work, Carry])
    }

    fn body(&self, budget: u32, level: u8) -> Body {
        scale_pattern(&[], &[Work, Carry, Move], budget, level_repeats(level, 1, 5))
    }

    fn initial_state(&self) -> StateTag {
        StateTag::Collecting
    }

    fn states(&self) -> &'static [StateTag] {
        &[StateTag::Collecting, StateTag::Building]
    }

    fn task_kinds(&self, state: StateTag) -> &'static [TaskKind] {
        match state {
            StateTag::Collecting => COLLECT,
            StateTag::Building => SPEND,
            _ => &[],
        }
    }

    fn deficit_task(&self) -> Option<TaskKind> {
        Some(TaskKind::Build)
    }

    fn on_state(
        &self,
        state: StateTag,
        ctx: &mut AgentCtx<'_>,
    ) -> Result<StateOutcome, DispatchError> {
        match state {
            StateTag::Collecting => collect_then(ctx, COLLECT, StateTag::Building),
            StateTag::Building => build(ctx),
            other => Err(DispatchError::UnhandledState {
                role: self.role(),
                state: other,
            }),
        }
    }
}

fn build(ctx: &mut AgentCtx<'_>) -> Result<StateOutcome, DispatchError> {
    if carried_energy(ctx) == 0 {
        return Ok(StateOutcome::go(StateTag::Collecting));
    }
    if let Some(run) = ctx.run_task(SPEND)? {
        return Ok(StateOutcome::stay(run.outcome()));
    }
    let outcome = build_nearest(ctx)
        .or_else(|| upgrade_controller(ctx))
        .unwrap_or_else(|| ctx.idle());
    Ok(StateOutcome::stay(outcome))
}
