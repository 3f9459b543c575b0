use crate::capability::{scale_pattern, Body, CapabilitySet, CapabilityUnit::*};
use crate::error::DispatchError;
use crate::fsm::AgentCtx;
use crate::memory::StateTag;
use crate::roles::common::return_home;
use crate::roles::{RoleStrategy, RoleTag, StateOutcome};
use crate::task::TaskKind;

/// Takes or reserves the controllers of expansion targets.
pub struct ClaimerStrategy;

const CLAIM: &[TaskKind] = &[TaskKind::ClaimController, TaskKind::ReserveController];

impl RoleStrategy for ClaimerStrategy {
    fn role(&self) -> RoleTag {
        RoleTag::Claimer
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::of(&[Claim])
    }

    fn body(&self, budget: u32, level: u8) -> Body {
        let repeats = if level >= 5 { 2 } else { 1 };
        scale_pattern(&[], &[Claim, Move], budget, repeats)
    }

    fn initial_state(&self) -> StateTag {
        StateTag::Patrolling
    }

    fn states(&self) -> &'static [StateTag] {
        &[StateTag::Patrolling, StateTag::Claiming]
    }

    fn task_kinds(&self, state: StateTag) -> &'static [TaskKind] {
        match state {
            StateTag::Patrolling | StateTag::Claiming => CLAIM,
            _ => &[],
        }
    }

    fn deficit_task(&self) -> Option<TaskKind> {
        Some(TaskKind::ClaimController)
    }

    fn on_state(
        &self,
        state: StateTag,
        ctx: &mut AgentCtx<'_>,
    ) -> Result<StateOutcome, DispatchError> {
        match state {
            StateTag::Patrolling => Ok(wait_for_target(ctx)),
            StateTag::Claiming => claim(ctx),
            other => Err(DispatchError::UnhandledState {
                role: self.role(),
                state: other,
            }),
        }
    }
}

fn wait_for_target(ctx: &mut AgentCtx<'_>) -> StateOutcome {
    if ctx.current_task().is_some() || ctx.acquire_task(CLAIM).is_some() {
        return StateOutcome::go(StateTag::Claiming);
    }
    if let Some(outcome) = return_home(ctx) {
        return StateOutcome::stay(outcome);
    }
    StateOutcome::stay(ctx.idle())
}

/// Reservation tasks complete once our reservation reaches the configured
/// target; cleanup then retires them as satisfied.
fn claim(ctx: &mut AgentCtx<'_>) -> Result<StateOutcome, DispatchError> {
    match ctx.run_task(CLAIM)? {
        Some(run) if run.is_done() => {
            Ok(StateOutcome::stay(run.outcome()).then(StateTag::Patrolling))
        }
        Some(run) => Ok(StateOutcome::stay(run.outcome())),
        None => Ok(StateOutcome::go(StateTag::Patrolling)),
    }
}
