use crate::capability::{scale_pattern, Body, CapabilitySet, CapabilityUnit::*};
use crate::error::DispatchError;
use crate::fsm::AgentCtx;
use crate::memory::StateTag;
use crate::roles::common::{carried_energy, collect_then, deliver_energy};
use crate::roles::{level_repeats, RoleStrategy, RoleTag, StateOutcome};
use crate::task::TaskKind;

/// Moves energy from containers and the ground to the refill sinks.
pub struct HaulerStrategy;

const COLLECT: &[TaskKind] = &[TaskKind::Pickup, TaskKind::Withdraw];
const DELIVER: &[TaskKind] = &[TaskKind::Transfer];

impl RoleStrategy for HaulerStrategy {
    fn role(&self) -> RoleTag {
        RoleTag::Hauler
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::of(&[Carry])
    }

    fn body(&self, budget: u32, level: u8) -> Body {
        scale_pattern(&[], &[Carry, Carry, Move], budget, level_repeats(level, 1, 8))
    }

    fn initial_state(&self) -> StateTag {
        StateTag::Collecting
    }

    fn states(&self) -> &'static [StateTag] {
        &[StateTag::Collecting, StateTag::Delivering]
    }

    fn task_kinds(&self, state: StateTag) -> &'static [TaskKind] {
        match state {
            StateTag::Collecting => COLLECT,
            StateTag::Delivering => DELIVER,
            _ => &[],
        }
    }

    fn deficit_task(&self) -> Option<TaskKind> {
        Some(TaskKind::Withdraw)
    }

    fn on_state(
        &self,
        state: StateTag,
        ctx: &mut AgentCtx<'_>,
    ) -> Result<StateOutcome, DispatchError> {
        match state {
            StateTag::Collecting => collect_then(ctx, COLLECT, StateTag::Delivering),
            StateTag::Delivering => deliver(ctx),
            other => Err(DispatchError::UnhandledState {
                role: self.role(),
                state: other,
            }),
        }
    }
}

fn deliver(ctx: &mut AgentCtx<'_>) -> Result<StateOutcome, DispatchError> {
    if carried_energy(ctx) == 0 {
        return Ok(StateOutcome::go(StateTag::Collecting));
    }
    if let Some(run) = ctx.run_task(DELIVER)? {
        return Ok(StateOutcome::stay(run.outcome()));
    }
    let outcome = deliver_energy(ctx).unwrap_or_else(|| ctx.idle());
    Ok(StateOutcome::stay(outcome))
}
