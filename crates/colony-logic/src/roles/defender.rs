use crate::action::PrimitiveAction;
use crate::capability::{scale_pattern, Body, CapabilitySet, CapabilityUnit::*};
use crate::error::DispatchError;
use crate::fsm::AgentCtx;
use crate::memory::StateTag;
use crate::roles::common::return_home;
use crate::roles::{level_repeats, RoleStrategy, RoleTag, StateOutcome};
use crate::task::TaskKind;
use crate::world::Category;

/// Guards the home zone against hostile agents.
pub struct DefenderStrategy;

const FIGHT: &[TaskKind] = &[TaskKind::Attack, TaskKind::RangedAttack];

impl RoleStrategy for DefenderStrategy {
    fn role(&self) -> RoleTag {
        RoleTag::Defender
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::of(&[Attack, RangedAttack])
    }

    fn body(&self, budget: u32, level: u8) -> Body {
        scale_pattern(
            &[Tough, Tough],
            &[Attack, RangedAttack, Move, Move],
            budget,
            level_repeats(level, 1, 4),
        )
    }

    fn initial_state(&self) -> StateTag {
        StateTag::Patrolling
    }

    fn states(&self) -> &'static [StateTag] {
        &[StateTag::Patrolling, StateTag::Engaging]
    }

    fn task_kinds(&self, state: StateTag) -> &'static [TaskKind] {
        match state {
            StateTag::Patrolling | StateTag::Engaging => FIGHT,
            _ => &[],
        }
    }

    fn deficit_task(&self) -> Option<TaskKind> {
        Some(TaskKind::Attack)
    }

    fn on_state(
        &self,
        state: StateTag,
        ctx: &mut AgentCtx<'_>,
    ) -> Result<StateOutcome, DispatchError> {
        match state {
            StateTag::Patrolling => Ok(patrol(ctx)),
            StateTag::Engaging => engage(ctx),
            other => Err(DispatchError::UnhandledState {
                role: self.role(),
                state: other,
            }),
        }
    }
}

fn patrol(ctx: &mut AgentCtx<'_>) -> StateOutcome {
    let threatened = ctx.current_task().is_some()
        || ctx.nearest(Category::HostileAgents, |_| true).is_some();
    if threatened {
        return StateOutcome::go(StateTag::Engaging);
    }
    if let Some(outcome) = return_home(ctx) {
        return StateOutcome::stay(outcome);
    }
    StateOutcome::stay(ctx.idle())
}

fn engage(ctx: &mut AgentCtx<'_>) -> Result<StateOutcome, DispatchError> {
    if let Some(run) = ctx.run_task(FIGHT)? {
        return Ok(StateOutcome::stay(run.outcome()));
    }
    let foe = match ctx.require_target()? {
        Some(e) if e.is_hostile() => Some(e),
        _ => ctx.nearest(Category::HostileAgents, |_| true),
    };
    let Some(foe) = foe else {
        return Ok(StateOutcome::go(StateTag::Patrolling));
    };
    ctx.set_target(Some(foe.id));
    let action = if ctx.agent.has(Attack) && ctx.pos().in_range(&foe.pos, 1) {
        PrimitiveAction::MeleeAttack { target: foe.id }
    } else if ctx.agent.has(RangedAttack) {
        PrimitiveAction::RangedAttack { target: foe.id }
    } else {
        PrimitiveAction::MeleeAttack { target: foe.id }
    };
    Ok(StateOutcome::stay(ctx.act_or_approach(action, foe.pos)))
}
