use crate::action::PrimitiveAction;
use crate::capability::{scale_pattern, Body, CapabilitySet, CapabilityUnit::*};
use crate::error::DispatchError;
use crate::fsm::AgentCtx;
use crate::memory::StateTag;
use crate::roles::common::return_home;
use crate::roles::{level_repeats, RoleStrategy, RoleTag, StateOutcome};
use crate::task::TaskKind;
use crate::world::{Category, Entity};

/// Patches up wounded own agents.
pub struct HealerStrategy;

const HEAL: &[TaskKind] = &[TaskKind::Heal];

impl RoleStrategy for HealerStrategy {
    fn role(&self) -> RoleTag {
        RoleTag::Healer
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::of(&[Heal])
    }

    fn body(&self, budget: u32, level: u8) -> Body {
        scale_pattern(&[], &[Heal, Move], budget, level_repeats(level, 1, 3))
    }

    fn initial_state(&self) -> StateTag {
        StateTag::Patrolling
    }

    fn states(&self) -> &'static [StateTag] {
        &[StateTag::Patrolling, StateTag::Healing]
    }

    fn task_kinds(&self, state: StateTag) -> &'static [TaskKind] {
        match state {
            StateTag::Patrolling | StateTag::Healing => HEAL,
            _ => &[],
        }
    }

    fn deficit_task(&self) -> Option<TaskKind> {
        Some(TaskKind::Heal)
    }

    fn on_state(
        &self,
        state: StateTag,
        ctx: &mut AgentCtx<'_>,
    ) -> Result<StateOutcome, DispatchError> {
        match state {
            StateTag::Patrolling => Ok(patrol(ctx)),
            StateTag::Healing => heal(ctx),
            other => Err(DispatchError::UnhandledState {
                role: self.role(),
                state: other,
            }),
        }
    }
}

fn wounded(e: &Entity) -> bool {
    e.as_agent()
        .is_some_and(|a| !a.spawning && a.hits < a.hits_max)
}

fn patrol(ctx: &mut AgentCtx<'_>) -> StateOutcome {
    let needed = ctx.current_task().is_some()
        || ctx.nearest(Category::MyAgents, wounded).is_some();
    if needed {
        return StateOutcome::go(StateTag::Healing);
    }
    if let Some(outcome) = return_home(ctx) {
        return StateOutcome::stay(outcome);
    }
    StateOutcome::stay(ctx.idle())
}

fn heal(ctx: &mut AgentCtx<'_>) -> Result<StateOutcome, DispatchError> {
    if let Some(run) = ctx.run_task(HEAL)? {
        return Ok(StateOutcome::stay(run.outcome()));
    }
    let remembered = ctx.target().filter(|e| e.is_mine() && wounded(e));
    let patient = remembered.or_else(|| ctx.nearest(Category::MyAgents, wounded));
    let Some(patient) = patient else {
        return Ok(StateOutcome::go(StateTag::Patrolling));
    };
    ctx.set_target(Some(patient.id));
    let action = PrimitiveAction::Heal { target: patient.id };
    Ok(StateOutcome::stay(ctx.act_or_approach(action, patient.pos)))
}
