use crate::capability::{scale_pattern, Body, CapabilitySet, CapabilityUnit::*};
use crate::error::DispatchError;
use crate::fsm::AgentCtx;
use crate::memory::StateTag;
use crate::roles::common::{return_home, ZONE_RANGE};
use crate::roles::{Outcome, RoleStrategy, RoleTag, StateOutcome};
use crate::task::TaskKind;
use crate::types::Pos;

/// Walks to zones with missing or stale intel and records what it sees.
pub struct ScoutStrategy;

/// Ticks a scout may stand still before giving up on its target zone.
const PATIENCE: u32 = 25;

impl RoleStrategy for ScoutStrategy {
    fn role(&self) -> RoleTag {
        RoleTag::Scout
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::of(&[Move])
    }

    fn body(&self, budget: u32, _level: u8) -> Body {
        scale_pattern(&[], &[Move], budget, 1)
    }

    fn initial_state(&self) -> StateTag {
        StateTag::Scouting
    }

    fn states(&self) -> &'static [StateTag] {
        &[StateTag::Scouting, StateTag::Patrolling]
    }

    fn task_kinds(&self, _state: StateTag) -> &'static [TaskKind] {
        &[]
    }

    fn on_state(
        &self,
        state: StateTag,
        ctx: &mut AgentCtx<'_>,
    ) -> Result<StateOutcome, DispatchError> {
        match state {
            StateTag::Scouting => Ok(scout(ctx)),
            StateTag::Patrolling => Ok(rest(ctx)),
            other => Err(DispatchError::UnhandledState {
                role: self.role(),
                state: other,
            }),
        }
    }
}

fn next_zone(ctx: &AgentCtx<'_>) -> Option<crate::types::ZoneId> {
    ctx.agent.memory.target_zone.or_else(|| {
        ctx.intel.next_to_scout(
            ctx.agent.home(),
            ctx.tick,
            ctx.config.intel_ttl,
            ctx.config.expansion.max_distance,
        )
    })
}

fn scout(ctx: &mut AgentCtx<'_>) -> StateOutcome {
    let Some(zone) = next_zone(ctx) else {
        return StateOutcome::go(StateTag::Patrolling);
    };
    if ctx.pos().zone == zone {
        ctx.intel.record(ctx.world, zone);
        ctx.agent.memory.target_zone = None;
        return StateOutcome::stay(Outcome::None);
    }
    if ctx.agent.memory.stuck_ticks >= PATIENCE {
        ctx.intel.mark_unreachable(zone, ctx.tick);
        ctx.agent.memory.target_zone = None;
        ctx.agent.memory.stuck_ticks = 0;
        return StateOutcome::stay(Outcome::None);
    }
    ctx.agent.memory.target_zone = Some(zone);
    StateOutcome::stay(ctx.move_to(Pos::center(zone), ZONE_RANGE))
}

/// Nothing left to scout: wait at home, and look again once intel ages.
fn rest(ctx: &mut AgentCtx<'_>) -> StateOutcome {
    if next_zone(ctx).is_some() {
        return StateOutcome::go(StateTag::Scouting);
    }
    let outcome = return_home(ctx).unwrap_or_else(|| ctx.idle());
    StateOutcome::stay(outcome)
}
