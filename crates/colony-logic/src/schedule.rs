//! Duty-cycle scheduler.
//!
//! Periodic housekeeping runs on an explicit schedule instead of ad hoc
//! `tick % n` checks scattered through the loop. Each duty has a cycle
//! length and an offset; offsets are handed out round-robin in
//! registration order so duties with equal cycles land on different ticks.
//!
//! | Duty | Default cycle | Work |
//! |------|---------------|------|
//! | ScoutSweep | 25 | record intel for every visible zone |
//! | ExpansionReview | 250 | rebuild expansion targets from intel |
//! | ZonePrune | 1000 | forget long-unseen zones and stale intel |
//! | StorePrune | 500 | drop store records of agents no longer alive |

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::DutyCycles;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Duty {
    ScoutSweep,
    ExpansionReview,
    ZonePrune,
    StorePrune,
}

impl fmt::Display for Duty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    duty: Duty,
    cycle: u64,
    offset: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DutyScheduler {
    slots: Vec<Slot>,
}

impl DutyScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(cycles: &DutyCycles) -> Self {
        let mut scheduler = Self::new();
        scheduler.register(Duty::ScoutSweep, cycles.scout_sweep);
        scheduler.register(Duty::ExpansionReview, cycles.expansion_review);
        scheduler.register(Duty::ZonePrune, cycles.zone_prune);
        scheduler.register(Duty::StorePrune, cycles.store_prune);
        scheduler
    }

    /// Adds a duty, or changes its cycle if already registered. A zero
    /// cycle disables the duty.
    pub fn register(&mut self, duty: Duty, cycle: u64) {
        let position = self
            .slots
            .iter()
            .position(|s| s.duty == duty)
            .unwrap_or(self.slots.len());
        let offset = if cycle == 0 {
            0
        } else {
            position as u64 % cycle
        };
        let slot = Slot {
            duty,
            cycle,
            offset,
        };
        match self.slots.get_mut(position) {
            Some(existing) => *existing = slot,
            None => self.slots.push(slot),
        }
    }

    pub fn is_due(&self, duty: Duty, tick: u64) -> bool {
        self.slot(duty)
            .is_some_and(|s| s.cycle > 0 && tick % s.cycle == s.offset)
    }

    /// Duties due at `tick`, in registration order.
    pub fn due(&self, tick: u64) -> Vec<Duty> {
        self.slots
            .iter()
            .filter(|s| s.cycle > 0 && tick % s.cycle == s.offset)
            .map(|s| s.duty)
            .collect()
    }

    /// First tick at or after `tick` the duty runs.
    pub fn next_due(&self, duty: Duty, tick: u64) -> Option<u64> {
        let slot = self.slot(duty).filter(|s| s.cycle > 0)?;
        let phase = tick % slot.cycle;
        let wait = (slot.offset + slot.cycle - phase) % slot.cycle;
        Some(tick + wait)
    }

    pub fn cycle(&self, duty: Duty) -> Option<u64> {
        self.slot(duty).map(|s| s.cycle)
    }

    pub fn offset(&self, duty: Duty) -> Option<u64> {
        self.slot(duty).map(|s| s.offset)
    }

    pub fn duties(&self) -> impl Iterator<Item = (Duty, u64, u64)> + '_ {
        self.slots.iter().map(|s| (s.duty, s.cycle, s.offset))
    }

    fn slot(&self, duty: Duty) -> Option<&Slot> {
        self.slots.iter().find(|s| s.duty == duty)
    }
}
