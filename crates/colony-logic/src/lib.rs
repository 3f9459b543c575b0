//! Colony controller logic.
//!
//! This crate decides, tick by tick, what every agent of a colony does. It
//! reads an immutable world snapshot through [`world::WorldView`], writes
//! intents through [`action::ActionSink`] and keeps everything that must
//! survive a restart in a [`store::StateStore`]. No world engine is linked;
//! `colony-core` provides a reference world.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`action`] | Primitive actions, results and the one-action-per-tick guard |
//! | [`agent`] | Agent roster: births, deaths, memory load and persist |
//! | [`allocation`] | Task board: creation, execution, cleanup, allocation |
//! | [`capability`] | Capability units, bodies and body scaling |
//! | [`colony`] | The per-tick controller tying every step together |
//! | [`config`] | Tunables with JSON loading and validation |
//! | [`cost`] | Movement cost surfaces and the terrain cache |
//! | [`error`] | Error types |
//! | [`fsm`] | Agent context, state dispatch and failure isolation |
//! | [`intel`] | Scouting intel and expansion targets |
//! | [`memory`] | Versioned agent memory and migrations |
//! | [`planner`] | Per-zone task demand and role deficits |
//! | [`roles`] | Role strategies and their registry |
//! | [`schedule`] | Staggered duty cycles |
//! | [`spawn`] | Spawn planning against the zone energy budget |
//! | [`store`] | Scoped, versioned key-value persistence |
//! | [`task`] | Task kinds, priorities and status |
//! | [`terrain`] | Terrain profile classification |
//! | [`testing`] | Snapshot builder and recording sink for tests |
//! | [`types`] | Ids, positions and resource stores |
//! | [`world`] | Read-only world snapshot and queries |
//! | [`zone`] | Per-zone records and pruning |

pub mod action;
pub mod agent;
pub mod allocation;
pub mod capability;
pub mod colony;
pub mod config;
pub mod cost;
pub mod error;
pub mod fsm;
pub mod intel;
pub mod memory;
pub mod planner;
pub mod roles;
pub mod schedule;
pub mod spawn;
pub mod store;
pub mod task;
pub mod terrain;
pub mod testing;
pub mod types;
pub mod world;
pub mod zone;

pub use colony::{Colony, TickReport};
pub use config::ColonyConfig;
