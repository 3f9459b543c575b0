//! Colony Core - reference world for the colony controller
//!
//! An ECS-based world the controller in `colony-logic` can run against
//! end to end: zones with terrain, sources, structures and hostile raiders,
//! agents that move, gather, build and die of age.
//!
//! # Architecture
//!
//! The world uses an Entity Component System (ECS) architecture via `hecs`:
//! - **Entities**: agents, structures, sites, sources, piles, controllers
//! - **Components**: pure data; every entity has a stable `Key` and a `Placement`
//! - **Systems**: apply the controller's recorded intents, then run upkeep
//!
//! The controller never touches the ECS. It sees a snapshot of the visible
//! zones and records intents through [`intents::IntentSink`]; the engine
//! applies them once the controller's tick returns.
//!
//! # Example
//!
//! ```rust,no_run
//! use colony_core::prelude::*;
//!
//! let mut engine = ColonyEngine::default();
//! engine.generate(&WorldSetup::default());
//! for _ in 0..1_000 {
//!     let report = engine.step();
//!     println!("tick {}: {} agents acted", report.tick, report.colony.dispatch.actions);
//! }
//! ```

pub mod components;
pub mod engine;
pub mod generation;
pub mod intents;
pub mod pathing;
pub mod persistence;
pub mod systems;
pub mod world;

/// Commonly used types for convenient importing
pub mod prelude {
    pub use crate::components::*;
    pub use crate::engine::{ColonyEngine, StepReport};
    pub use crate::generation::WorldSetup;
    pub use crate::world::SimWorld;
}
