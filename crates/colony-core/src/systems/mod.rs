//! Systems - logic that applies orders and advances the reference world

mod actions;
mod lifecycle;
mod movement;
mod spawning;

pub use actions::*;
pub use lifecycle::*;
pub use movement::*;
pub use spawning::*;
