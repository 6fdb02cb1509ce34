//! Ecosystem simulation engine.
//!
//! A headless agent-based simulation of foraging, contagion, reproduction,
//! and cooperation. Agents are ECS entities advanced by a fixed schedule of
//! systems; [`PopulationController`] owns the world and drives it tick by
//! tick. A given seed and configuration always produce the same run while
//! external reasoning is disabled.

pub mod components;
pub mod config;
pub mod controller;
pub mod decision;
pub mod environment;
pub mod error;
pub mod events;
pub mod output;
pub mod reasoning;
pub mod rng;
pub mod setup;
pub mod systems;

pub use config::SimConfig;
pub use controller::{PopulationController, TickReport};
pub use error::{ConfigError, SimError};
pub use rng::{RandomExt, SimRng};
