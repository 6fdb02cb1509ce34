//! ECS Systems
//!
//! One tick runs, in order: clock advance, perception index rebuild, message
//! delivery, agent updates in id order, outcome application, environment
//! advance, territory upkeep.

pub mod lifecycle;
pub mod messaging;
pub mod outcomes;
pub mod perception;
pub mod social;
pub mod update;
pub mod upkeep;

use bevy_ecs::prelude::*;

use crate::config::SimConfig;

pub use lifecycle::TickOutcome;
pub use messaging::{deliver_messages, MessageBus};
pub use outcomes::{apply_outcomes, IdAllocator, TickOutcomes};
pub use perception::{build_agent_index, AgentIndex, AgentView, Perception};
pub use update::update_agents;
pub use upkeep::{territory_upkeep, update_environment};

/// Current simulation tick. Zero before the first step.
#[derive(Resource, Debug, Default, Clone, Copy)]
pub struct SimClock {
    pub tick: u64,
}

/// The run's configuration, readable by every system
#[derive(Resource, Debug, Clone)]
pub struct SimSettings(pub SimConfig);

pub fn advance_clock(mut clock: ResMut<SimClock>) {
    clock.tick += 1;
}

/// Build the per-tick schedule
pub fn build_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems(
        (
            advance_clock,
            build_agent_index,
            deliver_messages,
            update_agents,
            apply_outcomes,
            update_environment,
            territory_upkeep,
        )
            .chain(),
    );
    schedule
}
