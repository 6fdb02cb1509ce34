//! World Construction
//!
//! Creates the ECS world with every resource the schedule needs, then seeds
//! the environment and the initial population from the run's seed.

use bevy_ecs::prelude::*;

use crate::config::SimConfig;
use crate::environment::Environment;
use crate::events::EventQueue;
use crate::reasoning::ReasoningOutbox;
use crate::rng::SimRng;
use crate::systems::{AgentIndex, IdAllocator, MessageBus, SimClock, SimSettings, TickOutcomes};

use super::agents::spawn_initial_population;

/// Build a ready-to-run world. The same config always yields the same world.
pub fn build_world(config: &SimConfig) -> World {
    let sim = &config.simulation;
    let mut world = World::new();
    let mut rng = SimRng::seeded(sim.seed);

    let env = Environment::new(
        &config.environment,
        sim.world_size,
        sim.enable_environment,
        &mut rng.0,
    );
    let mut ids = IdAllocator::new();
    let (summary, births) =
        spawn_initial_population(&mut world, config, &env, &mut ids, &mut rng.0);
    tracing::info!(seed = sim.seed, %summary, resources = env.resources.len(), "world built");

    let mut events = EventQueue::new(sim.event_queue_capacity);
    events.extend(0, births);

    world.insert_resource(SimClock::default());
    world.insert_resource(SimSettings(config.clone()));
    world.insert_resource(env);
    world.insert_resource(rng);
    world.insert_resource(ids);
    world.insert_resource(events);
    world.insert_resource(AgentIndex::new());
    world.insert_resource(MessageBus::new());
    world.insert_resource(TickOutcomes::default());
    world.insert_resource(ReasoningOutbox::new(config.reasoning.enabled));
    world
}
