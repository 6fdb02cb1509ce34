//! World Upkeep
//!
//! End-of-tick environment advance and territory decay.

use std::collections::HashMap;

use bevy_ecs::prelude::*;
use ecosim_events::{AgentId, EventKind, Vec3};

use crate::components::{Body, Identity};
use crate::environment::Environment;
use crate::events::EventQueue;
use crate::rng::SimRng;

use super::{SimClock, SimSettings};

/// System to advance weather, emergencies, and resource spawning
pub fn update_environment(
    clock: Res<SimClock>,
    mut env: ResMut<Environment>,
    mut rng: ResMut<SimRng>,
    mut events: ResMut<EventQueue>,
) {
    let emitted = env.advance(&mut rng.0);
    for event in &emitted {
        match event {
            EventKind::ClimateEmergencyStarted { emergency, .. } => {
                tracing::info!(tick = clock.tick, ?emergency, "climate emergency started");
            }
            EventKind::ClimateEmergencyEnded { emergency } => {
                tracing::info!(tick = clock.tick, ?emergency, "climate emergency ended");
            }
            _ => {}
        }
    }
    events.extend(clock.tick, emitted);
}

/// System to weaken territories whose owners wander off or die
pub fn territory_upkeep(
    clock: Res<SimClock>,
    settings: Res<SimSettings>,
    mut env: ResMut<Environment>,
    mut events: ResMut<EventQueue>,
    agents: Query<(&Identity, &Body)>,
) {
    if env.territories.is_empty() {
        return;
    }
    let positions: HashMap<AgentId, Vec3> = agents
        .iter()
        .map(|(identity, body)| (identity.id, body.position))
        .collect();
    let lapsed = env
        .territories
        .decay(settings.0.social.territory_decay, |owner| {
            positions.get(&owner).copied()
        });
    for territory in lapsed {
        tracing::debug!(tick = clock.tick, owner = %territory.owner, "territory lost");
        events.push(
            clock.tick,
            EventKind::TerritoryLost {
                owner: territory.owner,
            },
        );
    }
}
