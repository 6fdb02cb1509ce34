//! Outcome Application
//!
//! Enacts the deaths and births reported by agent updates. Runs as an
//! exclusive system after every agent has moved, so entities are only ever
//! spawned or despawned between updates.

use bevy_ecs::prelude::*;
use ecosim_events::{AgentId, AgentKind, EventKind, Vec3};

use crate::components::{Body, Genome, Identity, Modules, Vitals};
use crate::events::EventQueue;
use crate::rng::{RandomExt, SimRng};
use crate::setup::agent_bundle;

use super::lifecycle::{TickOutcome, OFFSPRING_SPREAD};
use super::{SimClock, SimSettings};

/// Outcomes reported this tick plus running totals
#[derive(Resource, Debug, Default)]
pub struct TickOutcomes {
    pub pending: Vec<(AgentId, Entity, TickOutcome)>,
    /// Agents removed during the last application
    pub died: Vec<AgentId>,
    /// Agents created during the last application
    pub born: Vec<AgentId>,
    pub births: u64,
    pub deaths: u64,
    pub suppressed: u64,
}

/// Hands out agent ids. Ids are never reused within a run.
#[derive(Resource, Debug)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn allocate(&mut self) -> AgentId {
        let id = AgentId(self.next);
        self.next += 1;
        id
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive system: deaths first, then births subject to the population cap
pub fn apply_outcomes(world: &mut World) {
    let pending = {
        let mut outcomes = world.resource_mut::<TickOutcomes>();
        outcomes.died.clear();
        outcomes.born.clear();
        std::mem::take(&mut outcomes.pending)
    };
    if pending.is_empty() {
        return;
    }
    let tick = world.resource::<SimClock>().tick;

    let mut events = Vec::new();
    let mut died = Vec::new();
    let mut parents = Vec::new();
    for (id, entity, outcome) in pending {
        match outcome {
            TickOutcome::Die { cause, hazard } => {
                let Some(event) = death_event(world, entity, cause, hazard) else {
                    continue;
                };
                world.despawn(entity);
                tracing::trace!(agent = %id, ?cause, "agent died");
                events.push(event);
                died.push(id);
            }
            TickOutcome::Reproduce => parents.push((id, entity)),
            TickOutcome::Continue => {}
        }
    }

    let mut born = Vec::new();
    let mut suppressed = 0u64;
    let mut population = world.query::<&Identity>().iter(world).count();
    for (parent_id, parent) in parents {
        let max_population = world.resource::<SimSettings>().0.simulation.max_population;
        if population >= max_population {
            tracing::debug!(parent = %parent_id, population, "birth suppressed at population cap");
            events.push(EventKind::BirthSuppressed {
                parent_id,
                population,
            });
            suppressed += 1;
            continue;
        }
        if let Some((child, event)) = spawn_offspring(world, parent_id, parent, tick) {
            events.push(event);
            born.push(child);
            population += 1;
        }
    }

    if !died.is_empty() || !born.is_empty() {
        tracing::debug!(tick, deaths = died.len(), births = born.len(), population, "population changed");
    }

    world.resource_mut::<EventQueue>().extend(tick, events);
    let mut outcomes = world.resource_mut::<TickOutcomes>();
    outcomes.deaths += died.len() as u64;
    outcomes.births += born.len() as u64;
    outcomes.suppressed += suppressed;
    outcomes.died = died;
    outcomes.born = born;
}

fn death_event(
    world: &World,
    entity: Entity,
    cause: ecosim_events::DeathCause,
    hazard: bool,
) -> Option<EventKind> {
    let identity = world.get::<Identity>(entity)?;
    let vitals = world.get::<Vitals>(entity)?;
    Some(EventKind::Death {
        agent_id: identity.id,
        kind: identity.kind,
        cause,
        age: vitals.age,
        energy: vitals.energy,
        hazard,
    })
}

/// Charge the parent and spawn a mutated child next to it
fn spawn_offspring(
    world: &mut World,
    parent_id: AgentId,
    parent: Entity,
    tick: u64,
) -> Option<(AgentId, EventKind)> {
    let config = world.resource::<SimSettings>().0.clone();
    let agents = &config.agents;

    let genotype = world.get::<Genome>(parent)?.genotype.clone();
    let origin = world.get::<Body>(parent)?.position;
    let kind = match world.get::<Modules>(parent)?.kind() {
        // Player control is not inherited
        AgentKind::Player => AgentKind::Basic,
        kind => kind,
    };
    {
        let mut vitals = world.get_mut::<Vitals>(parent)?;
        if vitals.energy < agents.reproduction_cost {
            return None;
        }
        vitals.drain(agents.reproduction_cost);
        vitals.reproduction_cooldown = agents.reproduction_cooldown;
    }

    let (child_genotype, position) = world.resource_scope(|_, mut rng: Mut<SimRng>| {
        let rng = &mut rng.0;
        let child = genotype.mutated(rng, agents.mutation_rate, agents.mutation_strength);
        let offset = rng.unit_direction() * rng.between(0.0, OFFSPRING_SPREAD);
        (child, origin + offset)
    });
    let world_size = config.simulation.world_size;
    let position = Vec3::planar(
        position.x.clamp(0.0, world_size),
        position.y.clamp(0.0, world_size),
    );

    let id = world.resource_mut::<IdAllocator>().allocate();
    world.spawn(agent_bundle(
        id,
        kind,
        Some(parent_id),
        tick,
        position,
        Genome::new(child_genotype),
        agents.offspring_energy,
        &config,
    ));
    tracing::trace!(agent = %id, parent = %parent_id, ?kind, "agent born");
    Some((
        id,
        EventKind::Birth {
            agent_id: id,
            kind,
            parent_id: Some(parent_id),
            position,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::setup::build_world;
    use ecosim_events::{DeathCause, EventType};

    fn small_world(population: usize, max_population: usize) -> World {
        let mut config = SimConfig::default();
        config.simulation.initial_population = population;
        config.simulation.max_population = max_population;
        config.simulation.player_count = 0;
        build_world(&config)
    }

    fn entities(world: &mut World) -> Vec<(AgentId, Entity)> {
        let mut all: Vec<(AgentId, Entity)> = world
            .query::<(Entity, &Identity)>()
            .iter(world)
            .map(|(e, i)| (i.id, e))
            .collect();
        all.sort();
        all
    }

    #[test]
    fn test_death_despawns_and_reports() {
        let mut world = small_world(3, 10);
        world.resource_mut::<EventQueue>().drain();
        let all = entities(&mut world);
        let (id, entity) = all[0];
        world.resource_mut::<TickOutcomes>().pending.push((
            id,
            entity,
            TickOutcome::Die {
                cause: DeathCause::Starvation,
                hazard: false,
            },
        ));
        apply_outcomes(&mut world);

        assert!(world.get_entity(entity).is_none());
        let outcomes = world.resource::<TickOutcomes>();
        assert_eq!(outcomes.died, vec![id]);
        assert_eq!(outcomes.deaths, 1);
        let events = world.resource_mut::<EventQueue>().drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Death);
    }

    #[test]
    fn test_birth_charges_parent() {
        let mut world = small_world(2, 10);
        world.resource_mut::<EventQueue>().drain();
        let all = entities(&mut world);
        let (id, entity) = all[0];
        world.get_mut::<Vitals>(entity).unwrap().energy = 90.0;
        world
            .resource_mut::<TickOutcomes>()
            .pending
            .push((id, entity, TickOutcome::Reproduce));
        apply_outcomes(&mut world);

        let parent = world.get::<Vitals>(entity).unwrap();
        assert!((parent.energy - 60.0).abs() < 1e-4);
        assert_eq!(parent.reproduction_cooldown, 150);

        let born = world.resource::<TickOutcomes>().born.clone();
        assert_eq!(born.len(), 1);
        let (child_entity, child) = world
            .query::<(Entity, &Identity)>()
            .iter(&world)
            .find(|(_, i)| i.id == born[0])
            .map(|(e, i)| (e, *i))
            .unwrap();
        assert_eq!(child.parent, Some(id));
        assert_eq!(world.get::<Vitals>(child_entity).unwrap().energy, 50.0);
        assert_eq!(world.get::<Vitals>(child_entity).unwrap().age, 0);
        let parent_pos = world.get::<Body>(entity).unwrap().position;
        let child_pos = world.get::<Body>(child_entity).unwrap().position;
        assert!(parent_pos.distance(&child_pos) <= OFFSPRING_SPREAD + 1e-4);
    }

    #[test]
    fn test_births_suppressed_at_cap() {
        let mut world = small_world(2, 2);
        world.resource_mut::<EventQueue>().drain();
        let all = entities(&mut world);
        for (id, entity) in &all {
            world.get_mut::<Vitals>(*entity).unwrap().energy = 90.0;
            world
                .resource_mut::<TickOutcomes>()
                .pending
                .push((*id, *entity, TickOutcome::Reproduce));
        }
        apply_outcomes(&mut world);

        assert_eq!(entities(&mut world).len(), 2);
        let outcomes = world.resource::<TickOutcomes>();
        assert_eq!(outcomes.suppressed, 2);
        assert!(outcomes.born.is_empty());
        let events = world.resource_mut::<EventQueue>().drain();
        assert!(events
            .iter()
            .all(|e| matches!(e.kind, EventKind::BirthSuppressed { .. })));
    }

    #[test]
    fn test_death_frees_room_for_birth() {
        let mut world = small_world(2, 2);
        let all = entities(&mut world);
        world.get_mut::<Vitals>(all[1].1).unwrap().energy = 90.0;
        {
            let mut outcomes = world.resource_mut::<TickOutcomes>();
            outcomes.pending.push((
                all[0].0,
                all[0].1,
                TickOutcome::Die {
                    cause: DeathCause::OldAge,
                    hazard: false,
                },
            ));
            outcomes.pending.push((all[1].0, all[1].1, TickOutcome::Reproduce));
        }
        apply_outcomes(&mut world);
        let outcomes = world.resource::<TickOutcomes>();
        assert_eq!(outcomes.died.len(), 1);
        assert_eq!(outcomes.born.len(), 1);
        assert_eq!(outcomes.suppressed, 0);
    }

    #[test]
    fn test_ids_never_reused() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.allocate(), AgentId(1));
        assert_eq!(ids.allocate(), AgentId(2));
        assert_eq!(ids.allocate(), AgentId(3));
    }
}
