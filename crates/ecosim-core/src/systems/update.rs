//! Agent Update System
//!
//! Advances every agent by one tick in ascending id order. Each agent reads
//! the previous-tick [`AgentIndex`] for everything it knows about others and
//! mutates only its own components plus the shared resource field, message
//! bus and territory registry.

use bevy_ecs::prelude::*;
use ecosim_events::{AgentId, EventKind, HealthStatus, Vec3};
use rand::rngs::SmallRng;

use crate::components::{Body, Brain, Genome, Identity, Modules, Vitals};
use crate::config::SimConfig;
use crate::decision::{
    from_decision, ActionKind, DecisionPolicy, DecisionSource, Observation, SocialAction,
    SynthesisContext,
};
use crate::environment::{Environment, StressVector, TerrainEffects};
use crate::events::EventQueue;
use crate::reasoning::ReasoningOutbox;
use crate::rng::{RandomExt, SimRng};

use super::lifecycle::{self, ReproductionPressure, TickOutcome};
use super::messaging::MessageBus;
use super::outcomes::TickOutcomes;
use super::perception::{AgentIndex, Perception};
use super::social::social_update;
use super::{SimClock, SimSettings};

/// Shared state one agent update may touch
pub struct TickContext<'a> {
    pub tick: u64,
    pub config: &'a SimConfig,
    pub index: &'a AgentIndex,
    pub env: &'a mut Environment,
    pub rng: &'a mut SmallRng,
    pub bus: &'a mut MessageBus,
    pub events: &'a mut EventQueue,
    pub outbox: &'a mut ReasoningOutbox,
}

/// Read-only facts about the agent being updated
pub struct AgentFrame<'a> {
    pub id: AgentId,
    pub age: u64,
    pub position: Vec3,
    pub genome: &'a Genome,
    pub stress: StressVector,
    pub effects: TerrainEffects,
}

type AgentQuery<'w, 's> = Query<
    'w,
    's,
    (
        Entity,
        &'static Identity,
        &'static Genome,
        &'static mut Body,
        &'static mut Vitals,
        &'static mut Brain,
        &'static mut Modules,
    ),
>;

/// System to update every living agent
#[allow(clippy::too_many_arguments)]
pub fn update_agents(
    clock: Res<SimClock>,
    settings: Res<SimSettings>,
    index: Res<AgentIndex>,
    mut env: ResMut<Environment>,
    mut rng: ResMut<SimRng>,
    mut bus: ResMut<MessageBus>,
    mut events: ResMut<EventQueue>,
    mut outbox: ResMut<ReasoningOutbox>,
    mut outcomes: ResMut<TickOutcomes>,
    mut agents: AgentQuery,
) {
    let mut order: Vec<(AgentId, Entity)> = agents
        .iter()
        .map(|(entity, identity, ..)| (identity.id, entity))
        .collect();
    order.sort();
    let population = order.len();

    let mut ctx = TickContext {
        tick: clock.tick,
        config: &settings.0,
        index: &index,
        env: &mut env,
        rng: &mut rng.0,
        bus: &mut bus,
        events: &mut events,
        outbox: &mut outbox,
    };

    for (id, entity) in order {
        let Ok((_, identity, genome, mut body, mut vitals, mut brain, mut modules)) =
            agents.get_mut(entity)
        else {
            continue;
        };
        let outcome = step_agent(
            &mut ctx,
            identity,
            genome,
            &mut body,
            &mut vitals,
            &mut brain.0,
            &mut modules,
            population,
        );
        if outcome != TickOutcome::Continue {
            tracing::trace!(agent = %id, ?outcome, "agent outcome");
            outcomes.pending.push((id, entity, outcome));
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn step_agent(
    ctx: &mut TickContext<'_>,
    identity: &Identity,
    genome: &Genome,
    body: &mut Body,
    vitals: &mut Vitals,
    policy: &mut DecisionPolicy,
    modules: &mut Modules,
    population: usize,
) -> TickOutcome {
    let cfg = ctx.config;
    let id = identity.id;
    let phenotype = &genome.phenotype;

    // Age, metabolism, cooldown
    vitals.age += 1;
    let effects = ctx.env.terrain.effects_at(&body.position, id);
    let stress = ctx.env.stress_for(&effects);
    let loss = lifecycle::energy_loss(&cfg.agents, phenotype, vitals, &stress, &effects);
    vitals.drain(loss);
    vitals.reproduction_cooldown = vitals.reproduction_cooldown.saturating_sub(1);

    let hazard = ctx.env.emergency.is_some() || effects.contaminated;
    if let Some((cause, hazard)) =
        lifecycle::death_check(&cfg.agents, phenotype, vitals, hazard, stress.max(), ctx.rng)
    {
        return TickOutcome::Die { cause, hazard };
    }

    if cfg.simulation.enable_disease {
        update_infection(ctx, id, body, vitals, genome, &stress, &effects);
    }

    // Perceive and consult the learned policy
    let resource_radius = phenotype
        .perception_radius
        .max(cfg.agents.resource_near_distance);
    let seen = Perception::gather(
        ctx.index,
        &ctx.env.resources,
        id,
        &body.position,
        phenotype.perception_radius,
        resource_radius,
    );
    let observation = Observation {
        energy: vitals.energy,
        age: vitals.age,
        nearby_agents: seen.neighbors.len(),
        nearby_infected: seen.nearby_infected,
        nearest_resource: seen.nearest_resource.map(|r| r.distance),
        status: vitals.status,
    };
    let choice = policy.decide(&observation, ctx.rng);

    let heading = body.velocity.normalized();
    let wander = if heading.length() > 0.0 {
        (heading + ctx.rng.unit_direction() * 0.5).normalized()
    } else {
        ctx.rng.unit_direction()
    };
    let synthesis = SynthesisContext {
        position: body.position,
        food_target: seen.nearest_resource.map(|r| r.position),
        threat_source: None,
        nearest_infected: seen.nearest_infected,
        neighbours_centroid: seen.centroid,
        wander,
    };
    let mut policy_action =
        from_decision(ActionKind::Explore, choice.intensity, choice.direction, &synthesis);
    policy_action.source = DecisionSource::Heuristic;
    if choice.avoid_infected {
        if let Some(infected) = seen.nearest_infected {
            let away = infected.direction_to(&body.position);
            policy_action.heading = (policy_action.heading + away).normalized();
        }
    }

    let pressure = ReproductionPressure {
        population,
        max_population: cfg.simulation.max_population,
        harshness: stress.max(),
    };

    let steer = match modules {
        Modules::Basic => policy_action,
        Modules::Player(control) => match control.heading {
            Some(heading) => SocialAction {
                kind: ActionKind::Explore,
                intensity: control.intensity,
                heading,
                source: DecisionSource::Heuristic,
            },
            None => policy_action,
        },
        Modules::Social(social) => {
            let frame = AgentFrame {
                id,
                age: vitals.age,
                position: body.position,
                genome,
                stress,
                effects,
            };
            let can_reproduce = cfg.simulation.enable_reproduction
                && lifecycle::can_reproduce(&cfg.agents, phenotype, vitals, &pressure);
            social_update(ctx, &frame, vitals, social, &seen, policy_action, can_reproduce)
        }
    };

    let eaten = lifecycle::forage(
        vitals,
        phenotype,
        &body.position,
        cfg.agents.forage_radius,
        &mut ctx.env.resources,
    );
    if !eaten.is_empty() {
        tracing::trace!(agent = %id, eaten = eaten.len(), energy = vitals.energy, "foraged");
    }

    let speed_factor = stress.movement_multiplier() * effects.movement_multiplier;
    let world_size = ctx.env.world_size();
    lifecycle::integrate_motion(
        body,
        steer.heading,
        steer.intensity,
        phenotype.max_speed,
        speed_factor,
        &cfg.agents,
        world_size,
    );
    body.position.z = ctx.env.terrain.elevation_at(&body.position);

    if cfg.simulation.enable_reproduction
        && lifecycle::reproduction_check(&cfg.agents, phenotype, vitals, &pressure, ctx.rng)
    {
        return TickOutcome::Reproduce;
    }
    TickOutcome::Continue
}

fn update_infection(
    ctx: &mut TickContext<'_>,
    id: AgentId,
    body: &Body,
    vitals: &mut Vitals,
    genome: &Genome,
    stress: &StressVector,
    effects: &TerrainEffects,
) {
    let cfg = ctx.config;
    if vitals.is_infected() {
        if let Some(infected_ticks) = lifecycle::progress_infection(&cfg.agents, vitals) {
            tracing::trace!(agent = %id, infected_ticks, "recovered");
            ctx.events.push(
                ctx.tick,
                EventKind::Recovery {
                    agent_id: id,
                    infected_ticks,
                },
            );
        }
        return;
    }
    if vitals.status != HealthStatus::Susceptible {
        return;
    }

    let phenotype = &genome.phenotype;
    let Some(source) = ctx
        .index
        .nearest_infected(&body.position, phenotype.contact_radius, Some(id))
        .map(|(view, _)| view.id)
    else {
        return;
    };
    let p = lifecycle::exposure_probability(
        cfg.disease.transmission_rate,
        stress.infection_multiplier(),
        effects.infection_multiplier,
        phenotype.resistance,
    );
    if ctx.rng.chance(p) && vitals.infect(lifecycle::recovery_time(&cfg.disease, stress)) {
        tracing::trace!(agent = %id, %source, "infected");
        ctx.events.push(
            ctx.tick,
            EventKind::Infection {
                agent_id: id,
                source_id: Some(source),
            },
        );
    }
}
