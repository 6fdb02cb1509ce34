//! Agent Spawning
//!
//! Builds agent bundles and seeds the initial population with random genomes,
//! positions, and infections.

use bevy_ecs::prelude::*;
use ecosim_events::{AgentId, AgentKind, EventKind, Vec3};
use rand::rngs::SmallRng;

use crate::components::{
    Body, Brain, Genome, Genotype, Identity, Modules, PlayerControl, SocialModules, Vitals,
};
use crate::config::SimConfig;
use crate::decision::{DecisionPolicy, LearningParams};
use crate::environment::Environment;
use crate::rng::RandomExt;
use crate::systems::lifecycle::recovery_time;
use crate::systems::IdAllocator;

/// Every component a living agent carries
#[derive(Bundle)]
pub struct AgentBundle {
    pub identity: Identity,
    pub body: Body,
    pub genome: Genome,
    pub vitals: Vitals,
    pub brain: Brain,
    pub modules: Modules,
}

/// Assemble a fresh agent of `kind`
#[allow(clippy::too_many_arguments)]
pub fn agent_bundle(
    id: AgentId,
    kind: AgentKind,
    parent: Option<AgentId>,
    born_tick: u64,
    position: Vec3,
    genome: Genome,
    energy: f32,
    config: &SimConfig,
) -> AgentBundle {
    let modules = match kind {
        AgentKind::Basic => Modules::Basic,
        AgentKind::Social => Modules::Social(Box::new(SocialModules::new(&config.social))),
        AgentKind::Player => Modules::Player(PlayerControl::default()),
    };
    let policy = DecisionPolicy::new(
        LearningParams::from(&config.learning),
        config.agents.resource_near_distance,
    );
    AgentBundle {
        identity: Identity {
            id,
            kind,
            parent,
            born_tick,
        },
        body: Body::at(position),
        genome,
        vitals: Vitals::new(energy),
        brain: Brain(policy),
        modules,
    }
}

/// Counts of spawned agents by kind
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SpawnSummary {
    pub basic: usize,
    pub social: usize,
    pub player: usize,
    pub infected: usize,
}

impl SpawnSummary {
    pub fn total(&self) -> usize {
        self.basic + self.social + self.player
    }
}

impl std::fmt::Display for SpawnSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} agents ({} basic, {} social, {} player), {} infected",
            self.total(),
            self.basic,
            self.social,
            self.player,
            self.infected
        )
    }
}

/// Spawn the initial population plus any player agents. Players come first,
/// so they get the lowest ids.
pub fn spawn_initial_population(
    world: &mut World,
    config: &SimConfig,
    env: &Environment,
    ids: &mut IdAllocator,
    rng: &mut SmallRng,
) -> (SpawnSummary, Vec<EventKind>) {
    let sim = &config.simulation;
    let mut summary = SpawnSummary::default();
    let total = sim.initial_population + sim.player_count;
    let mut events = Vec::with_capacity(total);

    for i in 0..total {
        let kind = if i < sim.player_count {
            AgentKind::Player
        } else if rng.chance(sim.social_fraction) {
            AgentKind::Social
        } else {
            AgentKind::Basic
        };
        let position = Vec3::planar(
            rng.between(0.0, sim.world_size),
            rng.between(0.0, sim.world_size),
        );
        let position = Vec3::new(position.x, position.y, env.terrain.elevation_at(&position));
        let genome = Genome::new(Genotype::random(rng));
        let energy = config.agents.initial_energy.sample(rng);

        let id = ids.allocate();
        let mut bundle = agent_bundle(id, kind, None, 0, position, genome, energy, config);
        if sim.enable_disease && rng.chance(config.disease.initial_infection_rate) {
            let due = recovery_time(&config.disease, &env.stress);
            if bundle.vitals.infect(due) {
                // Seeded infections start partway through their course
                bundle.vitals.infection_ticks = (rng.unit() * due as f32 * 0.5) as u32;
                summary.infected += 1;
            }
        }
        world.spawn(bundle);

        match kind {
            AgentKind::Basic => summary.basic += 1,
            AgentKind::Social => summary.social += 1,
            AgentKind::Player => summary.player += 1,
        }
        events.push(EventKind::Birth {
            agent_id: id,
            kind,
            parent_id: None,
            position,
        });
    }

    (summary, events)
}
