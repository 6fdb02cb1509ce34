//! Agent Components
//!
//! Identity, body, genome, and vitals for individual agents.

use bevy_ecs::prelude::*;
use ecosim_events::{AgentId, AgentKind, HealthStatus, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::Range;
use crate::decision::DecisionPolicy;
use crate::rng::RandomExt;

use super::social::SocialModules;

/// Energy is always kept within [0, MAX_ENERGY]
pub const MAX_ENERGY: f32 = 100.0;

/// Inclusive bounds for every heritable trait
pub mod genome_constants {
    use crate::config::Range;

    pub const SPEED: Range = Range::new(0.5, 2.0);
    pub const SIZE: Range = Range::new(0.5, 2.0);
    pub const SOCIAL_RADIUS: Range = Range::new(5.0, 25.0);
    pub const INFECTION_RESISTANCE: Range = Range::new(0.0, 0.9);
    pub const LIFESPAN: Range = Range::new(800.0, 1500.0);
    pub const REPRODUCTION_THRESHOLD: Range = Range::new(60.0, 90.0);
    pub const AGGRESSIVENESS: Range = Range::new(0.0, 1.0);
    pub const FORAGE_EFFICIENCY: Range = Range::new(0.5, 1.5);
}

/// Who an agent is. Fixed at spawn.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub id: AgentId,
    pub kind: AgentKind,
    pub parent: Option<AgentId>,
    pub born_tick: u64,
}

/// Position and velocity in world space
#[derive(Component, Debug, Clone, Copy, Default, PartialEq)]
pub struct Body {
    pub position: Vec3,
    pub velocity: Vec3,
}

impl Body {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
        }
    }
}

/// Heritable trait values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genotype {
    pub speed: f32,
    pub size: f32,
    pub social_radius: f32,
    pub infection_resistance: f32,
    pub lifespan: f32,
    pub reproduction_threshold: f32,
    pub aggressiveness: f32,
    pub forage_efficiency: f32,
}

impl Genotype {
    /// Uniform draw over every trait range
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        use genome_constants::*;
        Self {
            speed: SPEED.sample(rng),
            size: SIZE.sample(rng),
            social_radius: SOCIAL_RADIUS.sample(rng),
            infection_resistance: INFECTION_RESISTANCE.sample(rng),
            lifespan: LIFESPAN.sample(rng),
            reproduction_threshold: REPRODUCTION_THRESHOLD.sample(rng),
            aggressiveness: AGGRESSIVENESS.sample(rng),
            forage_efficiency: FORAGE_EFFICIENCY.sample(rng),
        }
    }

    fn genes_mut(&mut self) -> [(&mut f32, Range); 8] {
        use genome_constants::*;
        [
            (&mut self.speed, SPEED),
            (&mut self.size, SIZE),
            (&mut self.social_radius, SOCIAL_RADIUS),
            (&mut self.infection_resistance, INFECTION_RESISTANCE),
            (&mut self.lifespan, LIFESPAN),
            (&mut self.reproduction_threshold, REPRODUCTION_THRESHOLD),
            (&mut self.aggressiveness, AGGRESSIVENESS),
            (&mut self.forage_efficiency, FORAGE_EFFICIENCY),
        ]
    }

    /// Copy with each trait independently perturbed with probability `rate`.
    ///
    /// A perturbation is uniform within `strength` times the trait's range
    /// width, and the result is clamped back into range.
    pub fn mutated<R: Rng + ?Sized>(&self, rng: &mut R, rate: f32, strength: f32) -> Self {
        let mut child = self.clone();
        for (value, range) in child.genes_mut() {
            if rng.chance(rate) {
                *value = range.clamp(*value + rng.spread(strength * range.width()));
            }
        }
        child
    }

    /// Whether every trait lies within its range
    pub fn in_range(&self) -> bool {
        let mut copy = self.clone();
        copy.genes_mut()
            .iter()
            .all(|(value, range)| value.is_finite() && range.contains(**value))
    }
}

/// Observable properties derived from the genotype
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phenotype {
    pub max_speed: f32,
    pub render_radius: f32,
    pub perception_radius: f32,
    pub contact_radius: f32,
    pub metabolic_rate: f32,
    pub resistance: f32,
    pub max_lifespan: u64,
    pub reproduction_threshold: f32,
    pub aggressiveness: f32,
    pub forage_efficiency: f32,
}

impl Phenotype {
    pub fn from_genotype(g: &Genotype) -> Self {
        Self {
            max_speed: g.speed,
            render_radius: 0.5 + 0.5 * g.size,
            perception_radius: g.social_radius,
            contact_radius: 0.2 * g.social_radius,
            metabolic_rate: 0.75 + 0.25 * g.size,
            resistance: g.infection_resistance,
            max_lifespan: g.lifespan.round().max(1.0) as u64,
            reproduction_threshold: g.reproduction_threshold,
            aggressiveness: g.aggressiveness,
            forage_efficiency: g.forage_efficiency,
        }
    }
}

/// Genotype plus its derived phenotype. Immutable for the agent's life.
#[derive(Component, Debug, Clone, PartialEq)]
pub struct Genome {
    pub genotype: Genotype,
    pub phenotype: Phenotype,
}

impl Genome {
    pub fn new(genotype: Genotype) -> Self {
        let phenotype = Phenotype::from_genotype(&genotype);
        Self { genotype, phenotype }
    }
}

/// Mutable life state
#[derive(Component, Debug, Clone, PartialEq)]
pub struct Vitals {
    pub age: u64,
    pub energy: f32,
    pub status: HealthStatus,
    /// Ticks spent infected so far
    pub infection_ticks: u32,
    /// Ticks required to recover, fixed at the moment of infection
    pub recovery_due: u32,
    pub reproduction_cooldown: u32,
}

impl Vitals {
    pub fn new(energy: f32) -> Self {
        Self {
            age: 0,
            energy: energy.clamp(0.0, MAX_ENERGY),
            status: HealthStatus::Susceptible,
            infection_ticks: 0,
            recovery_due: 0,
            reproduction_cooldown: 0,
        }
    }

    pub fn is_infected(&self) -> bool {
        self.status == HealthStatus::Infected
    }

    /// Move S -> I. Any other starting state is left untouched.
    pub fn infect(&mut self, recovery_due: u32) -> bool {
        if self.status != HealthStatus::Susceptible {
            return false;
        }
        self.status = HealthStatus::Infected;
        self.infection_ticks = 0;
        self.recovery_due = recovery_due.max(1);
        true
    }

    /// Move I -> R. Any other starting state is left untouched.
    pub fn recover(&mut self) -> bool {
        if self.status != HealthStatus::Infected {
            return false;
        }
        self.status = HealthStatus::Recovered;
        true
    }

    /// Add energy, capped at the maximum. Returns the amount actually added.
    pub fn gain(&mut self, amount: f32) -> f32 {
        let before = self.energy;
        self.energy = (self.energy + amount.max(0.0)).min(MAX_ENERGY);
        self.energy - before
    }

    /// Remove energy, floored at zero. Returns the amount actually removed.
    pub fn drain(&mut self, amount: f32) -> f32 {
        let before = self.energy;
        self.energy = (self.energy - amount.max(0.0)).max(0.0);
        before - self.energy
    }
}

/// Learned movement policy
#[derive(Component, Debug, Clone)]
pub struct Brain(pub DecisionPolicy);

/// External steering for player agents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerControl {
    /// Desired heading; None hands control back to the learned policy
    pub heading: Option<Vec3>,
    pub intensity: f32,
}

impl PlayerControl {
    pub fn set_input(&mut self, heading: Option<Vec3>) {
        self.heading = heading.map(|h| h.normalized());
        self.intensity = if self.heading.is_some() { 1.0 } else { 0.0 };
    }
}

/// Behavior modules carried by an agent, tagged by kind
#[derive(Component, Debug)]
pub enum Modules {
    Basic,
    Social(Box<SocialModules>),
    Player(PlayerControl),
}

impl Modules {
    pub fn kind(&self) -> AgentKind {
        match self {
            Modules::Basic => AgentKind::Basic,
            Modules::Social(_) => AgentKind::Social,
            Modules::Player(_) => AgentKind::Player,
        }
    }

    pub fn social(&self) -> Option<&SocialModules> {
        match self {
            Modules::Social(s) => Some(&**s),
            _ => None,
        }
    }

    pub fn social_mut(&mut self) -> Option<&mut SocialModules> {
        match self {
            Modules::Social(s) => Some(&mut **s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_random_genotype_in_range() {
        let mut rng = SmallRng::seed_from_u64(11);
        for _ in 0..50 {
            assert!(Genotype::random(&mut rng).in_range());
        }
    }

    #[test]
    fn test_mutation_stays_in_range() {
        let mut rng = SmallRng::seed_from_u64(12);
        let mut genotype = Genotype::random(&mut rng);
        for _ in 0..500 {
            genotype = genotype.mutated(&mut rng, 1.0, 0.5);
            assert!(genotype.in_range(), "out of range: {:?}", genotype);
        }
    }

    #[test]
    fn test_zero_rate_mutation_is_identity() {
        let mut rng = SmallRng::seed_from_u64(13);
        let genotype = Genotype::random(&mut rng);
        assert_eq!(genotype.mutated(&mut rng, 0.0, 0.1), genotype);
    }

    #[test]
    fn test_phenotype_mapping() {
        let mut rng = SmallRng::seed_from_u64(14);
        let mut genotype = Genotype::random(&mut rng);
        genotype.size = 2.0;
        genotype.social_radius = 20.0;
        genotype.lifespan = 1000.4;
        let p = Phenotype::from_genotype(&genotype);
        assert!((p.render_radius - 1.5).abs() < 1e-6);
        assert!((p.metabolic_rate - 1.25).abs() < 1e-6);
        assert!((p.contact_radius - 4.0).abs() < 1e-6);
        assert_eq!(p.max_lifespan, 1000);
    }

    #[test]
    fn test_status_only_moves_forward() {
        let mut vitals = Vitals::new(50.0);
        assert!(!vitals.recover());
        assert!(vitals.infect(100));
        assert!(!vitals.infect(100));
        assert!(vitals.recover());
        assert!(!vitals.infect(100));
        assert_eq!(vitals.status, HealthStatus::Recovered);
    }

    #[test]
    fn test_energy_bounds() {
        let mut vitals = Vitals::new(150.0);
        assert_eq!(vitals.energy, MAX_ENERGY);
        assert_eq!(vitals.gain(10.0), 0.0);
        assert_eq!(vitals.drain(250.0), 100.0);
        assert_eq!(vitals.energy, 0.0);
    }

    #[test]
    fn test_player_input_normalizes_heading() {
        let mut control = PlayerControl::default();
        control.set_input(Some(Vec3::planar(3.0, 4.0)));
        let heading = control.heading.unwrap();
        assert!((heading.length() - 1.0).abs() < 1e-6);
        control.set_input(None);
        assert_eq!(control.intensity, 0.0);
    }
}
