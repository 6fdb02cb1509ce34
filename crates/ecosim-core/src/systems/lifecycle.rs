//! Agent Life-Cycle
//!
//! Energy, death, infection, foraging, movement and reproduction rules shared
//! by every agent kind. Each function covers one step of the per-tick update
//! and touches only the components it is handed.

use ecosim_events::{DeathCause, HealthStatus, Vec3};
use rand::Rng;

use crate::components::{Body, Phenotype, Vitals, MAX_ENERGY};
use crate::config::{AgentConfig, DiseaseConfig};
use crate::environment::{ResourceField, StressVector, TerrainEffects};
use crate::rng::RandomExt;

/// Floor for the pressure-adjusted reproduction threshold
pub const MIN_REPRODUCTION_THRESHOLD: f32 = 40.0;
/// Offspring are placed within this distance of the parent
pub const OFFSPRING_SPREAD: f32 = 3.0;

/// What the controller must enact after an agent's update
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    Continue,
    Die { cause: DeathCause, hazard: bool },
    Reproduce,
}

/// Energy lost this tick
pub fn energy_loss(
    cfg: &AgentConfig,
    phenotype: &Phenotype,
    vitals: &Vitals,
    stress: &StressVector,
    terrain: &TerrainEffects,
) -> f32 {
    let base = cfg.base_energy_loss * phenotype.metabolic_rate;
    let mut loss = base;
    if vitals.is_infected() {
        loss += cfg.infection_penalty;
    }
    if vitals.age as f32 > 0.8 * phenotype.max_lifespan as f32 {
        loss += cfg.age_penalty;
    }
    let environmental = base
        * (stress.energy_multiplier() - 1.0)
        * (1.0 - terrain.protection)
        * terrain.loss_factor;
    loss += environmental + terrain.drain;
    if loss.is_finite() {
        loss.max(0.0)
    } else {
        base
    }
}

/// Death probability this tick, with the branch that applies.
///
/// Old age takes precedence over starvation. `hazard` is whether an
/// environmental hazard is present at all.
pub fn death_probability(
    cfg: &AgentConfig,
    phenotype: &Phenotype,
    vitals: &Vitals,
    hazard: bool,
    stress_max: f32,
) -> Option<(DeathCause, f32)> {
    let max_age = phenotype.max_lifespan.max(1);
    let (cause, p) = if vitals.age >= max_age {
        let overrun = (vitals.age - max_age) as f32;
        (DeathCause::OldAge, 0.05 + overrun / (0.2 * max_age as f32))
    } else if vitals.energy <= cfg.critical_energy {
        let p = if cfg.critical_energy > 0.0 {
            0.2 + 0.8 * (cfg.critical_energy - vitals.energy) / cfg.critical_energy
        } else {
            1.0
        };
        (DeathCause::Starvation, p)
    } else {
        return None;
    };
    let factor = if hazard { 1.0 + 0.5 * stress_max } else { 1.0 };
    Some((cause, (p * factor).clamp(0.0, 1.0)))
}

/// Draw the death check. Returns the cause and whether a hazard raised the odds.
pub fn death_check<R: Rng + ?Sized>(
    cfg: &AgentConfig,
    phenotype: &Phenotype,
    vitals: &Vitals,
    hazard: bool,
    stress_max: f32,
    rng: &mut R,
) -> Option<(DeathCause, bool)> {
    let (cause, p) = death_probability(cfg, phenotype, vitals, hazard, stress_max)?;
    rng.chance(p)
        .then_some((cause, hazard && stress_max > 0.0))
}

/// Ticks to recover for an infection starting under `stress`
pub fn recovery_time(cfg: &DiseaseConfig, stress: &StressVector) -> u32 {
    let ticks = cfg.recovery_time as f32 * (1.0 + 0.5 * stress.cold + 0.25 * stress.heat);
    ticks.round().max(1.0) as u32
}

/// Per-tick infection probability for an exposed Susceptible agent
pub fn exposure_probability(
    transmission_rate: f32,
    weather_multiplier: f32,
    terrain_multiplier: f32,
    resistance: f32,
) -> f32 {
    let p = transmission_rate * weather_multiplier * terrain_multiplier * (1.0 - resistance);
    if p.is_finite() {
        p.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Advance an infection by one tick. Returns the ticks spent infected if the agent recovered.
pub fn progress_infection(cfg: &AgentConfig, vitals: &mut Vitals) -> Option<u32> {
    if !vitals.is_infected() {
        return None;
    }
    vitals.infection_ticks = vitals.infection_ticks.saturating_add(1);
    if vitals.infection_ticks < vitals.recovery_due {
        return None;
    }
    let starving = vitals.energy <= cfg.critical_energy;
    vitals.recover();
    if !starving {
        vitals.gain(cfg.recovery_bonus);
    }
    Some(vitals.infection_ticks)
}

/// Energy multiplier from health status when eating
pub fn status_bonus(status: HealthStatus) -> f32 {
    match status {
        HealthStatus::Susceptible => 1.0,
        HealthStatus::Infected => 0.8,
        HealthStatus::Recovered => 1.1,
    }
}

/// Eat resources within `radius`, nearest first, until full.
///
/// Returns the ids consumed. Every consumed resource leaves the field.
pub fn forage(
    vitals: &mut Vitals,
    phenotype: &Phenotype,
    at: &Vec3,
    radius: f32,
    resources: &mut ResourceField,
) -> Vec<u64> {
    let mut eaten = Vec::new();
    for (id, _) in resources.within(at, radius) {
        if vitals.energy >= MAX_ENERGY {
            break;
        }
        let Some(resource) = resources.consume(id) else {
            continue;
        };
        let gain = resource.value
            * resource.quality
            * phenotype.forage_efficiency
            * status_bonus(vitals.status);
        vitals.gain(gain);
        eaten.push(id);
    }
    eaten
}

/// Integrate one movement step.
///
/// `heading` need not be normalized. `speed_factor` combines weather and
/// terrain movement multipliers.
pub fn integrate_motion(
    body: &mut Body,
    heading: Vec3,
    intensity: f32,
    max_speed: f32,
    speed_factor: f32,
    cfg: &AgentConfig,
    world_size: f32,
) {
    let intensity = if intensity.is_finite() { intensity.clamp(0.0, 1.0) } else { 0.0 };
    let limit = max_speed * speed_factor;
    let delta = heading.normalized() * (intensity * limit * cfg.acceleration);
    let mut velocity = (Vec3::planar(body.velocity.x, body.velocity.y) * cfg.damping + delta)
        .clamp_length(limit);
    if !velocity.is_finite() {
        velocity = Vec3::ZERO;
    }

    let mut position = Vec3::planar(body.position.x + velocity.x, body.position.y + velocity.y);
    if position.x < 0.0 {
        position.x = -position.x;
        velocity.x = -velocity.x;
    } else if position.x > world_size {
        position.x = 2.0 * world_size - position.x;
        velocity.x = -velocity.x;
    }
    if position.y < 0.0 {
        position.y = -position.y;
        velocity.y = -velocity.y;
    } else if position.y > world_size {
        position.y = 2.0 * world_size - position.y;
        velocity.y = -velocity.y;
    }
    position.x = position.x.clamp(0.0, world_size);
    position.y = position.y.clamp(0.0, world_size);

    body.position = position;
    body.velocity = velocity;
}

/// Inputs to the reproduction check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReproductionPressure {
    pub population: usize,
    pub max_population: usize,
    /// Highest stress component felt by the agent
    pub harshness: f32,
}

impl ReproductionPressure {
    pub fn crowding(&self) -> f32 {
        if self.max_population == 0 {
            1.0
        } else {
            (self.population as f32 / self.max_population as f32).clamp(0.0, 1.0)
        }
    }
}

/// Energy an agent needs before it may reproduce
pub fn reproduction_threshold(phenotype: &Phenotype, pressure: &ReproductionPressure) -> f32 {
    (phenotype.reproduction_threshold - 10.0 * pressure.crowding() - 8.0 * pressure.harshness)
        .max(MIN_REPRODUCTION_THRESHOLD)
}

/// Whether the preconditions for reproducing hold, before the random draw
pub fn can_reproduce(
    cfg: &AgentConfig,
    phenotype: &Phenotype,
    vitals: &Vitals,
    pressure: &ReproductionPressure,
) -> bool {
    vitals.reproduction_cooldown == 0
        && vitals.age >= cfg.min_reproduction_age
        && vitals.energy > reproduction_threshold(phenotype, pressure)
        && vitals.energy >= cfg.reproduction_cost
}

pub fn reproduction_check<R: Rng + ?Sized>(
    cfg: &AgentConfig,
    phenotype: &Phenotype,
    vitals: &Vitals,
    pressure: &ReproductionPressure,
    rng: &mut R,
) -> bool {
    if !can_reproduce(cfg, phenotype, vitals, pressure) {
        return false;
    }
    let room = 1.0 - pressure.crowding();
    rng.chance(cfg.reproduction_rate * room * room)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Genotype, Phenotype};
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn phenotype() -> Phenotype {
        Phenotype::from_genotype(&Genotype {
            speed: 1.0,
            size: 1.0,
            social_radius: 10.0,
            infection_resistance: 0.0,
            lifespan: 1000.0,
            reproduction_threshold: 70.0,
            aggressiveness: 0.5,
            forage_efficiency: 1.0,
        })
    }

    fn calm() -> StressVector {
        StressVector::default()
    }

    #[test]
    fn test_energy_loss_terms() {
        let cfg = AgentConfig::default();
        let p = phenotype();
        let mut vitals = Vitals::new(50.0);
        let neutral = TerrainEffects::neutral();
        // metabolic rate 1.0 at size 1.0
        assert!((energy_loss(&cfg, &p, &vitals, &calm(), &neutral) - 0.1).abs() < 1e-6);

        vitals.infect(10);
        vitals.age = 900;
        assert!((energy_loss(&cfg, &p, &vitals, &calm(), &neutral) - 0.35).abs() < 1e-6);
    }

    #[test]
    fn test_shelter_blocks_weather_penalty() {
        let cfg = AgentConfig::default();
        let p = phenotype();
        let vitals = Vitals::new(50.0);
        let cold = StressVector {
            cold: 1.0,
            ..StressVector::default()
        };
        let exposed = energy_loss(&cfg, &p, &vitals, &cold, &TerrainEffects::neutral());
        // multiplier 2.2 -> penalty 0.12
        assert!((exposed - 0.22).abs() < 1e-5);

        let sheltered = TerrainEffects {
            protection: 0.7,
            ..TerrainEffects::neutral()
        };
        let inside = energy_loss(&cfg, &p, &vitals, &cold, &sheltered);
        assert!((inside - (0.1 + 0.12 * 0.3)).abs() < 1e-5);
    }

    #[test]
    fn test_old_age_branch_only() {
        let cfg = AgentConfig::default();
        let p = phenotype();
        let mut vitals = Vitals::new(50.0);
        vitals.age = p.max_lifespan;
        let (cause, prob) = death_probability(&cfg, &p, &vitals, false, 0.0).unwrap();
        assert_eq!(cause, DeathCause::OldAge);
        assert!((prob - 0.05).abs() < 1e-6);

        vitals.age = p.max_lifespan + 100;
        let (_, prob) = death_probability(&cfg, &p, &vitals, false, 0.0).unwrap();
        assert!((prob - 0.55).abs() < 1e-5);

        vitals.age = p.max_lifespan - 1;
        assert!(death_probability(&cfg, &p, &vitals, false, 0.0).is_none());
    }

    #[test]
    fn test_starvation_branch_and_hazard() {
        let cfg = AgentConfig::default();
        let p = phenotype();
        let mut vitals = Vitals::new(5.0);
        let (cause, prob) = death_probability(&cfg, &p, &vitals, false, 0.0).unwrap();
        assert_eq!(cause, DeathCause::Starvation);
        assert!((prob - 0.6).abs() < 1e-6);

        let (_, hazardous) = death_probability(&cfg, &p, &vitals, true, 0.5).unwrap();
        assert!((hazardous - 0.75).abs() < 1e-6);

        vitals.energy = 0.0;
        let (_, prob) = death_probability(&cfg, &p, &vitals, true, 1.0).unwrap();
        assert_eq!(prob, 1.0);
    }

    #[test]
    fn test_recovery_time_stretches_in_cold() {
        let cfg = DiseaseConfig::default();
        assert_eq!(recovery_time(&cfg, &calm()), 120);
        let cold = StressVector {
            cold: 1.0,
            heat: 0.0,
            ..StressVector::default()
        };
        assert_eq!(recovery_time(&cfg, &cold), 180);
    }

    #[test]
    fn test_recovery_bonus_withheld_when_starving() {
        let cfg = AgentConfig::default();
        let mut vitals = Vitals::new(50.0);
        vitals.infect(2);
        assert_eq!(progress_infection(&cfg, &mut vitals), None);
        assert_eq!(progress_infection(&cfg, &mut vitals), Some(2));
        assert_eq!(vitals.status, HealthStatus::Recovered);
        assert_eq!(vitals.energy, 60.0);

        let mut weak = Vitals::new(8.0);
        weak.infect(1);
        progress_infection(&cfg, &mut weak);
        assert_eq!(weak.status, HealthStatus::Recovered);
        assert_eq!(weak.energy, 8.0);
    }

    #[test]
    fn test_exposure_survival_matches_geometric_law() {
        let p = exposure_probability(0.15, 1.0, 1.0, 0.0);
        assert!((p - 0.15).abs() < 1e-6);
        assert_eq!(exposure_probability(0.15, 1.0, 1.0, 1.0), 0.0);

        let mut rng = SmallRng::seed_from_u64(2024);
        let trials = 200_000;
        let survivors = (0..trials)
            .filter(|_| (0..50).all(|_| !rng.chance(p)))
            .count();
        // 0.85^50 * 200_000 ~= 59
        assert!((25..=100).contains(&survivors), "survivors: {}", survivors);
    }

    #[test]
    fn test_forage_fills_to_cap_and_removes() {
        let p = phenotype();
        let mut vitals = Vitals::new(99.9);
        let mut field = ResourceField::new();
        let near = field.insert(Vec3::planar(2.0, 0.0), 20.0, 1.0, 0, false);
        let second = field.insert(Vec3::planar(2.5, 0.0), 20.0, 1.0, 0, false);
        field.insert(Vec3::planar(9.0, 0.0), 20.0, 1.0, 0, false);

        let eaten = forage(&mut vitals, &p, &Vec3::ZERO, 3.0, &mut field);
        assert_eq!(eaten, vec![near]);
        assert_eq!(vitals.energy, MAX_ENERGY);
        assert!(!field.contains(near));
        assert!(field.contains(second));
        assert_eq!(field.len(), 2);
    }

    #[test]
    fn test_motion_reflects_at_bounds() {
        let cfg = AgentConfig::default();
        let mut body = Body {
            position: Vec3::planar(0.2, 50.0),
            velocity: Vec3::planar(-1.0, 0.0),
        };
        integrate_motion(&mut body, Vec3::planar(-1.0, 0.0), 1.0, 1.0, 1.0, &cfg, 100.0);
        assert!(body.position.x >= 0.0);
        assert!(body.velocity.x > 0.0);
        assert!(body.velocity.length() <= 1.0 + 1e-6);

        let mut still = Body::at(Vec3::planar(10.0, 10.0));
        integrate_motion(&mut still, Vec3::ZERO, 1.0, 2.0, 1.0, &cfg, 100.0);
        assert_eq!(still.position, Vec3::planar(10.0, 10.0));
    }

    #[test]
    fn test_reproduction_gates() {
        let cfg = AgentConfig::default();
        let p = phenotype();
        let pressure = ReproductionPressure {
            population: 100,
            max_population: 1000,
            harshness: 0.0,
        };
        assert!((reproduction_threshold(&p, &pressure) - 69.0).abs() < 1e-5);

        let mut vitals = Vitals::new(95.0);
        vitals.age = 200;
        assert!(can_reproduce(&cfg, &p, &vitals, &pressure));
        vitals.reproduction_cooldown = 1;
        assert!(!can_reproduce(&cfg, &p, &vitals, &pressure));

        let mut rng = SmallRng::seed_from_u64(9);
        assert!((0..500).all(|_| !reproduction_check(&cfg, &p, &vitals, &pressure, &mut rng)));

        let full = ReproductionPressure {
            population: 1000,
            ..pressure
        };
        vitals.reproduction_cooldown = 0;
        assert!((0..500).all(|_| !reproduction_check(&cfg, &p, &vitals, &full, &mut rng)));
    }

    #[test]
    fn test_harsh_weather_lowers_threshold_to_floor() {
        let mut p = phenotype();
        p.reproduction_threshold = 50.0;
        let pressure = ReproductionPressure {
            population: 1000,
            max_population: 1000,
            harshness: 1.0,
        };
        assert_eq!(reproduction_threshold(&p, &pressure), MIN_REPRODUCTION_THRESHOLD);
    }
}
