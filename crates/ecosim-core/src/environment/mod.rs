//! Environment
//!
//! Weather, seasons, terrain, resources and territories. The environment is
//! created once per run, ticks once after every agent has updated, and never
//! belongs to an agent.

pub mod resources;
pub mod terrain;
pub mod territory;
pub mod weather;

use bevy_ecs::prelude::*;
use ecosim_events::{EnvironmentSummary, EventKind, Season, Vec3};
use rand::Rng;

use crate::config::EnvironmentConfig;
use crate::rng::RandomExt;

pub use resources::{Resource as FoodResource, ResourceField};
pub use terrain::{TerrainEffects, TerrainFeature, TerrainKind, TerrainMap};
pub use territory::{ClaimRejected, Territory, TerritoryRegistry};
pub use weather::{ClimateEmergency, StressVector, WeatherCategory, WeatherState};

/// Fraction of the cap below which the emergency top-up kicks in
pub const TOP_UP_TRIGGER: f32 = 0.1;
/// Fraction of the cap the emergency top-up restores
pub const TOP_UP_TARGET: f32 = 0.25;

/// Resource abundance per season
pub fn season_factor(season: Season) -> f32 {
    match season {
        Season::Spring => 1.2,
        Season::Summer => 1.0,
        Season::Autumn => 0.8,
        Season::Winter => 0.4,
    }
}

#[derive(Resource, Debug)]
pub struct Environment {
    config: EnvironmentConfig,
    world_size: f32,
    /// Weather, emergencies and storm damage run only when dynamic
    dynamic: bool,
    tick: u64,
    pub weather: WeatherState,
    pub emergency: Option<ClimateEmergency>,
    emergency_cooldown: u32,
    pub temperature: f32,
    pub stress: StressVector,
    pub terrain: TerrainMap,
    pub resources: ResourceField,
    pub territories: TerritoryRegistry,
    top_ups: u64,
}

impl Environment {
    pub fn new<R: Rng + ?Sized>(
        config: &EnvironmentConfig,
        world_size: f32,
        dynamic: bool,
        rng: &mut R,
    ) -> Self {
        let terrain = TerrainMap::generate(config, world_size, rng);
        let mut resources = ResourceField::new();
        for _ in 0..config.initial_resources {
            resources.spawn_random(config, world_size, &terrain, 0, rng);
        }
        let weather = if dynamic {
            WeatherState::roll(Season::Spring, rng)
        } else {
            WeatherState::calm()
        };
        let mut env = Self {
            config: config.clone(),
            world_size,
            dynamic,
            tick: 0,
            weather,
            emergency: None,
            emergency_cooldown: 0,
            temperature: 0.0,
            stress: StressVector::default(),
            terrain,
            resources,
            territories: TerritoryRegistry::new(),
            top_ups: 0,
        };
        env.refresh_climate();
        env
    }

    pub fn world_size(&self) -> f32 {
        self.world_size
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn season(&self) -> Season {
        Season::from_index(self.tick / self.config.season_length.max(1))
    }

    pub fn top_ups(&self) -> u64 {
        self.top_ups
    }

    /// Current resource population cap
    pub fn resource_cap(&self) -> usize {
        let cap = self.config.base_resource_cap as f32
            * season_factor(self.season())
            * self.resource_multiplier();
        cap.max(0.0).round() as usize
    }

    fn resource_multiplier(&self) -> f32 {
        if self.dynamic {
            self.stress.resource_multiplier()
        } else {
            1.0
        }
    }

    /// Stress felt by an agent with the given terrain effects
    pub fn stress_for(&self, effects: &TerrainEffects) -> StressVector {
        if effects.flood_immune {
            self.stress.without_flood()
        } else {
            self.stress
        }
    }

    /// Advance one tick. Returns the environment events produced.
    pub fn advance<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Vec<EventKind> {
        self.tick += 1;
        let mut events = Vec::new();
        if self.dynamic {
            self.advance_weather(rng, &mut events);
            self.advance_emergency(rng, &mut events);
        }
        self.refresh_climate();
        self.regenerate(rng);
        if self.dynamic {
            let removed = self.resources.storm_damage(self.stress.storm, rng);
            if removed > 0 {
                tracing::trace!(removed, storm = self.stress.storm, "storm damaged resources");
            }
        }
        if let Some(event) = self.top_up(rng) {
            events.push(event);
        }
        events
    }

    fn advance_weather<R: Rng + ?Sized>(&mut self, rng: &mut R, events: &mut Vec<EventKind>) {
        self.weather.remaining = self.weather.remaining.saturating_sub(1);
        if self.weather.remaining > 0 {
            return;
        }
        let season = self.season();
        self.weather = WeatherState::roll(season, rng);
        events.push(EventKind::WeatherChanged {
            category: self.weather.category.as_str().to_string(),
            intensity: self.weather.intensity,
            season,
        });
    }

    fn advance_emergency<R: Rng + ?Sized>(&mut self, rng: &mut R, events: &mut Vec<EventKind>) {
        if let Some(emergency) = self.emergency.as_mut() {
            emergency.remaining = emergency.remaining.saturating_sub(1);
            if emergency.remaining == 0 {
                let kind = emergency.kind;
                self.emergency = None;
                self.emergency_cooldown = self.config.emergency_cooldown;
                tracing::info!(tick = self.tick, emergency = ?kind, "climate emergency ended");
                events.push(EventKind::ClimateEmergencyEnded { emergency: kind });
            }
            return;
        }
        if self.emergency_cooldown > 0 {
            self.emergency_cooldown -= 1;
            return;
        }
        if rng.chance(self.config.emergency_chance) {
            let emergency = ClimateEmergency::roll(self.season(), rng);
            tracing::info!(
                tick = self.tick,
                emergency = ?emergency.kind,
                severity = emergency.severity,
                duration = emergency.duration,
                "climate emergency started"
            );
            events.push(EventKind::ClimateEmergencyStarted {
                emergency: emergency.kind,
                severity: emergency.severity,
                duration: emergency.duration,
            });
            self.emergency = Some(emergency);
        }
    }

    fn refresh_climate(&mut self) {
        let season = self.season();
        let base = weather::seasonal_temperature(season, self.tick);
        if self.dynamic {
            self.temperature =
                base + self.weather.category.temperature_offset(self.weather.intensity);
            self.stress = StressVector::compute(
                self.temperature,
                season,
                &self.weather,
                self.emergency.as_ref(),
            );
        } else {
            self.temperature = base;
            self.stress = StressVector::default();
        }
    }

    fn regenerate<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let cap = self.resource_cap();
        let p = self.config.spawn_probability
            * season_factor(self.season())
            * self.resource_multiplier();
        for _ in 0..self.config.spawn_attempts {
            if self.resources.len() >= cap {
                break;
            }
            if rng.chance(p) {
                self.resources.spawn_random(
                    &self.config,
                    self.world_size,
                    &self.terrain,
                    self.tick,
                    rng,
                );
            }
        }
    }

    fn top_up<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<EventKind> {
        let cap = self.resource_cap() as f32;
        if (self.resources.len() as f32) >= cap * TOP_UP_TRIGGER {
            return None;
        }
        let target = (cap * TOP_UP_TARGET).ceil() as usize;
        let mut spawned = 0;
        while self.resources.len() < target {
            self.resources.spawn_random(
                &self.config,
                self.world_size,
                &self.terrain,
                self.tick,
                rng,
            );
            spawned += 1;
        }
        if spawned == 0 {
            return None;
        }
        self.top_ups += 1;
        tracing::debug!(tick = self.tick, spawned, "emergency resource top-up");
        Some(EventKind::ResourceTopUp {
            spawned,
            total: self.resources.len(),
        })
    }

    /// Clamp a position into the world square
    pub fn clamp_to_world(&self, at: Vec3) -> Vec3 {
        Vec3::new(
            at.x.clamp(0.0, self.world_size),
            at.y.clamp(0.0, self.world_size),
            at.z,
        )
    }

    pub fn summary(&self) -> EnvironmentSummary {
        EnvironmentSummary {
            season: self.season(),
            temperature: self.temperature,
            resource_count: self.resources.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn config() -> EnvironmentConfig {
        EnvironmentConfig::default()
    }

    #[test]
    fn test_season_follows_tick() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut env = Environment::new(&config(), 200.0, true, &mut rng);
        assert_eq!(env.season(), Season::Spring);
        for _ in 0..300 {
            env.advance(&mut rng);
        }
        assert_eq!(env.season(), Season::Summer);
        for _ in 0..900 {
            env.advance(&mut rng);
        }
        assert_eq!(env.season(), Season::Spring);
    }

    #[test]
    fn test_static_environment_has_no_stress() {
        let mut rng = SmallRng::seed_from_u64(2);
        let mut env = Environment::new(&config(), 200.0, false, &mut rng);
        for _ in 0..500 {
            let events = env.advance(&mut rng);
            assert!(events
                .iter()
                .all(|e| matches!(e, EventKind::ResourceTopUp { .. })));
            assert_eq!(env.stress, StressVector::default());
            assert!(env.emergency.is_none());
        }
    }

    #[test]
    fn test_resources_stay_under_cap() {
        let mut rng = SmallRng::seed_from_u64(3);
        let mut env = Environment::new(&config(), 200.0, true, &mut rng);
        for _ in 0..1200 {
            let before = env.resources.len();
            env.advance(&mut rng);
            let cap = env.resource_cap();
            assert!(env.resources.len() <= before.max(cap) + 1);
        }
    }

    #[test]
    fn test_top_up_when_depleted() {
        let mut rng = SmallRng::seed_from_u64(4);
        let mut env = Environment::new(&config(), 200.0, false, &mut rng);
        env.resources.clear();
        let events = env.advance(&mut rng);
        let cap = env.resource_cap();
        assert!(events
            .iter()
            .any(|e| matches!(e, EventKind::ResourceTopUp { .. })));
        assert!(env.resources.len() >= (cap as f32 * TOP_UP_TARGET) as usize);
        assert_eq!(env.top_ups(), 1);
    }

    #[test]
    fn test_emergency_respects_cooldown() {
        let mut cfg = config();
        cfg.emergency_chance = 1.0;
        cfg.emergency_cooldown = 50;
        let mut rng = SmallRng::seed_from_u64(5);
        let mut env = Environment::new(&cfg, 200.0, true, &mut rng);
        env.advance(&mut rng);
        let first = env.emergency.expect("emergency should start at once");
        for _ in 0..first.duration {
            env.advance(&mut rng);
        }
        assert!(env.emergency.is_none());
        for _ in 0..49 {
            env.advance(&mut rng);
            assert!(env.emergency.is_none());
        }
        env.advance(&mut rng);
        env.advance(&mut rng);
        assert!(env.emergency.is_some());
    }

    #[test]
    fn test_flood_immunity() {
        let mut rng = SmallRng::seed_from_u64(6);
        let mut env = Environment::new(&config(), 200.0, true, &mut rng);
        env.stress.flood = 0.8;
        let hill = TerrainEffects {
            flood_immune: true,
            ..TerrainEffects::neutral()
        };
        assert_eq!(env.stress_for(&hill).flood, 0.0);
        assert_eq!(env.stress_for(&TerrainEffects::neutral()).flood, 0.8);
    }
}
