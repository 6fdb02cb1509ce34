//! Configuration System
//!
//! Loads tuning parameters from a TOML file so the simulation can be adjusted
//! without recompiling. Every section is optional; missing values fall back to
//! the defaults below.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::ConfigError;

/// Default tuning file path
pub const DEFAULT_CONFIG_PATH: &str = "ecosim.toml";

/// Inclusive numeric range used for randomized initial values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f32,
    pub max: f32,
}

impl Range {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    pub fn width(&self) -> f32 {
        self.max - self.min
    }

    /// Uniform sample; a degenerate range returns `min`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        if self.max <= self.min {
            self.min
        } else {
            rng.gen_range(self.min..self.max)
        }
    }
}

/// Top-level configuration structure
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub agents: AgentConfig,
    #[serde(default)]
    pub disease: DiseaseConfig,
    #[serde(default)]
    pub learning: LearningConfig,
    #[serde(default)]
    pub social: SocialConfig,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub reasoning: ReasoningConfig,
}

/// Run-level parameters and feature toggles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub seed: u64,
    pub world_size: f32,
    pub initial_population: usize,
    pub max_population: usize,
    /// Share of the initial population carrying the social modules
    pub social_fraction: f32,
    pub player_count: usize,
    pub max_ticks: u64,
    /// Ticks between aggregate statistics samples
    pub stats_interval: u64,
    pub history_capacity: usize,
    /// Keep every Nth statistics sample in the history buffer
    pub history_downsample: u64,
    /// Events retained when nobody drains the queue
    pub event_queue_capacity: usize,
    pub enable_disease: bool,
    pub enable_reproduction: bool,
    pub enable_environment: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            world_size: 200.0,
            initial_population: 150,
            max_population: 1000,
            social_fraction: 0.5,
            player_count: 0,
            max_ticks: 5000,
            stats_interval: 10,
            history_capacity: 1000,
            history_downsample: 1,
            event_queue_capacity: 100_000,
            enable_disease: true,
            enable_reproduction: true,
            enable_environment: true,
        }
    }
}

/// Life-cycle parameters shared by every agent kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub initial_energy: Range,
    pub base_energy_loss: f32,
    pub infection_penalty: f32,
    pub age_penalty: f32,
    pub critical_energy: f32,
    pub recovery_bonus: f32,
    pub forage_radius: f32,
    /// Distance below which a resource counts as "near" for the policy
    pub resource_near_distance: f32,
    pub acceleration: f32,
    pub damping: f32,
    pub reproduction_rate: f32,
    pub reproduction_cost: f32,
    pub reproduction_cooldown: u32,
    pub min_reproduction_age: u64,
    pub offspring_energy: f32,
    pub mutation_rate: f32,
    pub mutation_strength: f32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            initial_energy: Range::new(50.0, 100.0),
            base_energy_loss: 0.1,
            infection_penalty: 0.15,
            age_penalty: 0.1,
            critical_energy: 10.0,
            recovery_bonus: 10.0,
            forage_radius: 3.0,
            resource_near_distance: 15.0,
            acceleration: 0.5,
            damping: 0.85,
            reproduction_rate: 0.02,
            reproduction_cost: 30.0,
            reproduction_cooldown: 150,
            min_reproduction_age: 100,
            offspring_energy: 50.0,
            mutation_rate: 0.1,
            mutation_strength: 0.1,
        }
    }
}

/// Canonical contagion rate table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiseaseConfig {
    /// Per-tick infection probability for an exposed, unprotected agent
    pub transmission_rate: f32,
    /// Base ticks until an infected agent recovers
    pub recovery_time: u32,
    /// Fraction of the initial population seeded as infected
    pub initial_infection_rate: f32,
}

impl Default for DiseaseConfig {
    fn default() -> Self {
        Self {
            transmission_rate: 0.15,
            recovery_time: 120,
            initial_infection_rate: 0.05,
        }
    }
}

/// Q-learning hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub epsilon: f32,
    pub epsilon_decay: f32,
    pub min_epsilon: f32,
    pub learning_rate: f32,
    pub discount: f32,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.1,
            epsilon_decay: 0.999,
            min_epsilon: 0.01,
            learning_rate: 0.1,
            discount: 0.9,
        }
    }
}

/// Trust, communication, and cooperation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialConfig {
    pub relationship_capacity: usize,
    pub history_capacity: usize,
    pub message_buffer: usize,
    pub observation_buffer: usize,
    /// Nearest neighbours recorded as observed per tick
    pub observations_per_tick: usize,
    pub trust_idle_period: u64,
    pub trust_decay_rate: f32,
    /// Minimum trust before another agent's claims are acted on
    pub trust_threshold: f32,
    pub tip_capacity: usize,
    pub warning_capacity: usize,
    pub info_decay_interval: u64,
    pub info_decay: f32,
    pub info_ttl: u64,
    pub communication_rate: f32,
    pub alliance_proposal_chance: f32,
    pub alliance_trust: f32,
    pub alliance_accept_trust: f32,
    pub max_alliances: usize,
    pub alliance_decay: f32,
    pub alliance_floor: f32,
    pub alliance_grace: u64,
    pub share_energy: f32,
    pub territory_claim_chance: f32,
    pub territory_min_age: u64,
    pub territory_decay: f32,
    pub trade_price: f32,
    pub trade_expiry: u64,
    pub help_energy: f32,
    pub help_cooldown: u64,
    pub help_expiry: u64,
    pub evaluation_window: u64,
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            relationship_capacity: 64,
            history_capacity: 10,
            message_buffer: 32,
            observation_buffer: 32,
            observations_per_tick: 8,
            trust_idle_period: 200,
            trust_decay_rate: 0.01,
            trust_threshold: 0.4,
            tip_capacity: 16,
            warning_capacity: 16,
            info_decay_interval: 10,
            info_decay: 0.05,
            info_ttl: 300,
            communication_rate: 0.1,
            alliance_proposal_chance: 0.05,
            alliance_trust: 0.7,
            alliance_accept_trust: 0.6,
            max_alliances: 3,
            alliance_decay: 0.005,
            alliance_floor: 0.2,
            alliance_grace: 50,
            share_energy: 10.0,
            territory_claim_chance: 0.01,
            territory_min_age: 150,
            territory_decay: 0.002,
            trade_price: 8.0,
            trade_expiry: 20,
            help_energy: 15.0,
            help_cooldown: 50,
            help_expiry: 100,
            evaluation_window: 10,
        }
    }
}

/// Weather, terrain, and resource parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub season_length: u64,
    pub initial_resources: usize,
    pub base_resource_cap: usize,
    pub spawn_probability: f32,
    pub spawn_attempts: u32,
    pub resource_value: Range,
    pub resource_quality: Range,
    pub weather_resistant_fraction: f32,
    pub emergency_chance: f32,
    pub emergency_cooldown: u32,
    pub shelters: usize,
    pub shelter_capacity: usize,
    pub oases: usize,
    pub hills: usize,
    pub contaminated_zones: usize,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            season_length: 300,
            initial_resources: 150,
            base_resource_cap: 250,
            spawn_probability: 0.35,
            spawn_attempts: 3,
            resource_value: Range::new(10.0, 30.0),
            resource_quality: Range::new(0.5, 1.5),
            weather_resistant_fraction: 0.2,
            emergency_chance: 0.001,
            emergency_cooldown: 400,
            shelters: 5,
            shelter_capacity: 8,
            oases: 3,
            hills: 4,
            contaminated_zones: 3,
        }
    }
}

/// External reasoning service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
    /// Minimum ticks between two requests from the same agent
    pub request_cooldown: u64,
    pub worker_threads: usize,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "http://localhost:8000".to_string(),
            timeout_ms: 2000,
            max_retries: 1,
            request_cooldown: 30,
            worker_threads: 2,
            max_tokens: 256,
            temperature: 0.7,
        }
    }
}

impl SimConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load from the default path, or use defaults if it is missing or broken
    pub fn load_or_default() -> Self {
        if !Path::new(DEFAULT_CONFIG_PATH).exists() {
            return Self::default();
        }
        Self::load(DEFAULT_CONFIG_PATH).unwrap_or_else(|e| {
            tracing::warn!(error = %e, path = DEFAULT_CONFIG_PATH, "could not load config, using defaults");
            Self::default()
        })
    }

    /// Render as pretty TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every value and report all violations at once
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        let mut rate = |name: &str, value: f32| {
            if !(0.0..=1.0).contains(&value) {
                errors.push(format!("{} must be within [0, 1], got {}", name, value));
            }
        };

        let sim = &self.simulation;
        rate("simulation.social_fraction", sim.social_fraction);
        rate("agents.reproduction_rate", self.agents.reproduction_rate);
        rate("agents.mutation_rate", self.agents.mutation_rate);
        rate("agents.mutation_strength", self.agents.mutation_strength);
        rate("agents.damping", self.agents.damping);
        rate("disease.transmission_rate", self.disease.transmission_rate);
        rate("disease.initial_infection_rate", self.disease.initial_infection_rate);
        rate("learning.epsilon", self.learning.epsilon);
        rate("learning.epsilon_decay", self.learning.epsilon_decay);
        rate("learning.min_epsilon", self.learning.min_epsilon);
        rate("learning.learning_rate", self.learning.learning_rate);
        rate("learning.discount", self.learning.discount);
        rate("social.trust_threshold", self.social.trust_threshold);
        rate("social.communication_rate", self.social.communication_rate);
        rate("social.alliance_proposal_chance", self.social.alliance_proposal_chance);
        rate("social.alliance_trust", self.social.alliance_trust);
        rate("social.alliance_accept_trust", self.social.alliance_accept_trust);
        rate("social.alliance_floor", self.social.alliance_floor);
        rate("social.territory_claim_chance", self.social.territory_claim_chance);
        rate("environment.spawn_probability", self.environment.spawn_probability);
        rate("environment.weather_resistant_fraction", self.environment.weather_resistant_fraction);
        rate("environment.emergency_chance", self.environment.emergency_chance);

        if !(sim.world_size.is_finite() && sim.world_size > 0.0) {
            errors.push(format!("simulation.world_size must be positive, got {}", sim.world_size));
        }
        if sim.max_population == 0 {
            errors.push("simulation.max_population must be positive".to_string());
        }
        if sim.initial_population + sim.player_count > sim.max_population {
            errors.push(format!(
                "initial population ({} + {} players) exceeds max_population {}",
                sim.initial_population, sim.player_count, sim.max_population
            ));
        }
        if sim.stats_interval == 0 {
            errors.push("simulation.stats_interval must be positive".to_string());
        }
        if sim.history_capacity == 0 || sim.history_downsample == 0 {
            errors.push("simulation.history_capacity and history_downsample must be positive".to_string());
        }
        if sim.event_queue_capacity == 0 {
            errors.push("simulation.event_queue_capacity must be positive".to_string());
        }

        let agents = &self.agents;
        if !agents.initial_energy.is_valid()
            || agents.initial_energy.min < 0.0
            || agents.initial_energy.max > 100.0
        {
            errors.push(format!(
                "agents.initial_energy must be a range within [0, 100], got {:?}",
                agents.initial_energy
            ));
        }
        if !(0.0..100.0).contains(&agents.critical_energy) {
            errors.push(format!("agents.critical_energy must be within [0, 100), got {}", agents.critical_energy));
        }
        if !(0.0..=100.0).contains(&agents.offspring_energy) || agents.offspring_energy <= 0.0 {
            errors.push(format!("agents.offspring_energy must be within (0, 100], got {}", agents.offspring_energy));
        }
        for (name, value) in [
            ("agents.base_energy_loss", agents.base_energy_loss),
            ("agents.infection_penalty", agents.infection_penalty),
            ("agents.age_penalty", agents.age_penalty),
            ("agents.recovery_bonus", agents.recovery_bonus),
            ("agents.reproduction_cost", agents.reproduction_cost),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                errors.push(format!("{} must be non-negative, got {}", name, value));
            }
        }
        for (name, value) in [
            ("agents.forage_radius", agents.forage_radius),
            ("agents.resource_near_distance", agents.resource_near_distance),
            ("agents.acceleration", agents.acceleration),
        ] {
            if !(value.is_finite() && value > 0.0) {
                errors.push(format!("{} must be positive, got {}", name, value));
            }
        }

        if self.disease.recovery_time == 0 {
            errors.push("disease.recovery_time must be positive".to_string());
        }

        let social = &self.social;
        for (name, value) in [
            ("social.relationship_capacity", social.relationship_capacity),
            ("social.history_capacity", social.history_capacity),
            ("social.message_buffer", social.message_buffer),
            ("social.observation_buffer", social.observation_buffer),
            ("social.tip_capacity", social.tip_capacity),
            ("social.warning_capacity", social.warning_capacity),
        ] {
            if value == 0 {
                errors.push(format!("{} must be positive", name));
            }
        }
        if social.info_decay_interval == 0 || social.evaluation_window == 0 {
            errors.push("social.info_decay_interval and evaluation_window must be positive".to_string());
        }

        let env = &self.environment;
        if env.season_length == 0 {
            errors.push("environment.season_length must be positive".to_string());
        }
        if !env.resource_value.is_valid() || env.resource_value.min < 0.0 {
            errors.push(format!("environment.resource_value is not a valid range: {:?}", env.resource_value));
        }
        if !env.resource_quality.is_valid() || env.resource_quality.min < 0.0 {
            errors.push(format!("environment.resource_quality is not a valid range: {:?}", env.resource_quality));
        }
        if env.shelter_capacity == 0 && env.shelters > 0 {
            errors.push("environment.shelter_capacity must be positive when shelters exist".to_string());
        }

        if self.reasoning.enabled {
            if self.reasoning.endpoint.trim().is_empty() {
                errors.push("reasoning.endpoint must not be empty when reasoning is enabled".to_string());
            }
            if self.reasoning.timeout_ms == 0 || self.reasoning.worker_threads == 0 {
                errors.push("reasoning.timeout_ms and worker_threads must be positive".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.simulation.seed, 42);
        assert!((config.disease.transmission_rate - 0.15).abs() < f32::EPSILON);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = SimConfig::from_toml_str(
            r#"
            [simulation]
            seed = 7
            initial_population = 20

            [disease]
            transmission_rate = 0.3
            "#,
        )
        .unwrap();
        assert_eq!(config.simulation.seed, 7);
        assert_eq!(config.simulation.initial_population, 20);
        assert_eq!(config.simulation.max_population, 1000);
        assert!((config.disease.transmission_rate - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.learning, LearningConfig::default());
    }

    #[test]
    fn test_validation_collects_every_error() {
        let mut config = SimConfig::default();
        config.disease.transmission_rate = 1.5;
        config.learning.epsilon = -0.1;
        config.agents.initial_energy = Range::new(90.0, 10.0);

        match config.validate() {
            Err(ConfigError::Invalid(errors)) => {
                assert_eq!(errors.len(), 3, "errors: {:?}", errors);
                assert!(errors.iter().any(|e| e.contains("transmission_rate")));
            }
            other => panic!("expected invalid config, got {:?}", other),
        }
    }

    #[test]
    fn test_population_exceeding_cap_is_invalid() {
        let mut config = SimConfig::default();
        config.simulation.initial_population = 10;
        config.simulation.max_population = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = SimConfig::default();
        let text = config.to_toml().unwrap();
        let parsed = SimConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[environment]\nshelters = 2").unwrap();
        let config = SimConfig::load(file.path()).unwrap();
        assert_eq!(config.environment.shelters, 2);
        assert!(SimConfig::load("definitely/not/here.toml").is_err());
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../ecosim.toml");
        let config = SimConfig::load(path).unwrap();
        assert_eq!(config, SimConfig::default());
    }

    #[test]
    fn test_range_sampling_stays_in_bounds() {
        use rand::rngs::SmallRng;
        use rand::SeedableRng;

        let range = Range::new(2.0, 3.0);
        let mut rng = SmallRng::seed_from_u64(1);
        for _ in 0..100 {
            assert!(range.contains(range.sample(&mut rng)));
        }
        assert_eq!(Range::new(4.0, 4.0).sample(&mut rng), 4.0);
    }
}
