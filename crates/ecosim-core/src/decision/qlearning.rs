//! Learned Movement Policy
//!
//! Tabular Q-learning over a coarse discretization of what an agent perceives.
//! Each agent owns its own table; nothing is shared between agents.

use ecosim_events::HealthStatus;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::LearningConfig;
use crate::rng::RandomExt;

/// Where a movement action steers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    TowardResource,
    AwayFromInfected,
    TowardAgents,
    Random,
}

/// One entry of the fixed action set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyAction {
    pub name: &'static str,
    pub intensity: f32,
    pub direction: Direction,
    /// Blend a flee component away from nearby infected agents
    pub avoid_infected: bool,
}

const fn action(
    name: &'static str,
    intensity: f32,
    direction: Direction,
    avoid_infected: bool,
) -> PolicyAction {
    PolicyAction {
        name,
        intensity,
        direction,
        avoid_infected,
    }
}

pub const ACTION_COUNT: usize = 8;

pub const ACTIONS: [PolicyAction; ACTION_COUNT] = [
    action("wander_slow", 0.2, Direction::Random, false),
    action("wander", 0.6, Direction::Random, false),
    action("seek_food", 1.0, Direction::TowardResource, false),
    action("cautious_food", 0.6, Direction::TowardResource, true),
    action("flee", 1.0, Direction::AwayFromInfected, true),
    action("flock", 0.5, Direction::TowardAgents, false),
    action("cautious_flock", 0.5, Direction::TowardAgents, true),
    action("rest", 0.1, Direction::Random, false),
];

/// What the policy sees of the world on a given tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub energy: f32,
    pub age: u64,
    pub nearby_agents: usize,
    pub nearby_infected: usize,
    /// Distance to the nearest known resource
    pub nearest_resource: Option<f32>,
    pub status: HealthStatus,
}

/// Discretized state key, e.g. `e2|n3|i0|r1|S`
pub fn state_key(obs: &Observation, resource_near: bool) -> String {
    let energy_bucket = ((obs.energy / 25.0).floor() as i32).clamp(0, 4);
    format!(
        "e{}|n{}|i{}|r{}|{}",
        energy_bucket,
        obs.nearby_agents.min(5),
        obs.nearby_infected.min(3),
        u8::from(resource_near),
        obs.status.code()
    )
}

/// Reward for arriving in `obs`: energy, minus crowding by infected agents, plus a bonus for
/// reaching food while hungry
pub fn reward(obs: &Observation, resource_near: bool) -> f32 {
    let mut r = 0.1 * obs.energy - 2.0 * obs.nearby_infected as f32 - 0.001 * obs.age as f32;
    if obs.energy < 30.0 && resource_near {
        r += 5.0;
    }
    r
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearningParams {
    pub epsilon: f32,
    pub epsilon_decay: f32,
    pub min_epsilon: f32,
    pub learning_rate: f32,
    pub discount: f32,
}

impl From<&LearningConfig> for LearningParams {
    fn from(cfg: &LearningConfig) -> Self {
        Self {
            epsilon: cfg.epsilon,
            epsilon_decay: cfg.epsilon_decay,
            min_epsilon: cfg.min_epsilon,
            learning_rate: cfg.learning_rate,
            discount: cfg.discount,
        }
    }
}

/// Epsilon-greedy tabular Q-learner
#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    q_table: HashMap<String, [f32; ACTION_COUNT]>,
    params: LearningParams,
    epsilon: f32,
    near_distance: f32,
    last: Option<(String, usize)>,
    updates: u64,
}

impl DecisionPolicy {
    pub fn new(params: LearningParams, near_distance: f32) -> Self {
        Self {
            q_table: HashMap::new(),
            epsilon: params.epsilon,
            params,
            near_distance,
            last: None,
            updates: 0,
        }
    }

    pub fn is_resource_near(&self, obs: &Observation) -> bool {
        obs.nearest_resource.is_some_and(|d| d <= self.near_distance)
    }

    pub fn key(&self, obs: &Observation) -> String {
        state_key(obs, self.is_resource_near(obs))
    }

    /// Learn from the previous transition, then pick the next action.
    pub fn decide<R: Rng + ?Sized>(&mut self, obs: &Observation, rng: &mut R) -> PolicyAction {
        let near = self.is_resource_near(obs);
        let key = state_key(obs, near);
        if let Some((prev_key, prev_action)) = self.last.take() {
            self.update(&prev_key, prev_action, reward(obs, near), &key);
        }
        let index = self.get_action(&key, rng);
        self.last = Some((key, index));
        ACTIONS[index]
    }

    /// Epsilon-greedy selection. Exploration decays on every call.
    pub fn get_action<R: Rng + ?Sized>(&mut self, key: &str, rng: &mut R) -> usize {
        let index = if rng.chance(self.epsilon) {
            rng.gen_range(0..ACTION_COUNT)
        } else {
            self.greedy(key)
        };
        self.epsilon = (self.epsilon * self.params.epsilon_decay).max(self.params.min_epsilon);
        index
    }

    /// Highest-valued action; ties and unseen states resolve to the lowest index.
    pub fn greedy(&self, key: &str) -> usize {
        let Some(values) = self.q_table.get(key) else {
            return 0;
        };
        let mut best = 0;
        for (i, v) in values.iter().enumerate().skip(1) {
            if *v > values[best] {
                best = i;
            }
        }
        best
    }

    /// Standard one-step update: q += alpha * (r + gamma * max q' - q)
    pub fn update(&mut self, state: &str, action: usize, reward: f32, next_state: &str) {
        if action >= ACTION_COUNT || !reward.is_finite() {
            return;
        }
        let next_max = self
            .q_table
            .get(next_state)
            .map(|v| v.iter().copied().fold(f32::NEG_INFINITY, f32::max))
            .unwrap_or(0.0);
        let LearningParams {
            learning_rate,
            discount,
            ..
        } = self.params;
        let entry = self
            .q_table
            .entry(state.to_string())
            .or_insert([0.0; ACTION_COUNT]);
        entry[action] += learning_rate * (reward + discount * next_max - entry[action]);
        self.updates += 1;
    }

    pub fn q_values(&self, key: &str) -> Option<&[f32; ACTION_COUNT]> {
        self.q_table.get(key)
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    pub fn states_seen(&self) -> usize {
        self.q_table.len()
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn obs(energy: f32) -> Observation {
        Observation {
            energy,
            age: 10,
            nearby_agents: 7,
            nearby_infected: 1,
            nearest_resource: Some(4.0),
            status: HealthStatus::Susceptible,
        }
    }

    fn params() -> LearningParams {
        LearningParams::from(&LearningConfig::default())
    }

    #[test]
    fn test_state_key_buckets() {
        assert_eq!(state_key(&obs(45.0), true), "e1|n5|i1|r1|S");
        assert_eq!(state_key(&obs(75.0), true), "e3|n5|i1|r1|S");
        assert_eq!(state_key(&obs(100.0), false), "e4|n5|i1|r0|S");
        assert_eq!(state_key(&obs(0.0), false), "e0|n5|i1|r0|S");
    }

    #[test]
    fn test_reward_terms() {
        let mut o = obs(20.0);
        // one infected neighbour
        assert!((reward(&o, true) - (2.0 - 2.0 + 5.0 - 0.01)).abs() < 1e-5);
        assert!((reward(&o, false) - (2.0 - 2.0 - 0.01)).abs() < 1e-5);
        o.nearby_infected = 3;
        o.energy = 50.0;
        assert!((reward(&o, true) - (5.0 - 6.0 - 0.01)).abs() < 1e-5);
    }

    #[test]
    fn test_update_rule() {
        let mut policy = DecisionPolicy::new(params(), 15.0);
        policy.update("a", 2, 10.0, "b");
        assert!((policy.q_values("a").unwrap()[2] - 1.0).abs() < 1e-6);
        policy.update("b", 5, 0.0, "a");
        // 0.1 * (0 + 0.9 * 1.0 - 0)
        assert!((policy.q_values("b").unwrap()[5] - 0.09).abs() < 1e-6);
        assert_eq!(policy.greedy("a"), 2);
        assert_eq!(policy.updates(), 2);
    }

    #[test]
    fn test_zero_learning_rate_leaves_table_unchanged() {
        let mut p = params();
        p.learning_rate = 0.0;
        let mut policy = DecisionPolicy::new(p, 15.0);
        policy.update("a", 1, 50.0, "b");
        policy.update("a", 1, -50.0, "a");
        assert_eq!(policy.q_values("a").unwrap(), &[0.0; ACTION_COUNT]);
    }

    #[test]
    fn test_greedy_ties_pick_lowest_index() {
        let policy = DecisionPolicy::new(params(), 15.0);
        assert_eq!(policy.greedy("unseen"), 0);
    }

    #[test]
    fn test_epsilon_decays_to_floor() {
        let mut policy = DecisionPolicy::new(params(), 15.0);
        let mut rng = SmallRng::seed_from_u64(2);
        for _ in 0..10_000 {
            policy.get_action("s", &mut rng);
        }
        assert!((policy.epsilon() - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_decide_learns_from_previous_transition() {
        let mut policy = DecisionPolicy::new(params(), 15.0);
        let mut rng = SmallRng::seed_from_u64(3);
        policy.decide(&obs(50.0), &mut rng);
        assert_eq!(policy.updates(), 0);
        policy.decide(&obs(48.0), &mut rng);
        assert_eq!(policy.updates(), 1);
        assert_eq!(policy.states_seen(), 1);
    }

    #[test]
    fn test_zero_epsilon_is_deterministic() {
        let mut p = params();
        p.epsilon = 0.0;
        p.min_epsilon = 0.0;
        let mut policy = DecisionPolicy::new(p, 15.0);
        policy.update("k", 4, 5.0, "k");
        let mut rng = SmallRng::seed_from_u64(4);
        for _ in 0..20 {
            assert_eq!(policy.get_action("k", &mut rng), 4);
        }
    }
}
