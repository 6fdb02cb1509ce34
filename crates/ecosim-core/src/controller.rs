//! Population Controller
//!
//! Owns the ECS world, the tick schedule, and everything that lives outside
//! the world: the reasoning bridge, the event sink, and the statistics
//! history. This is the only entry point external callers need.

use std::collections::{BTreeMap, VecDeque};

use bevy_ecs::prelude::*;
use ecosim_events::{
    generate_run_id, AgentId, HealthStatus, MetricsSnapshot, PopulationStats, RenderFrame,
    SimEvent, SimulationExport, Vec3,
};
use uuid::Uuid;

use crate::components::{Body, Identity, Modules, Vitals, MAX_ENERGY};
use crate::config::SimConfig;
use crate::error::SimError;
use crate::events::{EventLogger, EventQueue};
use crate::output::{self, RunSummary, SnapshotHistory, StatsCollector};
use crate::reasoning::{BridgeStats, Completion, ReasoningBackend, ReasoningBridge, ReasoningOutbox};
use crate::setup::build_world;
use crate::systems::{build_schedule, SimClock, TickOutcomes};

/// What happened during one step
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub population: usize,
    pub births: usize,
    pub deaths: usize,
    pub events: usize,
    /// Present on ticks that sampled aggregate statistics
    pub stats: Option<PopulationStats>,
}

pub struct PopulationController {
    config: SimConfig,
    world: World,
    schedule: Schedule,
    run_id: Uuid,
    bridge: Option<ReasoningBridge>,
    logger: Option<EventLogger>,
    history: SnapshotHistory,
    collector: StatsCollector,
    /// Collected events not yet handed out by `drain_events`
    unread: VecDeque<SimEvent>,
    /// Health status seen at the end of the previous step
    statuses: BTreeMap<AgentId, HealthStatus>,
}

impl PopulationController {
    /// Validate `config` and build a fresh run. With reasoning enabled the
    /// HTTP backend for the configured endpoint is used.
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        let backend = config
            .reasoning
            .enabled
            .then(|| ReasoningBackend::http(&config.reasoning));
        Self::build(config, backend)
    }

    /// Build a run whose reasoning calls go to `backend`
    pub fn with_backend(mut config: SimConfig, backend: ReasoningBackend) -> Result<Self, SimError> {
        config.reasoning.enabled = true;
        Self::build(config, Some(backend))
    }

    fn build(mut config: SimConfig, backend: Option<ReasoningBackend>) -> Result<Self, SimError> {
        config.validate()?;
        let bridge = match backend {
            Some(backend) => match ReasoningBridge::new(&config.reasoning, backend) {
                Ok(bridge) => Some(bridge),
                Err(e) => {
                    tracing::warn!(error = %e, "reasoning disabled, falling back to local decisions");
                    config.reasoning.enabled = false;
                    None
                }
            },
            None => None,
        };

        let sim = &config.simulation;
        let history = SnapshotHistory::new(sim.history_capacity, sim.history_downsample);
        let world = build_world(&config);
        let mut controller = Self {
            world,
            schedule: build_schedule(),
            run_id: generate_run_id(),
            bridge,
            logger: None,
            history,
            collector: StatsCollector::new(),
            unread: VecDeque::new(),
            statuses: BTreeMap::new(),
            config,
        };
        controller.collect_events();
        controller.statuses = controller.current_statuses();
        let population = controller.population();
        tracing::info!(
            run_id = %controller.run_id,
            seed = controller.config.simulation.seed,
            population,
            "simulation initialized"
        );
        Ok(controller)
    }

    /// Advance one tick
    pub fn step(&mut self) -> Result<TickReport, SimError> {
        self.apply_completions();
        self.schedule.run(&mut self.world);
        self.dispatch_requests();

        let (born, died) = {
            let outcomes = self.world.resource::<TickOutcomes>();
            (outcomes.born.len(), outcomes.died.clone())
        };
        if let Some(bridge) = self.bridge.as_mut() {
            for agent in &died {
                bridge.cancel(*agent);
            }
        }

        let events = self.collect_events();
        let tick = self.tick();
        let interval = self.config.simulation.stats_interval.max(1);
        let stats = if tick % interval == 0 {
            let stats = output::compute_stats(&mut self.world);
            self.collector.record_sample(&stats);
            self.history.push(stats.clone());
            tracing::debug!(
                tick,
                population = stats.population,
                infected = stats.sir.infected,
                energy_mean = stats.energy_mean,
                "stats sampled"
            );
            Some(stats)
        } else {
            None
        };

        self.check_invariants()?;

        Ok(TickReport {
            tick,
            population: self.population(),
            births: born,
            deaths: died.len(),
            events,
            stats,
        })
    }

    /// Advance `ticks` ticks, stopping at the first error
    pub fn run(&mut self, ticks: u64) -> Result<(), SimError> {
        for _ in 0..ticks {
            self.step()?;
        }
        Ok(())
    }

    /// Rebuild the run from scratch with a new seed. The config is otherwise unchanged.
    pub fn reset(&mut self, seed: u64) {
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.cancel_all();
            let stale = bridge.poll();
            tracing::trace!(stale = stale.len(), "dropped completions of the previous run");
        }
        self.config.simulation.seed = seed;
        self.world = build_world(&self.config);
        self.schedule = build_schedule();
        self.run_id = generate_run_id();
        self.history.clear();
        self.collector = StatsCollector::new();
        self.unread.clear();
        self.collect_events();
        self.statuses = self.current_statuses();
        tracing::info!(run_id = %self.run_id, seed, "simulation reset");
    }

    /// Hand out every event collected since the last call, oldest first
    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        self.unread.drain(..).collect()
    }

    /// Write every future event to `logger`, starting with the undrained backlog
    pub fn attach_logger(&mut self, mut logger: EventLogger) -> Result<(), SimError> {
        logger.log_batch(self.unread.make_contiguous())?;
        self.logger = Some(logger);
        Ok(())
    }

    /// Flush the event sink and summarize the run
    pub fn finish(&mut self) -> Result<RunSummary, SimError> {
        if let Some(logger) = self.logger.as_mut() {
            logger.flush()?;
            let counts: Vec<_> = logger.counts().collect();
            tracing::debug!(written = logger.event_count(), ?counts, "event log flushed");
        }
        Ok(self.collector.summary(self.tick()))
    }

    /// Point the given player agent in a direction; None hands control back
    /// to its policy. Returns false if the agent is not a living player.
    pub fn set_player_input(&mut self, agent: AgentId, heading: Option<Vec3>) -> bool {
        let mut query = self.world.query::<(&Identity, &mut Modules)>();
        for (identity, mut modules) in query.iter_mut(&mut self.world) {
            if identity.id != agent {
                continue;
            }
            if let Modules::Player(control) = &mut *modules {
                control.set_input(heading);
                return true;
            }
            return false;
        }
        false
    }

    pub fn stats(&mut self) -> PopulationStats {
        output::compute_stats(&mut self.world)
    }

    pub fn metrics_snapshot(&mut self) -> MetricsSnapshot {
        output::metrics_snapshot(&mut self.world, self.run_id)
    }

    pub fn full_snapshot(&mut self) -> SimulationExport {
        output::export(&mut self.world, self.run_id)
    }

    /// Full snapshot as pretty JSON
    pub fn export(&mut self) -> Result<String, SimError> {
        Ok(serde_json::to_string_pretty(&self.full_snapshot())?)
    }

    pub fn render_frame(&mut self) -> RenderFrame {
        output::render_frame(&mut self.world)
    }

    pub fn state_digest(&mut self) -> u64 {
        output::state_digest(&mut self.world)
    }

    pub fn history(&self) -> &SnapshotHistory {
        &self.history
    }

    pub fn tick(&self) -> u64 {
        self.world.resource::<SimClock>().tick
    }

    pub fn population(&mut self) -> usize {
        self.world.query::<&Identity>().iter(&self.world).count()
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn reasoning_stats(&self) -> Option<BridgeStats> {
        self.bridge.as_ref().map(|b| b.stats())
    }

    /// Block until in-flight reasoning calls finish or `limit` elapses, and
    /// apply their results as if they had arrived at the next tick start.
    pub fn await_reasoning(&mut self, limit: std::time::Duration) -> usize {
        let Some(bridge) = self.bridge.as_mut() else {
            return 0;
        };
        let count = bridge.in_flight_count();
        let completions = bridge.wait_for(count, limit);
        let applied = completions.len();
        self.apply(completions);
        applied
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    fn apply_completions(&mut self) {
        let Some(bridge) = self.bridge.as_mut() else {
            return;
        };
        let completions = bridge.poll();
        self.apply(completions);
    }

    fn apply(&mut self, completions: Vec<Completion>) {
        if completions.is_empty() {
            return;
        }
        let mut by_agent: BTreeMap<AgentId, Completion> =
            completions.into_iter().map(|c| (c.agent, c)).collect();
        let mut fallbacks = 0u64;

        let mut query = self.world.query::<(&Identity, &mut Modules)>();
        for (identity, mut modules) in query.iter_mut(&mut self.world) {
            let Some(completion) = by_agent.remove(&identity.id) else {
                continue;
            };
            let Some(social) = modules.social_mut() else {
                continue;
            };
            if social.reasoning.pending != Some(completion.request_id) {
                continue;
            }
            social.reasoning.pending = None;
            match completion.result {
                Ok(decision) => {
                    tracing::trace!(
                        agent = %identity.id,
                        action = ?decision.action,
                        attempts = completion.attempts,
                        "reasoning decision ready"
                    );
                    social.reasoning.ready = Some(decision);
                }
                Err(_) => fallbacks += 1,
            }
        }
        self.world.resource_mut::<ReasoningOutbox>().fallbacks += fallbacks;
    }

    fn dispatch_requests(&mut self) {
        let requests = self.world.resource_mut::<ReasoningOutbox>().take();
        if requests.is_empty() {
            return;
        }
        let Some(bridge) = self.bridge.as_mut() else {
            return;
        };
        let mut refused = Vec::new();
        for request in requests {
            let agent = request.agent.id;
            let request_id = request.request_id;
            if !bridge.dispatch(request) {
                refused.push((agent, request_id));
            }
        }
        if refused.is_empty() {
            return;
        }

        // A refused request must not leave its agent waiting forever
        let mut query = self.world.query::<(&Identity, &mut Modules)>();
        for (identity, mut modules) in query.iter_mut(&mut self.world) {
            let Some(social) = modules.social_mut() else {
                continue;
            };
            if refused
                .iter()
                .any(|(agent, id)| *agent == identity.id && social.reasoning.pending == Some(*id))
            {
                social.reasoning.pending = None;
            }
        }
        self.world.resource_mut::<ReasoningOutbox>().fallbacks += refused.len() as u64;
    }

    /// Move queued events to the logger, the collector, and the unread buffer
    fn collect_events(&mut self) -> usize {
        let events = self.world.resource_mut::<EventQueue>().drain();
        if events.is_empty() {
            return 0;
        }
        self.collector.record_events(&events);
        if let Some(logger) = self.logger.as_mut() {
            if let Err(e) = logger.log_batch(&events) {
                tracing::warn!(error = %e, "failed to write events, detaching event log");
                self.logger = None;
            }
        }
        let count = events.len();
        self.unread.extend(events);
        let capacity = self.config.simulation.event_queue_capacity.max(1);
        while self.unread.len() > capacity {
            self.unread.pop_front();
        }
        count
    }

    fn current_statuses(&mut self) -> BTreeMap<AgentId, HealthStatus> {
        self.world
            .query::<(&Identity, &Vitals)>()
            .iter(&self.world)
            .map(|(identity, vitals)| (identity.id, vitals.status))
            .collect()
    }

    /// Energy and trust bounds, finite positions, and S -> I -> R ordering
    fn check_invariants(&mut self) -> Result<(), SimError> {
        let mut statuses = BTreeMap::new();
        let mut query = self.world.query::<(&Identity, &Body, &Vitals, &Modules)>();
        for (identity, body, vitals, modules) in query.iter(&self.world) {
            let id = identity.id;
            if !vitals.energy.is_finite() || !(0.0..=MAX_ENERGY).contains(&vitals.energy) {
                return Err(SimError::invariant(id, format!("energy {} out of range", vitals.energy)));
            }
            if !body.position.is_finite() || !body.velocity.is_finite() {
                return Err(SimError::invariant(id, "non-finite position or velocity"));
            }
            if let Some(before) = self.statuses.get(&id) {
                if !before.can_transition_to(vitals.status) {
                    return Err(SimError::invariant(
                        id,
                        format!("illegal status transition {} -> {}", before, vitals.status),
                    ));
                }
            }
            if let Some(social) = modules.social() {
                for (other, relationship) in social.memory.relationships() {
                    if !(0.0..=1.0).contains(&relationship.trust) {
                        return Err(SimError::invariant(
                            id,
                            format!("trust {} toward {} out of range", relationship.trust, other),
                        ));
                    }
                }
            }
            statuses.insert(id, vitals.status);
        }
        self.statuses = statuses;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::PlayerControl;

    fn small_config(seed: u64) -> SimConfig {
        let mut config = SimConfig::default();
        config.simulation.seed = seed;
        config.simulation.initial_population = 40;
        config.simulation.stats_interval = 5;
        config
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = small_config(1);
        config.disease.transmission_rate = 2.0;
        assert!(matches!(
            PopulationController::new(config),
            Err(SimError::Config(_))
        ));
    }

    #[test]
    fn test_step_advances_clock_and_samples_stats() {
        let mut sim = PopulationController::new(small_config(3)).unwrap();
        assert_eq!(sim.tick(), 0);
        for expected in 1..=5 {
            let report = sim.step().unwrap();
            assert_eq!(report.tick, expected);
            assert_eq!(report.stats.is_some(), expected == 5);
        }
        assert_eq!(sim.history().len(), 1);
    }

    #[test]
    fn test_initial_births_are_reported() {
        let mut sim = PopulationController::new(small_config(4)).unwrap();
        let events = sim.drain_events();
        assert_eq!(events.len(), 40);
        assert!(sim.drain_events().is_empty());
    }

    #[test]
    fn test_reset_reproduces_run() {
        let mut sim = PopulationController::new(small_config(9)).unwrap();
        sim.run(20).unwrap();
        let first = sim.state_digest();
        let first_run = sim.run_id();

        sim.reset(9);
        assert_eq!(sim.tick(), 0);
        assert!(sim.history().is_empty());
        sim.run(20).unwrap();
        assert_eq!(sim.state_digest(), first);
        assert_ne!(sim.run_id(), first_run);
    }

    #[test]
    fn test_player_input_only_reaches_players() {
        let mut config = small_config(5);
        config.simulation.player_count = 1;
        let mut sim = PopulationController::new(config).unwrap();

        assert!(sim.set_player_input(AgentId(1), Some(Vec3::planar(3.0, 4.0))));
        assert!(!sim.set_player_input(AgentId(2), Some(Vec3::planar(1.0, 0.0))));
        assert!(!sim.set_player_input(AgentId(999), None));

        let world = sim.world_mut();
        let control = world
            .query::<(&Identity, &Modules)>()
            .iter(world)
            .find(|(i, _)| i.id == AgentId(1))
            .and_then(|(_, m)| match m {
                Modules::Player(c) => Some(c.clone()),
                _ => None,
            });
        let expected = PlayerControl {
            heading: Some(Vec3::planar(0.6, 0.8)),
            intensity: 1.0,
        };
        let control = control.unwrap();
        assert_eq!(control.intensity, expected.intensity);
        let heading = control.heading.unwrap();
        assert!((heading.x - 0.6).abs() < 1e-5 && (heading.y - 0.8).abs() < 1e-5);
    }

    #[test]
    fn test_invariant_violation_is_fatal() {
        let mut sim = PopulationController::new(small_config(6)).unwrap();
        let world = sim.world_mut();
        let (entity, id) = world
            .query::<(Entity, &Identity)>()
            .iter(world)
            .min_by_key(|(_, i)| i.id)
            .map(|(e, i)| (e, i.id))
            .unwrap();
        world.get_mut::<Vitals>(entity).unwrap().status = HealthStatus::Susceptible;
        // Recovered -> Susceptible is never legal
        sim.statuses.insert(id, HealthStatus::Recovered);
        let err = sim.check_invariants().unwrap_err();
        assert!(matches!(err, SimError::InvariantViolation { .. }));
    }

    #[test]
    fn test_energy_out_of_range_is_fatal() {
        let mut sim = PopulationController::new(small_config(7)).unwrap();
        let world = sim.world_mut();
        let entity = world
            .query::<(Entity, &Identity)>()
            .iter(world)
            .map(|(e, _)| e)
            .next()
            .unwrap();
        world.get_mut::<Vitals>(entity).unwrap().energy = 120.0;
        assert!(sim.check_invariants().is_err());
    }

    #[test]
    fn test_export_is_json() {
        let mut sim = PopulationController::new(small_config(8)).unwrap();
        sim.step().unwrap();
        let json = sim.export().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["tick"], 1);
        assert!(value["agents"].is_array());
        assert!(value["environment"]["resourceCount"].is_number());
    }
}
