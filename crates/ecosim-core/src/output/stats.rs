//! Statistics Output
//!
//! Aggregates population statistics from the world and accumulates a run
//! summary across ticks.

use bevy_ecs::prelude::*;
use ecosim_events::{PopulationStats, SimEvent, SirCounts};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::components::{Identity, Modules, Vitals};
use crate::environment::Environment;
use crate::error::SimError;
use crate::reasoning::ReasoningOutbox;
use crate::systems::{SimClock, TickOutcomes};

/// Compute aggregate statistics for the current tick
pub fn compute_stats(world: &mut World) -> PopulationStats {
    let tick = world.resource::<SimClock>().tick;
    let mut stats = PopulationStats {
        tick,
        ..PopulationStats::default()
    };

    let mut energy_sum = 0.0f64;
    let mut trust_sum = 0.0f64;
    let mut pruned = 0u64;
    let mut alliance_links = 0usize;
    let mut evaluated = 0u64;
    let mut succeeded = 0u64;

    let mut query = world.query::<(&Identity, &Vitals, &Modules)>();
    for (identity, vitals, modules) in query.iter(world) {
        stats.population += 1;
        *stats.by_kind.entry(identity.kind).or_insert(0) += 1;
        stats.sir.record(vitals.status);
        energy_sum += vitals.energy as f64;

        if let Some(social) = modules.social() {
            trust_sum += social.memory.trust_sum() as f64;
            stats.social.relationships += social.memory.len();
            pruned += social.memory.pruned_count();
            alliance_links += social.alliances.len();
            evaluated += social.influence.evaluated();
            succeeded += social.influence.succeeded();
        }
    }
    if stats.population > 0 {
        stats.energy_mean = (energy_sum / stats.population as f64) as f32;
    }

    let social = &mut stats.social;
    if social.relationships > 0 {
        social.mean_trust = (trust_sum / social.relationships as f64) as f32;
    }
    social.pruned_relationships = pruned;
    // Each alliance is recorded by both partners
    social.alliances = alliance_links / 2;
    social.decisions_evaluated = evaluated;
    social.decisions_succeeded = succeeded;
    if evaluated > 0 {
        social.adaptability = succeeded as f32 / evaluated as f32;
    }

    let env = world.resource::<Environment>();
    stats.resource_count = env.resources.len();
    stats.social.territories = env.territories.len();

    let outbox = world.resource::<ReasoningOutbox>();
    stats.social.reasoning_requests = outbox.requests_sent;
    stats.social.reasoning_fallbacks = outbox.fallbacks;

    let outcomes = world.resource::<TickOutcomes>();
    stats.births = outcomes.births;
    stats.deaths = outcomes.deaths;
    stats.suppressed_births = outcomes.suppressed;
    stats
}

/// Summary of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total_ticks: u64,
    pub total_events: u64,
    pub events_by_type: BTreeMap<String, u64>,
    pub average_events_per_tick: f64,
    pub peak_population: usize,
    pub peak_infected: usize,
    pub final_stats: Option<PopulationStats>,
}

/// Accumulates event counts and population peaks during a run
#[derive(Debug, Default, Clone)]
pub struct StatsCollector {
    pub total_events: u64,
    pub events_by_type: BTreeMap<String, u64>,
    pub peak_population: usize,
    pub peak_infected: usize,
    last: Option<PopulationStats>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record events from a tick
    pub fn record_events(&mut self, events: &[SimEvent]) {
        for event in events {
            self.total_events += 1;
            let name = format!("{:?}", event.event_type);
            *self.events_by_type.entry(name).or_insert(0) += 1;
        }
    }

    /// Record an aggregate sample
    pub fn record_sample(&mut self, stats: &PopulationStats) {
        self.peak_population = self.peak_population.max(stats.population);
        self.peak_infected = self.peak_infected.max(stats.sir.infected);
        self.last = Some(stats.clone());
    }

    pub fn last_sample(&self) -> Option<&PopulationStats> {
        self.last.as_ref()
    }

    pub fn summary(&self, total_ticks: u64) -> RunSummary {
        let average_events_per_tick = if total_ticks > 0 {
            self.total_events as f64 / total_ticks as f64
        } else {
            0.0
        };
        RunSummary {
            total_ticks,
            total_events: self.total_events,
            events_by_type: self.events_by_type.clone(),
            average_events_per_tick,
            peak_population: self.peak_population,
            peak_infected: self.peak_infected,
            final_stats: self.last.clone(),
        }
    }
}

/// One-line console rendering of a stats sample
pub fn format_stats_line(stats: &PopulationStats) -> String {
    let SirCounts {
        susceptible,
        infected,
        recovered,
    } = stats.sir;
    format!(
        "tick {:>6} | pop {:>4} | S {:>4} I {:>4} R {:>4} | energy {:>5.1} | food {:>4} | alliances {:>3} | territories {:>3}",
        stats.tick,
        stats.population,
        susceptible,
        infected,
        recovered,
        stats.energy_mean,
        stats.resource_count,
        stats.social.alliances,
        stats.social.territories,
    )
}

/// Write the run summary as pretty JSON
pub fn write_summary(summary: &RunSummary, path: impl AsRef<Path>) -> Result<(), SimError> {
    let path = path.as_ref();
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json)?;
    Ok(())
}
