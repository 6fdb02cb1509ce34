//! Snapshot History
//!
//! Bounded ring of aggregate samples for charting consumers. Only every Nth
//! offered sample is kept; the oldest sample is evicted once full.

use ecosim_events::PopulationStats;
use std::collections::VecDeque;

/// Quantity extracted by [`SnapshotHistory::time_series`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesMetric {
    Population,
    Susceptible,
    Infected,
    Recovered,
    EnergyMean,
    Resources,
    MeanTrust,
}

impl SeriesMetric {
    fn read(&self, stats: &PopulationStats) -> f32 {
        match self {
            SeriesMetric::Population => stats.population as f32,
            SeriesMetric::Susceptible => stats.sir.susceptible as f32,
            SeriesMetric::Infected => stats.sir.infected as f32,
            SeriesMetric::Recovered => stats.sir.recovered as f32,
            SeriesMetric::EnergyMean => stats.energy_mean,
            SeriesMetric::Resources => stats.resource_count as f32,
            SeriesMetric::MeanTrust => stats.social.mean_trust,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotHistory {
    capacity: usize,
    downsample: u64,
    offered: u64,
    samples: VecDeque<PopulationStats>,
}

impl SnapshotHistory {
    pub fn new(capacity: usize, downsample: u64) -> Self {
        Self {
            capacity: capacity.max(1),
            downsample: downsample.max(1),
            offered: 0,
            samples: VecDeque::new(),
        }
    }

    /// Offer a sample. Returns true if it was kept.
    pub fn push(&mut self, stats: PopulationStats) -> bool {
        let keep = self.offered % self.downsample == 0;
        self.offered += 1;
        if !keep {
            return false;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(stats);
        true
    }

    pub fn latest(&self) -> Option<&PopulationStats> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PopulationStats> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.offered = 0;
    }

    /// (tick, value) pairs oldest first
    pub fn time_series(&self, metric: SeriesMetric) -> Vec<(u64, f32)> {
        self.samples
            .iter()
            .map(|s| (s.tick, metric.read(s)))
            .collect()
    }
}
