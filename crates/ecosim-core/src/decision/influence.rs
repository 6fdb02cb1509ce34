//! Decision Influence Tracking
//!
//! Records what pushed each decision (social input, individual need,
//! environmental pressure, or chance) and checks after a fixed window
//! whether the decision achieved its goal. The success share is the agent's
//! adaptability score.

use ecosim_events::Vec3;
use std::collections::VecDeque;

use super::goals::{Goal, GoalKind};
use super::synthesis::DecisionSource;

const MAX_PENDING: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfluenceCause {
    Social,
    Individual,
    Environmental,
    Random,
}

impl InfluenceCause {
    pub const ALL: [InfluenceCause; 4] = [
        InfluenceCause::Social,
        InfluenceCause::Individual,
        InfluenceCause::Environmental,
        InfluenceCause::Random,
    ];

    fn index(self) -> usize {
        match self {
            InfluenceCause::Social => 0,
            InfluenceCause::Individual => 1,
            InfluenceCause::Environmental => 2,
            InfluenceCause::Random => 3,
        }
    }
}

/// Normalized attribution weights. Always sum to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InfluenceWeights {
    pub social: f32,
    pub individual: f32,
    pub environmental: f32,
    pub random: f32,
}

impl InfluenceWeights {
    pub fn new(social: f32, individual: f32, environmental: f32, random: f32) -> Self {
        let parts = [social, individual, environmental, random].map(|w| if w.is_finite() { w.max(0.0) } else { 0.0 });
        let total: f32 = parts.iter().sum();
        if total <= 0.0 {
            return Self {
                social: 0.25,
                individual: 0.25,
                environmental: 0.25,
                random: 0.25,
            };
        }
        Self {
            social: parts[0] / total,
            individual: parts[1] / total,
            environmental: parts[2] / total,
            random: parts[3] / total,
        }
    }

    pub fn sum(&self) -> f32 {
        self.social + self.individual + self.environmental + self.random
    }

    pub fn get(&self, cause: InfluenceCause) -> f32 {
        match cause {
            InfluenceCause::Social => self.social,
            InfluenceCause::Individual => self.individual,
            InfluenceCause::Environmental => self.environmental,
            InfluenceCause::Random => self.random,
        }
    }

    pub fn dominant(&self) -> InfluenceCause {
        InfluenceCause::ALL
            .into_iter()
            .fold(InfluenceCause::Social, |best, c| {
                if self.get(c) > self.get(best) {
                    c
                } else {
                    best
                }
            })
    }

    /// Attribute a chosen goal to its likely causes
    pub fn attribute(
        goal: &Goal,
        used_social_info: bool,
        environmental_pressure: f32,
        source: DecisionSource,
    ) -> Self {
        let mut social = if used_social_info { 0.5 } else { 0.1 };
        let mut individual = 0.4;
        let mut environmental = 0.6 * environmental_pressure.clamp(0.0, 1.0);
        let mut random = 0.1;
        match goal.kind {
            GoalKind::HelpOther | GoalKind::Trade | GoalKind::FormAlliance => social += 0.3,
            GoalKind::FindFood | GoalKind::Recover | GoalKind::Reproduce => individual += 0.3,
            GoalKind::AvoidDanger => environmental += 0.3,
            GoalKind::DefendTerritory | GoalKind::Patrol => individual += 0.1,
            GoalKind::Explore => random += 0.4,
        }
        if source == DecisionSource::Reasoning {
            social += 0.1;
        }
        Self::new(social, individual, environmental, random)
    }
}

/// Snapshot taken when a decision is made
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionRecord {
    pub tick: u64,
    pub goal: GoalKind,
    pub weights: InfluenceWeights,
    pub energy: f32,
    pub threat: f32,
    pub position: Vec3,
    pub target: Option<Vec3>,
}

/// State of the agent when a decision is judged
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionOutcome {
    pub energy: f32,
    pub threat: f32,
    pub position: Vec3,
    pub infected: bool,
}

fn succeeded(record: &DecisionRecord, outcome: &DecisionOutcome) -> bool {
    match record.goal {
        GoalKind::FindFood => outcome.energy > record.energy,
        GoalKind::AvoidDanger => outcome.threat < record.threat || outcome.threat < 0.2,
        GoalKind::Recover => !outcome.infected || outcome.energy >= record.energy - 2.0,
        GoalKind::Reproduce => outcome.energy >= record.energy * 0.5,
        GoalKind::DefendTerritory
        | GoalKind::HelpOther
        | GoalKind::Trade
        | GoalKind::FormAlliance
        | GoalKind::Patrol
        | GoalKind::Explore => match record.target {
            Some(target) => {
                let after = outcome.position.distance(&target);
                after < 3.0 || after < record.position.distance(&target)
            }
            None => outcome.position.distance(&record.position) >= 1.0,
        },
    }
}

/// Pending decisions awaiting evaluation plus running success counts
#[derive(Debug, Clone)]
pub struct InfluenceTracker {
    window: u64,
    pending: VecDeque<DecisionRecord>,
    evaluated: u64,
    succeeded: u64,
    cause_weight: [f32; 4],
    cause_success: [f32; 4],
}

impl InfluenceTracker {
    pub fn new(window: u64) -> Self {
        Self {
            window: window.max(1),
            pending: VecDeque::new(),
            evaluated: 0,
            succeeded: 0,
            cause_weight: [0.0; 4],
            cause_success: [0.0; 4],
        }
    }

    pub fn record(&mut self, record: DecisionRecord) {
        self.pending.push_back(record);
        while self.pending.len() > MAX_PENDING {
            self.pending.pop_front();
        }
    }

    /// Judge every decision whose window has elapsed. Returns how many were judged.
    pub fn evaluate(&mut self, tick: u64, outcome: &DecisionOutcome) -> usize {
        let mut judged = 0;
        while let Some(front) = self.pending.front() {
            if front.tick + self.window > tick {
                break;
            }
            let Some(record) = self.pending.pop_front() else {
                break;
            };
            let ok = succeeded(&record, outcome);
            self.evaluated += 1;
            for cause in InfluenceCause::ALL {
                let w = record.weights.get(cause);
                self.cause_weight[cause.index()] += w;
                if ok {
                    self.cause_success[cause.index()] += w;
                }
            }
            if ok {
                self.succeeded += 1;
            }
            judged += 1;
        }
        judged
    }

    /// Share of evaluated decisions that succeeded; 0 before any evaluation
    pub fn adaptability(&self) -> f32 {
        if self.evaluated == 0 {
            0.0
        } else {
            self.succeeded as f32 / self.evaluated as f32
        }
    }

    /// Weighted success rate of decisions attributed to `cause`
    pub fn success_rate(&self, cause: InfluenceCause) -> Option<f32> {
        let total = self.cause_weight[cause.index()];
        (total > 0.0).then(|| self.cause_success[cause.index()] / total)
    }

    pub fn evaluated(&self) -> u64 {
        self.evaluated
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
