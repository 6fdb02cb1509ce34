//! Goal Generation
//!
//! Social agents rank what they want this tick. Goals are regenerated every
//! tick from the agent's current context and ordered by priority tier, then
//! urgency.

use ecosim_events::{AgentId, HealthStatus, Vec3};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Energy below which finding food is critical
pub const FOOD_CRITICAL: f32 = 20.0;
/// Energy below which finding food is high priority
pub const FOOD_HIGH: f32 = 40.0;
/// Threat above which avoiding danger is critical
pub const THREAT_CRITICAL: f32 = 0.7;
/// Threat above which avoiding danger is high priority
pub const THREAT_HIGH: f32 = 0.4;
/// Minimum energy before an agent spends effort on others
pub const HELPER_ENERGY: f32 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalKind {
    FindFood,
    AvoidDanger,
    Recover,
    DefendTerritory,
    HelpOther,
    Trade,
    Reproduce,
    FormAlliance,
    Patrol,
    Explore,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Goal {
    pub kind: GoalKind,
    pub priority: Priority,
    /// Tie-breaker within a tier, in [0, 1]
    pub urgency: f32,
    pub target: Option<Vec3>,
    pub target_agent: Option<AgentId>,
}

impl Goal {
    pub fn new(kind: GoalKind, priority: Priority, urgency: f32) -> Self {
        Self {
            kind,
            priority,
            urgency: urgency.clamp(0.0, 1.0),
            target: None,
            target_agent: None,
        }
    }

    pub fn with_target(mut self, target: Vec3) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_agent(mut self, agent: AgentId) -> Self {
        self.target_agent = Some(agent);
        self
    }

    fn rank(&self, other: &Goal) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then(other.urgency.total_cmp(&self.urgency))
    }
}

/// Everything goal generation looks at
#[derive(Debug, Clone, Default)]
pub struct GoalContext {
    pub energy: f32,
    pub status: Option<HealthStatus>,
    /// Combined threat at the agent's position, in [0, 1]
    pub threat: f32,
    /// Where the threat comes from, if known
    pub threat_source: Option<Vec3>,
    /// Best food target: a visible resource or a trusted tip
    pub food_target: Option<Vec3>,
    pub intruder: Option<(AgentId, Vec3)>,
    /// Most urgent pending help request
    pub help_target: Option<(AgentId, Vec3, f32)>,
    pub trade_partner: Option<AgentId>,
    pub can_reproduce: bool,
    pub alliance_candidate: Option<AgentId>,
    pub patrol_waypoint: Option<Vec3>,
    pub explore_heading: Option<Vec3>,
}

/// Build the ordered goal list for one tick. Never empty: Explore is always present.
pub fn generate_goals(ctx: &GoalContext) -> Vec<Goal> {
    let mut goals = Vec::new();

    let hunger = (1.0 - ctx.energy / 100.0).clamp(0.0, 1.0);
    if ctx.energy < FOOD_CRITICAL {
        goals.push(with_opt_target(Goal::new(GoalKind::FindFood, Priority::Critical, hunger), ctx.food_target));
    } else if ctx.energy < FOOD_HIGH {
        goals.push(with_opt_target(Goal::new(GoalKind::FindFood, Priority::High, hunger), ctx.food_target));
    } else if ctx.food_target.is_some() && ctx.energy < 80.0 {
        goals.push(with_opt_target(Goal::new(GoalKind::FindFood, Priority::Low, hunger), ctx.food_target));
    }

    if ctx.threat > THREAT_CRITICAL {
        goals.push(with_opt_target(Goal::new(GoalKind::AvoidDanger, Priority::Critical, ctx.threat), ctx.threat_source));
    } else if ctx.threat > THREAT_HIGH {
        goals.push(with_opt_target(Goal::new(GoalKind::AvoidDanger, Priority::High, ctx.threat), ctx.threat_source));
    }

    if ctx.status == Some(HealthStatus::Infected) {
        goals.push(Goal::new(GoalKind::Recover, Priority::High, hunger));
    }

    if let Some((intruder, position)) = ctx.intruder {
        goals.push(
            Goal::new(GoalKind::DefendTerritory, Priority::High, 0.5)
                .with_target(position)
                .with_agent(intruder),
        );
    }

    if ctx.energy > HELPER_ENERGY {
        if let Some((requester, position, urgency)) = ctx.help_target {
            goals.push(
                Goal::new(GoalKind::HelpOther, Priority::Medium, urgency)
                    .with_target(position)
                    .with_agent(requester),
            );
        }
    }

    if let Some(partner) = ctx.trade_partner {
        goals.push(Goal::new(GoalKind::Trade, Priority::Medium, 0.3).with_agent(partner));
    }

    if ctx.can_reproduce {
        goals.push(Goal::new(GoalKind::Reproduce, Priority::Low, ctx.energy / 100.0));
    }

    if let Some(candidate) = ctx.alliance_candidate {
        goals.push(Goal::new(GoalKind::FormAlliance, Priority::Low, 0.4).with_agent(candidate));
    }

    if let Some(waypoint) = ctx.patrol_waypoint {
        goals.push(Goal::new(GoalKind::Patrol, Priority::Low, 0.2).with_target(waypoint));
    }

    goals.push(with_opt_target(Goal::new(GoalKind::Explore, Priority::Low, 0.0), ctx.explore_heading));

    goals.sort_by(|a, b| a.rank(b));
    goals
}

fn with_opt_target(goal: Goal, target: Option<Vec3>) -> Goal {
    match target {
        Some(t) => goal.with_target(t),
        None => goal,
    }
}

/// The top goal is critical, or the two best goals share a tier with close urgency.
pub fn is_contested(goals: &[Goal]) -> bool {
    match goals {
        [first, second, ..] => {
            first.priority == Priority::Critical
                || (first.priority == second.priority
                    && first.priority >= Priority::Medium
                    && (first.urgency - second.urgency).abs() < 0.1)
        }
        [first] => first.priority == Priority::Critical,
        [] => false,
    }
}
