//! Action Synthesis
//!
//! Turns the top goal, or a decision from the external reasoning service,
//! into a concrete heading and intensity.

use ecosim_events::Vec3;
use serde::{Deserialize, Serialize};

use super::goals::{Goal, GoalKind, Priority};
use super::qlearning::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Forage,
    Avoid,
    Reproduce,
    Explore,
    Rest,
    Help,
    Defend,
    Patrol,
    Trade,
    Socialize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Heuristic,
    Reasoning,
}

/// Concrete movement request for one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SocialAction {
    pub kind: ActionKind,
    /// Fraction of maximum acceleration, in [0, 1]
    pub intensity: f32,
    /// Planar unit vector, or zero to hold still
    pub heading: Vec3,
    pub source: DecisionSource,
}

/// Positions the synthesizer steers relative to
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SynthesisContext {
    pub position: Vec3,
    pub food_target: Option<Vec3>,
    pub threat_source: Option<Vec3>,
    pub nearest_infected: Option<Vec3>,
    pub neighbours_centroid: Option<Vec3>,
    /// Fallback exploration heading
    pub wander: Vec3,
}

impl SynthesisContext {
    fn toward(&self, target: Option<Vec3>) -> Vec3 {
        target
            .map(|t| self.position.direction_to(&t))
            .filter(|h| h.length() > 0.0)
            .unwrap_or(self.wander)
    }

    fn away_from(&self, source: Option<Vec3>) -> Vec3 {
        source
            .map(|s| s.direction_to(&self.position))
            .filter(|h| h.length() > 0.0)
            .unwrap_or(self.wander)
    }

    fn heading_for(&self, direction: Direction) -> Vec3 {
        match direction {
            Direction::TowardResource => self.toward(self.food_target),
            Direction::AwayFromInfected => self.away_from(self.nearest_infected.or(self.threat_source)),
            Direction::TowardAgents => self.toward(self.neighbours_centroid),
            Direction::Random => self.wander,
        }
    }
}

fn heuristic(kind: ActionKind, intensity: f32, heading: Vec3) -> SocialAction {
    SocialAction {
        kind,
        intensity,
        heading,
        source: DecisionSource::Heuristic,
    }
}

/// Deterministic local mapping from a goal to an action
pub fn synthesize(goal: &Goal, ctx: &SynthesisContext) -> SocialAction {
    match goal.kind {
        GoalKind::FindFood => {
            let intensity = if goal.priority == Priority::Critical { 1.0 } else { 0.8 };
            heuristic(ActionKind::Forage, intensity, ctx.toward(goal.target.or(ctx.food_target)))
        }
        GoalKind::AvoidDanger => heuristic(
            ActionKind::Avoid,
            1.0,
            ctx.away_from(goal.target.or(ctx.threat_source).or(ctx.nearest_infected)),
        ),
        GoalKind::Recover => heuristic(ActionKind::Rest, 0.1, ctx.wander),
        GoalKind::DefendTerritory => heuristic(ActionKind::Defend, 0.8, ctx.toward(goal.target)),
        GoalKind::HelpOther => heuristic(ActionKind::Help, 0.8, ctx.toward(goal.target)),
        GoalKind::Trade => heuristic(ActionKind::Trade, 0.4, ctx.toward(ctx.neighbours_centroid)),
        GoalKind::Reproduce => heuristic(ActionKind::Reproduce, 0.2, ctx.wander),
        GoalKind::FormAlliance => {
            heuristic(ActionKind::Socialize, 0.4, ctx.toward(ctx.neighbours_centroid))
        }
        GoalKind::Patrol => heuristic(ActionKind::Patrol, 0.5, ctx.toward(goal.target)),
        GoalKind::Explore => heuristic(ActionKind::Explore, 0.6, ctx.toward(goal.target)),
    }
}

/// Map an external decision onto this tick's context
pub fn from_decision(
    action: ActionKind,
    intensity: f32,
    direction: Direction,
    ctx: &SynthesisContext,
) -> SocialAction {
    let intensity = if intensity.is_finite() {
        intensity.clamp(0.0, 1.0)
    } else {
        0.5
    };
    SocialAction {
        kind: action,
        intensity,
        heading: ctx.heading_for(direction),
        source: DecisionSource::Reasoning,
    }
}
