//! Decision Making
//!
//! The learned movement policy shared by every agent, plus the goal-driven
//! layer used by social agents.

pub mod goals;
pub mod influence;
pub mod qlearning;
pub mod synthesis;

pub use goals::{generate_goals, is_contested, Goal, GoalContext, GoalKind, Priority};
pub use influence::{
    DecisionOutcome, DecisionRecord, InfluenceCause, InfluenceTracker, InfluenceWeights,
};
pub use qlearning::{
    reward, state_key, DecisionPolicy, Direction, LearningParams, Observation, PolicyAction,
    ACTIONS, ACTION_COUNT,
};
pub use synthesis::{
    from_decision, synthesize, ActionKind, DecisionSource, SocialAction, SynthesisContext,
};
