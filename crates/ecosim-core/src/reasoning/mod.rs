//! External Reasoning
//!
//! Social agents may hand contested decisions to an external reasoning
//! service. Requests are queued in the [`ReasoningOutbox`] during a tick and
//! dispatched by the controller afterwards; completions arrive through the
//! [`ReasoningBridge`] and are acted on during the agent's next update.
//!
//! The simulation never waits on the service. Failures of any kind fall back
//! to the local goal-to-action mapping.

pub mod backend;
pub mod bridge;
pub mod parse;

use bevy_ecs::prelude::*;
use ecosim_events::{AgentId, HealthStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decision::{ActionKind, Direction};

pub use backend::{HttpBackend, ReasoningBackend, ScriptedBackend, ScriptedReply};
pub use bridge::{BridgeStats, Completion, ReasoningBridge};
pub use parse::parse_decision;

/// Heritable dispositions reported to the service
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Personality {
    pub aggressiveness: f32,
    pub sociability: f32,
    pub resistance: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: AgentId,
    pub age: u64,
    pub energy: f32,
    pub personality: Personality,
    pub status: HealthStatus,
}

/// What the agent perceives, summarized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationSummary {
    pub nearby_agents: usize,
    pub nearby_infected: usize,
    pub nearest_resource: Option<f32>,
    pub allies_nearby: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningRequest {
    pub request_id: u64,
    pub tick: u64,
    pub agent: AgentProfile,
    pub observation: ObservationSummary,
}

/// A decision returned by the service, normalized to the action contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningDecision {
    pub reasoning: String,
    pub action: ActionKind,
    /// In [0.1, 1.0]
    pub intensity: f32,
    pub direction: Direction,
    /// In [0.1, 1.0]
    pub confidence: f32,
}

#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("reasoning service unavailable: {0}")]
    Unavailable(String),

    #[error("reasoning request timed out after {0} ms")]
    Timeout(u64),

    #[error("reasoning service returned status {0}")]
    Status(u16),

    #[error("malformed reasoning response: {0}")]
    Malformed(String),

    #[error("http error: {0}")]
    Http(String),
}

impl ReasoningError {
    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReasoningError::Unavailable(_) | ReasoningError::Timeout(_) | ReasoningError::Http(_)
        ) || matches!(self, ReasoningError::Status(code) if *code >= 500)
    }
}

/// Requests raised during the current tick, waiting for dispatch
#[derive(Resource, Debug, Default)]
pub struct ReasoningOutbox {
    enabled: bool,
    requests: Vec<ReasoningRequest>,
    next_request_id: u64,
    pub requests_sent: u64,
    pub fallbacks: u64,
}

impl ReasoningOutbox {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Queue a request and return its id. None when delegation is disabled.
    pub fn submit(
        &mut self,
        tick: u64,
        agent: AgentProfile,
        observation: ObservationSummary,
    ) -> Option<u64> {
        if !self.enabled {
            return None;
        }
        self.next_request_id += 1;
        let request_id = self.next_request_id;
        self.requests.push(ReasoningRequest {
            request_id,
            tick,
            agent,
            observation,
        });
        self.requests_sent += 1;
        Some(request_id)
    }

    pub fn take(&mut self) -> Vec<ReasoningRequest> {
        std::mem::take(&mut self.requests)
    }

    pub fn queued(&self) -> usize {
        self.requests.len()
    }
}
