//! Snapshot Types
//!
//! Serialization structs for export snapshots, aggregate metrics, and the
//! read-only render frame.
//!
//! Snapshots capture simulation state at a point in time. They are used for
//! debugging, export, and charting; the simulation never reads them back.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::types::{AgentId, AgentKind, HealthStatus, Season, Vec3};

/// Generates a fresh run identifier.
pub fn generate_run_id() -> Uuid {
    Uuid::new_v4()
}

/// Exported agent state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentExport {
    pub id: AgentId,
    #[serde(rename = "type")]
    pub kind: AgentKind,
    pub age: u64,
    pub energy: f32,
    pub status: HealthStatus,
    pub position: Vec3,
}

/// Exported environment summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSummary {
    pub season: Season,
    pub temperature: f32,
    pub resource_count: usize,
}

/// Full export: every agent plus the environment summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationExport {
    pub run_id: Uuid,
    pub tick: u64,
    pub agents: Vec<AgentExport>,
    pub environment: EnvironmentSummary,
}

/// Counts per SIR state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SirCounts {
    #[serde(rename = "S")]
    pub susceptible: usize,
    #[serde(rename = "I")]
    pub infected: usize,
    #[serde(rename = "R")]
    pub recovered: usize,
}

impl SirCounts {
    pub fn record(&mut self, status: HealthStatus) {
        match status {
            HealthStatus::Susceptible => self.susceptible += 1,
            HealthStatus::Infected => self.infected += 1,
            HealthStatus::Recovered => self.recovered += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.susceptible + self.infected + self.recovered
    }
}

/// Aggregate population statistics for analytics consumers
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PopulationStats {
    pub tick: u64,
    pub population: usize,
    pub by_kind: BTreeMap<AgentKind, usize>,
    pub sir: SirCounts,
    pub energy_mean: f32,
    pub resource_count: usize,
    pub births: u64,
    pub deaths: u64,
    pub suppressed_births: u64,
    #[serde(default)]
    pub social: SocialMetrics,
}

/// Aggregate metrics for the social layer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SocialMetrics {
    pub mean_trust: f32,
    pub relationships: usize,
    pub pruned_relationships: u64,
    pub alliances: usize,
    pub territories: usize,
    pub decisions_evaluated: u64,
    pub decisions_succeeded: u64,
    /// Share of evaluated decisions that achieved their goal
    pub adaptability: f32,
    pub reasoning_requests: u64,
    pub reasoning_fallbacks: u64,
}

/// Metrics-only snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub tick: u64,
    pub run_id: Uuid,
    pub pop: usize,
    pub energy_mean: f32,
    pub sir: SirCounts,
    /// Hex digest of agent state in id order
    pub sim_digest: String,
}

/// Agent as seen by a renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderAgent {
    pub id: AgentId,
    pub kind: AgentKind,
    pub position: Vec3,
    pub radius: f32,
    pub status: HealthStatus,
}

/// Resource as seen by a renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderResource {
    pub id: u64,
    pub position: Vec3,
    pub value: f32,
}

/// Terrain feature as seen by a renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderTerrain {
    pub id: u32,
    pub kind: String,
    pub position: Vec3,
    pub radius: f32,
}

/// Territory as seen by a renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderTerritory {
    pub owner: AgentId,
    pub center: Vec3,
    pub radius: f32,
    pub strength: f32,
}

/// Read-only per-tick frame for rendering consumers
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RenderFrame {
    pub tick: u64,
    pub agents: Vec<RenderAgent>,
    pub resources: Vec<RenderResource>,
    pub terrain: Vec<RenderTerrain>,
    pub territories: Vec<RenderTerritory>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_export_shape() {
        let agent = AgentExport {
            id: AgentId(7),
            kind: AgentKind::Social,
            age: 12,
            energy: 55.5,
            status: HealthStatus::Infected,
            position: Vec3::new(1.0, 2.0, 0.5),
        };
        let json = serde_json::to_value(&agent).unwrap();
        assert_eq!(json["type"], "social");
        assert_eq!(json["status"], "infected");
        assert_eq!(json["position"]["z"], 0.5);
    }

    #[test]
    fn test_environment_summary_camel_case() {
        let summary = EnvironmentSummary {
            season: Season::Winter,
            temperature: -2.0,
            resource_count: 14,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["resourceCount"], 14);
        assert_eq!(json["season"], "winter");
    }

    #[test]
    fn test_sir_counts() {
        let mut sir = SirCounts::default();
        sir.record(HealthStatus::Susceptible);
        sir.record(HealthStatus::Infected);
        sir.record(HealthStatus::Infected);
        assert_eq!(sir.infected, 2);
        assert_eq!(sir.total(), 3);
        let json = serde_json::to_value(sir).unwrap();
        assert_eq!(json["I"], 2);
    }
}
