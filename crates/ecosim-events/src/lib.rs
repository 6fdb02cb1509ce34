//! Shared event and snapshot types for the ecosystem simulation.
//!
//! This crate contains pure data structures with no simulation logic.
//! It is a dependency for the engine and for any consumer (renderer,
//! analytics, export tooling).

pub mod event;
pub mod snapshot;
pub mod types;

// Re-export value types
pub use types::{AgentId, AgentKind, HealthStatus, ParseSeasonError, Season, Vec3};

// Re-export event types
pub use event::{
    generate_event_id, DeathCause, EmergencyKind, EventKind, EventType, MessageKind, SimEvent,
};

// Re-export snapshot types
pub use snapshot::{
    generate_run_id, AgentExport, EnvironmentSummary, MetricsSnapshot, PopulationStats,
    RenderAgent, RenderFrame, RenderResource, RenderTerrain, RenderTerritory, SimulationExport,
    SirCounts, SocialMetrics,
};
