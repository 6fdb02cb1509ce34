//! Event Types
//!
//! Discrete occurrences emitted by the engine for analytics consumers.
//! Events are plain data; the engine never depends on a consumer being present.

use serde::{Deserialize, Serialize};

use crate::types::{AgentId, AgentKind, Season, Vec3};

/// Primary event type categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Birth,
    Death,
    Infection,
    Recovery,
    Communication,
    Cooperation,
    Territory,
    Environment,
    Population,
}

impl EventType {
    /// Returns all event type variants.
    pub fn all() -> &'static [EventType] {
        &[
            EventType::Birth,
            EventType::Death,
            EventType::Infection,
            EventType::Recovery,
            EventType::Communication,
            EventType::Cooperation,
            EventType::Territory,
            EventType::Environment,
            EventType::Population,
        ]
    }
}

/// Why an agent died
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathCause {
    /// Age reached the genetic lifespan
    OldAge,
    /// Energy fell to the critical threshold
    Starvation,
}

/// Kind of message exchanged between social agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    ResourceTip,
    DangerWarning,
    HelpRequest,
    EnergyGift,
    AllianceProposal,
    AllianceAccept,
    AllianceDecline,
    TradeOffer,
    TradeAccept,
    TradeDecline,
    TerritoryWarning,
}

/// Climate emergency categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyKind {
    Heatwave,
    Coldsnap,
    Hurricane,
    Drought,
    Flood,
}

/// Event payload, tagged by subtype
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum EventKind {
    Birth {
        agent_id: AgentId,
        kind: AgentKind,
        /// None for the initial population
        parent_id: Option<AgentId>,
        position: Vec3,
    },
    Death {
        agent_id: AgentId,
        kind: AgentKind,
        cause: DeathCause,
        age: u64,
        energy: f32,
        /// Whether an environmental hazard raised the death probability
        hazard: bool,
    },
    Infection {
        agent_id: AgentId,
        /// Nearest infected agent at the time of exposure
        source_id: Option<AgentId>,
    },
    Recovery {
        agent_id: AgentId,
        infected_ticks: u32,
    },
    Communication {
        from: AgentId,
        to: AgentId,
        message: MessageKind,
    },
    AllianceFormed {
        alliance_id: String,
        members: [AgentId; 2],
    },
    AllianceDissolved {
        alliance_id: String,
        members: [AgentId; 2],
    },
    TradeCompleted {
        offer_id: String,
        seller: AgentId,
        buyer: AgentId,
        energy: f32,
    },
    TradeDeclined {
        offer_id: String,
        seller: AgentId,
        buyer: AgentId,
    },
    HelpGiven {
        helper: AgentId,
        recipient: AgentId,
        energy: f32,
    },
    TerritoryClaimed {
        owner: AgentId,
        center: Vec3,
        radius: f32,
    },
    TerritoryLost {
        owner: AgentId,
    },
    WeatherChanged {
        category: String,
        intensity: f32,
        season: Season,
    },
    ClimateEmergencyStarted {
        emergency: EmergencyKind,
        severity: f32,
        duration: u32,
    },
    ClimateEmergencyEnded {
        emergency: EmergencyKind,
    },
    ResourceTopUp {
        spawned: usize,
        total: usize,
    },
    BirthSuppressed {
        parent_id: AgentId,
        population: usize,
    },
}

impl EventKind {
    /// Category of this event.
    pub fn event_type(&self) -> EventType {
        match self {
            EventKind::Birth { .. } => EventType::Birth,
            EventKind::Death { .. } => EventType::Death,
            EventKind::Infection { .. } => EventType::Infection,
            EventKind::Recovery { .. } => EventType::Recovery,
            EventKind::Communication { .. } => EventType::Communication,
            EventKind::AllianceFormed { .. }
            | EventKind::AllianceDissolved { .. }
            | EventKind::TradeCompleted { .. }
            | EventKind::TradeDeclined { .. }
            | EventKind::HelpGiven { .. } => EventType::Cooperation,
            EventKind::TerritoryClaimed { .. } | EventKind::TerritoryLost { .. } => {
                EventType::Territory
            }
            EventKind::WeatherChanged { .. }
            | EventKind::ClimateEmergencyStarted { .. }
            | EventKind::ClimateEmergencyEnded { .. }
            | EventKind::ResourceTopUp { .. } => EventType::Environment,
            EventKind::BirthSuppressed { .. } => EventType::Population,
        }
    }
}

/// A single emitted event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    pub event_id: String,
    pub tick: u64,
    pub event_type: EventType,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl SimEvent {
    pub fn new(event_id: impl Into<String>, tick: u64, kind: EventKind) -> Self {
        Self {
            event_id: event_id.into(),
            tick,
            event_type: kind.event_type(),
            kind,
        }
    }
}

/// Generates an event ID with the given sequence number.
pub fn generate_event_id(sequence: u64) -> String {
    format!("evt_{:08}", sequence)
}
