//! Agent Messages
//!
//! Typed payloads exchanged between social agents through the message bus.

use ecosim_events::{AgentId, MessageKind, Vec3};

use super::ledger::{DangerWarning, ResourceTip, TradeOffer};

/// Why energy was handed over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiftReason {
    Help,
    AllianceShare,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    ResourceTip(ResourceTip),
    DangerWarning(DangerWarning),
    HelpRequest { urgency: f32, position: Vec3 },
    EnergyGift { amount: f32, reason: GiftReason },
    AllianceProposal,
    AllianceAccept { alliance_id: String },
    /// The proposer could not take up an accepted alliance
    AllianceDecline { alliance_id: String },
    TradeOffer(TradeOffer),
    TradeAccept { offer_id: String, energy: f32 },
    TradeDecline { offer_id: String },
    TerritoryWarning { center: Vec3, radius: f32 },
}

impl Payload {
    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::ResourceTip(_) => MessageKind::ResourceTip,
            Payload::DangerWarning(_) => MessageKind::DangerWarning,
            Payload::HelpRequest { .. } => MessageKind::HelpRequest,
            Payload::EnergyGift { .. } => MessageKind::EnergyGift,
            Payload::AllianceProposal => MessageKind::AllianceProposal,
            Payload::AllianceAccept { .. } => MessageKind::AllianceAccept,
            Payload::AllianceDecline { .. } => MessageKind::AllianceDecline,
            Payload::TradeOffer(_) => MessageKind::TradeOffer,
            Payload::TradeAccept { .. } => MessageKind::TradeAccept,
            Payload::TradeDecline { .. } => MessageKind::TradeDecline,
            Payload::TerritoryWarning { .. } => MessageKind::TerritoryWarning,
        }
    }
}

/// A message in flight. Delivered on the tick after it was sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub from: AgentId,
    pub to: AgentId,
    pub sent_tick: u64,
    pub payload: Payload,
}

impl Message {
    pub fn new(from: AgentId, to: AgentId, sent_tick: u64, payload: Payload) -> Self {
        Self {
            from,
            to,
            sent_tick,
            payload,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }
}
