//! Social Components
//!
//! Trust memory and the bundle of modules carried by social agents.
//!
//! Trust is an asymmetric per-pair score in [0, 1], starting at neutral 0.5.
//! Each agent keeps its own view of everyone it has met; nothing here is
//! shared between agents except through messages.

use ecosim_events::{AgentId, HealthStatus, MessageKind, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::config::SocialConfig;
use crate::decision::InfluenceTracker;
use crate::reasoning::ReasoningDecision;

use super::ledger::{AllianceLedger, HelpBook, InfoStore, TerritoryPlan, TradeBook};
use super::message::Message;

/// Trust assigned to a first contact
pub const NEUTRAL_TRUST: f32 = 0.5;

/// Interaction outcomes that move trust
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustEvent {
    HelpedAgent,
    WasHelped,
    AccurateInfo,
    FalseInfo,
    AllianceFormed,
    TerritorialIntrusion,
    TradeCompleted,
    TradeDeclined,
    /// Arbitrary signed adjustment
    Adjust(f32),
}

impl TrustEvent {
    pub fn delta(&self) -> f32 {
        match self {
            TrustEvent::HelpedAgent => 0.1,
            TrustEvent::WasHelped => 0.15,
            TrustEvent::AccurateInfo => 0.05,
            TrustEvent::FalseInfo => -0.15,
            TrustEvent::AllianceFormed => 0.2,
            TrustEvent::TerritorialIntrusion => -0.1,
            TrustEvent::TradeCompleted => 0.08,
            TrustEvent::TradeDeclined => -0.03,
            TrustEvent::Adjust(delta) => *delta,
        }
    }
}

/// One entry in a relationship's bounded history
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interaction {
    pub tick: u64,
    pub event: TrustEvent,
    pub trust_after: f32,
}

/// What one agent knows about another
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub trust: f32,
    pub first_seen: u64,
    pub last_seen: u64,
    pub interactions: u32,
    pub history: VecDeque<Interaction>,
}

impl Relationship {
    fn new(tick: u64) -> Self {
        Self {
            trust: NEUTRAL_TRUST,
            first_seen: tick,
            last_seen: tick,
            interactions: 0,
            history: VecDeque::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MessageRecord {
    pub tick: u64,
    pub from: AgentId,
    pub kind: MessageKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationRecord {
    pub tick: u64,
    pub agent: AgentId,
    pub position: Vec3,
    pub status: HealthStatus,
}

/// Buffer sizes and decay parameters for a `SocialMemory`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryLimits {
    pub relationships: usize,
    pub history: usize,
    pub messages: usize,
    pub observations: usize,
    pub idle_period: u64,
    pub decay_rate: f32,
}

impl From<&SocialConfig> for MemoryLimits {
    fn from(cfg: &SocialConfig) -> Self {
        Self {
            relationships: cfg.relationship_capacity.max(1),
            history: cfg.history_capacity,
            messages: cfg.message_buffer,
            observations: cfg.observation_buffer,
            idle_period: cfg.trust_idle_period,
            decay_rate: cfg.trust_decay_rate,
        }
    }
}

/// Per-agent trust table with bounded recent buffers
#[derive(Debug, Clone)]
pub struct SocialMemory {
    relationships: BTreeMap<AgentId, Relationship>,
    messages: VecDeque<MessageRecord>,
    observations: VecDeque<ObservationRecord>,
    limits: MemoryLimits,
    pruned: u64,
}

impl SocialMemory {
    pub fn new(limits: MemoryLimits) -> Self {
        Self {
            relationships: BTreeMap::new(),
            messages: VecDeque::new(),
            observations: VecDeque::new(),
            limits,
            pruned: 0,
        }
    }

    /// Note that `other` was seen, creating a neutral record on first contact.
    pub fn observe(&mut self, other: AgentId, tick: u64) {
        self.touch(other, tick);
    }

    fn touch(&mut self, other: AgentId, tick: u64) -> &mut Relationship {
        if !self.relationships.contains_key(&other) {
            self.relationships.insert(other, Relationship::new(tick));
            self.prune(other);
        }
        let rel = self
            .relationships
            .entry(other)
            .or_insert_with(|| Relationship::new(tick));
        rel.last_seen = rel.last_seen.max(tick);
        rel
    }

    /// Apply a trust event and return the new trust value.
    pub fn record(&mut self, other: AgentId, event: TrustEvent, tick: u64) -> f32 {
        let history_cap = self.limits.history;
        let rel = self.touch(other, tick);
        rel.trust = (rel.trust + event.delta()).clamp(0.0, 1.0);
        rel.interactions = rel.interactions.saturating_add(1);
        if history_cap > 0 {
            rel.history.push_back(Interaction {
                tick,
                event,
                trust_after: rel.trust,
            });
            while rel.history.len() > history_cap {
                rel.history.pop_front();
            }
        }
        rel.trust
    }

    pub fn trust(&self, other: AgentId) -> Option<f32> {
        self.relationships.get(&other).map(|r| r.trust)
    }

    /// Unknown agents are treated as neutral.
    pub fn trust_or_neutral(&self, other: AgentId) -> f32 {
        self.trust(other).unwrap_or(NEUTRAL_TRUST)
    }

    pub fn is_trusted(&self, other: AgentId, threshold: f32) -> bool {
        self.trust_or_neutral(other) >= threshold
    }

    pub fn relationship(&self, other: AgentId) -> Option<&Relationship> {
        self.relationships.get(&other)
    }

    pub fn relationships(&self) -> impl Iterator<Item = (&AgentId, &Relationship)> {
        self.relationships.iter()
    }

    pub fn forget(&mut self, other: AgentId) -> bool {
        self.relationships.remove(&other).is_some()
    }

    /// Pull trust toward neutral for relationships idle longer than the idle period.
    pub fn decay(&mut self, tick: u64) {
        let MemoryLimits {
            idle_period,
            decay_rate,
            ..
        } = self.limits;
        for rel in self.relationships.values_mut() {
            if tick.saturating_sub(rel.last_seen) <= idle_period {
                continue;
            }
            let gap = NEUTRAL_TRUST - rel.trust;
            if gap.abs() <= decay_rate {
                rel.trust = NEUTRAL_TRUST;
            } else {
                rel.trust += decay_rate.copysign(gap);
            }
        }
    }

    /// Evict least-recently-seen records until within capacity, never evicting `keep`.
    fn prune(&mut self, keep: AgentId) {
        while self.relationships.len() > self.limits.relationships {
            let victim = self
                .relationships
                .iter()
                .filter(|(id, _)| **id != keep)
                .min_by_key(|(id, rel)| (rel.last_seen, rel.interactions, **id))
                .map(|(id, _)| *id);
            match victim {
                Some(id) => {
                    self.relationships.remove(&id);
                    self.pruned += 1;
                }
                None => break,
            }
        }
    }

    pub fn remember_message(&mut self, record: MessageRecord) {
        push_bounded(&mut self.messages, record, self.limits.messages);
    }

    pub fn remember_observation(&mut self, record: ObservationRecord) {
        push_bounded(&mut self.observations, record, self.limits.observations);
    }

    pub fn recent_messages(&self) -> impl Iterator<Item = &MessageRecord> {
        self.messages.iter()
    }

    pub fn recent_observations(&self) -> impl Iterator<Item = &ObservationRecord> {
        self.observations.iter()
    }

    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }

    pub fn pruned_count(&self) -> u64 {
        self.pruned
    }

    pub fn capacity(&self) -> usize {
        self.limits.relationships
    }

    pub fn trust_sum(&self) -> f32 {
        self.relationships.values().map(|r| r.trust).sum()
    }

    /// Known agents at or above `threshold`, most trusted first
    pub fn trusted_agents(&self, threshold: f32) -> Vec<(AgentId, f32)> {
        let mut trusted: Vec<(AgentId, f32)> = self
            .relationships
            .iter()
            .filter(|(_, r)| r.trust >= threshold)
            .map(|(id, r)| (*id, r.trust))
            .collect();
        trusted.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        trusted
    }
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, item: T, capacity: usize) {
    if capacity == 0 {
        return;
    }
    buffer.push_back(item);
    while buffer.len() > capacity {
        buffer.pop_front();
    }
}

/// Reasoning bookkeeping for one agent
#[derive(Debug, Clone, Default)]
pub struct ReasoningState {
    /// Outstanding request id, if any
    pub pending: Option<u64>,
    pub last_request_tick: Option<u64>,
    /// Decision delivered but not yet acted on
    pub ready: Option<ReasoningDecision>,
}

impl ReasoningState {
    pub fn cooldown_elapsed(&self, tick: u64, cooldown: u64) -> bool {
        self.last_request_tick
            .map_or(true, |last| tick.saturating_sub(last) >= cooldown)
    }
}

/// Everything a social agent carries beyond the basic life-cycle
#[derive(Debug)]
pub struct SocialModules {
    pub memory: SocialMemory,
    pub info: InfoStore,
    pub alliances: AllianceLedger,
    pub territory: Option<TerritoryPlan>,
    pub trades: TradeBook,
    pub help: HelpBook,
    pub influence: InfluenceTracker,
    pub reasoning: ReasoningState,
    /// Messages delivered this tick, consumed during the agent's update
    pub inbox: Vec<Message>,
    pub reputation: f32,
    /// Persistent exploration heading
    pub wander: Vec3,
}

impl SocialModules {
    pub fn new(cfg: &SocialConfig) -> Self {
        Self {
            memory: SocialMemory::new(MemoryLimits::from(cfg)),
            info: InfoStore::new(cfg.tip_capacity, cfg.warning_capacity),
            alliances: AllianceLedger::default(),
            territory: None,
            trades: TradeBook::default(),
            help: HelpBook::default(),
            influence: InfluenceTracker::new(cfg.evaluation_window),
            reasoning: ReasoningState::default(),
            inbox: Vec::new(),
            reputation: NEUTRAL_TRUST,
            wander: Vec3::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(capacity: usize) -> MemoryLimits {
        MemoryLimits {
            relationships: capacity,
            history: 3,
            messages: 2,
            observations: 2,
            idle_period: 200,
            decay_rate: 0.01,
        }
    }

    #[test]
    fn test_first_contact_is_neutral() {
        let mut memory = SocialMemory::new(limits(8));
        memory.observe(AgentId(2), 0);
        assert_eq!(memory.trust(AgentId(2)), Some(NEUTRAL_TRUST));
        assert_eq!(memory.trust(AgentId(3)), None);
        assert!(memory.is_trusted(AgentId(3), 0.4));
    }

    #[test]
    fn test_trust_clamped() {
        let mut memory = SocialMemory::new(limits(8));
        for tick in 0..20 {
            memory.record(AgentId(1), TrustEvent::AllianceFormed, tick);
        }
        assert_eq!(memory.trust(AgentId(1)), Some(1.0));
        for tick in 20..40 {
            memory.record(AgentId(1), TrustEvent::FalseInfo, tick);
        }
        assert_eq!(memory.trust(AgentId(1)), Some(0.0));
        assert_eq!(memory.record(AgentId(1), TrustEvent::Adjust(-5.0), 41), 0.0);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut memory = SocialMemory::new(limits(8));
        for tick in 0..10 {
            memory.record(AgentId(1), TrustEvent::AccurateInfo, tick);
        }
        let rel = memory.relationship(AgentId(1)).unwrap();
        assert_eq!(rel.history.len(), 3);
        assert_eq!(rel.history.front().unwrap().tick, 7);
        assert_eq!(rel.interactions, 10);
    }

    #[test]
    fn test_prune_evicts_least_recent() {
        let mut memory = SocialMemory::new(limits(3));
        memory.observe(AgentId(1), 0);
        memory.observe(AgentId(2), 5);
        memory.observe(AgentId(3), 10);
        memory.observe(AgentId(4), 15);
        assert_eq!(memory.len(), 3);
        assert_eq!(memory.trust(AgentId(1)), None);
        assert!(memory.trust(AgentId(4)).is_some());
        assert_eq!(memory.pruned_count(), 1);
    }

    #[test]
    fn test_decay_pulls_idle_trust_to_neutral() {
        let mut memory = SocialMemory::new(limits(8));
        memory.record(AgentId(1), TrustEvent::Adjust(0.3), 0);
        memory.record(AgentId(2), TrustEvent::Adjust(-0.005), 0);

        memory.decay(100);
        assert!((memory.trust(AgentId(1)).unwrap() - 0.8).abs() < 1e-6);

        memory.decay(250);
        assert!((memory.trust(AgentId(1)).unwrap() - 0.79).abs() < 1e-6);
        assert_eq!(memory.trust(AgentId(2)), Some(NEUTRAL_TRUST));
    }

    #[test]
    fn test_bounded_buffers() {
        let mut memory = SocialMemory::new(limits(8));
        for tick in 0..5 {
            memory.remember_message(MessageRecord {
                tick,
                from: AgentId(1),
                kind: MessageKind::ResourceTip,
            });
        }
        let ticks: Vec<u64> = memory.recent_messages().map(|m| m.tick).collect();
        assert_eq!(ticks, vec![3, 4]);
    }

    #[test]
    fn test_trusted_agents_sorted() {
        let mut memory = SocialMemory::new(limits(8));
        memory.record(AgentId(1), TrustEvent::Adjust(0.1), 0);
        memory.record(AgentId(2), TrustEvent::Adjust(0.3), 0);
        memory.record(AgentId(3), TrustEvent::Adjust(-0.3), 0);
        let trusted = memory.trusted_agents(0.5);
        assert_eq!(trusted.iter().map(|t| t.0).collect::<Vec<_>>(), vec![AgentId(2), AgentId(1)]);
    }
}
