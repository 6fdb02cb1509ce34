//! Social Ledgers
//!
//! Bounded per-agent books for shared information, alliances, territory
//! plans, trade offers, and help requests.

use ecosim_events::{AgentId, Vec3};
use std::collections::BTreeMap;

/// Confidence below which shared information is dropped
pub const MIN_INFO_CONFIDENCE: f32 = 0.1;
/// Starting strength of a new alliance
pub const ALLIANCE_INITIAL_STRENGTH: f32 = 0.6;
/// Strength gained each time allies share
pub const ALLIANCE_SHARE_BOOST: f32 = 0.1;
/// Ticks an unanswered alliance proposal stays open
pub const PROPOSAL_EXPIRY: u64 = 10;

/// Belief that a resource exists at a position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceTip {
    pub resource_id: u64,
    pub position: Vec3,
    pub value: f32,
    pub confidence: f32,
    /// None when the agent saw the resource itself
    pub source: Option<AgentId>,
    pub tick: u64,
}

impl ResourceTip {
    /// Expected payoff discounted by distance from `from`
    pub fn utility(&self, from: &Vec3) -> f32 {
        self.value * self.confidence / (1.0 + from.distance(&self.position) / 10.0)
    }
}

/// Belief that an area is dangerous
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DangerWarning {
    pub position: Vec3,
    pub radius: f32,
    pub severity: f32,
    pub confidence: f32,
    pub source: Option<AgentId>,
    pub tick: u64,
}

impl DangerWarning {
    /// Threat contribution at `at`: full inside the radius, fading to zero at twice the radius
    pub fn threat_at(&self, at: &Vec3) -> f32 {
        let dist = self.position.distance(at);
        let falloff = if dist <= self.radius {
            1.0
        } else if self.radius > 0.0 {
            (1.0 - (dist - self.radius) / self.radius).max(0.0)
        } else {
            0.0
        };
        (self.severity * self.confidence * falloff).clamp(0.0, 1.0)
    }
}

/// Resource tips and danger warnings with confidence decay
#[derive(Debug, Clone)]
pub struct InfoStore {
    tips: Vec<ResourceTip>,
    warnings: Vec<DangerWarning>,
    tip_capacity: usize,
    warning_capacity: usize,
    last_decay: u64,
}

impl InfoStore {
    pub fn new(tip_capacity: usize, warning_capacity: usize) -> Self {
        Self {
            tips: Vec::new(),
            warnings: Vec::new(),
            tip_capacity,
            warning_capacity,
            last_decay: 0,
        }
    }

    /// Store a tip. A tip for a known resource keeps the higher confidence.
    pub fn add_tip(&mut self, tip: ResourceTip) {
        if let Some(existing) = self.tips.iter_mut().find(|t| t.resource_id == tip.resource_id) {
            if tip.confidence > existing.confidence {
                *existing = tip;
            } else {
                existing.tick = existing.tick.max(tip.tick);
            }
            return;
        }
        self.tips.push(tip);
        while self.tips.len() > self.tip_capacity {
            let weakest = self
                .tips
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    a.confidence
                        .total_cmp(&b.confidence)
                        .then(a.tick.cmp(&b.tick))
                })
                .map(|(i, _)| i);
            match weakest {
                Some(i) => {
                    self.tips.remove(i);
                }
                None => break,
            }
        }
    }

    /// Store a warning, merging with one already covering the same spot.
    pub fn add_warning(&mut self, warning: DangerWarning) {
        if let Some(existing) = self
            .warnings
            .iter_mut()
            .find(|w| w.position.distance(&warning.position) <= w.radius.max(warning.radius) * 0.5)
        {
            existing.confidence = existing.confidence.max(warning.confidence);
            existing.severity = existing.severity.max(warning.severity);
            existing.radius = existing.radius.max(warning.radius);
            existing.tick = existing.tick.max(warning.tick);
            return;
        }
        self.warnings.push(warning);
        while self.warnings.len() > self.warning_capacity {
            let weakest = self
                .warnings
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    a.confidence
                        .total_cmp(&b.confidence)
                        .then(a.tick.cmp(&b.tick))
                })
                .map(|(i, _)| i);
            match weakest {
                Some(i) => {
                    self.warnings.remove(i);
                }
                None => break,
            }
        }
    }

    /// Periodic confidence decay plus removal of weak or stale entries
    pub fn decay(&mut self, tick: u64, interval: u64, amount: f32, ttl: u64) {
        if interval > 0 && tick.saturating_sub(self.last_decay) >= interval {
            self.last_decay = tick;
            for tip in &mut self.tips {
                tip.confidence -= amount;
            }
            for warning in &mut self.warnings {
                warning.confidence -= amount;
            }
        }
        self.tips
            .retain(|t| t.confidence >= MIN_INFO_CONFIDENCE && tick.saturating_sub(t.tick) <= ttl);
        self.warnings
            .retain(|w| w.confidence >= MIN_INFO_CONFIDENCE && tick.saturating_sub(w.tick) <= ttl);
    }

    /// Highest-utility tip from `from`
    pub fn best_tip(&self, from: &Vec3) -> Option<&ResourceTip> {
        self.tips.iter().max_by(|a, b| {
            a.utility(from)
                .total_cmp(&b.utility(from))
                .then(b.resource_id.cmp(&a.resource_id))
        })
    }

    /// Most confident tip worth offering to someone else
    pub fn tradeable_tip(&self, min_confidence: f32) -> Option<&ResourceTip> {
        self.tips
            .iter()
            .filter(|t| t.confidence >= min_confidence)
            .max_by(|a, b| {
                a.confidence
                    .total_cmp(&b.confidence)
                    .then(b.resource_id.cmp(&a.resource_id))
            })
    }

    /// Combined threat at `at` from every warning, in [0, 1]
    pub fn threat_at(&self, at: &Vec3) -> f32 {
        let safe = self
            .warnings
            .iter()
            .fold(1.0_f32, |acc, w| acc * (1.0 - w.threat_at(at)));
        (1.0 - safe).clamp(0.0, 1.0)
    }

    /// Warning contributing the most threat at `at`
    pub fn worst_warning(&self, at: &Vec3) -> Option<&DangerWarning> {
        self.warnings
            .iter()
            .filter(|w| w.threat_at(at) > 0.0)
            .max_by(|a, b| a.threat_at(at).total_cmp(&b.threat_at(at)))
    }

    pub fn has_tip(&self, resource_id: u64) -> bool {
        self.tips.iter().any(|t| t.resource_id == resource_id)
    }

    pub fn tips(&self) -> &[ResourceTip] {
        &self.tips
    }

    pub fn warnings(&self) -> &[DangerWarning] {
        &self.warnings
    }
}

/// Canonical alliance identifier for an unordered pair
pub fn alliance_id(a: AgentId, b: AgentId) -> String {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    format!("alliance_{}_{}", low.0, high.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alliance {
    pub id: String,
    pub partner: AgentId,
    pub strength: f32,
    pub formed_tick: u64,
    pub last_shared_tick: u64,
}

/// One agent's side of its alliances, keyed by partner, plus the proposals
/// it is waiting on
#[derive(Debug, Clone, Default)]
pub struct AllianceLedger {
    alliances: BTreeMap<AgentId, Alliance>,
    proposals: BTreeMap<AgentId, u64>,
}

impl AllianceLedger {
    /// Record a new alliance. Returns None if already allied with `partner`.
    pub fn form(&mut self, me: AgentId, partner: AgentId, tick: u64) -> Option<String> {
        if me == partner || self.alliances.contains_key(&partner) {
            return None;
        }
        let id = alliance_id(me, partner);
        self.alliances.insert(
            partner,
            Alliance {
                id: id.clone(),
                partner,
                strength: ALLIANCE_INITIAL_STRENGTH,
                formed_tick: tick,
                last_shared_tick: tick,
            },
        );
        Some(id)
    }

    /// Remember a proposal sent to `partner`. False if one is already open.
    pub fn propose(&mut self, partner: AgentId, tick: u64) -> bool {
        if self.proposals.contains_key(&partner) {
            return false;
        }
        self.proposals.insert(partner, tick);
        true
    }

    pub fn has_proposed(&self, partner: AgentId) -> bool {
        self.proposals.contains_key(&partner)
    }

    /// Close the open proposal to `partner`, returning whether there was one
    pub fn take_proposal(&mut self, partner: AgentId) -> bool {
        self.proposals.remove(&partner).is_some()
    }

    pub fn is_allied(&self, partner: AgentId) -> bool {
        self.alliances.contains_key(&partner)
    }

    pub fn get(&self, partner: AgentId) -> Option<&Alliance> {
        self.alliances.get(&partner)
    }

    pub fn partners(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.alliances.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.alliances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alliances.is_empty()
    }

    /// Strengthen an alliance after sharing. Returns the new strength.
    pub fn record_share(&mut self, partner: AgentId, tick: u64) -> Option<f32> {
        let alliance = self.alliances.get_mut(&partner)?;
        alliance.strength = (alliance.strength + ALLIANCE_SHARE_BOOST).min(1.0);
        alliance.last_shared_tick = tick;
        Some(alliance.strength)
    }

    pub fn remove(&mut self, partner: AgentId) -> Option<Alliance> {
        self.alliances.remove(&partner)
    }

    /// Weaken alliances without recent sharing and drop dead or weak ones.
    pub fn upkeep(
        &mut self,
        tick: u64,
        decay: f32,
        grace: u64,
        floor: f32,
        is_alive: impl Fn(AgentId) -> bool,
    ) -> Vec<Alliance> {
        self.proposals
            .retain(|partner, sent| tick.saturating_sub(*sent) <= PROPOSAL_EXPIRY && is_alive(*partner));
        for alliance in self.alliances.values_mut() {
            if tick.saturating_sub(alliance.last_shared_tick) > grace {
                alliance.strength = (alliance.strength - decay).max(0.0);
            }
        }
        let doomed: Vec<AgentId> = self
            .alliances
            .values()
            .filter(|a| a.strength < floor || !is_alive(a.partner))
            .map(|a| a.partner)
            .collect();
        doomed
            .into_iter()
            .filter_map(|partner| self.alliances.remove(&partner))
            .collect()
    }
}

/// Patrol route around an agent's claimed territory
#[derive(Debug, Clone, PartialEq)]
pub struct TerritoryPlan {
    pub center: Vec3,
    pub radius: f32,
    pub waypoints: Vec<Vec3>,
    pub next: usize,
    pub claimed_tick: u64,
}

impl TerritoryPlan {
    /// Four waypoints at 0.7 of the radius, clamped into the world
    pub fn new(center: Vec3, radius: f32, tick: u64, world_size: f32) -> Self {
        let reach = radius * 0.7;
        let waypoints = [(1.0_f32, 0.0_f32), (0.0, 1.0), (-1.0, 0.0), (0.0, -1.0)]
            .iter()
            .map(|(dx, dy)| {
                Vec3::planar(
                    (center.x + dx * reach).clamp(0.0, world_size),
                    (center.y + dy * reach).clamp(0.0, world_size),
                )
            })
            .collect();
        Self {
            center,
            radius,
            waypoints,
            next: 0,
            claimed_tick: tick,
        }
    }

    pub fn contains(&self, position: &Vec3) -> bool {
        self.center.distance(position) <= self.radius
    }

    /// Current patrol target, advancing once `position` reaches it
    pub fn waypoint(&mut self, position: &Vec3) -> Vec3 {
        if self.waypoints.is_empty() {
            return self.center;
        }
        let current = self.waypoints[self.next % self.waypoints.len()];
        if current.distance(position) < 2.0 {
            self.next = (self.next + 1) % self.waypoints.len();
        }
        self.waypoints[self.next % self.waypoints.len()]
    }
}

/// Offer to sell a resource tip for energy
#[derive(Debug, Clone, PartialEq)]
pub struct TradeOffer {
    pub id: String,
    pub seller: AgentId,
    pub buyer: AgentId,
    pub tip: ResourceTip,
    pub price: f32,
    pub created_tick: u64,
}

/// Open outgoing offers and trade counters
#[derive(Debug, Clone, Default)]
pub struct TradeBook {
    offers: BTreeMap<String, TradeOffer>,
    next_seq: u64,
    pub completed: u64,
    pub declined: u64,
}

impl TradeBook {
    pub fn next_offer_id(&mut self, seller: AgentId) -> String {
        self.next_seq += 1;
        format!("trade_{}_{}", seller.0, self.next_seq)
    }

    pub fn open(&mut self, offer: TradeOffer) {
        self.offers.insert(offer.id.clone(), offer);
    }

    pub fn close(&mut self, offer_id: &str) -> Option<TradeOffer> {
        self.offers.remove(offer_id)
    }

    pub fn has_open_with(&self, buyer: AgentId) -> bool {
        self.offers.values().any(|o| o.buyer == buyer)
    }

    pub fn open_count(&self) -> usize {
        self.offers.len()
    }

    /// Remove offers older than `ttl` ticks
    pub fn expire(&mut self, tick: u64, ttl: u64) -> Vec<TradeOffer> {
        let stale: Vec<String> = self
            .offers
            .values()
            .filter(|o| tick.saturating_sub(o.created_tick) > ttl)
            .map(|o| o.id.clone())
            .collect();
        stale.iter().filter_map(|id| self.offers.remove(id)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HelpRequest {
    pub requester: AgentId,
    pub position: Vec3,
    /// 0 (mild) to 1 (desperate)
    pub urgency: f32,
    pub tick: u64,
}

/// Received help requests plus this agent's own request cooldown
#[derive(Debug, Clone, Default)]
pub struct HelpBook {
    requests: BTreeMap<AgentId, HelpRequest>,
    pub last_request_tick: Option<u64>,
    pub given: u64,
    pub received: u64,
}

impl HelpBook {
    pub fn receive(&mut self, request: HelpRequest) {
        self.requests.insert(request.requester, request);
    }

    pub fn take(&mut self, requester: AgentId) -> Option<HelpRequest> {
        self.requests.remove(&requester)
    }

    pub fn can_request(&self, tick: u64, cooldown: u64) -> bool {
        self.last_request_tick
            .map_or(true, |last| tick.saturating_sub(last) >= cooldown)
    }

    pub fn expire(&mut self, tick: u64, ttl: u64) {
        self.requests
            .retain(|_, r| tick.saturating_sub(r.tick) <= ttl);
    }

    /// Drop requests whose requester no longer exists
    pub fn forget_missing(&mut self, is_alive: impl Fn(AgentId) -> bool) {
        self.requests.retain(|requester, _| is_alive(*requester));
    }

    /// Most urgent request, nearest first among equals
    pub fn most_urgent(&self, from: &Vec3) -> Option<&HelpRequest> {
        self.requests.values().max_by(|a, b| {
            a.urgency
                .total_cmp(&b.urgency)
                .then(from.distance(&b.position).total_cmp(&from.distance(&a.position)))
        })
    }

    pub fn pending(&self) -> usize {
        self.requests.len()
    }
}
