//! Social Agent Update
//!
//! The goal-driven layer run for social agents after the shared life-cycle
//! steps. One call performs, in order: bookkeeping upkeep, recording what the
//! agent sees, handling last tick's inbox, goal generation, action selection
//! (possibly queuing a reasoning request), and the social acts the situation
//! allows. Outgoing messages land on the bus and are delivered next tick.

use ecosim_events::{AgentId, AgentKind, EventKind};
use rand::Rng;

use crate::components::{
    DangerWarning, GiftReason, HelpRequest, Message, MessageRecord, ObservationRecord, Payload,
    ResourceTip, SocialModules, TerritoryPlan, TradeOffer, TrustEvent, Vitals,
};
use crate::decision::{
    from_decision, generate_goals, goals::HELPER_ENERGY, is_contested, synthesize,
    DecisionOutcome, DecisionRecord, Goal, GoalContext, GoalKind, InfluenceWeights,
    SocialAction, SynthesisContext,
};
use crate::environment::terrain::terrain_constants::CONTAMINATED_RADIUS;
use crate::reasoning::{AgentProfile, ObservationSummary, Personality};
use crate::rng::RandomExt;

use super::perception::{AgentView, Perception};
use super::update::{AgentFrame, TickContext};

/// Distance within which help and alliance gifts are handed over
pub const HANDOVER_DISTANCE: f32 = 3.0;
/// Energy below which an agent asks for help
pub const HELP_REQUEST_ENERGY: f32 = 25.0;
/// Recipients of one help request
pub const HELP_REQUEST_FANOUT: usize = 3;
/// Trust needed to trade in either direction
pub const TRADE_TRUST: f32 = 0.5;
/// Sellers offer tips only when below this energy
pub const TRADE_SELLER_ENERGY: f32 = 50.0;
/// Buyers accept only above this energy
pub const TRADE_BUYER_ENERGY: f32 = 60.0;
/// Minimum confidence of a tip worth selling
pub const TRADE_MIN_CONFIDENCE: f32 = 0.3;
pub const REPUTATION_GAIN: f32 = 0.02;
/// Energy needed before sharing with a weak ally
pub const SHARE_ENERGY: f32 = 70.0;
/// Allies below this energy receive shares
pub const ALLY_NEEDS_ENERGY: f32 = 40.0;
/// Energy needed to claim territory
pub const CLAIM_ENERGY: f32 = 60.0;
/// Threat contributed by each visible infected agent
pub const INFECTED_THREAT: f32 = 0.25;
/// Chance per tick that the exploration heading is redrawn
pub const WANDER_TURN: f32 = 0.02;

/// Run the social layer for one agent and return the action to steer by.
///
/// `fallback` is the learned policy's action, used when exploring.
pub fn social_update(
    ctx: &mut TickContext<'_>,
    agent: &AgentFrame<'_>,
    vitals: &mut Vitals,
    social: &mut SocialModules,
    seen: &Perception,
    fallback: SocialAction,
    can_reproduce: bool,
) -> SocialAction {
    upkeep(ctx, agent, vitals, social);
    observe(ctx, agent, social, seen);
    process_inbox(ctx, agent, vitals, social);

    if social.wander.length() == 0.0 || ctx.rng.chance(WANDER_TURN) {
        social.wander = ctx.rng.unit_direction();
    }

    let goal_ctx = goal_context(ctx, agent, vitals, social, seen, can_reproduce);
    let goals = generate_goals(&goal_ctx);
    let Some(top) = goals.first().copied() else {
        return fallback;
    };

    let synthesis = SynthesisContext {
        position: agent.position,
        food_target: goal_ctx.food_target,
        threat_source: goal_ctx.threat_source,
        nearest_infected: seen.nearest_infected,
        neighbours_centroid: seen.centroid,
        wander: social.wander,
    };
    let action = match social.reasoning.ready.take() {
        Some(decision) => {
            tracing::trace!(agent = %agent.id, action = ?decision.action, "acting on reasoning decision");
            from_decision(decision.action, decision.intensity, decision.direction, &synthesis)
        }
        None if top.kind == GoalKind::Explore => fallback,
        None => synthesize(&top, &synthesis),
    };

    maybe_delegate(ctx, agent, vitals, social, seen, &goals);
    record_influence(ctx, agent, vitals, social, &top, &goal_ctx, &action);
    act(ctx, agent, vitals, social, seen, &top, &goal_ctx);
    action
}

/// Queue a message and log the communication
fn send(ctx: &mut TickContext<'_>, from: AgentId, to: AgentId, payload: Payload) {
    let message = Message::new(from, to, ctx.tick, payload);
    ctx.events.push(
        ctx.tick,
        EventKind::Communication {
            from,
            to,
            message: message.kind(),
        },
    );
    ctx.bus.send(message);
}

fn ordered(a: AgentId, b: AgentId) -> [AgentId; 2] {
    if a <= b {
        [a, b]
    } else {
        [b, a]
    }
}

fn social_neighbors(seen: &Perception) -> impl Iterator<Item = &AgentView> {
    seen.neighbors.iter().filter(|v| v.kind == AgentKind::Social)
}

fn upkeep(ctx: &mut TickContext<'_>, agent: &AgentFrame<'_>, vitals: &Vitals, social: &mut SocialModules) {
    let config = ctx.config;
    let cfg = &config.social;
    let tick = ctx.tick;
    let index = ctx.index;

    social.memory.decay(tick);
    social
        .info
        .decay(tick, cfg.info_decay_interval, cfg.info_decay, cfg.info_ttl);
    social.help.expire(tick, cfg.help_expiry);
    social.help.forget_missing(|id| index.contains(id));

    let expired = social.trades.expire(tick, cfg.trade_expiry);
    if !expired.is_empty() {
        tracing::trace!(agent = %agent.id, expired = expired.len(), "trade offers expired");
    }

    let outcome = DecisionOutcome {
        energy: vitals.energy,
        threat: social.info.threat_at(&agent.position),
        position: agent.position,
        infected: vitals.is_infected(),
    };
    social.influence.evaluate(tick, &outcome);

    let dissolved = social.alliances.upkeep(
        tick,
        cfg.alliance_decay,
        cfg.alliance_grace,
        cfg.alliance_floor,
        |id| index.contains(id),
    );
    for alliance in dissolved {
        // Emitted once per pair: by the lower id, or by the survivor
        if agent.id < alliance.partner || !index.contains(alliance.partner) {
            tracing::debug!(alliance = %alliance.id, strength = alliance.strength, "alliance dissolved");
            ctx.events.push(
                tick,
                EventKind::AllianceDissolved {
                    alliance_id: alliance.id,
                    members: ordered(agent.id, alliance.partner),
                },
            );
        }
    }

    if social.territory.is_some() && ctx.env.territories.get(agent.id).is_none() {
        social.territory = None;
    }
}

fn observe(ctx: &mut TickContext<'_>, agent: &AgentFrame<'_>, social: &mut SocialModules, seen: &Perception) {
    let tick = ctx.tick;
    for other in seen.neighbors.iter().take(ctx.config.social.observations_per_tick) {
        social.memory.observe(other.id, tick);
        social.memory.remember_observation(ObservationRecord {
            tick,
            agent: other.id,
            position: other.position,
            status: other.status,
        });
    }

    if let Some(resource) = seen.nearest_resource {
        social.info.add_tip(ResourceTip {
            resource_id: resource.id,
            position: resource.position,
            value: resource.value,
            confidence: 1.0,
            source: None,
            tick,
        });
    }

    if agent.effects.contaminated {
        social.info.add_warning(DangerWarning {
            position: agent.position,
            radius: CONTAMINATED_RADIUS,
            severity: 0.6,
            confidence: 1.0,
            source: None,
            tick,
        });
    }
    if seen.nearby_infected >= 2 {
        if let Some(position) = seen.nearest_infected {
            social.info.add_warning(DangerWarning {
                position,
                radius: agent.genome.phenotype.contact_radius * 2.0,
                severity: (0.2 * seen.nearby_infected as f32).min(1.0),
                confidence: 0.8,
                source: None,
                tick,
            });
        }
    }
}

fn process_inbox(ctx: &mut TickContext<'_>, agent: &AgentFrame<'_>, vitals: &mut Vitals, social: &mut SocialModules) {
    let tick = ctx.tick;
    let config = ctx.config;
    let cfg = &config.social;
    for message in std::mem::take(&mut social.inbox) {
        let from = message.from;
        social.memory.observe(from, tick);
        social.memory.remember_message(MessageRecord {
            tick,
            from,
            kind: message.kind(),
        });
        let trust = social.memory.trust_or_neutral(from);
        let trusted = social.memory.is_trusted(from, cfg.trust_threshold);

        match message.payload {
            Payload::ResourceTip(tip) => {
                if !trusted {
                    continue;
                }
                if ctx.env.resources.contains(tip.resource_id) {
                    social.memory.record(from, TrustEvent::AccurateInfo, tick);
                    social.info.add_tip(ResourceTip {
                        confidence: tip.confidence * trust,
                        source: Some(from),
                        tick,
                        ..tip
                    });
                } else {
                    social.memory.record(from, TrustEvent::FalseInfo, tick);
                }
            }
            Payload::DangerWarning(warning) => {
                if trusted {
                    social.info.add_warning(DangerWarning {
                        confidence: warning.confidence * trust,
                        source: Some(from),
                        tick,
                        ..warning
                    });
                }
            }
            Payload::HelpRequest { urgency, position } => {
                if trusted {
                    social.help.receive(HelpRequest {
                        requester: from,
                        position,
                        urgency,
                        tick,
                    });
                }
            }
            Payload::EnergyGift { amount, reason } => {
                vitals.gain(amount);
                social.memory.record(from, TrustEvent::WasHelped, tick);
                social.help.received += 1;
                if reason == GiftReason::AllianceShare {
                    social.alliances.record_share(from, tick);
                }
            }
            Payload::AllianceProposal => {
                if social.alliances.len() >= cfg.max_alliances || trust < cfg.alliance_accept_trust {
                    continue;
                }
                if let Some(alliance_id) = social.alliances.form(agent.id, from, tick) {
                    social.memory.record(from, TrustEvent::AllianceFormed, tick);
                    send(
                        ctx,
                        agent.id,
                        from,
                        Payload::AllianceAccept {
                            alliance_id: alliance_id.clone(),
                        },
                    );
                    tracing::debug!(alliance = %alliance_id, "alliance formed");
                    ctx.events.push(
                        tick,
                        EventKind::AllianceFormed {
                            alliance_id,
                            members: ordered(agent.id, from),
                        },
                    );
                }
            }
            Payload::AllianceAccept { alliance_id } => {
                let proposed = social.alliances.take_proposal(from);
                if social.alliances.is_allied(from) {
                    // Crossed proposals, both sides already formed it
                    continue;
                }
                if proposed
                    && alliance_id == crate::components::alliance_id(agent.id, from)
                    && social.alliances.len() < cfg.max_alliances
                    && social.alliances.form(agent.id, from, tick).is_some()
                {
                    social.memory.record(from, TrustEvent::AllianceFormed, tick);
                } else {
                    tracing::trace!(agent = %agent.id, partner = %from, "alliance accept declined");
                    send(ctx, agent.id, from, Payload::AllianceDecline { alliance_id });
                }
            }
            Payload::AllianceDecline { alliance_id } => {
                let ours = social
                    .alliances
                    .get(from)
                    .is_some_and(|alliance| alliance.id == alliance_id);
                if let Some(alliance) = ours.then(|| social.alliances.remove(from)).flatten() {
                    tracing::debug!(alliance = %alliance.id, "alliance withdrawn by proposer");
                    ctx.events.push(
                        tick,
                        EventKind::AllianceDissolved {
                            alliance_id: alliance.id,
                            members: ordered(agent.id, from),
                        },
                    );
                }
            }
            Payload::TradeOffer(offer) => {
                let wanted = !social.info.has_tip(offer.tip.resource_id);
                if trust >= TRADE_TRUST && vitals.energy > TRADE_BUYER_ENERGY && wanted {
                    let paid = vitals.drain(offer.price);
                    social.info.add_tip(ResourceTip {
                        source: Some(from),
                        tick,
                        ..offer.tip
                    });
                    send(
                        ctx,
                        agent.id,
                        from,
                        Payload::TradeAccept {
                            offer_id: offer.id.clone(),
                            energy: paid,
                        },
                    );
                    social.memory.record(from, TrustEvent::TradeCompleted, tick);
                    social.reputation = (social.reputation + REPUTATION_GAIN).min(1.0);
                    social.trades.completed += 1;
                    ctx.events.push(
                        tick,
                        EventKind::TradeCompleted {
                            offer_id: offer.id,
                            seller: from,
                            buyer: agent.id,
                            energy: paid,
                        },
                    );
                } else {
                    send(
                        ctx,
                        agent.id,
                        from,
                        Payload::TradeDecline {
                            offer_id: offer.id.clone(),
                        },
                    );
                    ctx.events.push(
                        tick,
                        EventKind::TradeDeclined {
                            offer_id: offer.id,
                            seller: from,
                            buyer: agent.id,
                        },
                    );
                }
            }
            Payload::TradeAccept { offer_id, energy } => {
                if social.trades.close(&offer_id).is_some() {
                    vitals.gain(energy);
                    social.memory.record(from, TrustEvent::TradeCompleted, tick);
                    social.reputation = (social.reputation + REPUTATION_GAIN).min(1.0);
                    social.trades.completed += 1;
                }
            }
            Payload::TradeDecline { offer_id } => {
                if social.trades.close(&offer_id).is_some() {
                    social.memory.record(from, TrustEvent::TradeDeclined, tick);
                    social.trades.declined += 1;
                }
            }
            Payload::TerritoryWarning { center, radius } => {
                social.info.add_warning(DangerWarning {
                    position: center,
                    radius,
                    severity: 0.3,
                    confidence: 0.5,
                    source: Some(from),
                    tick,
                });
            }
        }
    }
}

fn goal_context(
    ctx: &TickContext<'_>,
    agent: &AgentFrame<'_>,
    vitals: &Vitals,
    social: &mut SocialModules,
    seen: &Perception,
    can_reproduce: bool,
) -> GoalContext {
    let config = ctx.config;
    let cfg = &config.social;
    let position = agent.position;

    let threat = (social.info.threat_at(&position)
        + INFECTED_THREAT * seen.nearby_infected as f32)
        .clamp(0.0, 1.0);
    let threat_source = social
        .info
        .worst_warning(&position)
        .map(|w| w.position)
        .or(seen.nearest_infected);
    let food_target = social
        .info
        .best_tip(&position)
        .map(|t| t.position)
        .or(seen.nearest_resource.map(|r| r.position));

    let intruder = social.territory.as_ref().and_then(|plan| {
        seen.neighbors
            .iter()
            .find(|v| plan.contains(&v.position) && !social.alliances.is_allied(v.id))
            .map(|v| (v.id, v.position))
    });

    let help_target = social.help.most_urgent(&position).map(|request| {
        let at = ctx
            .index
            .get(request.requester)
            .map_or(request.position, |v| v.position);
        (request.requester, at, request.urgency)
    });

    let trade_partner = if vitals.energy < TRADE_SELLER_ENERGY
        && social.info.tradeable_tip(TRADE_MIN_CONFIDENCE).is_some()
    {
        social_neighbors(seen)
            .find(|v| {
                social.memory.trust_or_neutral(v.id) >= TRADE_TRUST
                    && !social.trades.has_open_with(v.id)
            })
            .map(|v| v.id)
    } else {
        None
    };

    let alliance_candidate = if social.alliances.len() < cfg.max_alliances {
        social_neighbors(seen)
            .find(|v| {
                !social.alliances.is_allied(v.id)
                    && social
                        .memory
                        .trust(v.id)
                        .is_some_and(|t| t >= cfg.alliance_trust)
            })
            .map(|v| v.id)
    } else {
        None
    };

    let patrol_waypoint = social
        .territory
        .as_mut()
        .map(|plan| plan.waypoint(&position));

    GoalContext {
        energy: vitals.energy,
        status: Some(vitals.status),
        threat,
        threat_source,
        food_target,
        intruder,
        help_target,
        trade_partner,
        can_reproduce,
        alliance_candidate,
        patrol_waypoint,
        explore_heading: Some(position + social.wander * 10.0),
    }
}

/// Queue a reasoning request for a contested decision
fn maybe_delegate(
    ctx: &mut TickContext<'_>,
    agent: &AgentFrame<'_>,
    vitals: &Vitals,
    social: &mut SocialModules,
    seen: &Perception,
    goals: &[Goal],
) {
    if !ctx.outbox.is_enabled()
        || social.reasoning.pending.is_some()
        || !social
            .reasoning
            .cooldown_elapsed(ctx.tick, ctx.config.reasoning.request_cooldown)
        || !is_contested(goals)
    {
        return;
    }

    let genotype = &agent.genome.genotype;
    let profile = AgentProfile {
        id: agent.id,
        age: agent.age,
        energy: vitals.energy,
        personality: Personality {
            aggressiveness: genotype.aggressiveness,
            sociability: ((genotype.social_radius - 5.0) / 20.0).clamp(0.0, 1.0),
            resistance: genotype.infection_resistance,
        },
        status: vitals.status,
    };
    let observation = ObservationSummary {
        nearby_agents: seen.neighbors.len(),
        nearby_infected: seen.nearby_infected,
        nearest_resource: seen.nearest_resource.map(|r| r.distance),
        allies_nearby: seen
            .neighbors
            .iter()
            .filter(|v| social.alliances.is_allied(v.id))
            .count(),
    };
    if let Some(request_id) = ctx.outbox.submit(ctx.tick, profile, observation) {
        tracing::trace!(agent = %agent.id, request_id, "reasoning requested");
        social.reasoning.pending = Some(request_id);
        social.reasoning.last_request_tick = Some(ctx.tick);
    }
}

fn record_influence(
    ctx: &TickContext<'_>,
    agent: &AgentFrame<'_>,
    vitals: &Vitals,
    social: &mut SocialModules,
    top: &Goal,
    goal_ctx: &GoalContext,
    action: &SocialAction,
) {
    let position = agent.position;
    let used_social = top.target_agent.is_some()
        || social
            .info
            .best_tip(&position)
            .is_some_and(|t| t.source.is_some())
        || social
            .info
            .worst_warning(&position)
            .is_some_and(|w| w.source.is_some());
    let terrain_pressure = if agent.effects.contaminated { 0.5 } else { 0.0 };
    let pressure = agent.stress.max().max(terrain_pressure);
    let weights = InfluenceWeights::attribute(top, used_social, pressure, action.source);
    social.influence.record(DecisionRecord {
        tick: ctx.tick,
        goal: top.kind,
        weights,
        energy: vitals.energy,
        threat: goal_ctx.threat,
        position,
        target: top.target,
    });
}

/// Opportunistic social acts for this tick
fn act(
    ctx: &mut TickContext<'_>,
    agent: &AgentFrame<'_>,
    vitals: &mut Vitals,
    social: &mut SocialModules,
    seen: &Perception,
    top: &Goal,
    goal_ctx: &GoalContext,
) {
    let config = ctx.config;
    let cfg = &config.social;
    let tick = ctx.tick;
    let me = agent.id;
    let position = agent.position;

    // Hand over help once close enough
    if let Some((requester, at, _)) = goal_ctx.help_target {
        if vitals.energy > HELPER_ENERGY
            && at.distance(&position) <= HANDOVER_DISTANCE
            && social.help.take(requester).is_some()
        {
            let energy = vitals.drain(cfg.help_energy);
            send(
                ctx,
                me,
                requester,
                Payload::EnergyGift {
                    amount: energy,
                    reason: GiftReason::Help,
                },
            );
            social.memory.record(requester, TrustEvent::HelpedAgent, tick);
            social.help.given += 1;
            ctx.events.push(
                tick,
                EventKind::HelpGiven {
                    helper: me,
                    recipient: requester,
                    energy,
                },
            );
        }
    }

    // Defend claimed ground
    if let Some((intruder, _)) = goal_ctx.intruder {
        let aggressiveness = agent.genome.phenotype.aggressiveness;
        if top.kind == GoalKind::DefendTerritory && ctx.rng.chance(0.1 + 0.2 * aggressiveness) {
            social.memory.record(intruder, TrustEvent::TerritorialIntrusion, tick);
            let is_social = ctx
                .index
                .get(intruder)
                .is_some_and(|v| v.kind == AgentKind::Social);
            if let (true, Some(plan)) = (is_social, social.territory.as_ref()) {
                let (center, radius) = (plan.center, plan.radius);
                send(ctx, me, intruder, Payload::TerritoryWarning { center, radius });
            }
        }
    }

    // Sell a tip when running low
    if let Some(buyer) = goal_ctx.trade_partner {
        if let Some(tip) = social.info.tradeable_tip(TRADE_MIN_CONFIDENCE).copied() {
            let offer = TradeOffer {
                id: social.trades.next_offer_id(me),
                seller: me,
                buyer,
                tip,
                price: cfg.trade_price,
                created_tick: tick,
            };
            social.trades.open(offer.clone());
            send(ctx, me, buyer, Payload::TradeOffer(offer));
        }
    }

    if let Some(candidate) = goal_ctx.alliance_candidate {
        if !social.alliances.has_proposed(candidate) && ctx.rng.chance(cfg.alliance_proposal_chance) {
            social.alliances.propose(candidate, tick);
            send(ctx, me, candidate, Payload::AllianceProposal);
        }
    }

    // Ask trusted neighbours for help
    if vitals.energy < HELP_REQUEST_ENERGY && social.help.can_request(tick, cfg.help_cooldown) {
        let recipients: Vec<AgentId> = social_neighbors(seen)
            .filter(|v| social.memory.is_trusted(v.id, cfg.trust_threshold))
            .take(HELP_REQUEST_FANOUT)
            .map(|v| v.id)
            .collect();
        if !recipients.is_empty() {
            let urgency = (1.0 - vitals.energy / HELP_REQUEST_ENERGY).clamp(0.0, 1.0);
            for to in recipients {
                send(ctx, me, to, Payload::HelpRequest { urgency, position });
            }
            social.help.last_request_tick = Some(tick);
        }
    }

    // Share with a struggling ally
    if vitals.energy > SHARE_ENERGY {
        let perception = agent.genome.phenotype.perception_radius;
        let needy = social.alliances.partners().find(|partner| {
            ctx.index.get(*partner).is_some_and(|v| {
                v.energy < ALLY_NEEDS_ENERGY && v.position.distance(&position) <= perception
            })
        });
        if let Some(ally) = needy {
            let amount = vitals.drain(cfg.share_energy);
            social.alliances.record_share(ally, tick);
            send(
                ctx,
                me,
                ally,
                Payload::EnergyGift {
                    amount,
                    reason: GiftReason::AllianceShare,
                },
            );
        }
    }

    // Pass on what we know
    if ctx.rng.chance(cfg.communication_rate) {
        let trusted: Vec<AgentId> = social_neighbors(seen)
            .filter(|v| social.memory.is_trusted(v.id, cfg.trust_threshold))
            .map(|v| v.id)
            .collect();
        if !trusted.is_empty() {
            let to = trusted[ctx.rng.gen_range(0..trusted.len())];
            if let Some(tip) = social.info.best_tip(&position).copied() {
                send(ctx, me, to, Payload::ResourceTip(tip));
            }
            if let Some(warning) = social.info.worst_warning(&position).copied() {
                send(ctx, me, to, Payload::DangerWarning(warning));
            }
        }
    }

    // Claim unowned ground
    if social.territory.is_none()
        && vitals.energy > CLAIM_ENERGY
        && agent.age >= cfg.territory_min_age
        && ctx.env.territories.containing(&position).is_none()
        && ctx.rng.chance(cfg.territory_claim_chance)
    {
        let radius = 10.0 + 5.0 * agent.genome.genotype.size;
        let world_size = ctx.env.world_size();
        match ctx.env.territories.claim(me, position, radius, tick) {
            Ok(_) => {
                social.territory = Some(TerritoryPlan::new(position, radius, tick, world_size));
                tracing::debug!(agent = %me, radius, "territory claimed");
                ctx.events.push(
                    tick,
                    EventKind::TerritoryClaimed {
                        owner: me,
                        center: position,
                        radius,
                    },
                );
            }
            Err(reason) => {
                tracing::trace!(agent = %me, ?reason, "territory claim rejected");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Genome, Genotype};
    use crate::config::SimConfig;
    use crate::environment::{Environment, StressVector, TerrainEffects};
    use crate::events::EventQueue;
    use crate::reasoning::ReasoningOutbox;
    use crate::systems::messaging::MessageBus;
    use crate::systems::perception::AgentIndex;
    use ecosim_events::{EventType, HealthStatus, Vec3};
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    struct Harness {
        config: SimConfig,
        index: AgentIndex,
        env: Environment,
        rng: SmallRng,
        bus: MessageBus,
        events: EventQueue,
        outbox: ReasoningOutbox,
        genome: Genome,
    }

    impl Harness {
        fn new() -> Self {
            let config = SimConfig::default();
            let mut rng = SmallRng::seed_from_u64(5);
            let mut env = Environment::new(&config.environment, 200.0, false, &mut rng);
            env.resources.clear();
            let genome = Genome::new(Genotype {
                speed: 1.0,
                size: 1.0,
                social_radius: 10.0,
                infection_resistance: 0.0,
                lifespan: 1000.0,
                reproduction_threshold: 70.0,
                aggressiveness: 0.0,
                forage_efficiency: 1.0,
            });
            Self {
                config,
                index: AgentIndex::new(),
                env,
                rng,
                bus: MessageBus::new(),
                events: EventQueue::new(64),
                outbox: ReasoningOutbox::new(false),
                genome,
            }
        }

        fn neighbor(&mut self, id: u64, x: f32, y: f32) {
            let mut views: Vec<AgentView> = self.index.iter().copied().collect();
            views.push(AgentView {
                id: AgentId(id),
                kind: AgentKind::Social,
                position: Vec3::planar(x, y),
                status: HealthStatus::Susceptible,
                energy: 50.0,
                age: 10,
            });
            self.index.rebuild(views);
        }

        /// Run the social layer for agent 1 at (100, 100)
        fn run(&mut self, tick: u64, vitals: &mut Vitals, social: &mut SocialModules) -> SocialAction {
            let position = Vec3::planar(100.0, 100.0);
            let seen = Perception::gather(&self.index, &self.env.resources, AgentId(1), &position, 10.0, 15.0);
            let frame = AgentFrame {
                id: AgentId(1),
                age: 50,
                position,
                genome: &self.genome,
                stress: StressVector::default(),
                effects: TerrainEffects::neutral(),
            };
            let mut ctx = TickContext {
                tick,
                config: &self.config,
                index: &self.index,
                env: &mut self.env,
                rng: &mut self.rng,
                bus: &mut self.bus,
                events: &mut self.events,
                outbox: &mut self.outbox,
            };
            let fallback = SocialAction {
                kind: crate::decision::ActionKind::Explore,
                intensity: 0.5,
                heading: Vec3::planar(1.0, 0.0),
                source: crate::decision::DecisionSource::Heuristic,
            };
            social_update(&mut ctx, &frame, vitals, social, &seen, fallback, false)
        }

        fn sent(&mut self) -> Vec<Message> {
            self.bus.take()
        }
    }

    fn modules(config: &SimConfig) -> SocialModules {
        let mut social = SocialModules::new(&config.social);
        social.wander = Vec3::planar(1.0, 0.0);
        social
    }

    fn tip(resource_id: u64, position: Vec3) -> ResourceTip {
        ResourceTip {
            resource_id,
            position,
            value: 20.0,
            confidence: 0.8,
            source: None,
            tick: 0,
        }
    }

    #[test]
    fn test_tip_verified_on_arrival() {
        let mut h = Harness::new();
        h.config.social.communication_rate = 0.0;
        let real = h.env.resources.insert(Vec3::planar(150.0, 150.0), 20.0, 1.0, 0, false);
        let mut social = modules(&h.config);
        social.inbox = vec![
            Message::new(AgentId(2), AgentId(1), 0, Payload::ResourceTip(tip(real, Vec3::planar(150.0, 150.0)))),
            Message::new(AgentId(3), AgentId(1), 0, Payload::ResourceTip(tip(9999, Vec3::planar(10.0, 10.0)))),
        ];
        let mut vitals = Vitals::new(90.0);
        h.run(1, &mut vitals, &mut social);

        assert!((social.memory.trust(AgentId(2)).unwrap() - 0.55).abs() < 1e-6);
        assert!((social.memory.trust(AgentId(3)).unwrap() - 0.35).abs() < 1e-6);
        assert!(social.info.has_tip(real));
        assert!(!social.info.has_tip(9999));
        let stored = social.info.tips().iter().find(|t| t.resource_id == real).unwrap();
        assert_eq!(stored.source, Some(AgentId(2)));
        assert!((stored.confidence - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_distrusted_claims_ignored() {
        let mut h = Harness::new();
        h.config.social.communication_rate = 0.0;
        let mut social = modules(&h.config);
        social.memory.observe(AgentId(2), 0);
        social.memory.record(AgentId(2), TrustEvent::Adjust(-0.3), 0);
        social.inbox = vec![Message::new(
            AgentId(2),
            AgentId(1),
            0,
            Payload::HelpRequest {
                urgency: 1.0,
                position: Vec3::planar(100.0, 101.0),
            },
        )];
        let mut vitals = Vitals::new(90.0);
        h.run(1, &mut vitals, &mut social);
        assert_eq!(social.help.pending(), 0);
        assert_eq!(social.help.given, 0);
    }

    #[test]
    fn test_alliance_proposal_accepted() {
        let mut h = Harness::new();
        h.config.social.communication_rate = 0.0;
        h.neighbor(2, 102.0, 100.0);
        let mut social = modules(&h.config);
        social.memory.observe(AgentId(2), 0);
        social.memory.record(AgentId(2), TrustEvent::Adjust(0.15), 0);
        social.inbox = vec![Message::new(AgentId(2), AgentId(1), 0, Payload::AllianceProposal)];
        let mut vitals = Vitals::new(55.0);
        h.run(1, &mut vitals, &mut social);

        assert!(social.alliances.is_allied(AgentId(2)));
        assert!((social.memory.trust(AgentId(2)).unwrap() - 0.85).abs() < 1e-6);
        let sent = h.sent();
        assert!(sent
            .iter()
            .any(|m| m.to == AgentId(2) && matches!(m.payload, Payload::AllianceAccept { .. })));
        let formed: Vec<_> = h
            .events
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::AllianceFormed { alliance_id, members } => Some((alliance_id.clone(), *members)),
                _ => None,
            })
            .collect();
        assert_eq!(formed, vec![("alliance_1_2".to_string(), [AgentId(1), AgentId(2)])]);
    }

    #[test]
    fn test_alliance_refused_at_low_trust() {
        let mut h = Harness::new();
        h.config.social.communication_rate = 0.0;
        let mut social = modules(&h.config);
        social.inbox = vec![Message::new(AgentId(2), AgentId(1), 0, Payload::AllianceProposal)];
        let mut vitals = Vitals::new(55.0);
        h.run(1, &mut vitals, &mut social);
        assert!(!social.alliances.is_allied(AgentId(2)));
        assert!(h.sent().iter().all(|m| !matches!(m.payload, Payload::AllianceAccept { .. })));
    }

    fn accept_from(partner: u64, alliance_id: &str) -> Message {
        Message::new(
            AgentId(partner),
            AgentId(1),
            1,
            Payload::AllianceAccept {
                alliance_id: alliance_id.to_string(),
            },
        )
    }

    fn declines_to(sent: &[Message], partner: u64) -> bool {
        sent.iter()
            .any(|m| m.to == AgentId(partner) && matches!(m.payload, Payload::AllianceDecline { .. }))
    }

    #[test]
    fn test_accept_of_own_proposal_forms_alliance() {
        let mut h = Harness::new();
        h.config.social.communication_rate = 0.0;
        h.config.social.alliance_proposal_chance = 0.0;
        h.neighbor(2, 102.0, 100.0);
        let mut social = modules(&h.config);
        social.alliances.propose(AgentId(2), 0);
        social.inbox = vec![accept_from(2, "alliance_1_2")];
        let mut vitals = Vitals::new(55.0);
        h.run(2, &mut vitals, &mut social);

        assert!(social.alliances.is_allied(AgentId(2)));
        assert!(!social.alliances.has_proposed(AgentId(2)));
        assert!(!declines_to(&h.sent(), 2));
    }

    #[test]
    fn test_accept_at_capacity_is_declined() {
        let mut h = Harness::new();
        h.config.social.communication_rate = 0.0;
        h.config.social.alliance_proposal_chance = 0.0;
        h.config.social.max_alliances = 1;
        h.neighbor(2, 102.0, 100.0);
        h.neighbor(3, 98.0, 100.0);
        let mut social = modules(&h.config);
        social.alliances.form(AgentId(1), AgentId(3), 0);
        social.alliances.propose(AgentId(2), 0);
        social.inbox = vec![accept_from(2, "alliance_1_2")];
        let mut vitals = Vitals::new(55.0);
        h.run(2, &mut vitals, &mut social);

        assert!(!social.alliances.is_allied(AgentId(2)));
        assert!(social.alliances.is_allied(AgentId(3)));
        assert!(!social.alliances.has_proposed(AgentId(2)));
        assert!(declines_to(&h.sent(), 2));
    }

    #[test]
    fn test_unsolicited_accept_is_declined() {
        let mut h = Harness::new();
        h.config.social.communication_rate = 0.0;
        h.config.social.alliance_proposal_chance = 0.0;
        h.neighbor(2, 102.0, 100.0);
        let mut social = modules(&h.config);
        social.inbox = vec![accept_from(2, "alliance_1_2")];
        let mut vitals = Vitals::new(55.0);
        h.run(2, &mut vitals, &mut social);

        assert!(!social.alliances.is_allied(AgentId(2)));
        assert!(declines_to(&h.sent(), 2));
    }

    #[test]
    fn test_decline_withdraws_accepted_alliance() {
        let mut h = Harness::new();
        h.config.social.communication_rate = 0.0;
        h.config.social.alliance_proposal_chance = 0.0;
        h.neighbor(2, 102.0, 100.0);
        let mut social = modules(&h.config);
        social.alliances.form(AgentId(1), AgentId(2), 1);
        social.inbox = vec![Message::new(
            AgentId(2),
            AgentId(1),
            2,
            Payload::AllianceDecline {
                alliance_id: "alliance_1_2".to_string(),
            },
        )];
        let mut vitals = Vitals::new(55.0);
        h.run(3, &mut vitals, &mut social);

        assert!(!social.alliances.is_allied(AgentId(2)));
        let dissolved: Vec<_> = h
            .events
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::AllianceDissolved { alliance_id, members } => Some((alliance_id.clone(), *members)),
                _ => None,
            })
            .collect();
        assert_eq!(dissolved, vec![("alliance_1_2".to_string(), [AgentId(1), AgentId(2)])]);
    }

    #[test]
    fn test_trade_offer_accepted_and_paid() {
        let mut h = Harness::new();
        h.config.social.communication_rate = 0.0;
        let mut social = modules(&h.config);
        let offer = TradeOffer {
            id: "trade_2_1".to_string(),
            seller: AgentId(2),
            buyer: AgentId(1),
            tip: tip(77, Vec3::planar(120.0, 120.0)),
            price: 8.0,
            created_tick: 0,
        };
        social.inbox = vec![Message::new(AgentId(2), AgentId(1), 0, Payload::TradeOffer(offer))];
        let mut vitals = Vitals::new(80.0);
        h.run(1, &mut vitals, &mut social);

        assert!(social.info.has_tip(77));
        assert_eq!(social.trades.completed, 1);
        assert!((social.reputation - 0.52).abs() < 1e-6);
        let accepted = h.sent().into_iter().find_map(|m| match m.payload {
            Payload::TradeAccept { offer_id, energy } => Some((offer_id, energy)),
            _ => None,
        });
        assert_eq!(accepted, Some(("trade_2_1".to_string(), 8.0)));
    }

    #[test]
    fn test_trade_declined_when_buyer_is_poor() {
        let mut h = Harness::new();
        h.config.social.communication_rate = 0.0;
        let mut social = modules(&h.config);
        let offer = TradeOffer {
            id: "trade_2_1".to_string(),
            seller: AgentId(2),
            buyer: AgentId(1),
            tip: tip(77, Vec3::planar(120.0, 120.0)),
            price: 8.0,
            created_tick: 0,
        };
        social.inbox = vec![Message::new(AgentId(2), AgentId(1), 0, Payload::TradeOffer(offer))];
        let mut vitals = Vitals::new(45.0);
        h.run(1, &mut vitals, &mut social);

        assert!(!social.info.has_tip(77));
        assert!(h
            .sent()
            .iter()
            .any(|m| matches!(m.payload, Payload::TradeDecline { .. })));
        assert!(h
            .events
            .iter()
            .any(|e| matches!(e.kind, EventKind::TradeDeclined { .. })));
    }

    #[test]
    fn test_trade_declined_when_tip_already_known() {
        let mut h = Harness::new();
        h.config.social.communication_rate = 0.0;
        let mut social = modules(&h.config);
        social.info.add_tip(tip(77, Vec3::planar(120.0, 120.0)));
        let offer = TradeOffer {
            id: "trade_2_1".to_string(),
            seller: AgentId(2),
            buyer: AgentId(1),
            tip: tip(77, Vec3::planar(120.0, 120.0)),
            price: 8.0,
            created_tick: 0,
        };
        social.inbox = vec![Message::new(AgentId(2), AgentId(1), 0, Payload::TradeOffer(offer))];
        let mut vitals = Vitals::new(80.0);
        h.run(1, &mut vitals, &mut social);

        assert_eq!(social.trades.completed, 0);
        assert!(vitals.energy > 79.0);
        assert!(h
            .sent()
            .iter()
            .any(|m| matches!(m.payload, Payload::TradeDecline { .. })));
    }

    #[test]
    fn test_seller_credited_only_for_open_offer() {
        let mut h = Harness::new();
        h.config.social.communication_rate = 0.0;
        let mut social = modules(&h.config);
        let id = social.trades.next_offer_id(AgentId(1));
        social.trades.open(TradeOffer {
            id: id.clone(),
            seller: AgentId(1),
            buyer: AgentId(2),
            tip: tip(5, Vec3::planar(110.0, 100.0)),
            price: 8.0,
            created_tick: 0,
        });
        social.inbox = vec![
            Message::new(AgentId(2), AgentId(1), 0, Payload::TradeAccept { offer_id: id.clone(), energy: 8.0 }),
            Message::new(AgentId(2), AgentId(1), 0, Payload::TradeAccept { offer_id: id, energy: 8.0 }),
        ];
        let mut vitals = Vitals::new(60.0);
        h.run(1, &mut vitals, &mut social);
        assert_eq!(social.trades.completed, 1);
        assert_eq!(social.trades.open_count(), 0);
    }

    #[test]
    fn test_starving_agent_asks_trusted_neighbours() {
        let mut h = Harness::new();
        h.config.social.communication_rate = 0.0;
        h.neighbor(2, 103.0, 100.0);
        h.neighbor(3, 100.0, 104.0);
        let mut social = modules(&h.config);
        let mut vitals = Vitals::new(20.0);
        h.run(5, &mut vitals, &mut social);

        let asked: Vec<AgentId> = h
            .sent()
            .into_iter()
            .filter(|m| matches!(m.payload, Payload::HelpRequest { .. }))
            .map(|m| m.to)
            .collect();
        assert_eq!(asked, vec![AgentId(2), AgentId(3)]);
        assert_eq!(social.help.last_request_tick, Some(5));
        let communications = h
            .events
            .iter()
            .filter(|e| e.event_type == EventType::Communication)
            .count();
        assert_eq!(communications, 2);

        // Cooldown holds the next request back
        let mut vitals = Vitals::new(20.0);
        h.run(6, &mut vitals, &mut social);
        assert!(h.sent().iter().all(|m| !matches!(m.payload, Payload::HelpRequest { .. })));
    }

    #[test]
    fn test_helper_gifts_energy_on_arrival() {
        let mut h = Harness::new();
        h.config.social.communication_rate = 0.0;
        h.neighbor(2, 101.0, 100.0);
        let mut social = modules(&h.config);
        social.help.receive(HelpRequest {
            requester: AgentId(2),
            position: Vec3::planar(101.0, 100.0),
            urgency: 0.8,
            tick: 0,
        });
        let mut vitals = Vitals::new(90.0);
        h.run(1, &mut vitals, &mut social);

        assert!((vitals.energy - 75.0).abs() < 1e-4);
        assert_eq!(social.help.given, 1);
        assert!((social.memory.trust(AgentId(2)).unwrap() - 0.6).abs() < 1e-6);
        assert!(h.events.iter().any(|e| matches!(
            e.kind,
            EventKind::HelpGiven { helper: AgentId(1), recipient: AgentId(2), .. }
        )));
    }

    #[test]
    fn test_gift_received_raises_energy_and_trust() {
        let mut h = Harness::new();
        h.config.social.communication_rate = 0.0;
        let mut social = modules(&h.config);
        social.inbox = vec![Message::new(
            AgentId(4),
            AgentId(1),
            0,
            Payload::EnergyGift {
                amount: 15.0,
                reason: GiftReason::Help,
            },
        )];
        let mut vitals = Vitals::new(30.0);
        h.run(1, &mut vitals, &mut social);
        assert!((vitals.energy - 45.0).abs() < 1e-4);
        assert!((social.memory.trust(AgentId(4)).unwrap() - 0.65).abs() < 1e-6);
        assert_eq!(social.help.received, 1);
    }

    #[test]
    fn test_ready_decision_overrides_local_choice() {
        let mut h = Harness::new();
        h.config.social.communication_rate = 0.0;
        let mut social = modules(&h.config);
        social.reasoning.ready = Some(crate::reasoning::ReasoningDecision {
            reasoning: "rest up".to_string(),
            action: crate::decision::ActionKind::Rest,
            intensity: 0.1,
            direction: crate::decision::Direction::Random,
            confidence: 0.9,
        });
        let mut vitals = Vitals::new(90.0);
        let action = h.run(1, &mut vitals, &mut social);
        assert_eq!(action.kind, crate::decision::ActionKind::Rest);
        assert_eq!(action.source, crate::decision::DecisionSource::Reasoning);
        assert!(social.reasoning.ready.is_none());
    }

    #[test]
    fn test_contested_decision_queues_request() {
        let mut h = Harness::new();
        h.config.social.communication_rate = 0.0;
        h.outbox = ReasoningOutbox::new(true);
        let mut social = modules(&h.config);
        // Starving makes FindFood critical, which is contested
        let mut vitals = Vitals::new(15.0);
        h.run(40, &mut vitals, &mut social);
        assert_eq!(h.outbox.queued(), 1);
        assert_eq!(social.reasoning.pending, Some(1));
        assert_eq!(social.reasoning.last_request_tick, Some(40));

        // Pending request blocks another
        let mut vitals = Vitals::new(15.0);
        h.run(80, &mut vitals, &mut social);
        assert_eq!(h.outbox.queued(), 1);
    }
}
