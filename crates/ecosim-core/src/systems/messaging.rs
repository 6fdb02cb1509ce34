//! Message Delivery
//!
//! Messages sent during tick t are held on the bus and handed to inboxes at
//! the start of tick t+1. Messages addressed to agents that died or cannot
//! receive them are dropped.

use bevy_ecs::prelude::*;
use ecosim_events::AgentId;
use std::collections::BTreeMap;

use crate::components::{Identity, Message, Modules};

#[derive(Resource, Debug, Default)]
pub struct MessageBus {
    outgoing: Vec<Message>,
    delivered: u64,
    dropped: u64,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, message: Message) {
        self.outgoing.push(message);
    }

    pub fn pending(&self) -> usize {
        self.outgoing.len()
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn take(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn clear(&mut self) {
        self.outgoing.clear();
    }
}

/// System to move last tick's messages into recipient inboxes
pub fn deliver_messages(mut bus: ResMut<MessageBus>, mut query: Query<(&Identity, &mut Modules)>) {
    let mut by_recipient: BTreeMap<AgentId, Vec<Message>> = BTreeMap::new();
    for message in bus.take() {
        by_recipient.entry(message.to).or_default().push(message);
    }

    let mut delivered = 0u64;
    for (identity, mut modules) in query.iter_mut() {
        let Some(social) = modules.social_mut() else {
            continue;
        };
        social.inbox.clear();
        if let Some(messages) = by_recipient.remove(&identity.id) {
            delivered += messages.len() as u64;
            social.inbox = messages;
        }
    }

    let dropped: u64 = by_recipient.values().map(|m| m.len() as u64).sum();
    bus.delivered += delivered;
    bus.dropped += dropped;
    if dropped > 0 {
        tracing::trace!(dropped, "messages to absent recipients dropped");
    }
}
