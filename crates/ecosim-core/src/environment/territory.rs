//! Territory Registry
//!
//! World-level record of claimed areas. Each owner holds at most one claim,
//! and a new claim may not be centered inside an existing one.

use ecosim_events::{AgentId, Vec3};
use std::collections::BTreeMap;

/// Strength below which a territory lapses
pub const TERRITORY_FLOOR: f32 = 0.1;
/// Strength regained for each tick the owner spends inside its claim
pub const TERRITORY_REINFORCE: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Territory {
    pub owner: AgentId,
    pub center: Vec3,
    pub radius: f32,
    pub strength: f32,
    pub claimed_tick: u64,
}

impl Territory {
    pub fn contains(&self, at: &Vec3) -> bool {
        self.center.distance(at) <= self.radius
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimRejected {
    AlreadyOwner,
    InsideTerritory(AgentId),
}

#[derive(Debug, Clone, Default)]
pub struct TerritoryRegistry {
    territories: BTreeMap<AgentId, Territory>,
}

impl TerritoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(
        &mut self,
        owner: AgentId,
        center: Vec3,
        radius: f32,
        tick: u64,
    ) -> Result<&Territory, ClaimRejected> {
        if self.territories.contains_key(&owner) {
            return Err(ClaimRejected::AlreadyOwner);
        }
        if let Some(existing) = self.containing(&center) {
            return Err(ClaimRejected::InsideTerritory(existing.owner));
        }
        let territory = self.territories.entry(owner).or_insert(Territory {
            owner,
            center,
            radius,
            strength: 1.0,
            claimed_tick: tick,
        });
        Ok(territory)
    }

    /// First territory (lowest owner id) covering `at`
    pub fn containing(&self, at: &Vec3) -> Option<&Territory> {
        self.territories.values().find(|t| t.contains(at))
    }

    pub fn get(&self, owner: AgentId) -> Option<&Territory> {
        self.territories.get(&owner)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Territory> {
        self.territories.values()
    }

    pub fn len(&self) -> usize {
        self.territories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.territories.is_empty()
    }

    pub fn release(&mut self, owner: AgentId) -> Option<Territory> {
        self.territories.remove(&owner)
    }

    /// Per-tick upkeep. `owner_position` returns None for owners that no longer
    /// exist. Returns the territories that lapsed.
    pub fn decay(
        &mut self,
        rate: f32,
        owner_position: impl Fn(AgentId) -> Option<Vec3>,
    ) -> Vec<Territory> {
        let mut lapsed = Vec::new();
        let owners: Vec<AgentId> = self.territories.keys().copied().collect();
        for owner in owners {
            let Some(position) = owner_position(owner) else {
                if let Some(t) = self.territories.remove(&owner) {
                    lapsed.push(t);
                }
                continue;
            };
            let Some(territory) = self.territories.get_mut(&owner) else {
                continue;
            };
            territory.strength -= rate;
            if territory.contains(&position) {
                territory.strength += TERRITORY_REINFORCE;
            }
            territory.strength = territory.strength.clamp(0.0, 1.0);
            if territory.strength < TERRITORY_FLOOR {
                if let Some(t) = self.territories.remove(&owner) {
                    lapsed.push(t);
                }
            }
        }
        lapsed
    }
}
