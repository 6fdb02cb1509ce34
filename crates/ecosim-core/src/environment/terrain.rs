//! Terrain Features
//!
//! Static, radius-scoped modifiers generated once per run. Shelters are the
//! only stateful feature: their occupant list is rebuilt every tick.

use ecosim_events::{AgentId, Vec3};
use rand::Rng;
use std::collections::BTreeMap;

use crate::config::EnvironmentConfig;
use crate::rng::RandomExt;

pub mod terrain_constants {
    pub const SHELTER_RADIUS: f32 = 6.0;
    pub const SHELTER_PROTECTION: f32 = 0.7;
    pub const OASIS_RADIUS: f32 = 10.0;
    pub const OASIS_LOSS_FACTOR: f32 = 0.7;
    pub const HILL_RADIUS: f32 = 15.0;
    pub const HILL_MAX_ELEVATION: f32 = 8.0;
    pub const HILL_MOVEMENT: f32 = 0.85;
    pub const CONTAMINATED_RADIUS: f32 = 8.0;
    pub const CONTAMINATED_INFECTION: f32 = 2.0;
    pub const CONTAMINATED_DRAIN: f32 = 0.1;
}

use terrain_constants::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TerrainKind {
    Shelter { capacity: usize, protection: f32 },
    Oasis { loss_factor: f32 },
    Hill { elevation: f32, movement: f32 },
    Contaminated { infection_multiplier: f32, drain: f32 },
}

impl TerrainKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerrainKind::Shelter { .. } => "shelter",
            TerrainKind::Oasis { .. } => "oasis",
            TerrainKind::Hill { .. } => "hill",
            TerrainKind::Contaminated { .. } => "contaminated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainFeature {
    pub id: u32,
    pub kind: TerrainKind,
    pub position: Vec3,
    pub radius: f32,
}

impl TerrainFeature {
    pub fn contains(&self, at: &Vec3) -> bool {
        self.position.distance(at) <= self.radius
    }
}

/// Combined terrain modifiers at one position for one agent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainEffects {
    /// Weather protection granted by an admitting shelter, in [0, 1]
    pub protection: f32,
    /// Multiplier on environmental energy loss (oases reduce it)
    pub loss_factor: f32,
    pub infection_multiplier: f32,
    /// Flat per-tick energy drain
    pub drain: f32,
    pub movement_multiplier: f32,
    pub elevation: f32,
    pub flood_immune: bool,
    pub contaminated: bool,
}

impl TerrainEffects {
    pub fn neutral() -> Self {
        Self {
            protection: 0.0,
            loss_factor: 1.0,
            infection_multiplier: 1.0,
            drain: 0.0,
            movement_multiplier: 1.0,
            elevation: 0.0,
            flood_immune: false,
            contaminated: false,
        }
    }
}

impl Default for TerrainEffects {
    fn default() -> Self {
        Self::neutral()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TerrainMap {
    features: Vec<TerrainFeature>,
    /// Shelter id -> admitted occupants, in id order
    admitted: BTreeMap<u32, Vec<AgentId>>,
}

impl TerrainMap {
    pub fn new(features: Vec<TerrainFeature>) -> Self {
        Self {
            features,
            admitted: BTreeMap::new(),
        }
    }

    /// Scatter the configured feature counts uniformly over the world
    pub fn generate<R: Rng + ?Sized>(cfg: &EnvironmentConfig, world_size: f32, rng: &mut R) -> Self {
        let mut features = Vec::new();
        let mut next_id = 0u32;
        let mut place = |kind: TerrainKind, radius: f32, count: usize, rng: &mut R| {
            for _ in 0..count {
                let margin = radius.min(world_size * 0.5);
                let position = Vec3::planar(
                    rng.between(margin, world_size - margin),
                    rng.between(margin, world_size - margin),
                );
                features.push(TerrainFeature {
                    id: next_id,
                    kind,
                    position,
                    radius,
                });
                next_id += 1;
            }
        };

        place(
            TerrainKind::Shelter {
                capacity: cfg.shelter_capacity,
                protection: SHELTER_PROTECTION,
            },
            SHELTER_RADIUS,
            cfg.shelters,
            rng,
        );
        place(
            TerrainKind::Oasis {
                loss_factor: OASIS_LOSS_FACTOR,
            },
            OASIS_RADIUS,
            cfg.oases,
            rng,
        );
        for _ in 0..cfg.hills {
            let elevation = rng.between(HILL_MAX_ELEVATION * 0.5, HILL_MAX_ELEVATION);
            place(
                TerrainKind::Hill {
                    elevation,
                    movement: HILL_MOVEMENT,
                },
                HILL_RADIUS,
                1,
                rng,
            );
        }
        place(
            TerrainKind::Contaminated {
                infection_multiplier: CONTAMINATED_INFECTION,
                drain: CONTAMINATED_DRAIN,
            },
            CONTAMINATED_RADIUS,
            cfg.contaminated_zones,
            rng,
        );

        Self::new(features)
    }

    pub fn features(&self) -> &[TerrainFeature] {
        &self.features
    }

    /// Rebuild shelter admission from positions. `agents` must be in id order.
    pub fn update_occupancy<'a>(&mut self, agents: impl IntoIterator<Item = (AgentId, &'a Vec3)>) {
        self.admitted.clear();
        let agents: Vec<(AgentId, &Vec3)> = agents.into_iter().collect();
        for feature in &self.features {
            if let TerrainKind::Shelter { capacity, .. } = feature.kind {
                let inside: Vec<AgentId> = agents
                    .iter()
                    .filter(|(_, pos)| feature.contains(pos))
                    .map(|(id, _)| *id)
                    .take(capacity)
                    .collect();
                self.admitted.insert(feature.id, inside);
            }
        }
    }

    pub fn is_admitted(&self, shelter: u32, agent: AgentId) -> bool {
        self.admitted
            .get(&shelter)
            .is_some_and(|ids| ids.binary_search(&agent).is_ok())
    }

    pub fn occupants(&self, shelter: u32) -> usize {
        self.admitted.get(&shelter).map_or(0, |ids| ids.len())
    }

    /// Modifiers for `agent` standing at `at`
    pub fn effects_at(&self, at: &Vec3, agent: AgentId) -> TerrainEffects {
        let mut fx = TerrainEffects::neutral();
        for feature in self.features.iter().filter(|f| f.contains(at)) {
            match feature.kind {
                TerrainKind::Shelter { protection, .. } => {
                    if self.is_admitted(feature.id, agent) {
                        fx.protection = fx.protection.max(protection);
                    }
                }
                TerrainKind::Oasis { loss_factor } => {
                    fx.loss_factor = fx.loss_factor.min(loss_factor);
                }
                TerrainKind::Hill {
                    elevation,
                    movement,
                } => {
                    fx.elevation = fx.elevation.max(hill_height(feature, elevation, at));
                    fx.movement_multiplier = fx.movement_multiplier.min(movement);
                    fx.flood_immune = true;
                }
                TerrainKind::Contaminated {
                    infection_multiplier,
                    drain,
                } => {
                    fx.infection_multiplier = fx.infection_multiplier.max(infection_multiplier);
                    fx.drain += drain;
                    fx.contaminated = true;
                }
            }
        }
        fx
    }

    /// Ground height at `at`
    pub fn elevation_at(&self, at: &Vec3) -> f32 {
        self.features
            .iter()
            .filter(|f| f.contains(at))
            .filter_map(|f| match f.kind {
                TerrainKind::Hill { elevation, .. } => Some(hill_height(f, elevation, at)),
                _ => None,
            })
            .fold(0.0, f32::max)
    }

    /// Random point inside a random oasis, if any exist
    pub fn random_oasis_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Vec3> {
        let oases: Vec<&TerrainFeature> = self
            .features
            .iter()
            .filter(|f| matches!(f.kind, TerrainKind::Oasis { .. }))
            .collect();
        if oases.is_empty() {
            return None;
        }
        let oasis = oases[rng.gen_range(0..oases.len())];
        let dir = rng.unit_direction();
        let dist = rng.between(0.0, oasis.radius);
        Some(Vec3::planar(
            oasis.position.x + dir.x * dist,
            oasis.position.y + dir.y * dist,
        ))
    }
}

/// Cone-shaped hill: peak at the center, zero at the rim
fn hill_height(feature: &TerrainFeature, peak: f32, at: &Vec3) -> f32 {
    if feature.radius <= 0.0 {
        return 0.0;
    }
    (peak * (1.0 - feature.position.distance(at) / feature.radius)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn feature(id: u32, kind: TerrainKind, radius: f32) -> TerrainFeature {
        TerrainFeature {
            id,
            kind,
            position: Vec3::planar(50.0, 50.0),
            radius,
        }
    }

    #[test]
    fn test_generate_counts() {
        let cfg = EnvironmentConfig::default();
        let mut rng = SmallRng::seed_from_u64(1);
        let map = TerrainMap::generate(&cfg, 200.0, &mut rng);
        assert_eq!(map.features().len(), 5 + 3 + 4 + 3);
        for f in map.features() {
            assert!(f.position.x >= 0.0 && f.position.x <= 200.0);
        }
    }

    #[test]
    fn test_shelter_capacity_in_id_order() {
        let mut map = TerrainMap::new(vec![feature(
            0,
            TerrainKind::Shelter {
                capacity: 2,
                protection: 0.7,
            },
            6.0,
        )]);
        let inside = Vec3::planar(51.0, 50.0);
        let far = Vec3::planar(0.0, 0.0);
        map.update_occupancy(vec![
            (AgentId(1), &inside),
            (AgentId(2), &far),
            (AgentId(3), &inside),
            (AgentId(4), &inside),
        ]);
        assert_eq!(map.occupants(0), 2);
        assert_eq!(map.effects_at(&inside, AgentId(1)).protection, 0.7);
        assert_eq!(map.effects_at(&inside, AgentId(3)).protection, 0.7);
        assert_eq!(map.effects_at(&inside, AgentId(4)).protection, 0.0);
    }

    #[test]
    fn test_overlapping_effects_combine() {
        let map = TerrainMap::new(vec![
            feature(
                0,
                TerrainKind::Hill {
                    elevation: 8.0,
                    movement: 0.85,
                },
                15.0,
            ),
            feature(
                1,
                TerrainKind::Contaminated {
                    infection_multiplier: 2.0,
                    drain: 0.1,
                },
                8.0,
            ),
        ]);
        let fx = map.effects_at(&Vec3::planar(50.0, 50.0), AgentId(1));
        assert_eq!(fx.elevation, 8.0);
        assert!(fx.flood_immune && fx.contaminated);
        assert_eq!(fx.infection_multiplier, 2.0);
        assert_eq!(map.effects_at(&Vec3::planar(0.0, 0.0), AgentId(1)), TerrainEffects::neutral());
        assert!((map.elevation_at(&Vec3::planar(57.5, 50.0)) - 4.0).abs() < 1e-5);
    }

    #[test]
    fn test_oasis_points_inside() {
        let map = TerrainMap::new(vec![feature(0, TerrainKind::Oasis { loss_factor: 0.7 }, 10.0)]);
        let mut rng = SmallRng::seed_from_u64(2);
        for _ in 0..50 {
            let p = map.random_oasis_point(&mut rng).unwrap();
            assert!(map.features()[0].contains(&p));
        }
        assert!(TerrainMap::default().random_oasis_point(&mut rng).is_none());
    }
}
