//! Resource Field
//!
//! Food items scattered over the world. A resource is removed the moment it
//! is consumed, so it can be consumed at most once.

use ecosim_events::Vec3;
use rand::Rng;
use std::collections::BTreeMap;

use crate::config::EnvironmentConfig;
use crate::rng::RandomExt;

use super::terrain::TerrainMap;

/// Share of spawns placed inside an oasis
pub const OASIS_SPAWN_SHARE: f32 = 0.3;
/// Per-tick removal chance for a fragile resource at full storm intensity
pub const STORM_DAMAGE_RATE: f32 = 0.002;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resource {
    pub id: u64,
    pub position: Vec3,
    pub value: f32,
    pub quality: f32,
    pub spawn_tick: u64,
    pub weather_resistant: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ResourceField {
    resources: BTreeMap<u64, Resource>,
    next_id: u64,
    consumed: u64,
}

impl ResourceField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        position: Vec3,
        value: f32,
        quality: f32,
        tick: u64,
        weather_resistant: bool,
    ) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.resources.insert(
            id,
            Resource {
                id,
                position,
                value,
                quality,
                spawn_tick: tick,
                weather_resistant,
            },
        );
        id
    }

    /// Spawn one resource at a random location, sometimes inside an oasis
    pub fn spawn_random<R: Rng + ?Sized>(
        &mut self,
        cfg: &EnvironmentConfig,
        world_size: f32,
        terrain: &TerrainMap,
        tick: u64,
        rng: &mut R,
    ) -> u64 {
        let oasis = if rng.chance(OASIS_SPAWN_SHARE) {
            terrain.random_oasis_point(rng)
        } else {
            None
        };
        let position = oasis
            .map(|p| Vec3::planar(p.x.clamp(0.0, world_size), p.y.clamp(0.0, world_size)))
            .unwrap_or_else(|| {
                Vec3::planar(rng.between(0.0, world_size), rng.between(0.0, world_size))
            });
        let value = cfg.resource_value.sample(rng);
        let quality = cfg.resource_quality.sample(rng);
        let resistant = rng.chance(cfg.weather_resistant_fraction);
        self.insert(position, value, quality, tick, resistant)
    }

    /// Remove and return a resource. Returns None if it is already gone.
    pub fn consume(&mut self, id: u64) -> Option<Resource> {
        let resource = self.resources.remove(&id)?;
        self.consumed += 1;
        Some(resource)
    }

    pub fn get(&self, id: u64) -> Option<&Resource> {
        self.resources.get(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.resources.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn consumed_count(&self) -> u64 {
        self.consumed
    }

    /// Resources within `radius` of `at` as (id, distance), nearest first
    pub fn within(&self, at: &Vec3, radius: f32) -> Vec<(u64, f32)> {
        let mut found: Vec<(u64, f32)> = self
            .resources
            .values()
            .map(|r| (r.id, r.position.distance(at)))
            .filter(|(_, d)| *d <= radius)
            .collect();
        found.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        found
    }

    pub fn nearest(&self, at: &Vec3, radius: f32) -> Option<(&Resource, f32)> {
        self.resources
            .values()
            .map(|r| (r, r.position.distance(at)))
            .filter(|(_, d)| *d <= radius)
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.id.cmp(&b.0.id)))
    }

    /// Storms wash away fragile resources. Returns the number removed.
    pub fn storm_damage<R: Rng + ?Sized>(&mut self, storm: f32, rng: &mut R) -> usize {
        if storm <= 0.0 {
            return 0;
        }
        let p = STORM_DAMAGE_RATE * storm;
        let doomed: Vec<u64> = self
            .resources
            .values()
            .filter(|r| !r.weather_resistant)
            .map(|r| r.id)
            .collect::<Vec<_>>()
            .into_iter()
            .filter(|_| rng.chance(p))
            .collect();
        for id in &doomed {
            self.resources.remove(id);
        }
        doomed.len()
    }

    pub fn clear(&mut self) {
        self.resources.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_consumed_exactly_once() {
        let mut field = ResourceField::new();
        let id = field.insert(Vec3::planar(1.0, 1.0), 20.0, 1.0, 0, false);
        assert!(field.consume(id).is_some());
        assert!(field.consume(id).is_none());
        assert_eq!(field.consumed_count(), 1);
        assert!(field.is_empty());
    }

    #[test]
    fn test_within_sorted_nearest_first() {
        let mut field = ResourceField::new();
        let far = field.insert(Vec3::planar(2.5, 0.0), 10.0, 1.0, 0, false);
        let near = field.insert(Vec3::planar(1.0, 0.0), 10.0, 1.0, 0, false);
        field.insert(Vec3::planar(9.0, 0.0), 10.0, 1.0, 0, false);
        let found = field.within(&Vec3::ZERO, 3.0);
        assert_eq!(found.iter().map(|f| f.0).collect::<Vec<_>>(), vec![near, far]);
        assert_eq!(field.nearest(&Vec3::ZERO, 100.0).unwrap().0.id, near);
        assert!(field.nearest(&Vec3::planar(100.0, 100.0), 5.0).is_none());
    }

    #[test]
    fn test_storm_spares_resistant() {
        let mut field = ResourceField::new();
        let mut rng = SmallRng::seed_from_u64(1);
        let keep = field.insert(Vec3::ZERO, 10.0, 1.0, 0, true);
        for _ in 0..100 {
            field.insert(Vec3::ZERO, 10.0, 1.0, 0, false);
        }
        let mut removed = 0;
        for _ in 0..2000 {
            removed += field.storm_damage(1.0, &mut rng);
        }
        assert!(removed > 0);
        assert!(field.contains(keep));
        assert_eq!(field.storm_damage(0.0, &mut rng), 0);
    }

    #[test]
    fn test_spawn_respects_config_ranges() {
        let cfg = EnvironmentConfig::default();
        let mut field = ResourceField::new();
        let mut rng = SmallRng::seed_from_u64(2);
        let terrain = TerrainMap::default();
        for tick in 0..100 {
            let id = field.spawn_random(&cfg, 50.0, &terrain, tick, &mut rng);
            let r = field.get(id).unwrap();
            assert!(cfg.resource_value.contains(r.value));
            assert!(r.position.x >= 0.0 && r.position.x <= 50.0);
        }
        assert_eq!(field.len(), 100);
    }
}
