//! Snapshot Generation
//!
//! Full exports, metrics snapshots, render frames, and the state digest. All
//! agent collections are emitted in ascending id order.

use bevy_ecs::prelude::*;
use ecosim_events::{
    AgentExport, MetricsSnapshot, RenderAgent, RenderFrame, RenderResource, RenderTerrain,
    RenderTerritory, SimulationExport, SirCounts,
};
use std::fs;
use std::path::Path;
use uuid::Uuid;

use crate::components::{Body, Genome, Identity, Vitals};
use crate::environment::Environment;
use crate::error::SimError;
use crate::systems::SimClock;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a hasher
#[derive(Debug, Clone, Copy)]
pub struct Fnv1a(u64);

impl Fnv1a {
    pub fn new() -> Self {
        Self(FNV_OFFSET)
    }

    pub fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.0 ^= u64::from(*byte);
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }

    pub fn write_u64(&mut self, value: u64) {
        self.write(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.write(&value.to_bits().to_le_bytes());
    }

    pub fn finish(&self) -> u64 {
        self.0
    }
}

impl Default for Fnv1a {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted_agents(world: &mut World) -> Vec<(Identity, Body, Vitals, f32)> {
    let mut query = world.query::<(&Identity, &Body, &Vitals, &Genome)>();
    let mut agents: Vec<(Identity, Body, Vitals, f32)> = query
        .iter(world)
        .map(|(identity, body, vitals, genome)| {
            (*identity, *body, vitals.clone(), genome.phenotype.render_radius)
        })
        .collect();
    agents.sort_by_key(|(identity, ..)| identity.id);
    agents
}

/// Digest over position, velocity, energy, status, and age of every agent in id order
pub fn state_digest(world: &mut World) -> u64 {
    let mut hasher = Fnv1a::new();
    for (identity, body, vitals, _) in sorted_agents(world) {
        hasher.write_u64(identity.id.0);
        for v in [
            body.position.x,
            body.position.y,
            body.position.z,
            body.velocity.x,
            body.velocity.y,
            body.velocity.z,
            vitals.energy,
        ] {
            hasher.write_f32(v);
        }
        hasher.write(&[vitals.status.stage()]);
        hasher.write_u64(vitals.age);
    }
    hasher.finish()
}

/// Population, mean energy, SIR counts, and the state digest
pub fn metrics_snapshot(world: &mut World, run_id: Uuid) -> MetricsSnapshot {
    let tick = world.resource::<SimClock>().tick;
    let agents = sorted_agents(world);
    let mut sir = SirCounts::default();
    let mut energy = 0.0f64;
    for (_, _, vitals, _) in &agents {
        sir.record(vitals.status);
        energy += vitals.energy as f64;
    }
    let energy_mean = if agents.is_empty() {
        0.0
    } else {
        (energy / agents.len() as f64) as f32
    };
    MetricsSnapshot {
        tick,
        run_id,
        pop: agents.len(),
        energy_mean,
        sir,
        sim_digest: format!("{:016x}", state_digest(world)),
    }
}

/// Every agent plus the environment summary
pub fn export(world: &mut World, run_id: Uuid) -> SimulationExport {
    let tick = world.resource::<SimClock>().tick;
    let agents = sorted_agents(world)
        .into_iter()
        .map(|(identity, body, vitals, _)| AgentExport {
            id: identity.id,
            kind: identity.kind,
            age: vitals.age,
            energy: vitals.energy,
            status: vitals.status,
            position: body.position,
        })
        .collect();
    SimulationExport {
        run_id,
        tick,
        agents,
        environment: world.resource::<Environment>().summary(),
    }
}

/// Read-only frame for a renderer
pub fn render_frame(world: &mut World) -> RenderFrame {
    let tick = world.resource::<SimClock>().tick;
    let agents = sorted_agents(world)
        .into_iter()
        .map(|(identity, body, vitals, radius)| RenderAgent {
            id: identity.id,
            kind: identity.kind,
            position: body.position,
            radius,
            status: vitals.status,
        })
        .collect();

    let env = world.resource::<Environment>();
    let resources = env
        .resources
        .iter()
        .map(|r| RenderResource {
            id: r.id,
            position: r.position,
            value: r.value,
        })
        .collect();
    let terrain = env
        .terrain
        .features()
        .iter()
        .map(|f| RenderTerrain {
            id: f.id,
            kind: f.kind.as_str().to_string(),
            position: f.position,
            radius: f.radius,
        })
        .collect();
    let territories = env
        .territories
        .iter()
        .map(|t| RenderTerritory {
            owner: t.owner,
            center: t.center,
            radius: t.radius,
            strength: t.strength,
        })
        .collect();

    RenderFrame {
        tick,
        agents,
        resources,
        terrain,
        territories,
    }
}

/// Write an export snapshot as pretty JSON
pub fn write_export(snapshot: &SimulationExport, path: impl AsRef<Path>) -> Result<(), SimError> {
    let path = path.as_ref();
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }
    let json = serde_json::to_string_pretty(snapshot)?;
    fs::write(path, json)?;
    Ok(())
}

pub fn read_export(path: impl AsRef<Path>) -> Result<SimulationExport, SimError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::setup::build_world;

    fn world() -> World {
        let mut config = SimConfig::default();
        config.simulation.initial_population = 25;
        build_world(&config)
    }

    #[test]
    fn test_fnv1a_reference_values() {
        assert_eq!(Fnv1a::new().finish(), 0xcbf29ce484222325);
        let mut h = Fnv1a::new();
        h.write(b"a");
        assert_eq!(h.finish(), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn test_digest_stable_and_sensitive() {
        let mut a = world();
        let mut b = world();
        assert_eq!(state_digest(&mut a), state_digest(&mut b));

        let entity = a
            .query::<(Entity, &Identity)>()
            .iter(&a)
            .min_by_key(|(_, i)| i.id)
            .map(|(e, _)| e)
            .unwrap();
        a.get_mut::<Vitals>(entity).unwrap().energy -= 1.0;
        assert_ne!(state_digest(&mut a), state_digest(&mut b));
    }

    #[test]
    fn test_export_sorted_by_id() {
        let mut w = world();
        let snapshot = export(&mut w, Uuid::nil());
        assert_eq!(snapshot.agents.len(), 25);
        assert!(snapshot.agents.windows(2).all(|p| p[0].id < p[1].id));
        assert_eq!(snapshot.tick, 0);
    }

    #[test]
    fn test_export_file_round_trip() {
        let mut w = world();
        let snapshot = export(&mut w, Uuid::nil());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        write_export(&snapshot, &path).unwrap();
        let back = read_export(&path).unwrap();
        for (a, b) in snapshot.agents.iter().zip(&back.agents) {
            assert_eq!(a.position, b.position);
            assert_eq!(a.energy, b.energy);
            assert_eq!(a.status, b.status);
        }
    }

    #[test]
    fn test_metrics_snapshot_counts() {
        let mut w = world();
        let metrics = metrics_snapshot(&mut w, Uuid::nil());
        assert_eq!(metrics.pop, 25);
        assert_eq!(metrics.sir.total(), 25);
        assert_eq!(metrics.sim_digest.len(), 16);
    }

    #[test]
    fn test_render_frame_includes_terrain() {
        let mut w = world();
        let frame = render_frame(&mut w);
        assert_eq!(frame.agents.len(), 25);
        let config = SimConfig::default();
        let env = &config.environment;
        assert_eq!(
            frame.terrain.len(),
            env.shelters + env.oases + env.hills + env.contaminated_zones
        );
        assert!(frame.agents.iter().all(|a| a.radius >= 0.75 && a.radius <= 1.5));
    }
}
