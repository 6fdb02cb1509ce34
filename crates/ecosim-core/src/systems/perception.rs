//! Perception System
//!
//! Builds a read-only index of every agent as it stood at the end of the
//! previous tick. Agent updates query this index instead of each other, so
//! update order never leaks into what an agent can see.

use bevy_ecs::prelude::*;
use ecosim_events::{AgentId, AgentKind, HealthStatus, Vec3};
use std::collections::{BTreeMap, HashMap};

use crate::components::{Body, Identity, Vitals};
use crate::environment::{Environment, ResourceField};

/// Side length of a spatial grid cell
pub const GRID_CELL: f32 = 10.0;

/// Snapshot of one agent, taken at tick start
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentView {
    pub id: AgentId,
    pub kind: AgentKind,
    pub position: Vec3,
    pub status: HealthStatus,
    pub energy: f32,
    pub age: u64,
}

/// Resource holding the previous-tick view of every agent
#[derive(Resource, Debug, Default)]
pub struct AgentIndex {
    /// Sorted by id
    views: Vec<AgentView>,
    by_id: BTreeMap<AgentId, usize>,
    grid: HashMap<(i32, i32), Vec<usize>>,
}

fn cell_of(at: &Vec3) -> (i32, i32) {
    (
        (at.x / GRID_CELL).floor() as i32,
        (at.y / GRID_CELL).floor() as i32,
    )
}

impl AgentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a set of views in any order
    pub fn rebuild(&mut self, mut views: Vec<AgentView>) {
        views.sort_by_key(|v| v.id);
        self.by_id.clear();
        self.grid.clear();
        for (i, view) in views.iter().enumerate() {
            self.by_id.insert(view.id, i);
            self.grid.entry(cell_of(&view.position)).or_default().push(i);
        }
        self.views = views;
    }

    pub fn get(&self, id: AgentId) -> Option<&AgentView> {
        self.by_id.get(&id).map(|&i| &self.views[i])
    }

    pub fn contains(&self, id: AgentId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Every view, in id order
    pub fn iter(&self) -> impl Iterator<Item = &AgentView> {
        self.views.iter()
    }

    /// Agents within `radius` of `at`, excluding `exclude`, nearest first
    /// (ties broken by id)
    pub fn neighbors(
        &self,
        at: &Vec3,
        radius: f32,
        exclude: Option<AgentId>,
    ) -> Vec<(&AgentView, f32)> {
        if radius < 0.0 || !radius.is_finite() {
            return Vec::new();
        }
        let (cx, cy) = cell_of(at);
        let reach = (radius / GRID_CELL).ceil() as i32;
        let mut found = Vec::new();
        for gx in (cx - reach)..=(cx + reach) {
            for gy in (cy - reach)..=(cy + reach) {
                let Some(members) = self.grid.get(&(gx, gy)) else {
                    continue;
                };
                for &i in members {
                    let view = &self.views[i];
                    if Some(view.id) == exclude {
                        continue;
                    }
                    let d = view.position.distance(at);
                    if d <= radius {
                        found.push((view, d));
                    }
                }
            }
        }
        found.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.id.cmp(&b.0.id)));
        found
    }

    /// Nearest Infected agent within `radius`
    pub fn nearest_infected(
        &self,
        at: &Vec3,
        radius: f32,
        exclude: Option<AgentId>,
    ) -> Option<(&AgentView, f32)> {
        self.neighbors(at, radius, exclude)
            .into_iter()
            .find(|(v, _)| v.status == HealthStatus::Infected)
    }
}

/// Nearest visible resource
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeenResource {
    pub id: u64,
    pub position: Vec3,
    pub value: f32,
    pub distance: f32,
}

/// What one agent perceives at the start of its update
#[derive(Debug, Clone, Default)]
pub struct Perception {
    /// Neighbours within perception radius, nearest first
    pub neighbors: Vec<AgentView>,
    pub nearby_infected: usize,
    pub nearest_infected: Option<Vec3>,
    pub nearest_resource: Option<SeenResource>,
    pub centroid: Option<Vec3>,
}

impl Perception {
    pub fn gather(
        index: &AgentIndex,
        resources: &ResourceField,
        me: AgentId,
        at: &Vec3,
        radius: f32,
        resource_radius: f32,
    ) -> Self {
        let neighbors: Vec<AgentView> = index
            .neighbors(at, radius, Some(me))
            .into_iter()
            .map(|(v, _)| *v)
            .collect();
        let infected: Vec<&AgentView> = neighbors
            .iter()
            .filter(|v| v.status == HealthStatus::Infected)
            .collect();
        let centroid = (!neighbors.is_empty()).then(|| {
            let n = neighbors.len() as f32;
            let (sx, sy) = neighbors
                .iter()
                .fold((0.0, 0.0), |(x, y), v| (x + v.position.x, y + v.position.y));
            Vec3::planar(sx / n, sy / n)
        });
        let nearest_resource = resources.nearest(at, resource_radius).map(|(r, d)| SeenResource {
            id: r.id,
            position: r.position,
            value: r.value,
            distance: d,
        });
        Self {
            nearby_infected: infected.len(),
            nearest_infected: infected.first().map(|v| v.position),
            nearest_resource,
            centroid,
            neighbors,
        }
    }
}

/// System to rebuild the agent index and shelter occupancy from the previous tick
pub fn build_agent_index(
    mut index: ResMut<AgentIndex>,
    mut env: ResMut<Environment>,
    query: Query<(&Identity, &Body, &Vitals)>,
) {
    let views: Vec<AgentView> = query
        .iter()
        .map(|(identity, body, vitals)| AgentView {
            id: identity.id,
            kind: identity.kind,
            position: body.position,
            status: vitals.status,
            energy: vitals.energy,
            age: vitals.age,
        })
        .collect();
    index.rebuild(views);
    env.terrain
        .update_occupancy(index.iter().map(|v| (v.id, &v.position)));
}
