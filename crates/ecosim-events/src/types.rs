//! Core Value Types
//!
//! Identifiers, kinds, and small geometric types shared by the engine and its
//! consumers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub};
use std::str::FromStr;

/// Unique identifier for an agent.
///
/// Ids are allocated sequentially by the engine and never reused within a run,
/// so ordering by id is a stable update order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub u64);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent_{:06}", self.0)
    }
}

/// Which behavior modules an agent carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Life-cycle plus the learned movement policy only
    Basic,
    /// Trust, communication, alliances, territory, and trade
    Social,
    /// Life-cycle driven by an external controller when input is present
    Player,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Basic => "basic",
            AgentKind::Social => "social",
            AgentKind::Player => "player",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SIR health status. Transitions only move forward: S -> I -> R.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Susceptible,
    Infected,
    Recovered,
}

impl HealthStatus {
    /// Position in the S -> I -> R order.
    pub fn stage(&self) -> u8 {
        match self {
            HealthStatus::Susceptible => 0,
            HealthStatus::Infected => 1,
            HealthStatus::Recovered => 2,
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Staying in the same state is always legal.
    pub fn can_transition_to(&self, next: HealthStatus) -> bool {
        matches!(
            (self, next),
            (HealthStatus::Susceptible, HealthStatus::Susceptible)
                | (HealthStatus::Susceptible, HealthStatus::Infected)
                | (HealthStatus::Infected, HealthStatus::Infected)
                | (HealthStatus::Infected, HealthStatus::Recovered)
                | (HealthStatus::Recovered, HealthStatus::Recovered)
        )
    }

    /// Single-letter code used in state keys and compact output.
    pub fn code(&self) -> char {
        match self {
            HealthStatus::Susceptible => 'S',
            HealthStatus::Infected => 'I',
            HealthStatus::Recovered => 'R',
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Susceptible => write!(f, "susceptible"),
            HealthStatus::Infected => write!(f, "infected"),
            HealthStatus::Recovered => write!(f, "recovered"),
        }
    }
}

/// Season of the simulated year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Spring,
    Summer,
    Autumn,
    Winter,
}

impl Season {
    /// Returns the next season in order.
    pub fn next(self) -> Self {
        match self {
            Season::Spring => Season::Summer,
            Season::Summer => Season::Autumn,
            Season::Autumn => Season::Winter,
            Season::Winter => Season::Spring,
        }
    }

    /// Season for a zero-based index into the yearly cycle.
    pub fn from_index(index: u64) -> Self {
        match index % 4 {
            0 => Season::Spring,
            1 => Season::Summer,
            2 => Season::Autumn,
            _ => Season::Winter,
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Season::Spring => write!(f, "spring"),
            Season::Summer => write!(f, "summer"),
            Season::Autumn => write!(f, "autumn"),
            Season::Winter => write!(f, "winter"),
        }
    }
}

/// Error returned when parsing a season name fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSeasonError(pub String);

impl fmt::Display for ParseSeasonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid season: '{}'", self.0)
    }
}

impl std::error::Error for ParseSeasonError {}

impl FromStr for Season {
    type Err = ParseSeasonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "spring" => Ok(Season::Spring),
            "summer" => Ok(Season::Summer),
            "autumn" => Ok(Season::Autumn),
            "winter" => Ok(Season::Winter),
            _ => Err(ParseSeasonError(s.to_string())),
        }
    }
}

/// Position or direction in world space.
///
/// The world is planar; `z` carries terrain elevation for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Planar vector with zero elevation.
    pub fn planar(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Planar length, ignoring elevation.
    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Planar distance, ignoring elevation.
    pub fn distance(&self, other: &Vec3) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Planar unit vector, or zero for a degenerate vector.
    pub fn normalized(&self) -> Vec3 {
        let len = self.length();
        if len <= f32::EPSILON {
            Vec3::ZERO
        } else {
            Vec3::planar(self.x / len, self.y / len)
        }
    }

    /// Planar unit vector pointing from `self` toward `target`.
    pub fn direction_to(&self, target: &Vec3) -> Vec3 {
        Vec3::planar(target.x - self.x, target.y - self.y).normalized()
    }

    /// Rescale to at most `max` planar length.
    pub fn clamp_length(&self, max: f32) -> Vec3 {
        let len = self.length();
        if len > max && len > f32::EPSILON {
            let scale = max / len;
            Vec3::new(self.x * scale, self.y * scale, self.z)
        } else {
            *self
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Vec3) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;

    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}
