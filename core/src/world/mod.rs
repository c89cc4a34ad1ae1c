//! Read-side view of the shared world.
//!
//! The engine never touches world storage directly. Everything it needs about
//! blocks and participants comes through [`WorldView`], which the host
//! implements against its own world state.

mod clock;
mod flat;

pub use clock::{Clock, ManualClock, SystemClock};
pub(crate) use clock::{earlier, later, to_delta};
pub use flat::FlatWorld;

use serde::{Deserialize, Serialize};
use std::fmt;

// ─────────────────────────────────────────────────────────────────────────────
// Identifiers
// ─────────────────────────────────────────────────────────────────────────────

/// Stable participant identifier assigned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub u64);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Runtime id of a spawned boss entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BossId(pub u64);

impl fmt::Display for BossId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "boss#{}", self.0)
    }
}

/// Runtime id of a spawned wave mob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId(pub u64);

// ─────────────────────────────────────────────────────────────────────────────
// Coordinates
// ─────────────────────────────────────────────────────────────────────────────

/// Block coordinates in a named world.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Location {
    pub fn new(world: impl Into<String>, x: i32, y: i32, z: i32) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }

    pub fn key(&self) -> LocationKey {
        LocationKey {
            world: self.world.clone(),
            x: self.x,
            z: self.z,
        }
    }

    pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.world.clone(), self.x + dx, self.y + dy, self.z + dz)
    }

    pub fn distance(&self, other: &Location) -> Option<f64> {
        if self.world != other.world {
            return None;
        }
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        let dz = f64::from(self.z - other.z);
        Some((dx * dx + dy * dy + dz * dz).sqrt())
    }

    /// Centre of the block, for positioning entities.
    pub fn center(&self) -> Position {
        Position {
            world: self.world.clone(),
            x: f64::from(self.x) + 0.5,
            y: f64::from(self.y),
            z: f64::from(self.z) + 0.5,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {}, {})", self.world, self.x, self.y, self.z)
    }
}

/// Column identity used by the allocator: elevation is resolved at commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationKey {
    pub world: String,
    pub x: i32,
    pub z: i32,
}

impl LocationKey {
    pub fn new(world: impl Into<String>, x: i32, z: i32) -> Self {
        Self {
            world: world.into(),
            x,
            z,
        }
    }

    /// Horizontal distance, `None` across worlds.
    pub fn distance(&self, other: &LocationKey) -> Option<f64> {
        if self.world != other.world {
            return None;
        }
        let dx = f64::from(self.x) - f64::from(other.x);
        let dz = f64::from(self.z) - f64::from(other.z);
        Some((dx * dx + dz * dz).sqrt())
    }

    pub fn at_height(&self, y: i32) -> Location {
        Location::new(self.world.clone(), self.x, y, self.z)
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.world, self.x, self.z)
    }
}

/// Continuous entity position.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }

    pub fn distance(&self, other: &Position) -> Option<f64> {
        if self.world != other.world {
            return None;
        }
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        Some((dx * dx + dy * dy + dz * dz).sqrt())
    }

    pub fn within(&self, other: &Position, radius: f64) -> bool {
        self.distance(other).is_some_and(|d| d <= radius)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Blocks & Participants
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Block {
    Air,
    /// Non-solid but not empty (grass, flowers, signs)
    Foliage,
    Solid,
    Water,
    Lava,
    Magma,
}

impl Block {
    pub fn is_solid(self) -> bool {
        matches!(self, Block::Solid | Block::Magma)
    }

    pub fn is_liquid(self) -> bool {
        matches!(self, Block::Water | Block::Lava)
    }

    pub fn is_passable(self) -> bool {
        matches!(self, Block::Air | Block::Foliage)
    }

    pub fn is_hazard(self) -> bool {
        matches!(self, Block::Lava | Block::Magma)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantState {
    pub id: ParticipantId,
    pub online: bool,
    pub position: Position,
}

/// Host-provided world access.
pub trait WorldView: Send + Sync {
    fn block(&self, world: &str, x: i32, y: i32, z: i32) -> Block;

    /// Y of the highest non-air block in the column.
    fn highest_block_y(&self, world: &str, x: i32, z: i32) -> i32;

    fn min_height(&self, world: &str) -> i32;

    fn max_height(&self, world: &str) -> i32;

    fn participant(&self, id: ParticipantId) -> Option<ParticipantState>;

    /// Online participants currently in `world`.
    fn participants_in(&self, world: &str) -> Vec<ParticipantState>;
}

/// Surface elevation lookup used when a reservation is committed.
pub trait TerrainProbe: Send + Sync {
    fn surface_y(&self, world: &str, x: i32, z: i32) -> i32;
}

impl<T: WorldView + ?Sized> TerrainProbe for T {
    fn surface_y(&self, world: &str, x: i32, z: i32) -> i32 {
        self.highest_block_y(world, x, z) + 1
    }
}
