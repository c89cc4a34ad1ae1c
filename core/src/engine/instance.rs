use chrono::{DateTime, Utc};
use std::fmt;

use super::command::InstanceKey;
use crate::party::{Countdown, DifficultyTier};
use crate::store::InstanceStatus;
use crate::world::{BossId, Location, ParticipantId};

/// Lifecycle position of a live instance.
///
/// ```text
/// Forming ─► Building ─► Wave(1..N) ─► BossDelay ─► BossActive ─► Completed
///    │           │            │             │             │
///    └───────────┴────────────┴─────────────┴─────────────┴──► Abandoned
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Forming,
    Building,
    Wave(usize),
    BossDelay,
    BossActive,
    Completed,
    Abandoned,
}

impl Stage {
    /// Whether a structure has been (or is being) placed.
    pub fn has_structure(self) -> bool {
        !matches!(self, Stage::Forming)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Forming => write!(f, "forming"),
            Stage::Building => write!(f, "building"),
            Stage::Wave(i) => write!(f, "wave {i}"),
            Stage::BossDelay => write!(f, "boss delay"),
            Stage::BossActive => write!(f, "boss active"),
            Stage::Completed => write!(f, "completed"),
            Stage::Abandoned => write!(f, "abandoned"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DungeonInstance {
    pub key: InstanceKey,
    /// Distinguishes this run from earlier runs under the same key
    pub generation: u64,
    pub dungeon_type: String,
    pub location: Location,
    pub status: InstanceStatus,
    pub stage: Stage,
    /// Final party; empty until the countdown completes
    pub party: Vec<ParticipantId>,
    pub tier: DifficultyTier,
    pub created_at: DateTime<Utc>,
    pub current_wave: usize,
    pub boss: Option<BossId>,
    pub(crate) countdown: Option<Countdown>,
}

impl DungeonInstance {
    pub fn new(
        key: InstanceKey,
        generation: u64,
        dungeon_type: String,
        location: Location,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            generation,
            dungeon_type,
            location,
            status: InstanceStatus::Pending,
            stage: Stage::Forming,
            party: Vec::new(),
            tier: crate::party::SOLO,
            created_at,
            current_wave: 0,
            boss: None,
            countdown: None,
        }
    }

    /// Who should hear about this instance right now.
    pub fn audience(&self) -> Vec<ParticipantId> {
        if !self.party.is_empty() {
            return self.party.clone();
        }
        match &self.countdown {
            Some(countdown) => countdown.members().to_vec(),
            None => vec![self.key.owner],
        }
    }

    pub fn counting_down(&self) -> bool {
        self.countdown.is_some()
    }
}
