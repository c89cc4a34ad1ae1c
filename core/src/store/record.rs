//! Persisted schema of the instance store file.
//!
//! ```json
//! {
//!   "participants": {
//!     "42": {
//!       "mining": {
//!         "reward_received": true,
//!         "cooldown_expires_at": "2026-10-16T18:00:00Z",
//!         "active_instance": { "world": "treasure_world", "x": 120, "y": 65, "z": -40,
//!                              "status": "pending", "dungeon_type": "crypt",
//!                              "created_at": "2026-10-16T12:00:00Z" }
//!       }
//!     }
//!   }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::world::{Location, ParticipantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceStatus {
    /// Location reserved, waiting for the party trigger
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveInstanceRecord {
    pub world: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub status: InstanceStatus,
    pub dungeon_type: String,
    pub created_at: DateTime<Utc>,
}

impl ActiveInstanceRecord {
    pub fn new(location: &Location, dungeon_type: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            world: location.world.clone(),
            x: location.x,
            y: location.y,
            z: location.z,
            status: InstanceStatus::Pending,
            dungeon_type: dungeon_type.to_string(),
            created_at,
        }
    }

    pub fn location(&self) -> Location {
        Location::new(self.world.clone(), self.x, self.y, self.z)
    }
}

/// Per participant, per skill state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillRecord {
    #[serde(default)]
    pub reward_received: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_instance: Option<ActiveInstanceRecord>,
}

impl SkillRecord {
    pub fn is_empty(&self) -> bool {
        !self.reward_received && self.cooldown_expires_at.is_none() && self.active_instance.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreData {
    #[serde(default)]
    pub participants: BTreeMap<ParticipantId, BTreeMap<String, SkillRecord>>,
}

impl StoreData {
    pub fn get(&self, participant: ParticipantId, skill: &str) -> Option<&SkillRecord> {
        self.participants.get(&participant)?.get(skill)
    }

    pub fn entry(&mut self, participant: ParticipantId, skill: &str) -> &mut SkillRecord {
        self.participants
            .entry(participant)
            .or_default()
            .entry(skill.to_string())
            .or_default()
    }

    /// Drops records with nothing left in them.
    pub fn prune(&mut self, participant: ParticipantId, skill: &str) {
        if let Some(skills) = self.participants.get_mut(&participant) {
            if skills.get(skill).is_some_and(SkillRecord::is_empty) {
                skills.remove(skill);
            }
            if skills.is_empty() {
                self.participants.remove(&participant);
            }
        }
    }
}
