//! Host-side collaborators of the engine.
//!
//! Structure placement, entity spawning, reward delivery and player-facing
//! messages all belong to the host. The engine only talks to them through the
//! narrow traits here, bundled in an [`EngineContext`].

use std::sync::Arc;

use delve_types::LootConfig;
use thiserror::Error;

use super::command::EngineCommand;
use super::ledger::RankingReport;
use super::scheduler::CommandSink;
use crate::allocator::SpatialAllocator;
use crate::config::ValidatedConfig;
use crate::party::DifficultyTier;
use crate::store::InstanceStore;
use crate::world::{BossId, Clock, EntityId, Location, ParticipantId, WorldView};

// ─────────────────────────────────────────────────────────────────────────────
// Completion Signals
// ─────────────────────────────────────────────────────────────────────────────

/// One-shot callback handed to asynchronous collaborators; completing it
/// posts a command back to the engine.
pub struct CompletionSignal {
    sink: CommandSink,
    command: EngineCommand,
}

impl CompletionSignal {
    pub(crate) fn new(sink: CommandSink, command: EngineCommand) -> Self {
        Self { sink, command }
    }

    pub fn complete(self) {
        if !self.sink.send(self.command) {
            tracing::debug!("Completion signal dropped; engine has stopped");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Construction
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct BuildRequest {
    pub location: Location,
    pub dungeon_type: String,
    /// Structure name from the dungeon type, if any
    pub structure: Option<String>,
}

/// Places and removes dungeon structures, possibly over many ticks.
pub trait Construction: Send + Sync {
    fn build(&self, request: BuildRequest, done: CompletionSignal);
    fn destroy(&self, location: &Location, done: CompletionSignal);
}

// ─────────────────────────────────────────────────────────────────────────────
// Spawning
// ─────────────────────────────────────────────────────────────────────────────

pub trait MobSpawner: Send + Sync {
    fn spawn_mob(&self, mob_id: &str, at: &Location) -> Option<EntityId>;

    /// `strength` multiplies the boss's base stats.
    fn spawn_boss(&self, boss_id: &str, at: &Location, strength: f64) -> Option<BossId>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Rewards
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct RewardGrant {
    pub participant: ParticipantId,
    pub dungeon_type: String,
    pub tier: DifficultyTier,
    pub loot: LootConfig,
}

impl RewardGrant {
    /// Loot command templates with `{player}` filled in.
    pub fn rendered_commands(&self) -> Vec<String> {
        let player = self.participant.to_string();
        self.loot
            .commands
            .iter()
            .map(|c| c.replace("{player}", &player))
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum RewardError {
    #[error("participant {participant} cannot receive rewards right now")]
    Unavailable { participant: ParticipantId },

    #[error("reward delivery failed: {reason}")]
    Failed { reason: String },
}

pub trait Rewards: Send + Sync {
    fn grant(&self, grant: RewardGrant) -> Result<(), RewardError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Notices
// ─────────────────────────────────────────────────────────────────────────────

/// Player-facing events. Wording and localization are up to the announcer.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    InstanceAlreadyActive { skill: String },
    AllocationFailed { skill: String },
    InstanceReady { location: Location, dungeon_type: String },
    PartyFormed { size: usize, countdown: u32 },
    CountdownTick { remaining: u32 },
    CountdownAborted,
    DifficultyScaled { tier: DifficultyTier, party_size: usize },
    WaveStarting { wave: usize, waves: usize },
    WaveCleared { wave: usize },
    BossIncoming { delay_secs: u64 },
    BossSpawned { boss: String, tier: DifficultyTier },
    DamageRanking(RankingReport),
    InstanceCompleted { dungeon_type: String },
    InstanceAbandoned { reason: String },
}

pub trait Announcer: Send + Sync {
    fn announce(&self, recipients: &[ParticipantId], notice: Notice);
}

/// Writes notices to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAnnouncer;

impl Announcer for TracingAnnouncer {
    fn announce(&self, recipients: &[ParticipantId], notice: Notice) {
        tracing::info!(recipients = ?recipients, notice = ?notice, "Notice");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Context
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the engine needs from the outside, shared by `Arc`.
pub struct EngineContext {
    pub config: Arc<ValidatedConfig>,
    pub clock: Arc<dyn Clock>,
    pub world: Arc<dyn WorldView>,
    pub store: InstanceStore,
    pub allocator: Arc<SpatialAllocator>,
    pub construction: Arc<dyn Construction>,
    pub spawner: Arc<dyn MobSpawner>,
    pub rewards: Arc<dyn Rewards>,
    pub announcer: Arc<dyn Announcer>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use delve_types::LootKind;

    #[test]
    fn loot_commands_name_the_participant() {
        let grant = RewardGrant {
            participant: ParticipantId(42),
            dungeon_type: "crypt".to_string(),
            tier: crate::party::SOLO,
            loot: LootConfig {
                kind: LootKind::Commands,
                commands: vec!["give {player} diamond".to_string(), "say gg".to_string()],
            },
        };
        assert_eq!(
            grant.rendered_commands(),
            vec!["give 42 diamond".to_string(), "say gg".to_string()]
        );
    }
}
