use std::fmt;

use crate::allocator::AllocatorError;
use crate::world::{BossId, Location, ParticipantId, Position};

/// Identity of a dungeon instance: at most one live instance per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceKey {
    pub owner: ParticipantId,
    pub skill: String,
}

impl InstanceKey {
    pub fn new(owner: ParticipantId, skill: impl Into<String>) -> Self {
        Self {
            owner,
            skill: skill.into(),
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.skill)
    }
}

/// Everything that can happen to the engine, consumed one at a time by the
/// world context.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    // ─── Requests from the host ──────────────────────────────────────────────
    /// Activation token consumed: find a location and record a pending instance.
    /// `world` defaults to the configured dungeon world.
    Activate {
        key: InstanceKey,
        world: Option<String>,
    },
    /// Party trigger at a pending instance
    Trigger {
        key: InstanceKey,
        initiator: ParticipantId,
        point: Position,
    },
    /// Abandon a live instance on request
    Abandon { key: InstanceKey },
    DamageDealt {
        boss: BossId,
        attacker: ParticipantId,
        amount: f64,
    },
    BossDefeated {
        boss: BossId,
        finisher: ParticipantId,
    },
    /// Reclaim instances whose store record has gone stale
    SweepStale,
    Shutdown,

    // ─── Internal follow-ups ─────────────────────────────────────────────────
    //
    // `generation` names the run the follow-up was issued for. A key can be
    // reused once its instance ends, so a follow-up only applies while the
    // live instance carries the same generation.
    LocationResolved {
        key: InstanceKey,
        result: Result<Location, AllocatorError>,
    },
    CountdownTick { key: InstanceKey, generation: u64 },
    ConstructionComplete { key: InstanceKey, generation: u64 },
    WaveTick {
        key: InstanceKey,
        generation: u64,
        wave: usize,
    },
    WaveCleared {
        key: InstanceKey,
        generation: u64,
        wave: usize,
    },
    /// All waves done; announce the boss and start the boss delay
    BossIncoming { key: InstanceKey, generation: u64 },
    BossSpawnDue { key: InstanceKey, generation: u64 },
    StructureRemoved { location: Location },
}

impl EngineCommand {
    /// The instance this command is about, when it names one directly.
    pub fn instance_key(&self) -> Option<&InstanceKey> {
        match self {
            EngineCommand::Activate { key, .. }
            | EngineCommand::Trigger { key, .. }
            | EngineCommand::Abandon { key }
            | EngineCommand::LocationResolved { key, .. }
            | EngineCommand::CountdownTick { key, .. }
            | EngineCommand::ConstructionComplete { key, .. }
            | EngineCommand::WaveTick { key, .. }
            | EngineCommand::WaveCleared { key, .. }
            | EngineCommand::BossIncoming { key, .. }
            | EngineCommand::BossSpawnDue { key, .. } => Some(key),
            EngineCommand::DamageDealt { .. }
            | EngineCommand::BossDefeated { .. }
            | EngineCommand::SweepStale
            | EngineCommand::Shutdown
            | EngineCommand::StructureRemoved { .. } => None,
        }
    }

    /// The run a follow-up belongs to; `None` for host requests.
    pub fn generation(&self) -> Option<u64> {
        match self {
            EngineCommand::CountdownTick { generation, .. }
            | EngineCommand::ConstructionComplete { generation, .. }
            | EngineCommand::WaveTick { generation, .. }
            | EngineCommand::WaveCleared { generation, .. }
            | EngineCommand::BossIncoming { generation, .. }
            | EngineCommand::BossSpawnDue { generation, .. } => Some(*generation),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EngineCommand::Activate { .. } => "activate",
            EngineCommand::Trigger { .. } => "trigger",
            EngineCommand::Abandon { .. } => "abandon",
            EngineCommand::DamageDealt { .. } => "damage_dealt",
            EngineCommand::BossDefeated { .. } => "boss_defeated",
            EngineCommand::SweepStale => "sweep_stale",
            EngineCommand::Shutdown => "shutdown",
            EngineCommand::LocationResolved { .. } => "location_resolved",
            EngineCommand::CountdownTick { .. } => "countdown_tick",
            EngineCommand::ConstructionComplete { .. } => "construction_complete",
            EngineCommand::WaveTick { .. } => "wave_tick",
            EngineCommand::WaveCleared { .. } => "wave_cleared",
            EngineCommand::BossIncoming { .. } => "boss_incoming",
            EngineCommand::BossSpawnDue { .. } => "boss_spawn_due",
            EngineCommand::StructureRemoved { .. } => "structure_removed",
        }
    }
}
