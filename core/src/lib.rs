pub mod activation;
pub mod allocator;
pub mod config;
pub mod engine;
pub mod party;
pub mod spawn;
pub mod store;
pub mod world;

// Re-exports for convenience
pub use activation::{IssueOutcome, TokenIssuer};
pub use allocator::{AllocatorError, AllocatorSettings, OccupiedSites, SpatialAllocator};
pub use config::{ConfigError, ValidatedConfig};
pub use engine::{
    Announcer, BuildRequest, CompletionSignal, Construction, DamageLedger, Engine, EngineCommand,
    EngineContext, EngineError, EngineHandle, InstanceKey, ManualScheduler, MobSpawner, Notice,
    Outcome, RankingReport, RewardError, RewardGrant, Rewards, Stage, TracingAnnouncer,
};
pub use party::{DifficultyTier, PartyRegistry, PartyResolver, WeightedTable};
pub use spawn::{SpawnResolver, SpawnValidationError};
pub use store::{InstanceStatus, InstanceStore, StoreError};
pub use world::{
    Block, BossId, Clock, EntityId, FlatWorld, Location, LocationKey, ManualClock,
    ParticipantId, Position, SystemClock, TerrainProbe, WorldView,
};
