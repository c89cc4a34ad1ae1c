//! Error types for engine transitions

use thiserror::Error;

use super::command::InstanceKey;
use crate::allocator::AllocatorError;
use crate::config::ConfigError;
use crate::spawn::SpawnValidationError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Allocation(#[from] AllocatorError),

    #[error(transparent)]
    Persistence(#[from] StoreError),

    #[error(transparent)]
    Spawn(#[from] SpawnValidationError),

    /// A command arrived that does not fit the instance's current stage
    #[error("{command} ignored for {key}: {reason}")]
    State {
        key: InstanceKey,
        command: &'static str,
        reason: String,
    },

    #[error("boss '{boss}' failed to spawn for {key}")]
    BossSpawnFailed { key: InstanceKey, boss: String },

    #[error("engine is no longer running")]
    Stopped,
}

impl EngineError {
    pub(crate) fn state(key: &InstanceKey, command: &'static str, reason: impl Into<String>) -> Self {
        EngineError::State {
            key: key.clone(),
            command,
            reason: reason.into(),
        }
    }
}
