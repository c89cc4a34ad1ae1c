//! Error types for location allocation

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocatorError {
    /// Bounds or distance settings that can never produce a location
    #[error("invalid allocator configuration: {reason}")]
    Configuration { reason: String },

    #[error("no free location found in '{world}' after {attempts} attempts")]
    Exhausted { world: String, attempts: u32 },
}
