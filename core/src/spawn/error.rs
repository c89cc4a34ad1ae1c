use thiserror::Error;

use crate::world::Location;

/// No candidate point passed validation; callers fall back to a degraded spot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpawnValidationError {
    #[error("no safe boss spawn point around {center}")]
    NoSafeBossPoint { center: Location },

    #[error("only {found} of {wanted} safe mob spawn points around {center}")]
    MobPointShortfall {
        center: Location,
        wanted: usize,
        found: usize,
    },
}
