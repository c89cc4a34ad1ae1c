//! Spatial allocator
//!
//! Hands out non-overlapping instance locations inside a bounded rectangle.
//!
//! ```text
//!   reserve ──► random candidate ──► reject if too close to:
//!                                      · an active reservation
//!                                      · a recently released site (cooldown)
//!                                      · another owner's in-progress instance
//!               first survivor ──► probe surface height ──► active set
//!
//!   release ──► active set ──► recent-release cache ──► purged by sweeper
//! ```
//!
//! All of the above runs under a single mutex, so two concurrent requests can
//! never be granted locations closer than the configured minimum distance.

mod error;

#[cfg(test)]
mod allocator_tests;

pub use error::AllocatorError;

use chrono::{DateTime, Utc};
use delve_types::{Bounds, EngineSettings};
use hashbrown::HashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::world::{Clock, Location, LocationKey, ParticipantId, TerrainProbe, to_delta};

/// Sites of instances that are already running, as seen by the instance store.
pub trait OccupiedSites: Send + Sync {
    /// In-progress instance sites owned by anyone other than `exclude`.
    fn in_progress_sites(&self, exclude: ParticipantId) -> Vec<LocationKey>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllocatorSettings {
    pub bounds: Bounds,
    pub min_distance: i32,
    pub max_attempts: u32,
    pub reuse_cooldown: Duration,
}

impl AllocatorSettings {
    pub fn from_engine(settings: &EngineSettings) -> Self {
        Self {
            bounds: settings.bounds,
            min_distance: settings.min_distance,
            max_attempts: settings.max_location_attempts,
            reuse_cooldown: settings.reuse_cooldown,
        }
    }

    /// Rejects settings that can never yield a location and warns when the
    /// area is too small to hold more than a handful of instances.
    pub fn validate_configuration(&self) -> Result<(), AllocatorError> {
        let b = &self.bounds;
        if b.min_x >= b.max_x || b.min_z >= b.max_z {
            return Err(AllocatorError::Configuration {
                reason: format!(
                    "bounds must satisfy min < max (x: {}..{}, z: {}..{})",
                    b.min_x, b.max_x, b.min_z, b.max_z
                ),
            });
        }
        if self.min_distance <= 0 {
            return Err(AllocatorError::Configuration {
                reason: format!("min_distance must be positive, got {}", self.min_distance),
            });
        }
        if self.max_attempts == 0 {
            return Err(AllocatorError::Configuration {
                reason: "max_location_attempts must be at least 1".to_string(),
            });
        }

        let span = i64::from(self.min_distance) * 2;
        if b.width() < span || b.depth() < span {
            tracing::warn!(
                width = b.width(),
                depth = b.depth(),
                min_distance = self.min_distance,
                "Allocation area is smaller than twice the minimum distance; few instances will fit"
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Reservation {
    owner: ParticipantId,
    reserved_at: DateTime<Utc>,
}

struct AllocatorState {
    active: HashMap<LocationKey, Reservation>,
    /// Released keys and when they were released
    recent: HashMap<LocationKey, DateTime<Utc>>,
    rng: StdRng,
}

pub struct SpatialAllocator {
    settings: AllocatorSettings,
    state: Mutex<AllocatorState>,
    terrain: Arc<dyn TerrainProbe>,
    sites: Arc<dyn OccupiedSites>,
    clock: Arc<dyn Clock>,
}

impl SpatialAllocator {
    pub fn new(
        settings: AllocatorSettings,
        terrain: Arc<dyn TerrainProbe>,
        sites: Arc<dyn OccupiedSites>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AllocatorError> {
        settings.validate_configuration()?;
        Ok(Self {
            settings,
            state: Mutex::new(AllocatorState {
                active: HashMap::new(),
                recent: HashMap::new(),
                rng: StdRng::from_entropy(),
            }),
            terrain,
            sites,
            clock,
        })
    }

    /// Replaces the candidate generator with a seeded one.
    pub fn with_seed(self, seed: u64) -> Self {
        self.lock().rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn settings(&self) -> &AllocatorSettings {
        &self.settings
    }

    fn lock(&self) -> MutexGuard<'_, AllocatorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn too_close(&self, a: &LocationKey, b: &LocationKey) -> bool {
        a.distance(b)
            .is_some_and(|d| d < f64::from(self.settings.min_distance))
    }

    /// Finds and claims a free location in `world`.
    ///
    /// The returned location carries the surface height of its column.
    pub fn reserve(&self, world: &str, requester: ParticipantId) -> Result<Location, AllocatorError> {
        let bounds = self.settings.bounds;
        let cooldown = to_delta(self.settings.reuse_cooldown);

        let mut state = self.lock();
        let now = self.clock.now();
        let occupied = self.sites.in_progress_sites(requester);

        for attempt in 1..=self.settings.max_attempts {
            let x = state.rng.gen_range(bounds.min_x..=bounds.max_x);
            let z = state.rng.gen_range(bounds.min_z..=bounds.max_z);
            let candidate = LocationKey::new(world, x, z);

            if state.active.contains_key(&candidate) {
                continue;
            }
            if state.active.keys().any(|k| self.too_close(k, &candidate)) {
                continue;
            }
            if state
                .recent
                .iter()
                .any(|(k, released)| now - *released < cooldown && self.too_close(k, &candidate))
            {
                continue;
            }
            if occupied.iter().any(|k| self.too_close(k, &candidate)) {
                continue;
            }

            let y = self.terrain.surface_y(world, x, z);
            state.recent.remove(&candidate);
            state.active.insert(
                candidate.clone(),
                Reservation {
                    owner: requester,
                    reserved_at: now,
                },
            );

            tracing::debug!(owner = %requester, location = %candidate, y, attempt, "Reserved location");
            return Ok(candidate.at_height(y));
        }

        tracing::warn!(
            owner = %requester,
            world,
            attempts = self.settings.max_attempts,
            active = state.active.len(),
            "Location search exhausted"
        );
        Err(AllocatorError::Exhausted {
            world: world.to_string(),
            attempts: self.settings.max_attempts,
        })
    }

    /// Returns a location to the pool behind the reuse cooldown.
    ///
    /// Unknown keys still get a cooldown entry; releasing twice is harmless.
    pub fn release(&self, location: &Location, requester: ParticipantId) {
        let key = location.key();
        let mut state = self.lock();
        let now = self.clock.now();

        match state.active.remove(&key) {
            Some(reservation) if reservation.owner != requester => {
                tracing::debug!(
                    location = %key,
                    owner = %reservation.owner,
                    released_by = %requester,
                    "Location released by a different participant"
                );
            }
            Some(reservation) => {
                let held = now - reservation.reserved_at;
                tracing::debug!(location = %key, owner = %requester, held_secs = held.num_seconds(), "Released location");
            }
            None => {
                tracing::debug!(location = %key, "Released location that was not reserved");
            }
        }
        state.recent.insert(key, now);
    }

    /// Drops recent-release entries whose cooldown has elapsed.
    pub fn sweep_recent(&self) -> usize {
        let cooldown = to_delta(self.settings.reuse_cooldown);
        let mut state = self.lock();
        let now = self.clock.now();
        let before = state.recent.len();
        state.recent.retain(|_, released| now - *released < cooldown);
        before - state.recent.len()
    }

    /// Runs [`sweep_recent`](Self::sweep_recent) every `interval` until aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let allocator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let purged = allocator.sweep_recent();
                if purged > 0 {
                    tracing::debug!(purged, "Purged expired released locations");
                }
            }
        })
    }

    pub fn is_reserved(&self, key: &LocationKey) -> bool {
        self.lock().active.contains_key(key)
    }

    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    pub fn recent_count(&self) -> usize {
        self.lock().recent.len()
    }

    /// Forgets every reservation and cooldown (shutdown / reload).
    pub fn clear(&self) {
        let mut state = self.lock();
        state.active.clear();
        state.recent.clear();
    }
}
