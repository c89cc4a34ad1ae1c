//! Instance store
//!
//! Durable per-participant, per-skill state: activation cooldowns, the
//! reward-received flag, and the active instance record. State lives in memory
//! behind a reader/writer lock; every mutation schedules a write of the whole
//! snapshot to a JSON file.
//!
//! A durable write is `backup copy → serialize → write → sync`, all under one
//! exclusive file lock. If any step after the backup fails the backup is
//! copied back, so the file on disk is always a complete snapshot.

mod error;
mod record;


pub use error::StoreError;
pub use record::{ActiveInstanceRecord, InstanceStatus, SkillRecord, StoreData};

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};
use std::time::Duration;

#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};

use crate::allocator::OccupiedSites;
use crate::world::{Clock, Location, LocationKey, ParticipantId, earlier, later};

/// Default store location: `~/.local/share/delve/instances.json` (or platform equivalent).
pub fn default_data_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("delve")
        .join("instances.json")
}

/// One row of [`InstanceStore::active_instances`].
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveInstanceEntry {
    pub participant: ParticipantId,
    pub skill: String,
    pub record: ActiveInstanceRecord,
}

struct StoreInner {
    path: PathBuf,
    backup_path: PathBuf,
    data: RwLock<StoreData>,
    /// Held for the whole backup/write/sync sequence
    file_lock: Mutex<()>,
    clock: Arc<dyn Clock>,
    #[cfg(test)]
    fail_next_write: AtomicBool,
}

/// Cheap to clone; clones share the same state and file.
#[derive(Clone)]
pub struct InstanceStore {
    inner: Arc<StoreInner>,
}

impl InstanceStore {
    /// Opens the store at `path`.
    ///
    /// A missing file yields an empty store. A corrupt file falls back to the
    /// `.bak` copy when that one parses.
    pub fn open(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let backup_path = backup_path_for(&path);
        let data = load(&path, &backup_path)?;

        tracing::info!(
            path = %path.display(),
            participants = data.participants.len(),
            "Instance store loaded"
        );

        Ok(Self {
            inner: Arc::new(StoreInner {
                path,
                backup_path,
                data: RwLock::new(data),
                file_lock: Mutex::new(()),
                clock,
                #[cfg(test)]
                fail_next_write: AtomicBool::new(false),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn backup_path(&self) -> &Path {
        &self.inner.backup_path
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreData> {
        self.inner.read()
    }

    /// Applies `f` under the write lock, then schedules a durable write.
    fn mutate<R>(&self, f: impl FnOnce(&mut StoreData) -> R) -> R {
        let result = {
            let mut data = self.inner.data.write().unwrap_or_else(|e| e.into_inner());
            f(&mut data)
        };
        self.schedule_write();
        result
    }

    fn schedule_write(&self) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let inner = Arc::clone(&self.inner);
                handle.spawn_blocking(move || {
                    if let Err(e) = inner.write_to_disk() {
                        tracing::error!(error = %e, path = %inner.path.display(), "Failed to persist instance store");
                    }
                });
            }
            Err(_) => {
                if let Err(e) = self.inner.write_to_disk() {
                    tracing::error!(error = %e, path = %self.inner.path.display(), "Failed to persist instance store");
                }
            }
        }
    }

    /// Writes the current snapshot synchronously.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.inner.write_to_disk()
    }

    pub fn snapshot(&self) -> StoreData {
        self.read().clone()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cooldowns & Rewards
    // ─────────────────────────────────────────────────────────────────────────

    pub fn set_cooldown(&self, participant: ParticipantId, skill: &str, duration: Duration) {
        let expires = later(self.inner.clock.now(), duration);
        self.mutate(|data| data.entry(participant, skill).cooldown_expires_at = Some(expires));
    }

    pub fn is_on_cooldown(&self, participant: ParticipantId, skill: &str) -> bool {
        let now = self.inner.clock.now();
        self.read()
            .get(participant, skill)
            .and_then(|r| r.cooldown_expires_at)
            .is_some_and(|expires| now < expires)
    }

    /// Time left on the cooldown, never negative.
    pub fn cooldown_remaining(&self, participant: ParticipantId, skill: &str) -> Duration {
        let now = self.inner.clock.now();
        self.read()
            .get(participant, skill)
            .and_then(|r| r.cooldown_expires_at)
            .and_then(|expires| (expires - now).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }

    pub fn set_reward_received(&self, participant: ParticipantId, skill: &str, received: bool) {
        self.mutate(|data| {
            data.entry(participant, skill).reward_received = received;
            data.prune(participant, skill);
        });
    }

    pub fn has_received_reward(&self, participant: ParticipantId, skill: &str) -> bool {
        self.read()
            .get(participant, skill)
            .is_some_and(|r| r.reward_received)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Active Instances
    // ─────────────────────────────────────────────────────────────────────────

    /// Records a new pending instance, replacing any previous record.
    pub fn set_active_instance(
        &self,
        participant: ParticipantId,
        skill: &str,
        location: &Location,
        dungeon_type: &str,
    ) {
        let record = ActiveInstanceRecord::new(location, dungeon_type, self.inner.clock.now());
        self.mutate(|data| data.entry(participant, skill).active_instance = Some(record));
    }

    /// Returns false when there is no record to update.
    pub fn set_instance_status(
        &self,
        participant: ParticipantId,
        skill: &str,
        status: InstanceStatus,
    ) -> bool {
        let exists = self
            .read()
            .get(participant, skill)
            .is_some_and(|r| r.active_instance.is_some());
        if !exists {
            return false;
        }
        self.mutate(|data| {
            if let Some(instance) = data.entry(participant, skill).active_instance.as_mut() {
                instance.status = status;
            }
        });
        true
    }

    /// True for pending and in-progress instances.
    pub fn has_active_instance(&self, participant: ParticipantId, skill: &str) -> bool {
        self.instance_status(participant, skill)
            .is_some_and(|s| s != InstanceStatus::Completed)
    }

    /// Returns whether a record was removed.
    pub fn clear_active_instance(&self, participant: ParticipantId, skill: &str) -> bool {
        let exists = self
            .read()
            .get(participant, skill)
            .is_some_and(|r| r.active_instance.is_some());
        if !exists {
            return false;
        }
        self.mutate(|data| {
            data.entry(participant, skill).active_instance = None;
            data.prune(participant, skill);
        });
        true
    }

    pub fn instance_coords(&self, participant: ParticipantId, skill: &str) -> Option<Location> {
        self.read()
            .get(participant, skill)?
            .active_instance
            .as_ref()
            .map(ActiveInstanceRecord::location)
    }

    pub fn instance_type(&self, participant: ParticipantId, skill: &str) -> Option<String> {
        self.read()
            .get(participant, skill)?
            .active_instance
            .as_ref()
            .map(|i| i.dungeon_type.clone())
    }

    pub fn instance_status(&self, participant: ParticipantId, skill: &str) -> Option<InstanceStatus> {
        self.read()
            .get(participant, skill)?
            .active_instance
            .as_ref()
            .map(|i| i.status)
    }

    pub fn active_instances(&self) -> Vec<ActiveInstanceEntry> {
        let data = self.read();
        data.participants
            .iter()
            .flat_map(|(participant, skills)| {
                skills.iter().filter_map(move |(skill, record)| {
                    record.active_instance.as_ref().map(|i| ActiveInstanceEntry {
                        participant: *participant,
                        skill: skill.clone(),
                        record: i.clone(),
                    })
                })
            })
            .collect()
    }

    /// Clears every instance record created more than `max_age` ago.
    ///
    /// Returns the `(participant, skill)` keys that were cleared.
    pub fn cleanup_stale_instances(&self, max_age: Duration) -> Vec<(ParticipantId, String)> {
        let cutoff = earlier(self.inner.clock.now(), max_age);
        let stale: Vec<(ParticipantId, String)> = self
            .active_instances()
            .into_iter()
            .filter(|e| e.record.created_at < cutoff)
            .map(|e| (e.participant, e.skill))
            .collect();

        if stale.is_empty() {
            return stale;
        }

        self.mutate(|data| {
            for (participant, skill) in &stale {
                data.entry(*participant, skill).active_instance = None;
                data.prune(*participant, skill);
            }
        });
        tracing::info!(count = stale.len(), "Cleared stale instance records");
        stale
    }

    #[cfg(test)]
    pub(crate) fn fail_next_write(&self) {
        self.inner.fail_next_write.store(true, Ordering::SeqCst);
    }
}

impl OccupiedSites for InstanceStore {
    fn in_progress_sites(&self, exclude: ParticipantId) -> Vec<LocationKey> {
        let data = self.read();
        data.participants
            .iter()
            .filter(|(participant, _)| **participant != exclude)
            .flat_map(|(_, skills)| skills.values())
            .filter_map(|r| r.active_instance.as_ref())
            .filter(|i| i.status == InstanceStatus::InProgress)
            .map(|i| LocationKey::new(i.world.clone(), i.x, i.z))
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File Handling
// ─────────────────────────────────────────────────────────────────────────────

impl StoreInner {
    fn read(&self) -> RwLockReadGuard<'_, StoreData> {
        self.data.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_to_disk(&self) -> Result<(), StoreError> {
        let _file = self.file_lock.lock().unwrap_or_else(|e| e.into_inner());

        let had_file = self.path.exists();
        if had_file {
            fs::copy(&self.path, &self.backup_path).map_err(|source| StoreError::Backup {
                path: self.backup_path.clone(),
                source,
            })?;
        }

        let bytes = {
            let data = self.read();
            serde_json::to_vec_pretty(&*data).map_err(StoreError::Serialize)?
        };

        if let Err(e) = self.write_file(&bytes) {
            self.restore_backup(had_file);
            return Err(e);
        }
        Ok(())
    }

    fn write_file(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let write_err = |source: std::io::Error| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        let mut file = File::create(&self.path).map_err(write_err)?;

        #[cfg(test)]
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            file.write_all(&bytes[..bytes.len() / 2]).map_err(write_err)?;
            return Err(write_err(std::io::Error::other("injected write failure")));
        }

        file.write_all(bytes).map_err(write_err)?;
        file.sync_all().map_err(write_err)
    }

    fn restore_backup(&self, had_file: bool) {
        let restored = if had_file {
            fs::copy(&self.backup_path, &self.path).map(|_| ())
        } else {
            fs::remove_file(&self.path)
        };
        match restored {
            Ok(()) => tracing::warn!(path = %self.path.display(), "Restored store file after failed write"),
            Err(e) => tracing::error!(error = %e, path = %self.path.display(), "Failed to restore store file"),
        }
    }
}

fn backup_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

fn load(path: &Path, backup: &Path) -> Result<StoreData, StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StoreData::default()),
        Err(source) => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(StoreData::default());
    }

    match serde_json::from_slice(&bytes) {
        Ok(data) => Ok(data),
        Err(source) => {
            tracing::warn!(error = %source, path = %path.display(), "Store file is corrupt, trying backup");
            let from_backup = fs::read(backup)
                .ok()
                .and_then(|b| serde_json::from_slice::<StoreData>(&b).ok());
            match from_backup {
                Some(data) => {
                    tracing::warn!(path = %backup.display(), "Loaded instance store from backup");
                    Ok(data)
                }
                None => Err(StoreError::Parse {
                    path: path.to_path_buf(),
                    source,
                }),
            }
        }
    }
}
