//! Configuration loading and validation
//!
//! Global settings come from a single TOML file managed by confy. Dungeon
//! types live in a directory of TOML files, each holding `[[dungeon]]`
//! tables. Both are checked once at startup and frozen into a
//! [`ValidatedConfig`] that the engine shares by `Arc`.

mod error;

pub use error::ConfigError;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use delve_types::{DungeonFile, DungeonTypeConfig, EngineSettings, SkillConfig};
use rand::Rng;

use crate::allocator::AllocatorSettings;
use crate::party::WeightedTable;

/// Boss delays shorter than this are raised to it.
pub const MIN_BOSS_DELAY: Duration = Duration::from_secs(1);

/// Upper bound for every configured delay, cooldown and age (100 years).
pub const MAX_DURATION: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

fn exceeds_limit(duration: Duration) -> Option<String> {
    (duration > MAX_DURATION).then(|| {
        format!(
            "{} exceeds the limit of {}",
            delve_types::duration::format(duration),
            delve_types::duration::format(MAX_DURATION)
        )
    })
}

/// Default settings file: `~/.config/delve/delve.toml` (or platform equivalent).
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("delve")
        .join("delve.toml")
}

/// Loads global settings, writing the defaults first if the file is missing.
pub fn load_settings(path: &Path) -> Result<EngineSettings, ConfigError> {
    confy::load_path(path).map_err(|source| ConfigError::LoadSettings {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_dungeon_types_from_file(path: &Path) -> Result<Vec<DungeonTypeConfig>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    let file: DungeonFile = toml::from_str(&content).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(file.dungeons)
}

/// Loads every `*.toml` under `dir`, recursively, in path order.
///
/// A missing directory yields no dungeon types.
pub fn load_dungeon_types(dir: &Path) -> Result<Vec<DungeonTypeConfig>, ConfigError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    collect_toml_files(dir, &mut files)?;
    files.sort();

    let mut dungeons = Vec::new();
    for path in &files {
        let loaded = load_dungeon_types_from_file(path)?;
        tracing::debug!(path = %path.display(), count = loaded.len(), "Loaded dungeon types");
        dungeons.extend(loaded);
    }
    Ok(dungeons)
}

fn collect_toml_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), ConfigError> {
    let entries = fs::read_dir(dir).map_err(|source| ConfigError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_toml_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            out.push(path);
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Validated Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    settings: EngineSettings,
    dungeons: Vec<DungeonTypeConfig>,
    /// Indices into `dungeons`, weighted
    selection: WeightedTable<usize>,
}

impl ValidatedConfig {
    pub fn new(
        settings: EngineSettings,
        dungeons: Vec<DungeonTypeConfig>,
    ) -> Result<Self, ConfigError> {
        validate_settings(&settings)?;

        let mut seen = HashSet::new();
        for dungeon in &dungeons {
            validate_dungeon(dungeon)?;
            if !seen.insert(dungeon.id.as_str()) {
                return Err(ConfigError::DuplicateDungeon {
                    id: dungeon.id.clone(),
                });
            }
        }

        let selection = WeightedTable::new(
            dungeons
                .iter()
                .enumerate()
                .map(|(i, d)| (i, d.weight))
                .collect(),
        )?;

        tracing::info!(
            world = %settings.world,
            dungeon_types = dungeons.len(),
            skills = settings.skills.len(),
            "Configuration validated"
        );

        Ok(Self {
            settings,
            dungeons,
            selection,
        })
    }

    pub fn load(settings_path: &Path, dungeon_dir: &Path) -> Result<Self, ConfigError> {
        let settings = load_settings(settings_path)?;
        let dungeons = load_dungeon_types(dungeon_dir)?;
        Self::new(settings, dungeons)
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn dungeons(&self) -> &[DungeonTypeConfig] {
        &self.dungeons
    }

    pub fn dungeon(&self, id: &str) -> Option<&DungeonTypeConfig> {
        self.dungeons.iter().find(|d| d.id == id)
    }

    /// Weighted random dungeon type.
    pub fn select_dungeon<R: Rng + ?Sized>(&self, rng: &mut R) -> &DungeonTypeConfig {
        &self.dungeons[*self.selection.sample(rng)]
    }

    /// Dungeon type for a fixed draw in `[0, total_weight)`.
    pub fn dungeon_for_draw(&self, draw: u64) -> &DungeonTypeConfig {
        &self.dungeons[*self.selection.pick(draw)]
    }

    pub fn total_weight(&self) -> u64 {
        self.selection.total()
    }

    pub fn skill(&self, name: &str) -> Result<&SkillConfig, ConfigError> {
        self.settings
            .skills
            .get(name)
            .ok_or_else(|| ConfigError::UnknownSkill {
                skill: name.to_string(),
            })
    }

    /// The dungeon's own boss delay, else the global one, never under a second.
    pub fn boss_delay(&self, dungeon: &DungeonTypeConfig) -> Duration {
        dungeon
            .boss
            .spawn_delay
            .unwrap_or(self.settings.boss_delay)
            .max(MIN_BOSS_DELAY)
    }
}

fn validate_settings(settings: &EngineSettings) -> Result<(), ConfigError> {
    AllocatorSettings::from_engine(settings)
        .validate_configuration()
        .map_err(|e| ConfigError::InvalidSettings {
            reason: e.to_string(),
        })?;

    if settings.world.trim().is_empty() {
        return Err(ConfigError::InvalidSettings {
            reason: "world must not be empty".to_string(),
        });
    }
    let radius = settings.party.radius;
    if !radius.is_finite() || radius <= 0.0 {
        return Err(ConfigError::InvalidSettings {
            reason: format!("party radius must be positive, got {radius}"),
        });
    }
    if settings.party.max_size == 0 {
        return Err(ConfigError::InvalidSettings {
            reason: "party max_size must be at least 1".to_string(),
        });
    }

    let durations = [
        ("reuse_cooldown", settings.reuse_cooldown),
        ("recent_sweep_interval", settings.recent_sweep_interval),
        ("wave_delay", settings.wave_delay),
        ("boss_delay", settings.boss_delay),
        ("stale_max_age", settings.stale_max_age),
        ("stale_sweep_interval", settings.stale_sweep_interval),
    ];
    for (name, duration) in durations {
        if let Some(reason) = exceeds_limit(duration) {
            return Err(ConfigError::InvalidSettings {
                reason: format!("{name}: {reason}"),
            });
        }
    }

    for (name, skill) in &settings.skills {
        if !(0.0..=1.0).contains(&skill.drop_chance) {
            return Err(ConfigError::InvalidSkill {
                skill: name.clone(),
                reason: format!("drop_chance must be within [0, 1], got {}", skill.drop_chance),
            });
        }
        if let Some(reason) = exceeds_limit(skill.cooldown) {
            return Err(ConfigError::InvalidSkill {
                skill: name.clone(),
                reason: format!("cooldown: {reason}"),
            });
        }
    }
    Ok(())
}

fn validate_dungeon(dungeon: &DungeonTypeConfig) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidDungeon {
        id: dungeon.id.clone(),
        reason: reason.to_string(),
    };

    if dungeon.id.trim().is_empty() {
        return Err(invalid("id must not be empty"));
    }
    if dungeon.weight == 0 {
        return Err(invalid("weight must be at least 1"));
    }
    if dungeon.boss.id.trim().is_empty() {
        return Err(invalid("boss id must not be empty"));
    }
    if dungeon.waves.iter().flatten().any(|mob| mob.trim().is_empty()) {
        return Err(invalid("wave mob ids must not be empty"));
    }
    if let Some(reason) = dungeon.boss.spawn_delay.and_then(exceeds_limit) {
        return Err(invalid(&format!("boss spawn_delay: {reason}")));
    }
    if dungeon.waves.iter().any(Vec::is_empty) {
        tracing::warn!(dungeon = %dungeon.id, "Dungeon has a wave with no mobs configured");
    }
    Ok(())
}
