//! Shared configuration types for Delve.
//!
//! These types are used by both the core engine and the CLI, and are
//! serialized to the user's `delve.toml` and dungeon definition files.

pub mod duration;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Serde Default Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

fn default_world() -> String {
    "treasure_world".to_string()
}

fn default_min_distance() -> i32 {
    50
}

fn default_max_location_attempts() -> u32 {
    50
}

fn default_thirty_minutes() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_wave_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_boss_delay() -> Duration {
    Duration::from_secs(8)
}

fn default_stale_max_age() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_stale_sweep_interval() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_party_radius() -> f64 {
    10.0
}

fn default_party_max_size() -> usize {
    4
}

fn default_countdown_ticks() -> u32 {
    10
}

fn default_weight() -> u32 {
    1
}

fn default_level_required() -> u32 {
    1000
}

fn default_drop_chance() -> f64 {
    0.3
}

fn default_skill_cooldown() -> Duration {
    Duration::from_secs(6 * 60 * 60)
}

// ─────────────────────────────────────────────────────────────────────────────
// World Bounds
// ─────────────────────────────────────────────────────────────────────────────

/// Inclusive rectangle (in block coordinates) that instances are placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: i32,
    pub max_x: i32,
    pub min_z: i32,
    pub max_z: i32,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min_x: -1000,
            max_x: 1000,
            min_z: -1000,
            max_z: 1000,
        }
    }
}

impl Bounds {
    pub fn width(&self) -> i64 {
        i64::from(self.max_x) - i64::from(self.min_x)
    }

    pub fn depth(&self) -> i64 {
        i64::from(self.max_z) - i64::from(self.min_z)
    }

    pub fn contains(&self, x: i32, z: i32) -> bool {
        (self.min_x..=self.max_x).contains(&x) && (self.min_z..=self.max_z).contains(&z)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Party formation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartySettings {
    /// Participants within this radius of the trigger point join the party
    #[serde(default = "default_party_radius")]
    pub radius: f64,
    /// Upper bound on party size, initiator included
    #[serde(default = "default_party_max_size")]
    pub max_size: usize,
    /// Countdown length in one-second ticks before a multi-member party starts
    #[serde(default = "default_countdown_ticks")]
    pub countdown_ticks: u32,
}

impl Default for PartySettings {
    fn default() -> Self {
        Self {
            radius: default_party_radius(),
            max_size: default_party_max_size(),
            countdown_ticks: default_countdown_ticks(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageTrackingSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Append the finisher's own line when they are outside the top three
    #[serde(default = "default_true")]
    pub show_personal: bool,
}

impl Default for DamageTrackingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            show_personal: true,
        }
    }
}

/// Global engine settings, persisted via confy as `delve.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// World that hosts every dungeon instance
    #[serde(default = "default_world")]
    pub world: String,

    #[serde(default)]
    pub bounds: Bounds,

    /// Minimum horizontal distance between two instances
    #[serde(default = "default_min_distance")]
    pub min_distance: i32,

    /// Random candidates tried before a reservation gives up
    #[serde(default = "default_max_location_attempts")]
    pub max_location_attempts: u32,

    /// How long a released location stays unavailable
    #[serde(default = "default_thirty_minutes", with = "duration::text")]
    pub reuse_cooldown: Duration,

    /// How often expired released locations are purged
    #[serde(default = "default_thirty_minutes", with = "duration::text")]
    pub recent_sweep_interval: Duration,

    #[serde(default = "default_wave_delay", with = "duration::text")]
    pub wave_delay: Duration,

    /// Boss delay for dungeon types that do not set their own
    #[serde(default = "default_boss_delay", with = "duration::text")]
    pub boss_delay: Duration,

    /// Persisted instances older than this are reclaimed by the stale sweep
    #[serde(default = "default_stale_max_age", with = "duration::text")]
    pub stale_max_age: Duration,

    #[serde(default = "default_stale_sweep_interval", with = "duration::text")]
    pub stale_sweep_interval: Duration,

    #[serde(default)]
    pub party: PartySettings,

    #[serde(default)]
    pub damage_tracking: DamageTrackingSettings,

    /// Activation skills keyed by skill name
    #[serde(default)]
    pub skills: BTreeMap<String, SkillConfig>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            world: default_world(),
            bounds: Bounds::default(),
            min_distance: default_min_distance(),
            max_location_attempts: default_max_location_attempts(),
            reuse_cooldown: default_thirty_minutes(),
            recent_sweep_interval: default_thirty_minutes(),
            wave_delay: default_wave_delay(),
            boss_delay: default_boss_delay(),
            stale_max_age: default_stale_max_age(),
            stale_sweep_interval: default_stale_sweep_interval(),
            party: PartySettings::default(),
            damage_tracking: DamageTrackingSettings::default(),
            skills: BTreeMap::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Skills
// ─────────────────────────────────────────────────────────────────────────────

/// A progression skill that can drop an activation token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Minimum skill level before tokens can drop
    #[serde(default = "default_level_required")]
    pub level_required: u32,
    /// Probability in `[0, 1]` per qualifying event
    #[serde(default = "default_drop_chance")]
    pub drop_chance: f64,
    /// Wait after a token is issued before another can drop
    #[serde(default = "default_skill_cooldown", with = "duration::text")]
    pub cooldown: Duration,
}

impl Default for SkillConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level_required: default_level_required(),
            drop_chance: default_drop_chance(),
            cooldown: default_skill_cooldown(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dungeon Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BossConfig {
    pub id: String,
    /// Overrides [`EngineSettings::boss_delay`] for this dungeon type
    #[serde(default, with = "duration::text_opt", skip_serializing_if = "Option::is_none")]
    pub spawn_delay: Option<Duration>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LootKind {
    /// Run each command template for every rewarded participant
    #[default]
    Commands,
}

/// Reward trigger handed to the rewards collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LootConfig {
    #[serde(default)]
    pub kind: LootKind,
    /// Command templates; `{player}` is replaced with the participant id
    #[serde(default)]
    pub commands: Vec<String>,
}

/// One selectable dungeon layout, loaded from a `[[dungeon]]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DungeonTypeConfig {
    pub id: String,
    /// Relative selection weight (must be at least 1)
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// Structure passed to the construction collaborator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure: Option<String>,
    /// Base mob ids per wave, in wave order
    #[serde(default)]
    pub waves: Vec<Vec<String>>,
    pub boss: BossConfig,
    #[serde(default)]
    pub loot: LootConfig,
}

impl DungeonTypeConfig {
    pub fn wave_count(&self) -> usize {
        self.waves.len()
    }
}

/// Contents of a single dungeon definition file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DungeonFile {
    #[serde(default, rename = "dungeon")]
    pub dungeons: Vec<DungeonTypeConfig>,
}
