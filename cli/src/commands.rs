use chrono::{DateTime, Utc};
use delve_core::config::{self, ValidatedConfig};
use delve_core::store::{InstanceStore, StoreData};
use delve_core::world::SystemClock;
use delve_types::duration;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::sim::{self, SimOptions};

/// Settings path from the flag, else the platform default.
fn settings_path(settings: Option<PathBuf>) -> PathBuf {
    settings.unwrap_or_else(config::default_settings_path)
}

fn dungeons_dir(dungeons: Option<PathBuf>, settings: &Path) -> PathBuf {
    dungeons.unwrap_or_else(|| {
        settings
            .parent()
            .map(|dir| dir.join("dungeons"))
            .unwrap_or_else(|| PathBuf::from("dungeons"))
    })
}

fn load_config(settings: Option<PathBuf>, dungeons: Option<PathBuf>) -> Result<ValidatedConfig, String> {
    let settings = settings_path(settings);
    let dungeons = dungeons_dir(dungeons, &settings);
    ValidatedConfig::load(&settings, &dungeons).map_err(|e| e.to_string())
}

fn open_store(data: Option<PathBuf>) -> Result<InstanceStore, String> {
    let path = data.unwrap_or_else(delve_core::store::default_data_path);
    InstanceStore::open(path, Arc::new(SystemClock)).map_err(|e| e.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// check-config
// ─────────────────────────────────────────────────────────────────────────────

pub fn check_config(settings: Option<PathBuf>, dungeons: Option<PathBuf>) -> Result<(), String> {
    let config = load_config(settings, dungeons)?;
    let s = config.settings();

    println!("World:          {}", s.world);
    println!(
        "Bounds:         x {}..{}, z {}..{}",
        s.bounds.min_x, s.bounds.max_x, s.bounds.min_z, s.bounds.max_z
    );
    println!("Min distance:   {}", s.min_distance);
    println!("Wave delay:     {}", duration::format(s.wave_delay));
    println!("Boss delay:     {}", duration::format(s.boss_delay));
    println!(
        "Party:          radius {}, max {}, countdown {}s",
        s.party.radius, s.party.max_size, s.party.countdown_ticks
    );
    println!();

    println!("{:<20} {:>6} {:>7} {:>6} {:<16} {:>10}", "Dungeon", "Weight", "Chance", "Waves", "Boss", "Boss delay");
    println!("{}", "-".repeat(70));
    let total = config.total_weight() as f64;
    for dungeon in config.dungeons() {
        println!(
            "{:<20} {:>6} {:>6.1}% {:>6} {:<16} {:>10}",
            dungeon.id,
            dungeon.weight,
            f64::from(dungeon.weight) / total * 100.0,
            dungeon.wave_count(),
            dungeon.boss.id,
            duration::format(config.boss_delay(dungeon))
        );
    }

    if !s.skills.is_empty() {
        println!();
        println!("{:<16} {:>8} {:>7} {:>10} {:>8}", "Skill", "Level", "Drop", "Cooldown", "Enabled");
        println!("{}", "-".repeat(53));
        for (name, skill) in &s.skills {
            println!(
                "{:<16} {:>8} {:>6.1}% {:>10} {:>8}",
                name,
                skill.level_required,
                skill.drop_chance * 100.0,
                duration::format(skill.cooldown),
                if skill.enabled { "yes" } else { "no" }
            );
        }
    }

    println!();
    println!("Configuration OK");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// store
// ─────────────────────────────────────────────────────────────────────────────

pub fn store_show(data: Option<PathBuf>) -> Result<(), String> {
    let store = open_store(data)?;
    let snapshot = store.snapshot();
    println!("Store: {}", store.path().display());
    print_store(&snapshot, Utc::now());
    Ok(())
}

fn print_store(data: &StoreData, now: DateTime<Utc>) {
    if data.participants.is_empty() {
        println!("No records");
        return;
    }

    println!(
        "{:<12} {:<12} {:<7} {:<12} {:<14} {:<30}",
        "Participant", "Skill", "Token", "Cooldown", "Instance", "Location"
    );
    println!("{}", "-".repeat(92));
    for (participant, skills) in &data.participants {
        for (skill, record) in skills {
            let cooldown = record
                .cooldown_expires_at
                .and_then(|expires| (expires - now).to_std().ok())
                .map(duration::format)
                .unwrap_or_else(|| "-".to_string());
            let (status, location) = match &record.active_instance {
                Some(instance) => (
                    format!("{:?}", instance.status).to_lowercase(),
                    format!("{} ({})", instance.location(), instance.dungeon_type),
                ),
                None => ("-".to_string(), String::new()),
            };
            println!(
                "{:<12} {:<12} {:<7} {:<12} {:<14} {:<30}",
                participant.to_string(),
                skill,
                if record.reward_received { "held" } else { "-" },
                cooldown,
                status,
                location
            );
        }
    }
}

pub fn store_cleanup(data: Option<PathBuf>, max_age: &str) -> Result<(), String> {
    let max_age = duration::parse(max_age).map_err(|e| format!("invalid --max-age: {e}"))?;
    if max_age > config::MAX_DURATION {
        return Err(format!(
            "invalid --max-age: {} exceeds the limit of {}",
            duration::format(max_age),
            duration::format(config::MAX_DURATION)
        ));
    }
    let store = open_store(data)?;
    let cleared = store.cleanup_stale_instances(max_age);
    store.flush().map_err(|e| e.to_string())?;

    if cleared.is_empty() {
        println!("No instances older than {}", duration::format(max_age));
        return Ok(());
    }
    for (participant, skill) in &cleared {
        println!("Cleared {participant}/{skill}");
    }
    println!("Cleared {} stale instance(s)", cleared.len());
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// simulate
// ─────────────────────────────────────────────────────────────────────────────

pub fn simulate(
    settings: Option<PathBuf>,
    dungeons: Option<PathBuf>,
    seed: u64,
    party: usize,
) -> Result<(), String> {
    let config = Arc::new(load_config(settings, dungeons)?);
    println!("Simulating a party of {party} (seed {seed})");
    let report = sim::run(
        config,
        &SimOptions {
            seed,
            party,
            data: None,
        },
    )?;
    sim::print_report(&report);
    Ok(())
}
