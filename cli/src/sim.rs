//! Offline simulation of a single dungeon run.
//!
//! Drives the real engine on a virtual timeline against a flat in-memory
//! world, with collaborators that only record what they were asked to do.

use delve_core::engine::{
    Announcer, BuildRequest, CompletionSignal, Construction, Engine, EngineCommand, EngineContext,
    InstanceKey, ManualScheduler, MobSpawner, Notice, RankingReport, RewardError, RewardGrant,
    Rewards, Stage,
};
use delve_core::world::{BossId, EntityId, FlatWorld, Location, ManualClock, ParticipantId, TerrainProbe};
use delve_core::{AllocatorSettings, InstanceStore, OccupiedSites, SpatialAllocator, ValidatedConfig};
use delve_types::duration;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SKILL: &str = "mining";
const DAMAGE_ROUNDS: usize = 12;

// ─────────────────────────────────────────────────────────────────────────────
// Recording Collaborators
// ─────────────────────────────────────────────────────────────────────────────

struct InstantConstruction;

impl Construction for InstantConstruction {
    fn build(&self, request: BuildRequest, done: CompletionSignal) {
        let structure = request.structure.as_deref().unwrap_or("default");
        println!("  [build]   {} '{}' at {}", request.dungeon_type, structure, request.location);
        done.complete();
    }

    fn destroy(&self, location: &Location, done: CompletionSignal) {
        println!("  [destroy] structure at {location}");
        done.complete();
    }
}

#[derive(Default)]
struct CountingSpawner {
    next_id: AtomicU64,
    mobs: AtomicU64,
}

impl MobSpawner for CountingSpawner {
    fn spawn_mob(&self, _mob_id: &str, _at: &Location) -> Option<EntityId> {
        self.mobs.fetch_add(1, Ordering::Relaxed);
        Some(EntityId(self.next_id.fetch_add(1, Ordering::Relaxed)))
    }

    fn spawn_boss(&self, boss_id: &str, at: &Location, strength: f64) -> Option<BossId> {
        println!("  [spawn]   boss '{boss_id}' x{strength:.1} at {at}");
        Some(BossId(self.next_id.fetch_add(1, Ordering::Relaxed)))
    }
}

struct PrintingRewards;

impl Rewards for PrintingRewards {
    fn grant(&self, grant: RewardGrant) -> Result<(), RewardError> {
        let commands = grant.rendered_commands();
        if commands.is_empty() {
            println!("  [reward]  {} ({} tier)", grant.participant, grant.tier.name);
        }
        for command in commands {
            println!("  [reward]  {command}");
        }
        Ok(())
    }
}

#[derive(Default)]
struct CapturingAnnouncer {
    rankings: Mutex<Vec<RankingReport>>,
}

impl Announcer for CapturingAnnouncer {
    fn announce(&self, recipients: &[ParticipantId], notice: Notice) {
        if let Notice::DamageRanking(report) = &notice {
            self.rankings
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(report.clone());
            return;
        }
        println!("  {:>3} -> {}", recipients.len(), describe(&notice));
    }
}

fn describe(notice: &Notice) -> String {
    match notice {
        Notice::InstanceAlreadyActive { skill } => format!("already running a {skill} dungeon"),
        Notice::AllocationFailed { skill } => format!("no room for a {skill} dungeon"),
        Notice::InstanceReady {
            location,
            dungeon_type,
        } => format!("{dungeon_type} ready at {location}"),
        Notice::PartyFormed { size, countdown } => {
            format!("party of {size} formed, starting in {countdown}s")
        }
        Notice::CountdownTick { remaining } => format!("{remaining}..."),
        Notice::CountdownAborted => "countdown aborted".to_string(),
        Notice::DifficultyScaled { tier, party_size } => {
            format!("{} difficulty for {party_size}", tier.name)
        }
        Notice::WaveStarting { wave, waves } => format!("wave {wave}/{waves}"),
        Notice::WaveCleared { wave } => format!("wave {wave} cleared"),
        Notice::BossIncoming { delay_secs } => format!("boss in {delay_secs}s"),
        Notice::BossSpawned { boss, tier } => format!("{boss} appears ({})", tier.name),
        Notice::DamageRanking(_) => "damage ranking".to_string(),
        Notice::InstanceCompleted { dungeon_type } => format!("{dungeon_type} completed"),
        Notice::InstanceAbandoned { reason } => format!("abandoned: {reason}"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Simulation
// ─────────────────────────────────────────────────────────────────────────────

pub struct SimOptions {
    pub seed: u64,
    pub party: usize,
    pub data: Option<PathBuf>,
}

pub struct SimReport {
    pub dungeon_type: String,
    pub elapsed: Duration,
    pub mobs_spawned: u64,
    pub ranking: Option<RankingReport>,
}

/// Runs one instance from activation to boss defeat.
pub fn run(config: Arc<ValidatedConfig>, options: &SimOptions) -> Result<SimReport, String> {
    let party = options.party.max(1);
    let clock = Arc::new(ManualClock::default());
    let world = Arc::new(FlatWorld::new(64));

    let data = options.data.clone().unwrap_or_else(|| {
        std::env::temp_dir()
            .join(format!("delve-sim-{}", std::process::id()))
            .join("instances.json")
    });
    let store = InstanceStore::open(&data, clock.clone()).map_err(|e| e.to_string())?;

    let terrain: Arc<dyn TerrainProbe> = world.clone();
    let sites: Arc<dyn OccupiedSites> = Arc::new(store.clone());
    let allocator = SpatialAllocator::new(
        AllocatorSettings::from_engine(config.settings()),
        terrain,
        sites,
        clock.clone(),
    )
    .map_err(|e| e.to_string())?
    .with_seed(options.seed);

    let spawner = Arc::new(CountingSpawner::default());
    let announcer = Arc::new(CapturingAnnouncer::default());
    let ctx = Arc::new(EngineContext {
        config: Arc::clone(&config),
        clock: clock.clone(),
        world: world.clone(),
        store: store.clone(),
        allocator: Arc::new(allocator),
        construction: Arc::new(InstantConstruction),
        spawner: spawner.clone(),
        rewards: Arc::new(PrintingRewards),
        announcer: announcer.clone(),
    });

    let driver = ManualScheduler::new().with_clock(clock);
    let mut engine = Engine::new(ctx, Box::new(driver.clone())).with_seed(options.seed);
    let mut rng = StdRng::seed_from_u64(options.seed);
    let key = InstanceKey::new(ParticipantId(1), SKILL);

    let send = |engine: &mut Engine, command: EngineCommand| {
        engine.handle(command);
        while let Some(next) = driver.next_ready() {
            engine.handle(next);
        }
    };

    send(
        &mut engine,
        EngineCommand::Activate {
            key: key.clone(),
            world: None,
        },
    );
    let (location, dungeon_type) = engine
        .instance(&key)
        .map(|i| (i.location.clone(), i.dungeon_type.clone()))
        .ok_or("activation did not produce an instance")?;

    let radius = config.settings().party.radius;
    for id in 1..=party as u64 {
        let mut at = location.center();
        at.x += rng.gen_range(-radius / 2.0..radius / 2.0);
        at.z += rng.gen_range(-radius / 2.0..radius / 2.0);
        world.add_participant(ParticipantId(id), at);
    }

    send(
        &mut engine,
        EngineCommand::Trigger {
            key: key.clone(),
            initiator: ParticipantId(1),
            point: location.center(),
        },
    );
    while let Some(command) = driver.next_command() {
        engine.handle(command);
    }

    let instance = engine.instance(&key).ok_or("instance ended before the boss")?;
    if instance.stage != Stage::BossActive {
        return Err(format!("instance stopped at {}", instance.stage));
    }
    let boss = instance.boss.ok_or("boss not tracked")?;
    let members = instance.party.clone();

    for _ in 0..DAMAGE_ROUNDS {
        for member in &members {
            let amount = (rng.gen_range(5.0..60.0_f64) * 10.0).round() / 10.0;
            send(
                &mut engine,
                EngineCommand::DamageDealt {
                    boss,
                    attacker: *member,
                    amount,
                },
            );
        }
    }
    let finisher = members[rng.gen_range(0..members.len())];
    send(&mut engine, EngineCommand::BossDefeated { boss, finisher });

    let elapsed = driver.elapsed();
    send(&mut engine, EngineCommand::Shutdown);

    let ranking = announcer
        .rankings
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .pop();
    Ok(SimReport {
        dungeon_type,
        elapsed,
        mobs_spawned: spawner.mobs.load(Ordering::Relaxed),
        ranking,
    })
}

pub fn print_report(report: &SimReport) {
    println!();
    println!(
        "{} finished after {} with {} mobs spawned",
        report.dungeon_type,
        duration::format(report.elapsed),
        report.mobs_spawned
    );
    let Some(ranking) = &report.ranking else {
        println!("Damage tracking disabled");
        return;
    };

    println!("{:<6} {:<14} {:>10}", "Rank", "Participant", "Damage");
    println!("{}", "-".repeat(32));
    for entry in &ranking.top {
        println!(
            "{:<6} {:<14} {:>10.1}",
            entry.rank,
            entry.participant.to_string(),
            entry.damage
        );
    }
    if let Some(entry) = &ranking.finisher {
        println!("{}", "·".repeat(32));
        println!(
            "{:<6} {:<14} {:>10.1}  (finisher)",
            entry.rank,
            entry.participant.to_string(),
            entry.damage
        );
    }
    println!("{:<21} {:>10.1}", "Total", ranking.total_damage);
}
