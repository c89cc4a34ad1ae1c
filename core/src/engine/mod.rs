//! Encounter engine
//!
//! Drives every dungeon instance through its lifecycle. The engine is a plain
//! state machine: [`Engine::handle`] applies one [`EngineCommand`] at a time
//! and asks its [`TaskScheduler`] for any follow-ups. Commands for a single
//! instance are therefore strictly sequential, while different instances
//! interleave freely.
//!
//! Any error or panic inside a transition abandons the instance through the
//! same cleanup routine used for normal completion, so spatial claims, timers
//! and store records are never left behind.

mod collaborators;
mod command;
mod error;
mod instance;
mod ledger;
mod scheduler;
mod service;


pub use collaborators::{
    Announcer, BuildRequest, CompletionSignal, Construction, EngineContext, MobSpawner, Notice,
    RewardError, RewardGrant, Rewards, TracingAnnouncer,
};
pub use command::{EngineCommand, InstanceKey};
pub use error::EngineError;
pub use instance::{DungeonInstance, Stage};
pub use ledger::{DamageEntry, DamageLedger, RANKING_SIZE, RankingReport};
pub use scheduler::{CommandSink, ManualScheduler, OffloadJob, TaskScheduler, TimerHandle, TokioScheduler};
pub use service::{BackgroundTasks, EngineHandle, WorldContext, start};

use hashbrown::{HashMap, HashSet};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crate::allocator::AllocatorError;
use crate::config::ConfigError;
use crate::party::{CountdownStep, DifficultyTier, PartyRegistry, PartyResolver};
use crate::spawn::SpawnResolver;
use crate::store::InstanceStatus;
use crate::world::{BossId, Location, ParticipantId, Position, WorldView};

/// Shortest gap between a wave starting and its cleared notice.
const MIN_WAVE_NOTICE: Duration = Duration::from_secs(1);
const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// How an instance left the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Abandoned,
}

pub struct Engine {
    ctx: Arc<EngineContext>,
    scheduler: Box<dyn TaskScheduler>,
    instances: HashMap<InstanceKey, DungeonInstance>,
    /// Activations waiting on the allocator
    allocating: HashSet<InstanceKey>,
    /// Live bosses and the instance each belongs to
    ledgers: HashMap<BossId, (InstanceKey, DamageLedger)>,
    parties: PartyRegistry,
    party_resolver: PartyResolver,
    spawn_resolver: SpawnResolver,
    rng: StdRng,
    /// Last generation handed to a new instance
    generation: u64,
    running: bool,
}

impl Engine {
    pub fn new(ctx: Arc<EngineContext>, scheduler: Box<dyn TaskScheduler>) -> Self {
        let party_resolver = PartyResolver::new(&ctx.config.settings().party);
        Self {
            ctx,
            scheduler,
            instances: HashMap::new(),
            allocating: HashSet::new(),
            ledgers: HashMap::new(),
            parties: PartyRegistry::new(),
            party_resolver,
            spawn_resolver: SpawnResolver::new(),
            rng: StdRng::from_entropy(),
            generation: 0,
            running: true,
        }
    }

    /// Seeds dungeon selection and mob placement.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn instance(&self, key: &InstanceKey) -> Option<&DungeonInstance> {
        self.instances.get(key)
    }

    pub fn instances(&self) -> impl Iterator<Item = &DungeonInstance> {
        self.instances.values()
    }

    pub fn tracked_bosses(&self) -> usize {
        self.ledgers.len()
    }

    pub fn ledger(&self, boss: BossId) -> Option<&DamageLedger> {
        self.ledgers.get(&boss).map(|(_, ledger)| ledger)
    }

    pub fn parties(&self) -> &PartyRegistry {
        &self.parties
    }

    /// Applies one command. Returns false once the engine has shut down.
    pub fn handle(&mut self, command: EngineCommand) -> bool {
        if !self.running {
            tracing::debug!(command = command.name(), "Engine stopped; command dropped");
            return false;
        }

        let name = command.name();
        let target = self.target_of(&command);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(command)));

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e @ EngineError::State { .. })) => {
                tracing::warn!(error = %e, "Stale or out-of-order command");
            }
            Ok(Err(e)) => {
                tracing::error!(command = name, error = %e, "Transition failed");
                if let Some(key) = target {
                    self.abandon(&key, &e.to_string());
                }
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(command = name, panic = %message, "Transition panicked");
                if let Some(key) = target {
                    self.abandon(&key, "internal error");
                }
            }
        }
        self.running
    }

    /// The instance a command affects, resolving bosses through their ledgers.
    fn target_of(&self, command: &EngineCommand) -> Option<InstanceKey> {
        match command {
            EngineCommand::BossDefeated { boss, .. } | EngineCommand::DamageDealt { boss, .. } => {
                self.ledgers.get(boss).map(|(key, _)| key.clone())
            }
            other => other.instance_key().cloned(),
        }
    }

    fn dispatch(&mut self, command: EngineCommand) -> Result<(), EngineError> {
        match command {
            EngineCommand::Activate { key, world } => self.activate(key, world),
            EngineCommand::LocationResolved { key, result } => self.location_resolved(key, result),
            EngineCommand::Trigger {
                key,
                initiator,
                point,
            } => self.trigger(&key, initiator, point),
            EngineCommand::CountdownTick { key, generation } => {
                self.countdown_tick(&key, generation)
            }
            EngineCommand::ConstructionComplete { key, generation } => {
                self.construction_complete(&key, generation)
            }
            EngineCommand::WaveTick {
                key,
                generation,
                wave,
            } => self.wave_tick(&key, generation, wave),
            EngineCommand::WaveCleared {
                key,
                generation,
                wave,
            } => self.wave_cleared(&key, generation, wave),
            EngineCommand::BossIncoming { key, generation } => self.boss_incoming(&key, generation),
            EngineCommand::BossSpawnDue { key, generation } => self.spawn_boss(&key, generation),
            EngineCommand::DamageDealt {
                boss,
                attacker,
                amount,
            } => {
                self.record_damage(boss, attacker, amount);
                Ok(())
            }
            EngineCommand::BossDefeated { boss, finisher } => self.boss_defeated(boss, finisher),
            EngineCommand::Abandon { key } => {
                self.abandon(&key, "abandoned on request");
                Ok(())
            }
            EngineCommand::SweepStale => {
                self.sweep_stale();
                Ok(())
            }
            EngineCommand::StructureRemoved { location } => {
                tracing::debug!(location = %location, "Structure removed");
                Ok(())
            }
            EngineCommand::Shutdown => {
                self.shutdown();
                Ok(())
            }
        }
    }

    fn announce(&self, recipients: &[ParticipantId], notice: Notice) {
        self.ctx.announcer.announce(recipients, notice);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Activation
    // ─────────────────────────────────────────────────────────────────────────

    fn activate(&mut self, key: InstanceKey, world: Option<String>) -> Result<(), EngineError> {
        let busy = self.instances.contains_key(&key)
            || self.allocating.contains(&key)
            || self.ctx.store.has_active_instance(key.owner, &key.skill);
        if busy {
            tracing::info!(instance = %key, "Activation rejected; instance already active");
            self.announce(
                &[key.owner],
                Notice::InstanceAlreadyActive {
                    skill: key.skill.clone(),
                },
            );
            return Ok(());
        }

        let world = world.unwrap_or_else(|| self.ctx.config.settings().world.clone());
        let allocator = Arc::clone(&self.ctx.allocator);
        self.allocating.insert(key.clone());
        self.scheduler.offload(Box::new(move || {
            let result = allocator.reserve(&world, key.owner);
            EngineCommand::LocationResolved { key, result }
        }));
        Ok(())
    }

    fn location_resolved(
        &mut self,
        key: InstanceKey,
        result: Result<Location, AllocatorError>,
    ) -> Result<(), EngineError> {
        if !self.allocating.remove(&key) {
            if let Ok(location) = &result {
                self.ctx.allocator.release(location, key.owner);
            }
            return Err(EngineError::state(&key, "location_resolved", "no activation pending"));
        }

        let location = match result {
            Ok(location) => location,
            Err(e) => {
                tracing::warn!(instance = %key, error = %e, "Could not allocate a dungeon location");
                self.announce(
                    &[key.owner],
                    Notice::AllocationFailed {
                        skill: key.skill.clone(),
                    },
                );
                return Ok(());
            }
        };

        let dungeon_type = self.ctx.config.select_dungeon(&mut self.rng).id.clone();
        let created_at = self.ctx.clock.now();
        self.generation += 1;
        let generation = self.generation;
        self.ctx
            .store
            .set_active_instance(key.owner, &key.skill, &location, &dungeon_type);

        tracing::info!(instance = %key, location = %location, dungeon = %dungeon_type, "Instance ready");
        self.announce(
            &[key.owner],
            Notice::InstanceReady {
                location: location.clone(),
                dungeon_type: dungeon_type.clone(),
            },
        );
        self.instances.insert(
            key.clone(),
            DungeonInstance::new(key, generation, dungeon_type, location, created_at),
        );
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Party Formation
    // ─────────────────────────────────────────────────────────────────────────

    fn trigger(
        &mut self,
        key: &InstanceKey,
        initiator: ParticipantId,
        point: Position,
    ) -> Result<(), EngineError> {
        let instance = self
            .instances
            .get_mut(key)
            .ok_or_else(|| EngineError::state(key, "trigger", "no live instance"))?;
        if instance.stage != Stage::Forming || instance.counting_down() {
            return Err(EngineError::state(
                key,
                "trigger",
                format!("instance already started ({})", instance.stage),
            ));
        }

        let members = self
            .party_resolver
            .form(self.ctx.world.as_ref(), &self.parties, initiator, &point);

        if members.len() == 1 {
            return self.begin_build(key, members);
        }

        let countdown = self.party_resolver.countdown(members.clone(), point);
        let ticks = countdown.remaining();
        let generation = instance.generation;
        instance.countdown = Some(countdown);
        tracing::info!(instance = %key, size = members.len(), "Party formed; countdown started");
        self.ctx.announcer.announce(
            &members,
            Notice::PartyFormed {
                size: members.len(),
                countdown: ticks,
            },
        );
        self.scheduler.schedule(
            key,
            Duration::ZERO,
            EngineCommand::CountdownTick {
                key: key.clone(),
                generation,
            },
        );
        Ok(())
    }

    fn countdown_tick(&mut self, key: &InstanceKey, generation: u64) -> Result<(), EngineError> {
        current_run(&self.instances, key, generation, "countdown_tick")?;
        let Some(instance) = self.instances.get_mut(key) else {
            return Err(EngineError::state(key, "countdown_tick", "no live instance"));
        };
        let Some(countdown) = instance.countdown.as_mut() else {
            return Err(EngineError::state(key, "countdown_tick", "no countdown running"));
        };

        match countdown.tick(self.ctx.world.as_ref()) {
            CountdownStep::Tick {
                remaining,
                announce,
            } => {
                if announce {
                    self.ctx
                        .announcer
                        .announce(countdown.members(), Notice::CountdownTick { remaining });
                }
                self.scheduler.schedule(
                    key,
                    COUNTDOWN_TICK,
                    EngineCommand::CountdownTick {
                        key: key.clone(),
                        generation,
                    },
                );
                Ok(())
            }
            CountdownStep::Aborted => {
                let members = countdown.members().to_vec();
                instance.countdown = None;
                tracing::info!(instance = %key, "Countdown aborted; nobody stayed at the trigger point");
                self.ctx.announcer.announce(&members, Notice::CountdownAborted);
                Ok(())
            }
            CountdownStep::Ready(present) => {
                instance.countdown = None;
                self.begin_build(key, present)
            }
        }
    }

    fn begin_build(&mut self, key: &InstanceKey, members: Vec<ParticipantId>) -> Result<(), EngineError> {
        let ctx = Arc::clone(&self.ctx);
        let instance = self
            .instances
            .get_mut(key)
            .ok_or_else(|| EngineError::state(key, "build", "no live instance"))?;
        let dungeon = ctx.config.dungeon(&instance.dungeon_type).ok_or_else(|| {
            ConfigError::InvalidDungeon {
                id: instance.dungeon_type.clone(),
                reason: "dungeon type is no longer configured".to_string(),
            }
        })?;

        let tier = DifficultyTier::for_party_size(members.len());
        instance.tier = tier;
        instance.party = members;
        instance.stage = Stage::Building;
        instance.status = InstanceStatus::InProgress;
        self.parties.register(&instance.party);
        ctx.store
            .set_instance_status(key.owner, &key.skill, InstanceStatus::InProgress);

        tracing::info!(
            instance = %key,
            party_size = instance.party.len(),
            tier = tier.name,
            "Building dungeon"
        );
        ctx.announcer.announce(
            &instance.party,
            Notice::DifficultyScaled {
                tier,
                party_size: instance.party.len(),
            },
        );

        let request = BuildRequest {
            location: instance.location.clone(),
            dungeon_type: dungeon.id.clone(),
            structure: dungeon.structure.clone(),
        };
        let done = CompletionSignal::new(
            self.scheduler.sink(),
            EngineCommand::ConstructionComplete {
                key: key.clone(),
                generation: instance.generation,
            },
        );
        ctx.construction.build(request, done);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Waves
    // ─────────────────────────────────────────────────────────────────────────

    fn construction_complete(&mut self, key: &InstanceKey, generation: u64) -> Result<(), EngineError> {
        let instance = current_run(&self.instances, key, generation, "construction_complete")?;
        if instance.stage != Stage::Building {
            return Err(EngineError::state(
                key,
                "construction_complete",
                format!("instance is at {}", instance.stage),
            ));
        }
        let waves = self
            .ctx
            .config
            .dungeon(&instance.dungeon_type)
            .map_or(0, |d| d.wave_count());

        if waves == 0 {
            self.boss_incoming(key, generation)
        } else {
            self.wave_tick(key, generation, 1)
        }
    }

    fn wave_tick(&mut self, key: &InstanceKey, generation: u64, wave: usize) -> Result<(), EngineError> {
        let ctx = Arc::clone(&self.ctx);
        let instance = current_run(&self.instances, key, generation, "wave_tick")?;
        let in_waves = matches!(instance.stage, Stage::Building | Stage::Wave(_));
        if !in_waves || wave != instance.current_wave + 1 {
            return Err(EngineError::state(
                key,
                "wave_tick",
                format!("wave {wave} does not follow {}", instance.stage),
            ));
        }
        if !party_present(ctx.world.as_ref(), instance) {
            self.abandon(key, "no party members left in the dungeon");
            return Ok(());
        }

        let dungeon = ctx.config.dungeon(&instance.dungeon_type).ok_or_else(|| {
            ConfigError::InvalidDungeon {
                id: instance.dungeon_type.clone(),
                reason: "dungeon type is no longer configured".to_string(),
            }
        })?;
        let waves = dungeon.wave_count();
        let base = dungeon.waves.get(wave - 1).map_or(&[][..], Vec::as_slice);
        let mobs = instance.tier.scale_wave(base);
        if mobs.is_empty() {
            tracing::warn!(instance = %key, wave, "No mobs configured for wave");
        }

        let points = self.spawn_resolver.mob_spawn_points(
            ctx.world.as_ref(),
            &instance.location,
            mobs.len(),
            &mut self.rng,
        );
        let mut spawned = 0usize;
        for (mob, at) in mobs.iter().zip(&points) {
            match ctx.spawner.spawn_mob(mob, at) {
                Some(_) => spawned += 1,
                None => tracing::warn!(instance = %key, mob = %mob, at = %at, "Mob failed to spawn"),
            }
        }

        let audience = instance.party.clone();
        if let Some(instance) = self.instances.get_mut(key) {
            instance.stage = Stage::Wave(wave);
            instance.current_wave = wave;
        }
        tracing::info!(instance = %key, wave, waves, spawned, "Wave started");
        ctx.announcer
            .announce(&audience, Notice::WaveStarting { wave, waves });

        let delay = ctx.config.settings().wave_delay;
        self.scheduler.schedule(
            key,
            delay.saturating_sub(Duration::from_secs(1)).max(MIN_WAVE_NOTICE),
            EngineCommand::WaveCleared {
                key: key.clone(),
                generation,
                wave,
            },
        );
        let next = if wave < waves {
            EngineCommand::WaveTick {
                key: key.clone(),
                generation,
                wave: wave + 1,
            }
        } else {
            EngineCommand::BossIncoming {
                key: key.clone(),
                generation,
            }
        };
        self.scheduler.schedule(key, delay, next);
        Ok(())
    }

    fn wave_cleared(&mut self, key: &InstanceKey, generation: u64, wave: usize) -> Result<(), EngineError> {
        let instance = current_run(&self.instances, key, generation, "wave_cleared")?;
        if instance.current_wave != wave {
            return Err(EngineError::state(
                key,
                "wave_cleared",
                format!("wave {wave} is not current ({})", instance.stage),
            ));
        }
        self.announce(&instance.party, Notice::WaveCleared { wave });
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Boss
    // ─────────────────────────────────────────────────────────────────────────

    fn boss_incoming(&mut self, key: &InstanceKey, generation: u64) -> Result<(), EngineError> {
        let ctx = Arc::clone(&self.ctx);
        let instance = current_run(&self.instances, key, generation, "boss_incoming")?;
        let dungeon = ctx.config.dungeon(&instance.dungeon_type).ok_or_else(|| {
            ConfigError::InvalidDungeon {
                id: instance.dungeon_type.clone(),
                reason: "dungeon type is no longer configured".to_string(),
            }
        })?;
        let waves = dungeon.wave_count();
        let expected = if waves == 0 {
            Stage::Building
        } else {
            Stage::Wave(waves)
        };
        if instance.stage != expected {
            return Err(EngineError::state(
                key,
                "boss_incoming",
                format!("instance is at {}", instance.stage),
            ));
        }
        if !party_present(ctx.world.as_ref(), instance) {
            self.abandon(key, "no party members left in the dungeon");
            return Ok(());
        }

        let delay = ctx.config.boss_delay(dungeon);
        let audience = instance.party.clone();
        if let Some(instance) = self.instances.get_mut(key) {
            instance.stage = Stage::BossDelay;
        }
        tracing::info!(instance = %key, delay_secs = delay.as_secs(), "Boss incoming");
        ctx.announcer.announce(
            &audience,
            Notice::BossIncoming {
                delay_secs: delay.as_secs(),
            },
        );
        self.scheduler.schedule(
            key,
            delay,
            EngineCommand::BossSpawnDue {
                key: key.clone(),
                generation,
            },
        );
        Ok(())
    }

    fn spawn_boss(&mut self, key: &InstanceKey, generation: u64) -> Result<(), EngineError> {
        let ctx = Arc::clone(&self.ctx);
        let instance = current_run(&self.instances, key, generation, "boss_spawn_due")?;
        if instance.stage != Stage::BossDelay {
            return Err(EngineError::state(
                key,
                "boss_spawn_due",
                format!("instance is at {}", instance.stage),
            ));
        }

        let present = present_members(ctx.world.as_ref(), instance);
        if present.is_empty() {
            self.abandon(key, "no party members left for the boss");
            return Ok(());
        }

        let dungeon = ctx.config.dungeon(&instance.dungeon_type).ok_or_else(|| {
            ConfigError::InvalidDungeon {
                id: instance.dungeon_type.clone(),
                reason: "dungeon type is no longer configured".to_string(),
            }
        })?;
        let point = self
            .spawn_resolver
            .boss_spawn_point(ctx.world.as_ref(), &instance.location);
        let tier = instance.tier;
        let boss = ctx
            .spawner
            .spawn_boss(&dungeon.boss.id, &point, tier.boss_multiplier)
            .ok_or_else(|| EngineError::BossSpawnFailed {
                key: key.clone(),
                boss: dungeon.boss.id.clone(),
            })?;

        let audience = instance.party.clone();
        self.ledgers
            .insert(boss, (key.clone(), DamageLedger::with_participants(present)));
        if let Some(instance) = self.instances.get_mut(key) {
            instance.boss = Some(boss);
            instance.stage = Stage::BossActive;
        }

        tracing::info!(instance = %key, boss = %boss, boss_type = %dungeon.boss.id, at = %point, "Boss spawned");
        ctx.announcer.announce(
            &audience,
            Notice::BossSpawned {
                boss: dungeon.boss.id.clone(),
                tier,
            },
        );
        Ok(())
    }

    fn record_damage(&mut self, boss: BossId, attacker: ParticipantId, amount: f64) {
        match self.ledgers.get_mut(&boss) {
            Some((_, ledger)) => {
                if !ledger.record(attacker, amount) {
                    tracing::debug!(boss = %boss, attacker = %attacker, amount, "Ignored invalid damage amount");
                }
            }
            None => tracing::trace!(boss = %boss, "Damage to untracked boss ignored"),
        }
    }

    fn boss_defeated(&mut self, boss: BossId, finisher: ParticipantId) -> Result<(), EngineError> {
        let Some((key, ledger)) = self.ledgers.remove(&boss) else {
            tracing::debug!(boss = %boss, "Defeat of untracked boss ignored");
            return Ok(());
        };
        let ctx = Arc::clone(&self.ctx);
        let instance = self
            .instances
            .get(&key)
            .ok_or_else(|| EngineError::state(&key, "boss_defeated", "no live instance"))?;
        if instance.stage != Stage::BossActive {
            return Err(EngineError::state(
                &key,
                "boss_defeated",
                format!("instance is at {}", instance.stage),
            ));
        }

        let tracking = &ctx.config.settings().damage_tracking;
        if tracking.enabled {
            let report = ledger.report(tracking.show_personal.then_some(finisher));
            ctx.announcer
                .announce(&instance.party, Notice::DamageRanking(report));
        }

        let loot = ctx
            .config
            .dungeon(&instance.dungeon_type)
            .map(|d| d.loot.clone())
            .unwrap_or_default();
        for member in &instance.party {
            let grant = RewardGrant {
                participant: *member,
                dungeon_type: instance.dungeon_type.clone(),
                tier: instance.tier,
                loot: loot.clone(),
            };
            if let Err(e) = ctx.rewards.grant(grant) {
                tracing::warn!(instance = %key, participant = %member, error = %e, "Reward grant failed");
            }
        }

        self.cleanup(&key, Outcome::Completed, "boss defeated");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cleanup
    // ─────────────────────────────────────────────────────────────────────────

    /// Forces `key` into the abandoned state and reclaims its resources.
    pub fn abandon(&mut self, key: &InstanceKey, reason: &str) {
        self.cleanup(key, Outcome::Abandoned, reason);
    }

    /// Shared teardown for completed and abandoned instances. Calling it
    /// again for the same key only re-cancels its (already empty) timers.
    pub fn cleanup(&mut self, key: &InstanceKey, outcome: Outcome, reason: &str) {
        self.scheduler.cancel(key);
        self.allocating.remove(key);
        let Some(instance) = self.instances.remove(key) else {
            tracing::debug!(instance = %key, "Cleanup already done");
            return;
        };
        let audience = instance.audience();

        if let Some(boss) = instance.boss {
            self.ledgers.remove(&boss);
        }
        for member in &instance.party {
            self.parties.remove(*member);
        }
        if instance.stage.has_structure() {
            let done = CompletionSignal::new(
                self.scheduler.sink(),
                EngineCommand::StructureRemoved {
                    location: instance.location.clone(),
                },
            );
            self.ctx.construction.destroy(&instance.location, done);
        }

        self.ctx.allocator.release(&instance.location, key.owner);
        self.ctx.store.clear_active_instance(key.owner, &key.skill);

        match outcome {
            Outcome::Completed => {
                self.ctx.store.set_reward_received(key.owner, &key.skill, false);
                tracing::info!(instance = %key, dungeon = %instance.dungeon_type, "Instance completed");
                self.announce(
                    &audience,
                    Notice::InstanceCompleted {
                        dungeon_type: instance.dungeon_type.clone(),
                    },
                );
            }
            Outcome::Abandoned => {
                tracing::info!(instance = %key, stage = %instance.stage, reason, "Instance abandoned");
                self.announce(
                    &audience,
                    Notice::InstanceAbandoned {
                        reason: reason.to_string(),
                    },
                );
            }
        }
    }

    fn sweep_stale(&mut self) {
        let max_age = self.ctx.config.settings().stale_max_age;
        let cleared = self.ctx.store.cleanup_stale_instances(max_age);
        for (owner, skill) in cleared {
            let key = InstanceKey::new(owner, skill);
            if self.instances.contains_key(&key) {
                self.abandon(&key, "instance expired");
            }
        }
    }

    fn shutdown(&mut self) {
        tracing::info!(live_instances = self.instances.len(), "Engine shutting down");
        self.scheduler.cancel_all();
        self.instances.clear();
        self.allocating.clear();
        self.ledgers.clear();
        self.parties.clear();
        self.ctx.allocator.clear();
        if let Err(e) = self.ctx.store.flush() {
            tracing::error!(error = %e, "Failed to flush instance store on shutdown");
        }
        self.running = false;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// The live instance for a follow-up issued to run `generation`.
fn current_run<'a>(
    instances: &'a HashMap<InstanceKey, DungeonInstance>,
    key: &InstanceKey,
    generation: u64,
    operation: &'static str,
) -> Result<&'a DungeonInstance, EngineError> {
    let instance = instances
        .get(key)
        .ok_or_else(|| EngineError::state(key, operation, "no live instance"))?;
    if instance.generation != generation {
        return Err(EngineError::state(
            key,
            operation,
            format!("issued for run {generation}, live run is {}", instance.generation),
        ));
    }
    Ok(instance)
}

/// Party members online and in the instance's world.
fn present_members(world: &dyn WorldView, instance: &DungeonInstance) -> Vec<ParticipantId> {
    instance
        .party
        .iter()
        .copied()
        .filter(|id| {
            world
                .participant(*id)
                .is_some_and(|p| p.online && p.position.world == instance.location.world)
        })
        .collect()
}

fn party_present(world: &dyn WorldView, instance: &DungeonInstance) -> bool {
    !present_members(world, instance).is_empty()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
