//! Tokio host for the engine.
//!
//! A single task owns the [`Engine`] and drains one command channel. Host
//! requests arrive through [`EngineHandle`]; timers and offloaded jobs post
//! their follow-ups into the same channel, so every transition runs on this
//! one logical thread.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::collaborators::EngineContext;
use super::command::{EngineCommand, InstanceKey};
use super::error::EngineError;
use super::scheduler::TokioScheduler;
use super::Engine;
use crate::world::{BossId, ParticipantId, Position};

/// Owns the engine and its command queue.
pub struct WorldContext {
    engine: Engine,
    cmd_rx: mpsc::UnboundedReceiver<EngineCommand>,
}

impl WorldContext {
    pub fn new(ctx: Arc<EngineContext>) -> (Self, EngineHandle) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let scheduler = TokioScheduler::new(cmd_tx.clone());
        let engine = Engine::new(ctx, Box::new(scheduler));
        (Self { engine, cmd_rx }, EngineHandle { cmd_tx })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.engine = self.engine.with_seed(seed);
        self
    }

    /// Runs until a shutdown command is handled or every handle is dropped.
    pub async fn run(mut self) {
        tracing::info!("World context started");
        while let Some(command) = self.cmd_rx.recv().await {
            if !self.engine.handle(command) {
                break;
            }
        }
        if self.engine.is_running() {
            self.engine.handle(EngineCommand::Shutdown);
        }
        tracing::info!("World context stopped");
    }
}

/// Cheap, cloneable entry point used by host event handlers.
#[derive(Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::UnboundedSender<EngineCommand>,
}

impl EngineHandle {
    fn send(&self, command: EngineCommand) -> Result<(), EngineError> {
        self.cmd_tx.send(command).map_err(|_| EngineError::Stopped)
    }

    /// Consumes an activation token in the configured dungeon world.
    pub fn activate(&self, owner: ParticipantId, skill: &str) -> Result<(), EngineError> {
        self.send(EngineCommand::Activate {
            key: InstanceKey::new(owner, skill),
            world: None,
        })
    }

    pub fn activate_in(&self, owner: ParticipantId, skill: &str, world: &str) -> Result<(), EngineError> {
        self.send(EngineCommand::Activate {
            key: InstanceKey::new(owner, skill),
            world: Some(world.to_string()),
        })
    }

    pub fn trigger(
        &self,
        owner: ParticipantId,
        skill: &str,
        initiator: ParticipantId,
        point: Position,
    ) -> Result<(), EngineError> {
        self.send(EngineCommand::Trigger {
            key: InstanceKey::new(owner, skill),
            initiator,
            point,
        })
    }

    pub fn damage_dealt(&self, boss: BossId, attacker: ParticipantId, amount: f64) -> Result<(), EngineError> {
        self.send(EngineCommand::DamageDealt {
            boss,
            attacker,
            amount,
        })
    }

    pub fn boss_defeated(&self, boss: BossId, finisher: ParticipantId) -> Result<(), EngineError> {
        self.send(EngineCommand::BossDefeated { boss, finisher })
    }

    pub fn abandon(&self, owner: ParticipantId, skill: &str) -> Result<(), EngineError> {
        self.send(EngineCommand::Abandon {
            key: InstanceKey::new(owner, skill),
        })
    }

    pub fn sweep_stale(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::SweepStale)
    }

    pub fn shutdown(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::Shutdown)
    }

    /// Posts a stale sweep every `interval` until the engine stops.
    pub fn spawn_stale_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if handle.sweep_stale().is_err() {
                    break;
                }
            }
        })
    }
}

/// Long-running tasks started alongside the world context.
#[derive(Default)]
pub struct BackgroundTasks {
    pub world: Option<JoinHandle<()>>,
    pub recent_sweep: Option<JoinHandle<()>>,
    pub stale_sweep: Option<JoinHandle<()>>,
}

impl BackgroundTasks {
    pub fn abort_all(&mut self) {
        if let Some(handle) = self.stale_sweep.take() {
            handle.abort();
        }
        if let Some(handle) = self.recent_sweep.take() {
            handle.abort();
        }
        if let Some(handle) = self.world.take() {
            handle.abort();
        }
    }
}

/// Spawns the world context and both periodic sweepers on the current runtime.
pub fn start(ctx: Arc<EngineContext>) -> (EngineHandle, BackgroundTasks) {
    let settings = ctx.config.settings();
    let recent_interval = settings.recent_sweep_interval;
    let stale_interval = settings.stale_sweep_interval;
    let allocator = Arc::clone(&ctx.allocator);

    let (world, handle) = WorldContext::new(ctx);
    let tasks = BackgroundTasks {
        world: Some(tokio::spawn(world.run())),
        recent_sweep: Some(allocator.spawn_sweeper(recent_interval)),
        stale_sweep: Some(handle.spawn_stale_sweeper(stale_interval)),
    };
    (handle, tasks)
}
