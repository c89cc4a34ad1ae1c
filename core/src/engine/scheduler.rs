//! Deferred and offloaded work for the engine.
//!
//! The engine never sleeps. It asks its [`TaskScheduler`] to deliver a command
//! later (`schedule`), to run blocking work elsewhere and deliver the result
//! (`offload`), or to drop everything still pending for an instance
//! (`cancel`). [`TokioScheduler`] does this with spawned tasks;
//! [`ManualScheduler`] keeps a virtual timeline for tests and simulation.

use hashbrown::HashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use super::command::{EngineCommand, InstanceKey};
use crate::world::ManualClock;

/// Blocking job whose result is fed back to the engine.
pub type OffloadJob = Box<dyn FnOnce() -> EngineCommand + Send + 'static>;

/// Where follow-up commands are delivered.
#[derive(Clone)]
pub enum CommandSink {
    Channel(mpsc::UnboundedSender<EngineCommand>),
    Queue(Arc<Mutex<VecDeque<EngineCommand>>>),
}

impl CommandSink {
    /// Returns false once the engine is gone.
    pub fn send(&self, command: EngineCommand) -> bool {
        match self {
            CommandSink::Channel(tx) => tx.send(command).is_ok(),
            CommandSink::Queue(queue) => {
                queue
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push_back(command);
                true
            }
        }
    }
}

pub trait TaskScheduler: Send {
    /// Delivers `command` after `delay`, unless `key` is cancelled first.
    fn schedule(&mut self, key: &InstanceKey, delay: Duration, command: EngineCommand);

    /// Runs `job` off the world context and delivers its command.
    fn offload(&mut self, job: OffloadJob);

    /// Drops every pending delivery for `key`. Cancelling twice is a no-op.
    fn cancel(&mut self, key: &InstanceKey);

    fn cancel_all(&mut self);

    fn sink(&self) -> CommandSink;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tokio
// ─────────────────────────────────────────────────────────────────────────────

/// All pending timer tasks of one instance.
#[derive(Debug, Default)]
pub struct TimerHandle {
    tasks: Vec<AbortHandle>,
}

impl TimerHandle {
    fn push(&mut self, task: AbortHandle) {
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(task);
    }

    pub fn cancel(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    pub fn pending(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }
}

/// Must be used from within a tokio runtime.
pub struct TokioScheduler {
    tx: mpsc::UnboundedSender<EngineCommand>,
    timers: HashMap<InstanceKey, TimerHandle>,
}

impl TokioScheduler {
    pub fn new(tx: mpsc::UnboundedSender<EngineCommand>) -> Self {
        Self {
            tx,
            timers: HashMap::new(),
        }
    }

    pub fn pending_for(&self, key: &InstanceKey) -> usize {
        self.timers.get(key).map_or(0, TimerHandle::pending)
    }
}

impl TaskScheduler for TokioScheduler {
    fn schedule(&mut self, key: &InstanceKey, delay: Duration, command: EngineCommand) {
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(command);
        });
        self.timers
            .entry(key.clone())
            .or_default()
            .push(task.abort_handle());
    }

    fn offload(&mut self, job: OffloadJob) {
        let tx = self.tx.clone();
        tokio::task::spawn_blocking(move || {
            let _ = tx.send(job());
        });
    }

    fn cancel(&mut self, key: &InstanceKey) {
        if let Some(mut handle) = self.timers.remove(key) {
            handle.cancel();
        }
    }

    fn cancel_all(&mut self) {
        for (_, mut handle) in self.timers.drain() {
            handle.cancel();
        }
    }

    fn sink(&self) -> CommandSink {
        CommandSink::Channel(self.tx.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Manual (virtual time)
// ─────────────────────────────────────────────────────────────────────────────

struct PendingCommand {
    due: Duration,
    seq: u64,
    key: InstanceKey,
    command: EngineCommand,
}

#[derive(Default)]
struct Timeline {
    now: Duration,
    seq: u64,
    pending: Vec<PendingCommand>,
}

/// Deterministic scheduler on a virtual timeline.
///
/// Clones share the same timeline: hand one to the engine and drive the
/// other. Offloaded jobs run inline.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    timeline: Arc<Mutex<Timeline>>,
    ready: Arc<Mutex<VecDeque<EngineCommand>>>,
    clock: Option<Arc<ManualClock>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances `clock` along with the virtual timeline.
    pub fn with_clock(mut self, clock: Arc<ManualClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    fn timeline(&self) -> MutexGuard<'_, Timeline> {
        self.timeline.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Virtual time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        self.timeline().now
    }

    pub fn pending_timers(&self) -> usize {
        self.timeline().pending.len()
    }

    pub fn pending_for(&self, key: &InstanceKey) -> usize {
        self.timeline().pending.iter().filter(|p| &p.key == key).count()
    }

    /// A command that is deliverable without advancing time.
    pub fn next_ready(&self) -> Option<EngineCommand> {
        if let Some(command) = self
            .ready
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
        {
            return Some(command);
        }
        let mut timeline = self.timeline();
        let now = timeline.now;
        Self::pop_due(&mut timeline, now)
    }

    /// Next command in delivery order, advancing time to the earliest timer
    /// when nothing is ready.
    pub fn next_command(&self) -> Option<EngineCommand> {
        if let Some(command) = self.next_ready() {
            return Some(command);
        }
        let mut timeline = self.timeline();
        let due = timeline.pending.iter().map(|p| p.due).min()?;
        let step = due.saturating_sub(timeline.now);
        timeline.now = due;
        drop(timeline);
        if let Some(clock) = &self.clock {
            clock.advance(step);
        }
        let mut timeline = self.timeline();
        Self::pop_due(&mut timeline, due)
    }

    /// Moves time forward by `by` and returns every command that fell due, in order.
    pub fn advance(&self, by: Duration) -> Vec<EngineCommand> {
        let mut timeline = self.timeline();
        timeline.now += by;
        let now = timeline.now;
        let mut due = Vec::new();
        while let Some(command) = Self::pop_due(&mut timeline, now) {
            due.push(command);
        }
        drop(timeline);
        if let Some(clock) = &self.clock {
            clock.advance(by);
        }
        due
    }

    fn pop_due(timeline: &mut Timeline, now: Duration) -> Option<EngineCommand> {
        let index = timeline
            .pending
            .iter()
            .enumerate()
            .filter(|(_, p)| p.due <= now)
            .min_by_key(|(_, p)| (p.due, p.seq))
            .map(|(i, _)| i)?;
        Some(timeline.pending.remove(index).command)
    }
}

impl TaskScheduler for ManualScheduler {
    fn schedule(&mut self, key: &InstanceKey, delay: Duration, command: EngineCommand) {
        let mut timeline = self.timeline();
        let seq = timeline.seq;
        timeline.seq += 1;
        let due = timeline.now + delay;
        timeline.pending.push(PendingCommand {
            due,
            seq,
            key: key.clone(),
            command,
        });
    }

    fn offload(&mut self, job: OffloadJob) {
        let command = job();
        self.sink().send(command);
    }

    fn cancel(&mut self, key: &InstanceKey) {
        self.timeline().pending.retain(|p| &p.key != key);
    }

    fn cancel_all(&mut self) {
        self.timeline().pending.clear();
    }

    fn sink(&self) -> CommandSink {
        CommandSink::Queue(Arc::clone(&self.ready))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::ParticipantId;

    fn key(owner: u64) -> InstanceKey {
        InstanceKey::new(ParticipantId(owner), "mining")
    }

    fn tick(owner: u64) -> EngineCommand {
        EngineCommand::CountdownTick {
            key: key(owner),
            generation: 1,
        }
    }

    fn owner_of(command: &EngineCommand) -> Option<u64> {
        command.instance_key().map(|k| k.owner.0)
    }

    #[test]
    fn manual_timeline_delivers_in_due_order() {
        let mut scheduler = ManualScheduler::new();
        let driver = scheduler.clone();
        scheduler.schedule(&key(1), Duration::from_secs(5), tick(1));
        scheduler.schedule(&key(2), Duration::from_secs(2), tick(2));
        scheduler.schedule(&key(3), Duration::from_secs(2), tick(3));

        assert!(driver.next_ready().is_none());
        assert_eq!(driver.next_command().as_ref().and_then(owner_of), Some(2));
        assert_eq!(driver.next_command().as_ref().and_then(owner_of), Some(3));
        assert_eq!(driver.elapsed(), Duration::from_secs(2));
        assert_eq!(driver.next_command().as_ref().and_then(owner_of), Some(1));
        assert_eq!(driver.elapsed(), Duration::from_secs(5));
        assert!(driver.next_command().is_none());
    }

    #[test]
    fn manual_cancel_is_per_instance_and_idempotent() {
        let mut scheduler = ManualScheduler::new();
        scheduler.schedule(&key(1), Duration::from_secs(1), tick(1));
        scheduler.schedule(&key(1), Duration::from_secs(2), tick(1));
        scheduler.schedule(&key(2), Duration::from_secs(1), tick(2));

        scheduler.cancel(&key(1));
        scheduler.cancel(&key(1));
        assert_eq!(scheduler.pending_for(&key(1)), 0);
        assert_eq!(scheduler.pending_timers(), 1);

        let due = scheduler.advance(Duration::from_secs(3));
        assert_eq!(due.len(), 1);
    }

    #[test]
    fn manual_offload_and_sink_are_ready_immediately() {
        let mut scheduler = ManualScheduler::new();
        scheduler.offload(Box::new(|| tick(4)));
        scheduler.sink().send(tick(5));

        assert_eq!(scheduler.next_ready().as_ref().and_then(owner_of), Some(4));
        assert_eq!(scheduler.next_ready().as_ref().and_then(owner_of), Some(5));
        assert_eq!(scheduler.elapsed(), Duration::ZERO);
    }

    #[test]
    fn manual_scheduler_moves_the_clock() {
        let clock = Arc::new(ManualClock::default());
        let mut scheduler = ManualScheduler::new().with_clock(clock.clone());
        let start = crate::world::Clock::now(clock.as_ref());
        scheduler.schedule(&key(1), Duration::from_secs(8), tick(1));

        scheduler.next_command();
        let now = crate::world::Clock::now(clock.as_ref());
        assert_eq!((now - start).num_seconds(), 8);
    }

    #[tokio::test]
    async fn tokio_timers_deliver_and_cancel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = TokioScheduler::new(tx);

        scheduler.schedule(&key(1), Duration::from_millis(10), tick(1));
        scheduler.schedule(&key(2), Duration::from_secs(60), tick(2));
        assert_eq!(scheduler.pending_for(&key(2)), 1);

        let first = rx.recv().await.unwrap();
        assert_eq!(owner_of(&first), Some(1));

        scheduler.cancel(&key(2));
        scheduler.cancel(&key(2));
        assert_eq!(scheduler.pending_for(&key(2)), 0);
    }

    #[tokio::test]
    async fn tokio_offload_returns_result_as_command() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = TokioScheduler::new(tx);

        scheduler.offload(Box::new(|| tick(7)));
        let command = rx.recv().await.unwrap();
        assert_eq!(owner_of(&command), Some(7));
    }
}
