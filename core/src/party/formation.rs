use delve_types::PartySettings;

use super::PartyRegistry;
use crate::world::{ParticipantId, Position, WorldView};

/// Members must stay within this multiple of the party radius during the countdown.
const ABORT_RADIUS_FACTOR: f64 = 1.5;

#[derive(Debug, Clone)]
pub struct PartyResolver {
    radius: f64,
    max_size: usize,
    countdown_ticks: u32,
}

impl PartyResolver {
    pub fn new(settings: &PartySettings) -> Self {
        Self {
            radius: settings.radius,
            max_size: settings.max_size.max(1),
            countdown_ticks: settings.countdown_ticks,
        }
    }

    /// Initiator first, then online participants within the radius of the
    /// trigger point, up to the size cap. Anyone already in a running party
    /// is passed over.
    pub fn form(
        &self,
        world: &dyn WorldView,
        running: &PartyRegistry,
        initiator: ParticipantId,
        trigger: &Position,
    ) -> Vec<ParticipantId> {
        let mut members = vec![initiator];
        for candidate in world.participants_in(&trigger.world) {
            if members.len() >= self.max_size {
                break;
            }
            if candidate.id == initiator || running.is_in_party(candidate.id) {
                continue;
            }
            if candidate.position.within(trigger, self.radius) {
                members.push(candidate.id);
            }
        }
        members
    }

    pub fn countdown(&self, members: Vec<ParticipantId>, trigger: Position) -> Countdown {
        Countdown {
            members,
            trigger,
            remaining: self.countdown_ticks,
            abort_radius: self.radius * ABORT_RADIUS_FACTOR,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CountdownStep {
    Tick {
        remaining: u32,
        /// Whether this tick should be broadcast
        announce: bool,
    },
    /// Nobody is left near the trigger point
    Aborted,
    /// Countdown finished; these members form the final party
    Ready(Vec<ParticipantId>),
}

/// Pre-start countdown for a multi-member party, advanced once per second.
#[derive(Debug, Clone)]
pub struct Countdown {
    members: Vec<ParticipantId>,
    trigger: Position,
    remaining: u32,
    abort_radius: f64,
}

impl Countdown {
    pub fn members(&self) -> &[ParticipantId] {
        &self.members
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn tick(&mut self, world: &dyn WorldView) -> CountdownStep {
        let present: Vec<ParticipantId> = self
            .members
            .iter()
            .copied()
            .filter(|id| {
                world.participant(*id).is_some_and(|p| {
                    p.online && p.position.within(&self.trigger, self.abort_radius)
                })
            })
            .collect();

        if present.is_empty() {
            return CountdownStep::Aborted;
        }
        if self.remaining == 0 {
            return CountdownStep::Ready(present);
        }

        let remaining = self.remaining;
        self.remaining -= 1;
        CountdownStep::Tick {
            remaining,
            announce: remaining <= 5 || remaining % 5 == 0,
        }
    }
}
