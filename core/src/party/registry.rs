use hashbrown::HashMap;
use std::sync::Arc;

use crate::world::ParticipantId;

/// Party membership of participants in running instances.
#[derive(Debug, Default)]
pub struct PartyRegistry {
    parties: HashMap<ParticipantId, Arc<[ParticipantId]>>,
}

impl PartyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `members` as one party; each member maps to the full roster.
    pub fn register(&mut self, members: &[ParticipantId]) {
        let roster: Arc<[ParticipantId]> = members.into();
        for member in members {
            self.parties.insert(*member, Arc::clone(&roster));
        }
    }

    pub fn members_of(&self, participant: ParticipantId) -> Option<&[ParticipantId]> {
        self.parties.get(&participant).map(|r| &r[..])
    }

    pub fn is_in_party(&self, participant: ParticipantId) -> bool {
        self.parties.contains_key(&participant)
    }

    /// Removes the party containing `participant`, for every member.
    pub fn remove(&mut self, participant: ParticipantId) {
        if let Some(roster) = self.parties.remove(&participant) {
            for member in roster.iter() {
                self.parties.remove(member);
            }
        }
    }

    pub fn clear(&mut self) {
        self.parties.clear();
    }

    pub fn len(&self) -> usize {
        self.parties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parties.is_empty()
    }
}
