use hashbrown::HashMap;
use std::sync::RwLock;

use super::{Block, ParticipantId, ParticipantState, Position, WorldView};

/// In-memory world: solid ground up to `ground_y`, air above, with per-block
/// overrides and a participant roster. Backs headless simulation and tests.
#[derive(Debug)]
pub struct FlatWorld {
    ground_y: i32,
    min_height: i32,
    max_height: i32,
    overrides: RwLock<HashMap<(String, i32, i32, i32), Block>>,
    participants: RwLock<HashMap<ParticipantId, ParticipantState>>,
}

impl FlatWorld {
    pub fn new(ground_y: i32) -> Self {
        Self {
            ground_y,
            min_height: -64,
            max_height: 320,
            overrides: RwLock::new(HashMap::new()),
            participants: RwLock::new(HashMap::new()),
        }
    }

    pub fn ground_y(&self) -> i32 {
        self.ground_y
    }

    pub fn set_block(&self, world: &str, x: i32, y: i32, z: i32, block: Block) {
        let mut overrides = self.overrides.write().unwrap_or_else(|e| e.into_inner());
        overrides.insert((world.to_string(), x, y, z), block);
    }

    /// Adds (or replaces) an online participant.
    pub fn add_participant(&self, id: ParticipantId, position: Position) {
        let mut participants = self.participants.write().unwrap_or_else(|e| e.into_inner());
        participants.insert(
            id,
            ParticipantState {
                id,
                online: true,
                position,
            },
        );
    }

    pub fn set_online(&self, id: ParticipantId, online: bool) {
        let mut participants = self.participants.write().unwrap_or_else(|e| e.into_inner());
        if let Some(p) = participants.get_mut(&id) {
            p.online = online;
        }
    }

    pub fn move_participant(&self, id: ParticipantId, position: Position) {
        let mut participants = self.participants.write().unwrap_or_else(|e| e.into_inner());
        if let Some(p) = participants.get_mut(&id) {
            p.position = position;
        }
    }
}

impl WorldView for FlatWorld {
    fn block(&self, world: &str, x: i32, y: i32, z: i32) -> Block {
        let overrides = self.overrides.read().unwrap_or_else(|e| e.into_inner());
        if let Some(block) = overrides.get(&(world.to_string(), x, y, z)) {
            return *block;
        }
        if y <= self.ground_y { Block::Solid } else { Block::Air }
    }

    fn highest_block_y(&self, world: &str, x: i32, z: i32) -> i32 {
        (self.min_height..self.max_height)
            .rev()
            .find(|&y| self.block(world, x, y, z) != Block::Air)
            .unwrap_or(self.min_height)
    }

    fn min_height(&self, _world: &str) -> i32 {
        self.min_height
    }

    fn max_height(&self, _world: &str) -> i32 {
        self.max_height
    }

    fn participant(&self, id: ParticipantId) -> Option<ParticipantState> {
        let participants = self.participants.read().unwrap_or_else(|e| e.into_inner());
        participants.get(&id).cloned()
    }

    fn participants_in(&self, world: &str) -> Vec<ParticipantState> {
        let participants = self.participants.read().unwrap_or_else(|e| e.into_inner());
        let mut found: Vec<_> = participants
            .values()
            .filter(|p| p.online && p.position.world == world)
            .cloned()
            .collect();
        found.sort_by_key(|p| p.id);
        found
    }
}
