//! Party formation, difficulty tiers and weighted dungeon selection.

mod difficulty;
mod formation;
mod registry;
mod selection;

pub use difficulty::{DUO, DifficultyTier, SOLO, SQUAD, TRIO};
pub use formation::{Countdown, CountdownStep, PartyResolver};
pub use registry::PartyRegistry;
pub use selection::WeightedTable;
