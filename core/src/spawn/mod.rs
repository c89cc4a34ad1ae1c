//! Spawn point resolution for wave mobs and bosses.
//!
//! A point is *safe* when the block below is solid and not a liquid, and the
//! feet and head blocks are passable. Mob points additionally need no lava or
//! magma under their 3×3 footprint; boss points need a clear 3×3×3 column on
//! top of that. When nothing validates, resolution degrades to a point one
//! block above the dungeon centre rather than failing.

mod error;

pub use error::SpawnValidationError;

use rand::Rng;
use std::f64::consts::TAU;

use crate::world::{Location, WorldView};

/// Mob candidates are drawn within this many blocks of the centre.
pub const MOB_SPAWN_RADIUS: f64 = 15.0;
/// Accepted mob points are at least this far apart.
pub const MIN_MOB_SEPARATION: f64 = 3.0;
/// Fallback mob points are offset by at most this much on each axis.
pub const FALLBACK_OFFSET: i32 = 5;
/// Ring offsets tried for the boss, on both axes.
pub const BOSS_OFFSETS: [i32; 5] = [0, 3, -3, 6, -6];

const HEIGHT_SCAN_BELOW: i32 = 5;
const HEIGHT_SCAN_ABOVE: i32 = 10;

#[derive(Debug, Clone, Copy, Default)]
pub struct SpawnResolver;

impl SpawnResolver {
    pub fn new() -> Self {
        Self
    }

    /// Exactly `count` points around `center`, degrading to fallbacks when
    /// random candidates run out.
    pub fn mob_spawn_points<R: Rng + ?Sized>(
        &self,
        world: &dyn WorldView,
        center: &Location,
        count: usize,
        rng: &mut R,
    ) -> Vec<Location> {
        let mut points: Vec<Location> = Vec::with_capacity(count);
        for _ in 0..count * 3 {
            if points.len() >= count {
                break;
            }
            let angle = rng.gen_range(0.0..TAU);
            let distance = rng.gen_range(0.0..MOB_SPAWN_RADIUS);
            let x = center.x + (distance * angle.cos()) as i32;
            let z = center.z + (distance * angle.sin()) as i32;
            let candidate = self.safe_height(world, &Location::new(center.world.clone(), x, center.y, z));

            let crowded = points
                .iter()
                .any(|p| p.distance(&candidate).is_some_and(|d| d < MIN_MOB_SEPARATION));
            if !crowded && self.is_valid_mob_point(world, &candidate) {
                points.push(candidate);
            }
        }

        if points.len() < count {
            let shortfall = SpawnValidationError::MobPointShortfall {
                center: center.clone(),
                wanted: count,
                found: points.len(),
            };
            tracing::debug!(error = %shortfall, "Using fallback mob spawn points");
        }

        while points.len() < count {
            let offset = center.offset(
                rng.gen_range(-FALLBACK_OFFSET..=FALLBACK_OFFSET),
                0,
                rng.gen_range(-FALLBACK_OFFSET..=FALLBACK_OFFSET),
            );
            let fallback = self.safe_height(world, &offset);
            if self.is_valid_mob_point(world, &fallback) {
                points.push(fallback);
            } else {
                points.push(center.offset(0, 1, 0));
            }
        }
        points
    }

    /// Highest valid point on the boss ring, else the centre.
    pub fn try_boss_spawn_point(
        &self,
        world: &dyn WorldView,
        center: &Location,
    ) -> Result<Location, SpawnValidationError> {
        let best = BOSS_OFFSETS
            .iter()
            .flat_map(|&dx| BOSS_OFFSETS.iter().map(move |&dz| (dx, dz)))
            .filter(|&offset| offset != (0, 0))
            .map(|(dx, dz)| self.safe_height(world, &center.offset(dx, 0, dz)))
            .filter(|candidate| self.is_valid_boss_point(world, candidate))
            .reduce(|best, candidate| if candidate.y > best.y { candidate } else { best });

        if let Some(point) = best {
            return Ok(point);
        }

        let centered = self.safe_height(world, center);
        if self.is_valid_boss_point(world, &centered) {
            return Ok(centered);
        }
        Err(SpawnValidationError::NoSafeBossPoint {
            center: center.clone(),
        })
    }

    pub fn boss_spawn_point(&self, world: &dyn WorldView, center: &Location) -> Location {
        self.try_boss_spawn_point(world, center).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Boss spawning one block above the dungeon centre");
            center.offset(0, 1, 0)
        })
    }

    /// First safe height scanning upward from `y - 5` to `y + 10`, else `y + 1`.
    pub fn safe_height(&self, world: &dyn WorldView, at: &Location) -> Location {
        let start = (at.y - HEIGHT_SCAN_BELOW).max(world.min_height(&at.world));
        let end = (at.y + HEIGHT_SCAN_ABOVE).min(world.max_height(&at.world) - 2);
        (start..=end)
            .map(|y| Location::new(at.world.clone(), at.x, y, at.z))
            .find(|candidate| is_safe_height(world, candidate))
            .unwrap_or_else(|| at.offset(0, 1, 0))
    }

    pub fn is_valid_mob_point(&self, world: &dyn WorldView, at: &Location) -> bool {
        if !is_safe_height(world, at) {
            return false;
        }
        for dx in -1..=1 {
            for dz in -1..=1 {
                if world
                    .block(&at.world, at.x + dx, at.y - 1, at.z + dz)
                    .is_hazard()
                {
                    return false;
                }
            }
        }
        true
    }

    pub fn is_valid_boss_point(&self, world: &dyn WorldView, at: &Location) -> bool {
        if !self.is_valid_mob_point(world, at) {
            return false;
        }
        for dx in -1..=1 {
            for dz in -1..=1 {
                for dy in 0..=2 {
                    if !world
                        .block(&at.world, at.x + dx, at.y + dy, at.z + dz)
                        .is_passable()
                    {
                        return false;
                    }
                }
            }
        }
        true
    }
}

fn is_safe_height(world: &dyn WorldView, at: &Location) -> bool {
    let ground = world.block(&at.world, at.x, at.y - 1, at.z);
    let feet = world.block(&at.world, at.x, at.y, at.z);
    let head = world.block(&at.world, at.x, at.y + 1, at.z);
    ground.is_solid() && !ground.is_liquid() && feet.is_passable() && head.is_passable()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{Block, FlatWorld};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn center() -> Location {
        Location::new("w", 0, 65, 0)
    }

    #[test]
    fn safe_height_finds_the_surface() {
        let world = FlatWorld::new(64);
        let resolver = SpawnResolver::new();
        assert_eq!(resolver.safe_height(&world, &Location::new("w", 3, 62, 3)).y, 65);
        assert_eq!(resolver.safe_height(&world, &Location::new("w", 3, 70, 3)).y, 65);
    }

    #[test]
    fn safe_height_falls_back_one_up() {
        let world = FlatWorld::new(64);
        let resolver = SpawnResolver::new();
        // Surface far below the scan window
        let high = Location::new("w", 0, 100, 0);
        assert_eq!(resolver.safe_height(&world, &high).y, 101);
    }

    #[test]
    fn mob_points_are_valid_and_spread_out() {
        let world = FlatWorld::new(64);
        let resolver = SpawnResolver::new();
        let mut rng = StdRng::seed_from_u64(3);

        let points = resolver.mob_spawn_points(&world, &center(), 6, &mut rng);
        assert_eq!(points.len(), 6);
        for p in &points {
            assert!(resolver.is_valid_mob_point(&world, p), "{p} is not valid");
            assert!(p.distance(&center()).unwrap() <= MOB_SPAWN_RADIUS + 1.0);
        }
    }

    #[test]
    fn lava_footprint_rejects_mob_point() {
        let world = FlatWorld::new(64);
        let resolver = SpawnResolver::new();
        let spot = Location::new("w", 10, 65, 10);
        assert!(resolver.is_valid_mob_point(&world, &spot));

        world.set_block("w", 11, 64, 9, Block::Lava);
        assert!(!resolver.is_valid_mob_point(&world, &spot));
    }

    #[test]
    fn hazardous_area_still_yields_requested_count() {
        let world = FlatWorld::new(64);
        for x in -25..=25 {
            for z in -25..=25 {
                world.set_block("w", x, 64, z, Block::Magma);
            }
        }
        let resolver = SpawnResolver::new();
        let mut rng = StdRng::seed_from_u64(1);

        let points = resolver.mob_spawn_points(&world, &center(), 4, &mut rng);
        assert_eq!(points, vec![center().offset(0, 1, 0); 4]);
    }

    #[test]
    fn boss_prefers_highest_ring_point() {
        let world = FlatWorld::new(64);
        // A raised platform under the (6, 6) ring point
        for x in 4..=8 {
            for z in 4..=8 {
                world.set_block("w", x, 65, z, Block::Solid);
                world.set_block("w", x, 66, z, Block::Solid);
            }
        }
        let resolver = SpawnResolver::new();

        let point = resolver.try_boss_spawn_point(&world, &center()).unwrap();
        assert_eq!(point, Location::new("w", 6, 67, 6));
    }

    #[test]
    fn boss_falls_back_above_center_when_boxed_in() {
        let world = FlatWorld::new(64);
        // Low ceiling everywhere nearby
        for x in -10..=10 {
            for z in -10..=10 {
                world.set_block("w", x, 67, z, Block::Solid);
            }
        }
        let resolver = SpawnResolver::new();

        assert!(matches!(
            resolver.try_boss_spawn_point(&world, &center()),
            Err(SpawnValidationError::NoSafeBossPoint { .. })
        ));
        assert_eq!(resolver.boss_spawn_point(&world, &center()), center().offset(0, 1, 0));
    }
}
