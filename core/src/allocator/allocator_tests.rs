//! Tests for SpatialAllocator reservation, release and cooldown behaviour

use std::sync::{Arc, Mutex};
use std::time::Duration;

use delve_types::Bounds;

use super::{AllocatorError, AllocatorSettings, OccupiedSites, SpatialAllocator};
use crate::world::{FlatWorld, LocationKey, ManualClock, ParticipantId};

// ═══════════════════════════════════════════════════════════════════════════
// Test Helpers
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct FixedSites {
    sites: Mutex<Vec<(ParticipantId, LocationKey)>>,
}

impl OccupiedSites for FixedSites {
    fn in_progress_sites(&self, exclude: ParticipantId) -> Vec<LocationKey> {
        self.sites
            .lock()
            .unwrap()
            .iter()
            .filter(|(owner, _)| *owner != exclude)
            .map(|(_, key)| key.clone())
            .collect()
    }
}

fn settings(bounds: Bounds, min_distance: i32) -> AllocatorSettings {
    AllocatorSettings {
        bounds,
        min_distance,
        max_attempts: 50,
        reuse_cooldown: Duration::from_secs(30 * 60),
    }
}

/// Bounds so small that only one instance can ever fit at min distance 20.
fn tiny() -> Bounds {
    Bounds {
        min_x: 0,
        max_x: 10,
        min_z: 0,
        max_z: 10,
    }
}

fn make_allocator(
    settings: AllocatorSettings,
) -> (SpatialAllocator, Arc<ManualClock>, Arc<FixedSites>) {
    let clock = Arc::new(ManualClock::default());
    let sites = Arc::new(FixedSites::default());
    let allocator = SpatialAllocator::new(
        settings,
        Arc::new(FlatWorld::new(64)),
        sites.clone(),
        clock.clone(),
    )
    .unwrap()
    .with_seed(7);
    (allocator, clock, sites)
}

fn p(id: u64) -> ParticipantId {
    ParticipantId(id)
}

// ═══════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn inverted_bounds_are_rejected() {
    let bounds = Bounds {
        min_x: 10,
        max_x: 10,
        min_z: 0,
        max_z: 100,
    };
    let err = settings(bounds, 5).validate_configuration().unwrap_err();
    assert!(matches!(err, AllocatorError::Configuration { .. }));
}

#[test]
fn non_positive_distance_is_rejected() {
    let err = settings(Bounds::default(), 0)
        .validate_configuration()
        .unwrap_err();
    assert!(matches!(err, AllocatorError::Configuration { .. }));
}

#[test]
fn small_area_is_only_a_warning() {
    assert!(settings(tiny(), 20).validate_configuration().is_ok());
}

// ═══════════════════════════════════════════════════════════════════════════
// Reservation
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn reserved_location_sits_on_the_surface() {
    let (allocator, _, _) = make_allocator(settings(Bounds::default(), 50));
    let loc = allocator.reserve("w", p(1)).unwrap();

    assert_eq!(loc.world, "w");
    assert_eq!(loc.y, 65);
    assert!(Bounds::default().contains(loc.x, loc.z));
    assert!(allocator.is_reserved(&loc.key()));
}

#[test]
fn reservations_keep_minimum_distance() {
    let (allocator, _, _) = make_allocator(settings(Bounds::default(), 50));
    let locations: Vec<_> = (0..20)
        .map(|i| allocator.reserve("w", p(i)).unwrap())
        .collect();

    for (i, a) in locations.iter().enumerate() {
        for b in &locations[i + 1..] {
            let d = a.key().distance(&b.key()).unwrap();
            assert!(d >= 50.0, "{a} and {b} are only {d} apart");
        }
    }
    assert_eq!(allocator.active_count(), 20);
}

#[test]
fn concurrent_reservations_never_overlap() {
    let (allocator, _, _) = make_allocator(settings(
        Bounds {
            min_x: 0,
            max_x: 400,
            min_z: 0,
            max_z: 400,
        },
        60,
    ));
    let allocator = Arc::new(allocator);

    let granted: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let allocator = Arc::clone(&allocator);
                scope.spawn(move || {
                    (0..4)
                        .filter_map(|i| allocator.reserve("w", p(t * 10 + i)).ok())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    assert!(!granted.is_empty());
    for (i, a) in granted.iter().enumerate() {
        for b in &granted[i + 1..] {
            assert!(a.key().distance(&b.key()).unwrap() >= 60.0);
        }
    }
    assert_eq!(allocator.active_count(), granted.len());
}

#[test]
fn exhaustion_reports_attempts() {
    let (allocator, _, _) = make_allocator(settings(tiny(), 20));
    allocator.reserve("w", p(1)).unwrap();

    let err = allocator.reserve("w", p(2)).unwrap_err();
    assert_eq!(
        err,
        AllocatorError::Exhausted {
            world: "w".to_string(),
            attempts: 50
        }
    );
}

#[test]
fn other_worlds_do_not_conflict() {
    let (allocator, _, _) = make_allocator(settings(tiny(), 20));
    allocator.reserve("w", p(1)).unwrap();
    assert!(allocator.reserve("nether", p(2)).is_ok());
}

#[test]
fn in_progress_instances_of_others_block_candidates() {
    let (allocator, _, sites) = make_allocator(settings(tiny(), 20));
    sites
        .sites
        .lock()
        .unwrap()
        .push((p(9), LocationKey::new("w", 5, 5)));

    assert!(allocator.reserve("w", p(1)).is_err());
    // The owner's own running instance does not block them
    assert!(allocator.reserve("w", p(9)).is_ok());
}

// ═══════════════════════════════════════════════════════════════════════════
// Release & Cooldown
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn released_location_is_held_back_until_cooldown_expires() {
    let (allocator, clock, _) = make_allocator(settings(tiny(), 20));
    let loc = allocator.reserve("w", p(1)).unwrap();
    allocator.release(&loc, p(1));

    assert_eq!(allocator.active_count(), 0);
    assert_eq!(allocator.recent_count(), 1);
    assert!(allocator.reserve("w", p(2)).is_err());

    clock.advance(Duration::from_secs(29 * 60));
    assert!(allocator.reserve("w", p(2)).is_err());

    clock.advance(Duration::from_secs(61));
    let again = allocator.reserve("w", p(2)).unwrap();
    assert!(allocator.is_reserved(&again.key()));
}

#[test]
fn committing_a_key_clears_its_stale_cooldown_entry() {
    let (allocator, clock, _) = make_allocator(settings(tiny(), 20));
    let loc = allocator.reserve("w", p(1)).unwrap();
    allocator.release(&loc, p(1));
    clock.advance(Duration::from_secs(31 * 60));

    let again = allocator.reserve("w", p(2)).unwrap();
    if again.key() == loc.key() {
        assert_eq!(allocator.recent_count(), 0);
    } else {
        assert_eq!(allocator.recent_count(), 1);
    }
}

#[test]
fn releasing_unknown_or_twice_is_harmless() {
    let (allocator, _, _) = make_allocator(settings(Bounds::default(), 50));
    let stray = LocationKey::new("w", 100, 100).at_height(65);

    allocator.release(&stray, p(1));
    allocator.release(&stray, p(1));

    assert_eq!(allocator.active_count(), 0);
    assert_eq!(allocator.recent_count(), 1);
}

#[test]
fn sweep_purges_only_expired_entries() {
    let (allocator, clock, _) = make_allocator(settings(Bounds::default(), 50));
    allocator.release(&LocationKey::new("w", 0, 0).at_height(65), p(1));
    clock.advance(Duration::from_secs(20 * 60));
    allocator.release(&LocationKey::new("w", 500, 500).at_height(65), p(2));

    assert_eq!(allocator.sweep_recent(), 0);
    clock.advance(Duration::from_secs(11 * 60));
    assert_eq!(allocator.sweep_recent(), 1);
    assert_eq!(allocator.recent_count(), 1);
}

#[tokio::test]
async fn background_sweeper_purges_expired_entries() {
    let (allocator, clock, _) = make_allocator(settings(Bounds::default(), 50));
    let allocator = Arc::new(allocator);
    allocator.release(&LocationKey::new("w", 0, 0).at_height(65), p(1));
    clock.advance(Duration::from_secs(31 * 60));

    let handle = allocator.spawn_sweeper(Duration::from_millis(10));
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.abort();

    assert_eq!(allocator.recent_count(), 0);
}

#[test]
fn clear_forgets_everything() {
    let (allocator, _, _) = make_allocator(settings(Bounds::default(), 50));
    let loc = allocator.reserve("w", p(1)).unwrap();
    allocator.reserve("w", p(2)).unwrap();
    allocator.release(&loc, p(1));

    allocator.clear();
    assert_eq!(allocator.active_count(), 0);
    assert_eq!(allocator.recent_count(), 0);
}
