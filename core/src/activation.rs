//! Activation token drops on skill progression.
//!
//! A token is what a participant later consumes to open an instance. At most
//! one can be held per skill, and issuing one starts the skill's cooldown.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ValidatedConfig;
use crate::store::InstanceStore;
use crate::world::ParticipantId;

/// Result of a single progression event.
#[derive(Debug, Clone, PartialEq)]
pub enum IssueOutcome {
    UnknownSkill,
    SkillDisabled,
    BelowLevel { required: u32 },
    AlreadyHeld,
    OnCooldown { remaining: Duration },
    /// The drop roll failed
    Unlucky,
    Issued { cooldown: Duration },
}

impl IssueOutcome {
    pub fn is_issued(&self) -> bool {
        matches!(self, IssueOutcome::Issued { .. })
    }
}

pub struct TokenIssuer {
    config: Arc<ValidatedConfig>,
    store: InstanceStore,
}

impl TokenIssuer {
    pub fn new(config: Arc<ValidatedConfig>, store: InstanceStore) -> Self {
        Self { config, store }
    }

    /// Handles a level-up of `skill` to `level`, rolling the drop with `rng`.
    pub fn on_progress<R: Rng + ?Sized>(
        &self,
        participant: ParticipantId,
        skill: &str,
        level: u32,
        rng: &mut R,
    ) -> IssueOutcome {
        let Ok(config) = self.config.skill(skill) else {
            return IssueOutcome::UnknownSkill;
        };
        if !config.enabled {
            return IssueOutcome::SkillDisabled;
        }
        if level < config.level_required {
            return IssueOutcome::BelowLevel {
                required: config.level_required,
            };
        }
        if self.store.has_received_reward(participant, skill) {
            return IssueOutcome::AlreadyHeld;
        }
        if self.store.is_on_cooldown(participant, skill) {
            return IssueOutcome::OnCooldown {
                remaining: self.store.cooldown_remaining(participant, skill),
            };
        }

        let roll: f64 = rng.gen_range(0.0..1.0);
        if roll >= config.drop_chance {
            tracing::trace!(participant = %participant, skill, roll, "Token roll failed");
            return IssueOutcome::Unlucky;
        }

        self.store.set_reward_received(participant, skill, true);
        self.store.set_cooldown(participant, skill, config.cooldown);
        tracing::info!(participant = %participant, skill, level, "Activation token issued");
        IssueOutcome::Issued {
            cooldown: config.cooldown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delve_types::{BossConfig, DungeonTypeConfig, EngineSettings, LootConfig, SkillConfig};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::world::ManualClock;

    fn issuer(name: &str, drop_chance: f64) -> (TokenIssuer, InstanceStore, Arc<ManualClock>) {
        let mut settings = EngineSettings::default();
        settings.skills.insert(
            "mining".to_string(),
            SkillConfig {
                drop_chance,
                level_required: 50,
                cooldown: Duration::from_secs(3600),
                ..SkillConfig::default()
            },
        );
        settings.skills.insert(
            "fishing".to_string(),
            SkillConfig {
                enabled: false,
                ..SkillConfig::default()
            },
        );
        let dungeon = DungeonTypeConfig {
            id: "crypt".to_string(),
            weight: 1,
            structure: None,
            waves: Vec::new(),
            boss: BossConfig {
                id: "lich".to_string(),
                spawn_delay: None,
            },
            loot: LootConfig::default(),
        };
        let config = Arc::new(ValidatedConfig::new(settings, vec![dungeon]).unwrap());

        let dir = std::env::temp_dir().join(format!("delve-activation-{}-{name}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let clock = Arc::new(ManualClock::default());
        let store = InstanceStore::open(dir.join("instances.json"), clock.clone()).unwrap();
        (TokenIssuer::new(config, store.clone()), store, clock)
    }

    #[test]
    fn guaranteed_drop_issues_once_then_holds() {
        let (issuer, store, _) = issuer("issue", 1.0);
        let mut rng = StdRng::seed_from_u64(1);

        let first = issuer.on_progress(ParticipantId(1), "mining", 50, &mut rng);
        assert_eq!(
            first,
            IssueOutcome::Issued {
                cooldown: Duration::from_secs(3600)
            }
        );
        assert!(store.has_received_reward(ParticipantId(1), "mining"));
        assert!(store.is_on_cooldown(ParticipantId(1), "mining"));

        let second = issuer.on_progress(ParticipantId(1), "mining", 51, &mut rng);
        assert_eq!(second, IssueOutcome::AlreadyHeld);
    }

    #[test]
    fn cooldown_blocks_after_the_token_is_used() {
        let (issuer, store, clock) = issuer("cooldown", 1.0);
        let mut rng = StdRng::seed_from_u64(2);
        issuer.on_progress(ParticipantId(1), "mining", 60, &mut rng);

        // Token consumed and dungeon completed
        store.set_reward_received(ParticipantId(1), "mining", false);
        clock.advance(Duration::from_secs(600));
        assert_eq!(
            issuer.on_progress(ParticipantId(1), "mining", 61, &mut rng),
            IssueOutcome::OnCooldown {
                remaining: Duration::from_secs(3000)
            }
        );

        clock.advance(Duration::from_secs(3000));
        assert!(issuer.on_progress(ParticipantId(1), "mining", 62, &mut rng).is_issued());
    }

    #[test]
    fn ineligible_events_never_roll() {
        let (issuer, store, _) = issuer("ineligible", 1.0);
        let mut rng = StdRng::seed_from_u64(3);

        assert_eq!(
            issuer.on_progress(ParticipantId(1), "mining", 49, &mut rng),
            IssueOutcome::BelowLevel { required: 50 }
        );
        assert_eq!(
            issuer.on_progress(ParticipantId(1), "fishing", 5000, &mut rng),
            IssueOutcome::SkillDisabled
        );
        assert_eq!(
            issuer.on_progress(ParticipantId(1), "archery", 5000, &mut rng),
            IssueOutcome::UnknownSkill
        );
        assert!(!store.has_received_reward(ParticipantId(1), "mining"));
    }

    #[test]
    fn zero_chance_never_drops() {
        let (issuer, store, _) = issuer("zero", 0.0);
        let mut rng = StdRng::seed_from_u64(4);
        for level in 50..150 {
            assert_eq!(
                issuer.on_progress(ParticipantId(1), "mining", level, &mut rng),
                IssueOutcome::Unlucky
            );
        }
        assert!(!store.is_on_cooldown(ParticipantId(1), "mining"));
    }
}
