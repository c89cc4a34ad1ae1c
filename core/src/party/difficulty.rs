/// Encounter strength for a given party size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifficultyTier {
    pub name: &'static str,
    pub mob_multiplier: f64,
    pub boss_multiplier: f64,
    pub loot_multiplier: f64,
}

pub const SOLO: DifficultyTier = DifficultyTier {
    name: "Solo",
    mob_multiplier: 1.0,
    boss_multiplier: 1.0,
    loot_multiplier: 1.0,
};

pub const DUO: DifficultyTier = DifficultyTier {
    name: "Duo",
    mob_multiplier: 1.5,
    boss_multiplier: 1.3,
    loot_multiplier: 1.2,
};

pub const TRIO: DifficultyTier = DifficultyTier {
    name: "Trio",
    mob_multiplier: 2.0,
    boss_multiplier: 1.6,
    loot_multiplier: 1.5,
};

pub const SQUAD: DifficultyTier = DifficultyTier {
    name: "Squad",
    mob_multiplier: 2.5,
    boss_multiplier: 2.0,
    loot_multiplier: 2.0,
};

impl DifficultyTier {
    pub fn for_party_size(size: usize) -> DifficultyTier {
        match size {
            0 | 1 => SOLO,
            2 => DUO,
            3 => TRIO,
            _ => SQUAD,
        }
    }

    /// Scales a wave to `ceil(len × mob_multiplier)` mobs by cycling the base list.
    pub fn scale_wave(&self, base: &[String]) -> Vec<String> {
        if base.is_empty() {
            return Vec::new();
        }
        let target = (base.len() as f64 * self.mob_multiplier).ceil() as usize;
        base.iter().cycle().take(target).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mobs(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn tiers_by_party_size() {
        assert_eq!(DifficultyTier::for_party_size(1), SOLO);
        assert_eq!(DifficultyTier::for_party_size(2).name, "Duo");
        let trio = DifficultyTier::for_party_size(3);
        assert_eq!(trio.name, "Trio");
        assert_eq!(trio.mob_multiplier, 2.0);
        assert_eq!(DifficultyTier::for_party_size(4), SQUAD);
        assert_eq!(DifficultyTier::for_party_size(9), SQUAD);
    }

    #[test]
    fn trio_doubles_a_wave() {
        let scaled = TRIO.scale_wave(&mobs(&["zombie", "zombie"]));
        assert_eq!(scaled, mobs(&["zombie"; 4]));
    }

    #[test]
    fn scaling_rounds_up_and_cycles() {
        let scaled = DUO.scale_wave(&mobs(&["zombie", "skeleton", "spider"]));
        assert_eq!(
            scaled,
            mobs(&["zombie", "skeleton", "spider", "zombie", "skeleton"])
        );
        assert_eq!(SOLO.scale_wave(&mobs(&["a", "b"])).len(), 2);
        assert!(SQUAD.scale_wave(&[]).is_empty());
    }
}
