use rand::Rng;

use crate::config::ConfigError;

/// Items with integer weights, drawn in insertion order.
#[derive(Debug, Clone)]
pub struct WeightedTable<T> {
    entries: Vec<(T, u32)>,
    total: u64,
}

impl<T> WeightedTable<T> {
    pub fn new(entries: Vec<(T, u32)>) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Err(ConfigError::EmptySelection);
        }
        if let Some(index) = entries.iter().position(|(_, w)| *w == 0) {
            return Err(ConfigError::ZeroWeight { index });
        }
        let total = entries.iter().map(|(_, w)| u64::from(*w)).sum();
        Ok(Self { entries, total })
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry whose cumulative weight exceeds `draw`.
    ///
    /// `draw` is expected in `[0, total)`; larger values land on the last entry.
    pub fn pick(&self, draw: u64) -> &T {
        let mut cumulative = 0u64;
        for (item, weight) in &self.entries {
            cumulative += u64::from(*weight);
            if draw < cumulative {
                return item;
            }
        }
        // entries is non-empty by construction
        &self.entries[self.entries.len() - 1].0
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> &T {
        self.pick(rng.gen_range(0..self.total))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&T, u32)> {
        self.entries.iter().map(|(item, w)| (item, *w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn table() -> WeightedTable<&'static str> {
        WeightedTable::new(vec![("dragon", 1), ("goblin", 4)]).unwrap()
    }

    #[test]
    fn fixed_draws_follow_cumulative_weights() {
        let t = table();
        assert_eq!(t.total(), 5);
        assert_eq!(*t.pick(0), "dragon");
        assert_eq!(*t.pick(1), "goblin");
        assert_eq!(*t.pick(2), "goblin");
        assert_eq!(*t.pick(4), "goblin");
        assert_eq!(*t.pick(99), "goblin");
    }

    #[test]
    fn sampling_converges_to_weights() {
        let t = table();
        let mut rng = StdRng::seed_from_u64(42);
        let n = 20_000;
        let dragons = (0..n).filter(|_| *t.sample(&mut rng) == "dragon").count();
        let ratio = dragons as f64 / n as f64;
        assert!((ratio - 0.2).abs() < 0.02, "dragon ratio {ratio}");
    }

    #[test]
    fn empty_and_zero_weight_tables_are_rejected() {
        assert!(matches!(
            WeightedTable::<u8>::new(Vec::new()),
            Err(ConfigError::EmptySelection)
        ));
        assert!(matches!(
            WeightedTable::new(vec![("a", 2), ("b", 0)]),
            Err(ConfigError::ZeroWeight { index: 1 })
        ));
    }
}
