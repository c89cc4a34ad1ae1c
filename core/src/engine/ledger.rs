//! Per-boss damage attribution.

use hashbrown::HashMap;

use crate::world::ParticipantId;

/// Number of ranked lines announced at boss defeat.
pub const RANKING_SIZE: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct DamageEntry {
    /// 1-based position in the ranking
    pub rank: usize,
    pub participant: ParticipantId,
    pub damage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankingReport {
    pub top: Vec<DamageEntry>,
    /// The finisher's own line when they placed outside `top`
    pub finisher: Option<DamageEntry>,
    pub total_damage: f64,
}

/// Cumulative damage per attacker, remembered in first-recorded order so
/// that ties rank by who was recorded first.
#[derive(Debug, Clone, Default)]
pub struct DamageLedger {
    order: Vec<ParticipantId>,
    totals: HashMap<ParticipantId, f64>,
}

impl DamageLedger {
    /// Seeds a zero entry for each participant present at boss spawn.
    pub fn with_participants(participants: impl IntoIterator<Item = ParticipantId>) -> Self {
        let mut ledger = Self::default();
        for participant in participants {
            ledger.insert(participant);
        }
        ledger
    }

    fn insert(&mut self, participant: ParticipantId) -> &mut f64 {
        if !self.totals.contains_key(&participant) {
            self.order.push(participant);
        }
        self.totals.entry(participant).or_insert(0.0)
    }

    /// Adds `amount` for `attacker`. Negative and non-finite amounts are ignored.
    pub fn record(&mut self, attacker: ParticipantId, amount: f64) -> bool {
        if !amount.is_finite() || amount < 0.0 {
            return false;
        }
        *self.insert(attacker) += amount;
        true
    }

    pub fn total(&self, participant: ParticipantId) -> f64 {
        self.totals.get(&participant).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Everyone, highest damage first; ties keep first-recorded order.
    pub fn ranking(&self) -> Vec<DamageEntry> {
        let mut ranked: Vec<(ParticipantId, f64)> = self
            .order
            .iter()
            .map(|p| (*p, self.total(*p)))
            .collect();
        // sort_by is stable
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
            .into_iter()
            .enumerate()
            .map(|(i, (participant, damage))| DamageEntry {
                rank: i + 1,
                participant,
                damage,
            })
            .collect()
    }

    /// Top [`RANKING_SIZE`] plus the finisher's entry when it falls outside.
    pub fn report(&self, finisher: Option<ParticipantId>) -> RankingReport {
        let ranking = self.ranking();
        let total_damage = ranking.iter().map(|e| e.damage).sum();
        let finisher = finisher.and_then(|f| {
            ranking
                .iter()
                .skip(RANKING_SIZE)
                .find(|e| e.participant == f)
                .cloned()
        });
        let mut top = ranking;
        top.truncate(RANKING_SIZE);
        RankingReport {
            top,
            finisher,
            total_damage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(id: u64) -> ParticipantId {
        ParticipantId(id)
    }

    fn order(entries: &[DamageEntry]) -> Vec<ParticipantId> {
        entries.iter().map(|e| e.participant).collect()
    }

    #[test]
    fn ranks_by_total_damage() {
        let (a, b, c) = (p(1), p(2), p(3));
        let mut ledger = DamageLedger::with_participants([a, b, c]);
        ledger.record(a, 10.0);
        ledger.record(b, 25.5);
        ledger.record(c, 5.0);

        let ranking = ledger.ranking();
        assert_eq!(order(&ranking), vec![b, a, c]);
        assert_eq!(ranking[0].rank, 1);
        assert_eq!(ranking[0].damage, 25.5);
    }

    #[test]
    fn ties_keep_first_recorded_order() {
        let mut ledger = DamageLedger::default();
        ledger.record(p(5), 10.0);
        ledger.record(p(2), 10.0);
        ledger.record(p(9), 10.0);
        assert_eq!(order(&ledger.ranking()), vec![p(5), p(2), p(9)]);
    }

    #[test]
    fn damage_accumulates_and_rejects_negative() {
        let mut ledger = DamageLedger::with_participants([p(1)]);
        assert!(ledger.record(p(1), 4.0));
        assert!(ledger.record(p(1), 6.0));
        assert!(!ledger.record(p(1), -3.0));
        assert!(!ledger.record(p(1), f64::NAN));
        assert_eq!(ledger.total(p(1)), 10.0);
    }

    #[test]
    fn late_attacker_is_appended() {
        let mut ledger = DamageLedger::with_participants([p(1), p(2)]);
        ledger.record(p(7), 1.0);
        assert_eq!(ledger.len(), 3);
        assert_eq!(order(&ledger.ranking()), vec![p(7), p(1), p(2)]);
    }

    #[test]
    fn report_appends_finisher_outside_top_three() {
        let mut ledger = DamageLedger::default();
        for (id, dmg) in [(1, 40.0), (2, 30.0), (3, 20.0), (4, 10.0), (5, 5.0)] {
            ledger.record(p(id), dmg);
        }

        let report = ledger.report(Some(p(5)));
        assert_eq!(order(&report.top), vec![p(1), p(2), p(3)]);
        let own = report.finisher.unwrap();
        assert_eq!((own.rank, own.participant), (5, p(5)));
        assert_eq!(report.total_damage, 105.0);

        assert!(ledger.report(Some(p(2))).finisher.is_none());
        assert!(ledger.report(None).finisher.is_none());
    }
}
