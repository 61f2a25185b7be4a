use crate::domain::{Address, Decimal, EligibilityResult, Holding, InstrumentId, Snapshot};

/// Decides whether a holder "held through" the match.
///
/// An instrument counts as maintained when its post-match balance is at least
/// the pre-match balance. The holder is eligible when the maintained fraction
/// of pre-match instruments reaches `threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EligibilityEvaluator {
    threshold: Decimal,
}

impl EligibilityEvaluator {
    pub fn new(threshold: Decimal) -> Self {
        Self { threshold }
    }

    /// Evaluate `address` against the two snapshots. A missing post-match
    /// snapshot means nothing was maintained.
    pub fn evaluate(
        &self,
        pre: &Snapshot,
        post: Option<&Snapshot>,
        address: &Address,
    ) -> EligibilityResult {
        let pre_holdings = pre.holdings_of(address);
        let post_holdings = post.map(|s| s.holdings_of(address)).unwrap_or(&[]);
        self.evaluate_holdings(address, pre_holdings, post_holdings)
    }

    pub fn evaluate_holdings(
        &self,
        address: &Address,
        pre: &[Holding],
        post: &[Holding],
    ) -> EligibilityResult {
        let mut instruments: Vec<_> = pre
            .iter()
            .filter(|h| h.balance > 0)
            .map(|h| &h.instrument_id)
            .collect();
        instruments.sort();
        instruments.dedup();

        let total_count = instruments.len() as i64;
        if total_count == 0 {
            return EligibilityResult {
                address: address.clone(),
                eligible: false,
                maintained_count: 0,
                total_count: 0,
                maintained_ratio: Decimal::zero(),
            };
        }

        let maintained_count = instruments
            .iter()
            .filter(|&&instrument| balance_in(post, instrument) >= balance_in(pre, instrument))
            .count() as i64;

        let maintained_ratio = Decimal::new(maintained_count.into())
            .checked_div(Decimal::new(total_count.into()))
            .unwrap_or_default();

        EligibilityResult {
            address: address.clone(),
            eligible: maintained_ratio >= self.threshold,
            maintained_count,
            total_count,
            maintained_ratio,
        }
    }
}

fn balance_in(holdings: &[Holding], instrument: &InstrumentId) -> u128 {
    holdings
        .iter()
        .filter(|h| &h.instrument_id == instrument)
        .map(|h| h.balance)
        .fold(0u128, |acc, b| acc.saturating_add(b))
}

impl Default for EligibilityEvaluator {
    fn default() -> Self {
        Self::new(Decimal::new(rust_decimal::Decimal::new(5, 1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::{compute_stats, group_balances, holders_digest};
    use crate::domain::{Phase, TimeMs, TournamentId};

    fn addr(s: &str) -> Address {
        Address::new(s.to_string())
    }

    fn snapshot(phase: Phase, entries: &[(&str, &str, u128)]) -> Snapshot {
        let holders = group_balances(entries.iter().map(|(a, i, b)| {
            (addr(a), InstrumentId::new(i.to_string()), *b)
        }));
        let stats = compute_stats(&holders).unwrap();
        Snapshot {
            tournament_id: TournamentId::new("t1".to_string()),
            phase,
            captured_at_block: 1,
            captured_at_time: TimeMs::new(0),
            ledger_address: String::new(),
            digest: holders_digest(&holders),
            holders,
            total_holder_entries: stats.total_holder_entries,
            total_tokens: stats.total_tokens,
            unique_address_count: stats.unique_address_count,
        }
    }

    fn ratio(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_all_maintained_or_increased_is_eligible() {
        let pre = snapshot(Phase::PreMatch, &[("0xa", "P1", 100), ("0xa", "P2", 50)]);
        let post = snapshot(Phase::PostMatch, &[("0xa", "P1", 100), ("0xa", "P2", 80)]);

        let result = EligibilityEvaluator::default().evaluate(&pre, Some(&post), &addr("0xa"));
        assert!(result.eligible);
        assert_eq!(result.maintained_count, 2);
        assert_eq!(result.total_count, 2);
        assert_eq!(result.maintained_ratio, Decimal::one());
    }

    #[test]
    fn test_partial_sell_breaks_maintenance() {
        let pre = snapshot(
            Phase::PreMatch,
            &[("0xa", "P1", 100), ("0xa", "P2", 50), ("0xa", "P3", 10)],
        );
        let post = snapshot(
            Phase::PostMatch,
            &[("0xa", "P1", 99), ("0xa", "P2", 50), ("0xa", "P3", 5)],
        );

        let result = EligibilityEvaluator::default().evaluate(&pre, Some(&post), &addr("0xa"));
        assert_eq!(result.maintained_count, 1);
        assert_eq!(result.total_count, 3);
        assert!(!result.eligible);
    }

    #[test]
    fn test_exactly_half_meets_default_threshold() {
        let pre = snapshot(Phase::PreMatch, &[("0xa", "P1", 100), ("0xa", "P2", 50)]);
        let post = snapshot(Phase::PostMatch, &[("0xa", "P1", 100)]);

        let result = EligibilityEvaluator::default().evaluate(&pre, Some(&post), &addr("0xa"));
        assert_eq!(result.maintained_ratio, ratio("0.5"));
        assert!(result.eligible);

        let strict = EligibilityEvaluator::new(ratio("0.75"));
        assert!(!strict.evaluate(&pre, Some(&post), &addr("0xa")).eligible);
    }

    #[test]
    fn test_absent_from_pre_is_not_eligible() {
        let pre = snapshot(Phase::PreMatch, &[("0xa", "P1", 100)]);
        let post = snapshot(Phase::PostMatch, &[("0xb", "P1", 100)]);

        let result = EligibilityEvaluator::default().evaluate(&pre, Some(&post), &addr("0xb"));
        assert!(!result.eligible);
        assert_eq!(result.total_count, 0);
        assert!(result.maintained_ratio.is_zero());
    }

    #[test]
    fn test_absent_from_post_maintains_nothing() {
        let pre = snapshot(Phase::PreMatch, &[("0xa", "P1", 100)]);
        let post = snapshot(Phase::PostMatch, &[]);

        let result = EligibilityEvaluator::default().evaluate(&pre, Some(&post), &addr("0xa"));
        assert!(!result.eligible);
        assert_eq!(result.maintained_count, 0);
        assert_eq!(result.total_count, 1);

        let missing = EligibilityEvaluator::default().evaluate(&pre, None, &addr("0xa"));
        assert_eq!(missing, result);
    }

    #[test]
    fn test_zero_threshold_still_requires_pre_holdings() {
        let evaluator = EligibilityEvaluator::new(Decimal::zero());
        let pre = snapshot(Phase::PreMatch, &[("0xa", "P1", 100)]);
        let post = snapshot(Phase::PostMatch, &[]);

        assert!(evaluator.evaluate(&pre, Some(&post), &addr("0xa")).eligible);
        assert!(!evaluator.evaluate(&pre, Some(&post), &addr("0xz")).eligible);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let pre = snapshot(Phase::PreMatch, &[("0xa", "P1", 100), ("0xa", "P2", 50)]);
        let post = snapshot(Phase::PostMatch, &[("0xa", "P2", 70)]);
        let evaluator = EligibilityEvaluator::default();

        let first = evaluator.evaluate(&pre, Some(&post), &addr("0xa"));
        let second = evaluator.evaluate(&pre, Some(&post), &addr("0xa"));
        assert_eq!(first, second);
    }
}
