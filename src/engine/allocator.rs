//! Proportional division of a reward pool among eligible holders.

use crate::domain::{
    Decimal, Holder, HoldingContribution, PerformanceScores, RewardRecord, Snapshot, TokenUnits,
    UnitsError,
};
use thiserror::Error;

use super::EligibilityEvaluator;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("no eligible score-bearing holders")]
    ZeroTotalScore,
    #[error("reward pool must be positive, got {0}")]
    InvalidPool(Decimal),
    #[error(transparent)]
    Units(#[from] UnitsError),
    #[error("arithmetic overflow while {0}")]
    Overflow(&'static str),
}

/// Computes ranked reward records from a pair of snapshots and a score table.
#[derive(Debug, Clone, Copy)]
pub struct RewardAllocator {
    units: TokenUnits,
    evaluator: EligibilityEvaluator,
}

impl RewardAllocator {
    pub fn new(units: TokenUnits, evaluator: EligibilityEvaluator) -> Self {
        Self { units, evaluator }
    }

    pub fn evaluator(&self) -> &EligibilityEvaluator {
        &self.evaluator
    }

    /// Allocate `total` across the eligible holders of `pre`.
    ///
    /// A holder's score is the sum over their pre-match holdings of the
    /// balance in human units times the instrument's points. The post-match
    /// snapshot only decides eligibility. A score that negative points pull
    /// below zero is floored at zero. Records are ordered by reward
    /// descending, ties broken by ascending address, and ranked from 1.
    ///
    /// # Errors
    /// `InvalidPool` for a non-positive pool, `ZeroTotalScore` when no eligible
    /// holder carries a positive score.
    pub fn allocate(
        &self,
        pre: &Snapshot,
        post: Option<&Snapshot>,
        scores: &PerformanceScores,
        total: Decimal,
    ) -> Result<Vec<RewardRecord>, AllocationError> {
        if !total.is_positive() {
            return Err(AllocationError::InvalidPool(total));
        }

        let mut records = Vec::new();
        let mut grand_total = Decimal::zero();

        for holder in &pre.holders {
            let post_holder = post.and_then(|s| s.holder(&holder.address));
            let post_holdings = post_holder.map(|h| h.holdings.as_slice()).unwrap_or(&[]);

            let verdict =
                self.evaluator
                    .evaluate_holdings(&holder.address, &holder.holdings, post_holdings);
            if !verdict.eligible {
                continue;
            }

            let record = self.score_holder(holder, scores)?;
            grand_total = grand_total
                .checked_add(record.total_score)
                .ok_or(AllocationError::Overflow("summing scores"))?;
            records.push(record);
        }

        if !grand_total.is_positive() {
            return Err(AllocationError::ZeroTotalScore);
        }

        for record in &mut records {
            let share = record
                .total_score
                .checked_div(grand_total)
                .ok_or(AllocationError::Overflow("computing share"))?;
            record.reward_amount = total
                .checked_mul(share)
                .ok_or(AllocationError::Overflow("scaling reward"))?;
        }

        records.sort_by(|a, b| {
            b.reward_amount
                .cmp(&a.reward_amount)
                .then_with(|| a.address.cmp(&b.address))
        });
        for (idx, record) in records.iter_mut().enumerate() {
            record.rank = idx as i64 + 1;
        }

        Ok(records)
    }

    fn score_holder(
        &self,
        holder: &Holder,
        scores: &PerformanceScores,
    ) -> Result<RewardRecord, AllocationError> {
        let mut breakdown = Vec::with_capacity(holder.holdings.len());
        let mut total_score = Decimal::zero();
        let mut total_tokens: u128 = 0;

        for holding in &holder.holdings {
            let points = scores.points(&holding.instrument_id);
            let contribution = self
                .units
                .normalize(holding.balance)?
                .checked_mul(points)
                .ok_or(AllocationError::Overflow("weighting holding"))?;

            total_score = total_score
                .checked_add(contribution)
                .ok_or(AllocationError::Overflow("summing holdings"))?;
            total_tokens = total_tokens
                .checked_add(holding.balance)
                .ok_or(AllocationError::Overflow("summing balances"))?;
            breakdown.push(HoldingContribution {
                instrument_id: holding.instrument_id.clone(),
                balance: holding.balance,
                points,
                contribution,
            });
        }

        // Negative points can pull a holder below zero; they then earn nothing.
        if total_score.is_negative() {
            total_score = Decimal::zero();
        }

        Ok(RewardRecord {
            address: holder.address.clone(),
            total_score,
            total_tokens,
            reward_amount: Decimal::zero(),
            rank: 0,
            holding_breakdown: breakdown,
        })
    }
}
