use crate::config::Config;
use crate::db::{RepoError, Repository, RewardBatchRow, StoredRewardRecord};
use crate::domain::{
    Address, Decimal, EligibilityResult, PerformanceScore, Phase, RewardRecord, Snapshot,
    TournamentId,
};
use crate::engine::{AllocationError, EligibilityEvaluator, RewardAllocator};
use crate::ledger::Ledger;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use super::{CaptureError, HolderSnapshotBuilder, SettlementError, SettlementExecutor};
use super::{SettlementSummary, Shutdown};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{phase} snapshot missing for tournament {tournament}")]
    MissingSnapshot {
        tournament: TournamentId,
        phase: Phase,
    },
    #[error("settlement batch {0} not found")]
    BatchNotFound(String),
    #[error("reward allocation failed for tournament {tournament}: {source}")]
    Allocation {
        tournament: TournamentId,
        source: AllocationError,
    },
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Settlement(#[from] SettlementError),
    #[error(transparent)]
    Store(#[from] RepoError),
}

/// The four reward operations, wired to their collaborators.
#[derive(Clone)]
pub struct RewardService {
    repo: Arc<Repository>,
    snapshots: HolderSnapshotBuilder,
    allocator: RewardAllocator,
    settlement: SettlementExecutor,
    min_payout: Decimal,
    shutdown: Shutdown,
}

impl RewardService {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        repo: Arc<Repository>,
        config: &Config,
        shutdown: Shutdown,
    ) -> Self {
        let evaluator = EligibilityEvaluator::new(config.eligibility_threshold);
        Self {
            snapshots: HolderSnapshotBuilder::new(ledger.clone(), repo.clone(), config.clone()),
            allocator: RewardAllocator::new(config.token_units, evaluator),
            settlement: SettlementExecutor::new(
                ledger,
                repo.clone(),
                config.signer_address.clone(),
                config.reward_instrument.clone(),
                config.reward_units,
                config.confirmation_timeout,
            ),
            repo,
            min_payout: config.min_payout,
            shutdown,
        }
    }

    pub async fn capture_snapshot(
        &self,
        tournament: &TournamentId,
        phase: Phase,
    ) -> Result<Snapshot, ServiceError> {
        Ok(self
            .snapshots
            .capture(tournament, phase, None, &self.shutdown)
            .await?)
    }

    pub async fn get_snapshot(
        &self,
        tournament: &TournamentId,
        phase: Phase,
    ) -> Result<Option<Snapshot>, ServiceError> {
        Ok(self.repo.get_snapshot(tournament, phase).await?)
    }

    /// Eligibility of one address. The pre-match snapshot must exist; a
    /// missing post-match snapshot counts as empty.
    pub async fn evaluate_eligibility(
        &self,
        tournament: &TournamentId,
        address: &Address,
    ) -> Result<EligibilityResult, ServiceError> {
        let (pre, post) = self.load_snapshots(tournament).await?;
        Ok(self
            .allocator
            .evaluator()
            .evaluate(&pre, post.as_ref(), address))
    }

    pub async fn store_scores(
        &self,
        tournament: &TournamentId,
        scores: &[PerformanceScore],
    ) -> Result<usize, ServiceError> {
        let stored = self
            .repo
            .replace_performance_scores(tournament, scores)
            .await?;
        info!(tournament = %tournament, scores = stored, "Performance scores stored");
        Ok(stored)
    }

    /// Ranked rewards for `pool`. Reads only; nothing is persisted.
    pub async fn compute_rewards(
        &self,
        tournament: &TournamentId,
        pool: Decimal,
    ) -> Result<Vec<RewardRecord>, ServiceError> {
        let (pre, post) = self.load_snapshots(tournament).await?;
        let scores = self.repo.get_performance_scores(tournament).await?;

        self.allocator
            .allocate(&pre, post.as_ref(), &scores, pool)
            .map_err(|source| ServiceError::Allocation {
                tournament: tournament.clone(),
                source,
            })
    }

    pub async fn settle(
        &self,
        tournament: &TournamentId,
        records: &[RewardRecord],
    ) -> Result<SettlementSummary, ServiceError> {
        Ok(self
            .settlement
            .settle(tournament, records, self.min_payout, &self.shutdown)
            .await?)
    }

    pub async fn settlement_batch(
        &self,
        batch_id: &str,
    ) -> Result<(RewardBatchRow, Vec<StoredRewardRecord>), ServiceError> {
        let batch = self
            .repo
            .get_reward_batch(batch_id)
            .await?
            .ok_or_else(|| ServiceError::BatchNotFound(batch_id.to_string()))?;
        let records = self.repo.list_reward_records(batch_id).await?;
        Ok((batch, records))
    }

    /// Settlement batches of a tournament, oldest first.
    pub async fn settlement_batches(
        &self,
        tournament: &TournamentId,
    ) -> Result<Vec<RewardBatchRow>, ServiceError> {
        Ok(self.repo.list_reward_batches(tournament).await?)
    }

    async fn load_snapshots(
        &self,
        tournament: &TournamentId,
    ) -> Result<(Snapshot, Option<Snapshot>), ServiceError> {
        let pre = self
            .repo
            .get_snapshot(tournament, Phase::PreMatch)
            .await?
            .ok_or_else(|| ServiceError::MissingSnapshot {
                tournament: tournament.clone(),
                phase: Phase::PreMatch,
            })?;
        let post = self.repo.get_snapshot(tournament, Phase::PostMatch).await?;
        Ok((pre, post))
    }
}
