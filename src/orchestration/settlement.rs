//! Sequential payout of reward records with per-record outcome tracking.

use crate::db::{RepoError, Repository};
use crate::domain::decimal::canonical;
use crate::domain::units::amount_str;
use crate::domain::{
    Address, Decimal, InstrumentId, RewardRecord, SettlementStatus, TokenUnits, TournamentId,
    TxHash,
};
use crate::ledger::Ledger;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::Shutdown;

pub const BELOW_BASE_UNIT: &str = "below one base unit";

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("recipient {0} appears more than once in the batch")]
    DuplicateRecipient(Address),
    #[error("failed to create settlement batch for tournament {tournament}: {source}")]
    BatchCreation {
        tournament: TournamentId,
        source: RepoError,
    },
}

/// A confirmed payout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSuccess {
    pub address: Address,
    #[serde(with = "canonical")]
    pub reward_amount: Decimal,
    #[serde(with = "amount_str")]
    pub amount: u128,
    pub tx_hash: TxHash,
}

/// A payout that was attempted and did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferFailure {
    pub address: Address,
    #[serde(with = "canonical")]
    pub reward_amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<TxHash>,
    pub error: String,
}

/// A payout withheld by policy; the ledger was not called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedPayout {
    pub address: Address,
    #[serde(with = "canonical")]
    pub reward_amount: Decimal,
    pub reason: String,
}

/// A payout left PENDING because the batch was cancelled first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnprocessedPayout {
    pub address: Address,
    #[serde(with = "canonical")]
    pub reward_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementSummary {
    pub batch_id: String,
    pub successful: Vec<TransferSuccess>,
    pub failed: Vec<TransferFailure>,
    pub skipped: Vec<SkippedPayout>,
    pub unprocessed: Vec<UnprocessedPayout>,
    #[serde(with = "canonical")]
    pub total_distributed: Decimal,
    pub cancelled: bool,
}

impl SettlementSummary {
    fn new(batch_id: String) -> Self {
        Self {
            batch_id,
            successful: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            unprocessed: Vec::new(),
            total_distributed: Decimal::zero(),
            cancelled: false,
        }
    }
}

enum Outcome {
    Completed(TransferSuccess),
    Failed(TransferFailure),
    Skipped(SkippedPayout),
}

/// Issues one ledger transfer at a time from the custodial signer.
///
/// The signer sits behind an async mutex that is held for a whole batch, so
/// concurrent `settle` calls queue instead of interleaving nonces.
#[derive(Clone)]
pub struct SettlementExecutor {
    ledger: Arc<dyn Ledger>,
    repo: Arc<Repository>,
    signer: Arc<Mutex<Address>>,
    reward_instrument: InstrumentId,
    reward_units: TokenUnits,
    confirmation_timeout: Duration,
}

impl SettlementExecutor {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        repo: Arc<Repository>,
        signer: Address,
        reward_instrument: InstrumentId,
        reward_units: TokenUnits,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            repo,
            signer: Arc::new(Mutex::new(signer)),
            reward_instrument,
            reward_units,
            confirmation_timeout,
        }
    }

    /// Pay out `records` in order.
    ///
    /// Every record is persisted as PENDING before the first transfer. Records
    /// below `min_payout` are skipped; any other record gets exactly one
    /// transfer attempt. A failed record never stops the batch. Once
    /// `shutdown` fires the remaining records are left PENDING.
    ///
    /// # Errors
    /// Only failures before the first transfer are errors. From then on the
    /// batch always produces a summary.
    pub async fn settle(
        &self,
        tournament: &TournamentId,
        records: &[RewardRecord],
        min_payout: Decimal,
        shutdown: &Shutdown,
    ) -> Result<SettlementSummary, SettlementError> {
        let mut seen = HashSet::with_capacity(records.len());
        if let Some(dup) = records.iter().find(|r| !seen.insert(&r.address)) {
            return Err(SettlementError::DuplicateRecipient(dup.address.clone()));
        }

        let signer = self.signer.lock().await;

        let batch_id = Uuid::new_v4().to_string();
        self.repo
            .create_reward_batch(&batch_id, tournament, min_payout, records)
            .await
            .map_err(|source| SettlementError::BatchCreation {
                tournament: tournament.clone(),
                source,
            })?;

        info!(
            tournament = %tournament,
            batch = %batch_id,
            records = records.len(),
            min_payout = %min_payout,
            "Settlement batch started"
        );

        let mut summary = SettlementSummary::new(batch_id);
        for (idx, record) in records.iter().enumerate() {
            if shutdown.is_triggered() {
                summary.cancelled = true;
                summary.unprocessed = records[idx..]
                    .iter()
                    .map(|r| UnprocessedPayout {
                        address: r.address.clone(),
                        reward_amount: r.reward_amount,
                    })
                    .collect();
                warn!(
                    batch = %summary.batch_id,
                    remaining = summary.unprocessed.len(),
                    "Settlement cancelled, remaining records left pending"
                );
                break;
            }

            let outcome = self
                .settle_record(&signer, &summary.batch_id, record, min_payout)
                .await;
            match outcome {
                Outcome::Completed(success) => {
                    summary.total_distributed = summary.total_distributed + success.reward_amount;
                    summary.successful.push(success);
                }
                Outcome::Failed(failure) => summary.failed.push(failure),
                Outcome::Skipped(skip) => summary.skipped.push(skip),
            }
        }

        info!(
            batch = %summary.batch_id,
            successful = summary.successful.len(),
            failed = summary.failed.len(),
            skipped = summary.skipped.len(),
            unprocessed = summary.unprocessed.len(),
            total_distributed = %summary.total_distributed,
            "Settlement batch finished"
        );
        Ok(summary)
    }

    async fn settle_record(
        &self,
        signer: &Address,
        batch_id: &str,
        record: &RewardRecord,
        min_payout: Decimal,
    ) -> Outcome {
        let address = &record.address;
        let skip = |reason: String| {
            Outcome::Skipped(SkippedPayout {
                address: address.clone(),
                reward_amount: record.reward_amount,
                reason,
            })
        };

        if record.reward_amount < min_payout {
            let reason = format!("below minimum payout {}", min_payout);
            self.persist(batch_id, address, SettlementStatus::Skipped, None, Some(reason.as_str()))
                .await;
            return skip(reason);
        }

        let amount = match self.reward_units.to_base_units(record.reward_amount) {
            Ok(0) => {
                self.persist(
                    batch_id,
                    address,
                    SettlementStatus::Skipped,
                    None,
                    Some(BELOW_BASE_UNIT),
                )
                .await;
                return skip(BELOW_BASE_UNIT.to_string());
            }
            Ok(amount) => amount,
            Err(e) => return self.fail(batch_id, record, None, e.to_string()).await,
        };

        self.persist(batch_id, address, SettlementStatus::Processing, None, None)
            .await;

        let hash = match self
            .ledger
            .transfer(signer, address, amount, &self.reward_instrument)
            .await
        {
            Ok(hash) => hash,
            Err(e) => return self.fail(batch_id, record, None, e.to_string()).await,
        };
        // Record the hash before waiting so an interrupted batch can be reconciled.
        self.persist(
            batch_id,
            address,
            SettlementStatus::Processing,
            Some(&hash),
            None,
        )
        .await;

        let confirmation =
            tokio::time::timeout(self.confirmation_timeout, self.ledger.wait_for_confirmation(&hash))
                .await;

        let cause = match confirmation {
            Ok(Ok(c)) if c.success => {
                self.persist(batch_id, address, SettlementStatus::Completed, Some(&hash), None)
                    .await;
                info!(
                    batch = %batch_id,
                    address = %address,
                    amount = %amount,
                    tx = %hash,
                    "Payout confirmed"
                );
                return Outcome::Completed(TransferSuccess {
                    address: address.clone(),
                    reward_amount: record.reward_amount,
                    amount,
                    tx_hash: hash,
                });
            }
            Ok(Ok(c)) => c
                .error
                .unwrap_or_else(|| "transaction rejected".to_string()),
            Ok(Err(e)) => format!("confirmation failed: {}", e),
            Err(_) => format!(
                "confirmation timed out after {}ms",
                self.confirmation_timeout.as_millis()
            ),
        };

        self.fail(batch_id, record, Some(hash), cause).await
    }

    async fn fail(
        &self,
        batch_id: &str,
        record: &RewardRecord,
        tx_hash: Option<TxHash>,
        cause: String,
    ) -> Outcome {
        warn!(
            batch = %batch_id,
            address = %record.address,
            error = %cause,
            "Payout failed"
        );
        self.persist(
            batch_id,
            &record.address,
            SettlementStatus::Failed,
            tx_hash.as_ref(),
            Some(cause.as_str()),
        )
        .await;
        Outcome::Failed(TransferFailure {
            address: record.address.clone(),
            reward_amount: record.reward_amount,
            tx_hash,
            error: cause,
        })
    }

    /// Write a status transition. A failed write is logged; the batch goes on.
    async fn persist(
        &self,
        batch_id: &str,
        address: &Address,
        status: SettlementStatus,
        tx_hash: Option<&TxHash>,
        cause: Option<&str>,
    ) {
        if let Err(e) = self
            .repo
            .update_reward_status(batch_id, address, status, tx_hash, cause)
            .await
        {
            error!(
                batch = %batch_id,
                address = %address,
                status = %status,
                error = %e,
                "Failed to persist settlement transition"
            );
        }
    }
}
