//! Reward batch persistence and settlement outcome tracking.

use crate::domain::{
    Address, Decimal, HoldingContribution, RewardRecord, SettlementStatus, TimeMs, TournamentId,
    TxHash,
};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;

use super::{RepoError, Repository};

/// Header row of a settlement batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardBatchRow {
    pub batch_id: String,
    pub tournament_id: TournamentId,
    #[serde(with = "crate::domain::decimal::canonical")]
    pub min_payout: Decimal,
    pub record_count: i64,
    pub created_at_ms: i64,
}

/// A reward record together with its settlement outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRewardRecord {
    pub batch_id: String,
    #[serde(flatten)]
    pub record: RewardRecord,
    pub status: SettlementStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<TxHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at_ms: i64,
}

impl Repository {
    /// Create a batch and persist every record as PENDING, atomically.
    ///
    /// # Errors
    /// Returns an error if the transaction fails (e.g. duplicate batch id).
    pub async fn create_reward_batch(
        &self,
        batch_id: &str,
        tournament: &TournamentId,
        min_payout: Decimal,
        records: &[RewardRecord],
    ) -> Result<(), RepoError> {
        let now = TimeMs::now().as_ms();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO reward_batches (batch_id, tournament_id, min_payout, record_count, created_at_ms)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(batch_id)
        .bind(tournament.as_str())
        .bind(min_payout.to_canonical_string())
        .bind(records.len() as i64)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for record in records {
            let breakdown = serde_json::to_string(&record.holding_breakdown)
                .map_err(|e| RepoError::corrupt("reward_records", e))?;

            sqlx::query(
                r#"
                INSERT INTO reward_records (
                    batch_id, address, rank, total_score, total_tokens, reward_amount,
                    breakdown_json, status, tx_hash, error, updated_at_ms
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, NULL, ?)
                "#,
            )
            .bind(batch_id)
            .bind(record.address.as_str())
            .bind(record.rank)
            .bind(record.total_score.to_canonical_string())
            .bind(record.total_tokens.to_string())
            .bind(record.reward_amount.to_canonical_string())
            .bind(breakdown)
            .bind(SettlementStatus::Pending.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Persist a status transition of one record.
    ///
    /// `tx_hash` and `error` only overwrite the stored values when present.
    ///
    /// # Errors
    /// Returns an error if the update fails or the record does not exist.
    pub async fn update_reward_status(
        &self,
        batch_id: &str,
        address: &Address,
        status: SettlementStatus,
        tx_hash: Option<&TxHash>,
        error: Option<&str>,
    ) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE reward_records
            SET status = ?,
                tx_hash = COALESCE(?, tx_hash),
                error = COALESCE(?, error),
                updated_at_ms = ?
            WHERE batch_id = ? AND address = ?
            "#,
        )
        .bind(status.as_str())
        .bind(tx_hash.map(|h| h.as_str()))
        .bind(error)
        .bind(TimeMs::now().as_ms())
        .bind(batch_id)
        .bind(address.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepoError::Db(sqlx::Error::RowNotFound));
        }
        Ok(())
    }

    /// Records of a batch, in rank order.
    ///
    /// # Errors
    /// Returns an error if the query fails or a row does not decode.
    pub async fn list_reward_records(
        &self,
        batch_id: &str,
    ) -> Result<Vec<StoredRewardRecord>, RepoError> {
        let rows = sqlx::query(
            r#"
            SELECT batch_id, address, rank, total_score, total_tokens, reward_amount,
                   breakdown_json, status, tx_hash, error, updated_at_ms
            FROM reward_records
            WHERE batch_id = ?
            ORDER BY rank ASC, address ASC
            "#,
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(decode_record).collect()
    }

    /// Batch header, if the batch exists.
    pub async fn get_reward_batch(&self, batch_id: &str) -> Result<Option<RewardBatchRow>, RepoError> {
        let row = sqlx::query(
            r#"
            SELECT batch_id, tournament_id, min_payout, record_count, created_at_ms
            FROM reward_batches
            WHERE batch_id = ?
            "#,
        )
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(decode_batch).transpose()
    }

    /// All batches of a tournament, oldest first.
    pub async fn list_reward_batches(
        &self,
        tournament: &TournamentId,
    ) -> Result<Vec<RewardBatchRow>, RepoError> {
        let rows = sqlx::query(
            r#"
            SELECT batch_id, tournament_id, min_payout, record_count, created_at_ms
            FROM reward_batches
            WHERE tournament_id = ?
            ORDER BY created_at_ms ASC, batch_id ASC
            "#,
        )
        .bind(tournament.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(decode_batch).collect()
    }
}

fn decode_batch(row: &SqliteRow) -> Result<RewardBatchRow, RepoError> {
    let min_payout: String = row.get("min_payout");
    Ok(RewardBatchRow {
        batch_id: row.get("batch_id"),
        tournament_id: TournamentId::new(row.get("tournament_id")),
        min_payout: Decimal::from_str_canonical(&min_payout)
            .map_err(|e| RepoError::corrupt("reward_batches", e))?,
        record_count: row.get("record_count"),
        created_at_ms: row.get("created_at_ms"),
    })
}

fn decode_record(row: &SqliteRow) -> Result<StoredRewardRecord, RepoError> {
    let corrupt = |e: String| RepoError::corrupt("reward_records", e);

    let total_score: String = row.get("total_score");
    let total_tokens: String = row.get("total_tokens");
    let reward_amount: String = row.get("reward_amount");
    let breakdown_json: String = row.get("breakdown_json");
    let status: String = row.get("status");
    let tx_hash: Option<String> = row.get("tx_hash");

    let holding_breakdown: Vec<HoldingContribution> =
        serde_json::from_str(&breakdown_json).map_err(|e| corrupt(e.to_string()))?;

    Ok(StoredRewardRecord {
        batch_id: row.get("batch_id"),
        record: RewardRecord {
            address: Address::new(row.get("address")),
            total_score: Decimal::from_str_canonical(&total_score)
                .map_err(|e| corrupt(e.to_string()))?,
            total_tokens: total_tokens
                .parse::<u128>()
                .map_err(|e| corrupt(e.to_string()))?,
            reward_amount: Decimal::from_str_canonical(&reward_amount)
                .map_err(|e| corrupt(e.to_string()))?,
            rank: row.get("rank"),
            holding_breakdown,
        },
        status: SettlementStatus::from_str(&status).map_err(corrupt)?,
        tx_hash: tx_hash.map(TxHash::new),
        error: row.get("error"),
        updated_at_ms: row.get("updated_at_ms"),
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::setup_repo;
    use super::*;
    use crate::domain::InstrumentId;

    fn record(address: &str, amount: &str, rank: i64) -> RewardRecord {
        RewardRecord {
            address: Address::new(address.to_string()),
            total_score: Decimal::from_str_canonical("2").unwrap(),
            total_tokens: 100,
            reward_amount: Decimal::from_str_canonical(amount).unwrap(),
            rank,
            holding_breakdown: vec![HoldingContribution {
                instrument_id: InstrumentId::new("P1".to_string()),
                balance: 100,
                points: Decimal::from_str_canonical("2").unwrap(),
                contribution: Decimal::from_str_canonical("2").unwrap(),
            }],
        }
    }

    #[tokio::test]
    async fn test_batch_records_start_pending() {
        let (repo, _temp) = setup_repo().await;
        let tournament = TournamentId::new("t1".to_string());
        let records = vec![record("0xa", "60", 1), record("0xb", "40", 2)];

        repo.create_reward_batch("b1", &tournament, Decimal::zero(), &records)
            .await
            .unwrap();

        let stored = repo.list_reward_records("b1").await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|r| r.status == SettlementStatus::Pending));
        assert_eq!(stored[0].record, records[0]);
        assert_eq!(stored[1].record, records[1]);

        let batch = repo.get_reward_batch("b1").await.unwrap().unwrap();
        assert_eq!(batch.record_count, 2);
        assert_eq!(batch.tournament_id, tournament);
    }

    #[tokio::test]
    async fn test_status_transitions_keep_tx_hash() {
        let (repo, _temp) = setup_repo().await;
        let tournament = TournamentId::new("t1".to_string());
        let address = Address::new("0xa".to_string());
        repo.create_reward_batch("b1", &tournament, Decimal::zero(), &[record("0xa", "10", 1)])
            .await
            .unwrap();

        let hash = TxHash::new("0xtx".to_string());
        repo.update_reward_status("b1", &address, SettlementStatus::Processing, None, None)
            .await
            .unwrap();
        repo.update_reward_status(
            "b1",
            &address,
            SettlementStatus::Failed,
            Some(&hash),
            Some("confirmation timed out"),
        )
        .await
        .unwrap();

        let stored = repo.list_reward_records("b1").await.unwrap();
        assert_eq!(stored[0].status, SettlementStatus::Failed);
        assert_eq!(stored[0].tx_hash.as_ref(), Some(&hash));
        assert_eq!(stored[0].error.as_deref(), Some("confirmation timed out"));
    }

    #[tokio::test]
    async fn test_update_unknown_record_errors() {
        let (repo, _temp) = setup_repo().await;
        let result = repo
            .update_reward_status(
                "missing",
                &Address::new("0xa".to_string()),
                SettlementStatus::Completed,
                None,
                None,
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_batch_id_rejected() {
        let (repo, _temp) = setup_repo().await;
        let tournament = TournamentId::new("t1".to_string());
        repo.create_reward_batch("b1", &tournament, Decimal::zero(), &[])
            .await
            .unwrap();
        assert!(repo
            .create_reward_batch("b1", &tournament, Decimal::zero(), &[])
            .await
            .is_err());

        let batches = repo.list_reward_batches(&tournament).await.unwrap();
        assert_eq!(batches.len(), 1);
    }
}
