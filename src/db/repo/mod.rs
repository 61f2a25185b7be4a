//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by domain:
//! - `snapshots.rs` - Immutable holder snapshots
//! - `rewards.rs` - Reward batches and per-record settlement outcomes
//!
//! Performance scores live here since they are a flat key-value table.

mod rewards;
mod snapshots;

pub use rewards::{RewardBatchRow, StoredRewardRecord};

use crate::domain::{Decimal, InstrumentId, PerformanceScore, PerformanceScores, TimeMs, TournamentId};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use thiserror::Error;

/// Errors raised by the repository.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("corrupt {what} row: {reason}")]
    Corrupt { what: String, reason: String },
}

impl RepoError {
    fn corrupt(what: &str, reason: impl ToString) -> Self {
        RepoError::Corrupt {
            what: what.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    // =========================================================================
    // Performance score operations
    // =========================================================================

    /// Replace the performance scores of a tournament in a single transaction.
    ///
    /// Returns the number of scores stored.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn replace_performance_scores(
        &self,
        tournament: &TournamentId,
        scores: &[PerformanceScore],
    ) -> Result<usize, RepoError> {
        let now = TimeMs::now().as_ms();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM performance_scores WHERE tournament_id = ?")
            .bind(tournament.as_str())
            .execute(&mut *tx)
            .await?;

        for score in scores {
            sqlx::query(
                r#"
                INSERT INTO performance_scores (tournament_id, instrument_id, points, updated_at_ms)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(tournament_id, instrument_id) DO UPDATE SET
                    points = excluded.points,
                    updated_at_ms = excluded.updated_at_ms
                "#,
            )
            .bind(tournament.as_str())
            .bind(score.instrument_id.as_str())
            .bind(score.points.to_canonical_string())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(scores.len())
    }

    /// Load the performance scores of a tournament. Unknown tournaments yield an empty map.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored value is not a decimal.
    pub async fn get_performance_scores(
        &self,
        tournament: &TournamentId,
    ) -> Result<PerformanceScores, RepoError> {
        let rows = sqlx::query(
            r#"
            SELECT instrument_id, points
            FROM performance_scores
            WHERE tournament_id = ?
            ORDER BY instrument_id ASC
            "#,
        )
        .bind(tournament.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let instrument_id: String = row.get("instrument_id");
                let points_str: String = row.get("points");
                let points = Decimal::from_str_canonical(&points_str)
                    .map_err(|e| RepoError::corrupt("performance_scores", e))?;
                Ok(PerformanceScore {
                    instrument_id: InstrumentId::new(instrument_id),
                    points,
                })
            })
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::setup_repo;
    use super::*;

    fn score(id: &str, points: &str) -> PerformanceScore {
        PerformanceScore {
            instrument_id: InstrumentId::new(id.to_string()),
            points: Decimal::from_str_canonical(points).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_scores_roundtrip() {
        let (repo, _temp) = setup_repo().await;
        let tournament = TournamentId::new("t1".to_string());

        let stored = repo
            .replace_performance_scores(&tournament, &[score("P1", "2.0"), score("P2", "0.5")])
            .await
            .unwrap();
        assert_eq!(stored, 2);

        let scores = repo.get_performance_scores(&tournament).await.unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(
            scores.points(&InstrumentId::new("P2".to_string())),
            Decimal::from_str_canonical("0.5").unwrap()
        );
    }

    #[tokio::test]
    async fn test_scores_replace_drops_old_entries() {
        let (repo, _temp) = setup_repo().await;
        let tournament = TournamentId::new("t1".to_string());

        repo.replace_performance_scores(&tournament, &[score("P1", "2"), score("P2", "1")])
            .await
            .unwrap();
        repo.replace_performance_scores(&tournament, &[score("P3", "4")])
            .await
            .unwrap();

        let scores = repo.get_performance_scores(&tournament).await.unwrap();
        assert_eq!(scores.len(), 1);
        assert!(scores.points(&InstrumentId::new("P1".to_string())).is_zero());
    }

    #[tokio::test]
    async fn test_scores_are_scoped_by_tournament() {
        let (repo, _temp) = setup_repo().await;
        repo.replace_performance_scores(&TournamentId::new("t1".to_string()), &[score("P1", "2")])
            .await
            .unwrap();

        let other = repo
            .get_performance_scores(&TournamentId::new("t2".to_string()))
            .await
            .unwrap();
        assert!(other.is_empty());
    }
}
