//! Snapshot persistence. The holder list is stored as one LZ4-compressed JSON blob.

use crate::domain::{Holder, Phase, Snapshot, TimeMs, TournamentId};
use sqlx::Row;
use std::io::{Read, Write};
use std::str::FromStr;

use super::{RepoError, Repository};

impl Repository {
    /// Insert a snapshot. Returns `false` if one already exists for the
    /// (tournament, phase); the stored record is left untouched.
    ///
    /// # Errors
    /// Returns an error if encoding or the insert fails.
    pub async fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<bool, RepoError> {
        let blob = encode_holders(&snapshot.holders)?;
        let block = i64::try_from(snapshot.captured_at_block)
            .map_err(|_| RepoError::corrupt("snapshots", "block height out of range"))?;

        let result = sqlx::query(
            r#"
            INSERT INTO snapshots (
                tournament_id, phase, captured_at_block, captured_at_ms, ledger_address,
                holders_blob, digest, total_holder_entries, total_tokens, unique_address_count
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(tournament_id, phase) DO NOTHING
            "#,
        )
        .bind(snapshot.tournament_id.as_str())
        .bind(snapshot.phase.as_str())
        .bind(block)
        .bind(snapshot.captured_at_time.as_ms())
        .bind(snapshot.ledger_address.as_str())
        .bind(blob)
        .bind(snapshot.digest.as_str())
        .bind(snapshot.total_holder_entries)
        .bind(snapshot.total_tokens.to_string())
        .bind(snapshot.unique_address_count)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Fetch the snapshot for a (tournament, phase), verifying its digest.
    ///
    /// # Errors
    /// Returns an error if the query fails or the stored blob does not decode.
    pub async fn get_snapshot(
        &self,
        tournament: &TournamentId,
        phase: Phase,
    ) -> Result<Option<Snapshot>, RepoError> {
        let row = sqlx::query(
            r#"
            SELECT tournament_id, phase, captured_at_block, captured_at_ms, ledger_address,
                   holders_blob, digest, total_holder_entries, total_tokens, unique_address_count
            FROM snapshots
            WHERE tournament_id = ? AND phase = ?
            "#,
        )
        .bind(tournament.as_str())
        .bind(phase.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let blob: Vec<u8> = row.get("holders_blob");
        let holders = decode_holders(&blob)?;

        let phase_str: String = row.get("phase");
        let phase = Phase::from_str(&phase_str).map_err(|e| RepoError::corrupt("snapshots", e))?;
        let total_tokens_str: String = row.get("total_tokens");
        let total_tokens = total_tokens_str
            .parse::<u128>()
            .map_err(|e| RepoError::corrupt("snapshots", e))?;
        let block: i64 = row.get("captured_at_block");

        let snapshot = Snapshot {
            tournament_id: TournamentId::new(row.get("tournament_id")),
            phase,
            captured_at_block: u64::try_from(block)
                .map_err(|e| RepoError::corrupt("snapshots", e))?,
            captured_at_time: TimeMs::new(row.get("captured_at_ms")),
            ledger_address: row.get("ledger_address"),
            holders,
            total_holder_entries: row.get("total_holder_entries"),
            total_tokens,
            unique_address_count: row.get("unique_address_count"),
            digest: row.get("digest"),
        };

        if !snapshot.verify_digest() {
            return Err(RepoError::corrupt(
                "snapshots",
                format!(
                    "digest mismatch for {} {}",
                    snapshot.tournament_id, snapshot.phase
                ),
            ));
        }

        Ok(Some(snapshot))
    }
}

fn encode_holders(holders: &[Holder]) -> Result<Vec<u8>, RepoError> {
    let json = serde_json::to_vec(holders).map_err(|e| RepoError::corrupt("snapshots", e))?;
    let mut encoder = lz4_flex::frame::FrameEncoder::new(Vec::new());
    encoder
        .write_all(&json)
        .map_err(|e| RepoError::corrupt("snapshots", e))?;
    encoder
        .finish()
        .map_err(|e| RepoError::corrupt("snapshots", e))
}

fn decode_holders(blob: &[u8]) -> Result<Vec<Holder>, RepoError> {
    let mut decoder = lz4_flex::frame::FrameDecoder::new(blob);
    let mut json = Vec::new();
    decoder
        .read_to_end(&mut json)
        .map_err(|e| RepoError::corrupt("snapshots", e))?;
    serde_json::from_slice(&json).map_err(|e| RepoError::corrupt("snapshots", e))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::setup_repo;
    use super::*;
    use crate::domain::snapshot::{compute_stats, group_balances, holders_digest};
    use crate::domain::{Address, InstrumentId};

    fn make_snapshot(tournament: &str, phase: Phase, balance: u128) -> Snapshot {
        let holders = group_balances(vec![
            (
                Address::new("0xa".to_string()),
                InstrumentId::new("P1".to_string()),
                balance,
            ),
            (
                Address::new("0xb".to_string()),
                InstrumentId::new("P2".to_string()),
                10u128.pow(30),
            ),
        ]);
        let stats = compute_stats(&holders).unwrap();
        Snapshot {
            tournament_id: TournamentId::new(tournament.to_string()),
            phase,
            captured_at_block: 42,
            captured_at_time: TimeMs::new(1_700_000_000_000),
            ledger_address: "0xcontract".to_string(),
            digest: holders_digest(&holders),
            holders,
            total_holder_entries: stats.total_holder_entries,
            total_tokens: stats.total_tokens,
            unique_address_count: stats.unique_address_count,
        }
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let (repo, _temp) = setup_repo().await;
        let snapshot = make_snapshot("t1", Phase::PreMatch, 100);

        assert!(repo.insert_snapshot(&snapshot).await.unwrap());
        let loaded = repo
            .get_snapshot(&snapshot.tournament_id, Phase::PreMatch)
            .await
            .unwrap()
            .expect("snapshot should exist");
        assert_eq!(loaded, snapshot);
    }

    #[tokio::test]
    async fn test_snapshot_is_immutable() {
        let (repo, _temp) = setup_repo().await;
        let first = make_snapshot("t1", Phase::PreMatch, 100);
        let second = make_snapshot("t1", Phase::PreMatch, 999);

        assert!(repo.insert_snapshot(&first).await.unwrap());
        assert!(!repo.insert_snapshot(&second).await.unwrap());

        let loaded = repo
            .get_snapshot(&first.tournament_id, Phase::PreMatch)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.total_tokens, first.total_tokens);
    }

    #[tokio::test]
    async fn test_snapshot_missing_phase() {
        let (repo, _temp) = setup_repo().await;
        let snapshot = make_snapshot("t1", Phase::PreMatch, 100);
        repo.insert_snapshot(&snapshot).await.unwrap();

        let post = repo
            .get_snapshot(&snapshot.tournament_id, Phase::PostMatch)
            .await
            .unwrap();
        assert!(post.is_none());
    }

    #[tokio::test]
    async fn test_tampered_digest_is_rejected() {
        let (repo, _temp) = setup_repo().await;
        let mut snapshot = make_snapshot("t1", Phase::PreMatch, 100);
        snapshot.digest = "00".repeat(16);
        repo.insert_snapshot(&snapshot).await.unwrap();

        let result = repo
            .get_snapshot(&snapshot.tournament_id, Phase::PreMatch)
            .await;
        assert!(matches!(result, Err(RepoError::Corrupt { .. })));
    }

    #[test]
    fn test_blob_roundtrip() {
        let holders = make_snapshot("t1", Phase::PreMatch, 5).holders;
        let blob = encode_holders(&holders).unwrap();
        assert_eq!(decode_holders(&blob).unwrap(), holders);
        assert!(decode_holders(b"not lz4").is_err());
    }
}
