//! Capture of the holder universe at a point in time.

use crate::config::{Config, SnapshotPolicy};
use crate::db::{RepoError, Repository};
use crate::domain::snapshot::{compute_stats, group_balances, holders_digest};
use crate::domain::{Address, InstrumentId, Phase, Snapshot, TimeMs, TournamentId};
use crate::ledger::{Ledger, LedgerError};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::Shutdown;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("{phase} snapshot already exists for tournament {tournament}")]
    SnapshotExists {
        tournament: TournamentId,
        phase: Phase,
    },
    #[error("ledger unavailable while capturing {phase} for tournament {tournament}: {source}")]
    LedgerUnavailable {
        tournament: TournamentId,
        phase: Phase,
        source: LedgerError,
    },
    #[error("{phase} capture for tournament {tournament} timed out after {timeout_ms}ms")]
    Timeout {
        tournament: TournamentId,
        phase: Phase,
        timeout_ms: u128,
    },
    #[error("{phase} capture for tournament {tournament} was cancelled")]
    Cancelled {
        tournament: TournamentId,
        phase: Phase,
    },
    #[error("token total overflowed in {phase} snapshot for tournament {tournament}")]
    Overflow {
        tournament: TournamentId,
        phase: Phase,
    },
    #[error(transparent)]
    Store(#[from] RepoError),
}

/// Reads every `(holder, instrument)` balance from the ledger and persists
/// the grouped result as an immutable snapshot.
#[derive(Clone)]
pub struct HolderSnapshotBuilder {
    ledger: Arc<dyn Ledger>,
    repo: Arc<Repository>,
    config: Config,
}

/// Raw ledger reading before grouping.
struct LedgerReading {
    block: u64,
    balances: Vec<(Address, InstrumentId, u128)>,
}

impl HolderSnapshotBuilder {
    pub fn new(ledger: Arc<dyn Ledger>, repo: Arc<Repository>, config: Config) -> Self {
        Self {
            ledger,
            repo,
            config,
        }
    }

    /// Capture and persist the `phase` snapshot of `tournament`.
    ///
    /// An existing snapshot is returned or rejected according to the
    /// configured [`SnapshotPolicy`]. Nothing is persisted when the capture
    /// fails, times out or is cancelled.
    pub async fn capture(
        &self,
        tournament: &TournamentId,
        phase: Phase,
        ledger_address: Option<&str>,
        shutdown: &Shutdown,
    ) -> Result<Snapshot, CaptureError> {
        if let Some(existing) = self.repo.get_snapshot(tournament, phase).await? {
            return self.resolve_existing(existing);
        }

        let timeout = self.config.capture_timeout;
        let reading = tokio::select! {
            biased;
            _ = shutdown.triggered() => {
                warn!(tournament = %tournament, phase = %phase, "Snapshot capture cancelled");
                return Err(CaptureError::Cancelled {
                    tournament: tournament.clone(),
                    phase,
                });
            }
            result = tokio::time::timeout(timeout, self.read_ledger(tournament, phase)) => {
                result.map_err(|_| CaptureError::Timeout {
                    tournament: tournament.clone(),
                    phase,
                    timeout_ms: timeout.as_millis(),
                })??
            }
        };

        let holders = group_balances(reading.balances);
        let stats = compute_stats(&holders).ok_or_else(|| CaptureError::Overflow {
            tournament: tournament.clone(),
            phase,
        })?;

        let snapshot = Snapshot {
            tournament_id: tournament.clone(),
            phase,
            captured_at_block: reading.block,
            captured_at_time: TimeMs::now(),
            ledger_address: ledger_address
                .map(str::to_string)
                .unwrap_or_else(|| self.config.ledger_address.clone()),
            digest: holders_digest(&holders),
            holders,
            total_holder_entries: stats.total_holder_entries,
            total_tokens: stats.total_tokens,
            unique_address_count: stats.unique_address_count,
        };

        if !self.repo.insert_snapshot(&snapshot).await? {
            // Lost a race with a concurrent capture of the same phase.
            let existing = self.repo.get_snapshot(tournament, phase).await?;
            return match existing {
                Some(existing) => self.resolve_existing(existing),
                None => Ok(snapshot),
            };
        }

        if snapshot.is_empty() {
            warn!(
                tournament = %tournament,
                phase = %phase,
                "Snapshot captured with no holders"
            );
        }
        info!(
            tournament = %tournament,
            phase = %phase,
            block = snapshot.captured_at_block,
            holders = snapshot.unique_address_count,
            entries = snapshot.total_holder_entries,
            total_tokens = %snapshot.total_tokens,
            "Snapshot captured"
        );
        Ok(snapshot)
    }

    fn resolve_existing(&self, existing: Snapshot) -> Result<Snapshot, CaptureError> {
        match self.config.snapshot_policy {
            SnapshotPolicy::Reuse => {
                info!(
                    tournament = %existing.tournament_id,
                    phase = %existing.phase,
                    "Reusing existing snapshot"
                );
                Ok(existing)
            }
            SnapshotPolicy::Reject => Err(CaptureError::SnapshotExists {
                tournament: existing.tournament_id,
                phase: existing.phase,
            }),
        }
    }

    async fn read_ledger(
        &self,
        tournament: &TournamentId,
        phase: Phase,
    ) -> Result<LedgerReading, CaptureError> {
        let unavailable = |source: LedgerError| CaptureError::LedgerUnavailable {
            tournament: tournament.clone(),
            phase,
            source,
        };

        let mut addresses = self
            .ledger
            .list_holders(&self.config.base_instrument)
            .await
            .map_err(unavailable)?;
        addresses.sort();
        addresses.dedup();

        let block = self
            .ledger
            .current_block_height()
            .await
            .map_err(unavailable)?;

        let pairs: Vec<(Address, InstrumentId)> = addresses
            .iter()
            .flat_map(|address| {
                self.config
                    .instruments
                    .iter()
                    .map(move |instrument| (address.clone(), instrument.clone()))
            })
            .collect();

        info!(
            tournament = %tournament,
            phase = %phase,
            addresses = addresses.len(),
            lookups = pairs.len(),
            block,
            "Reading holder balances"
        );

        let ledger = &self.ledger;
        let balances = stream::iter(pairs)
            .map(|(address, instrument)| async move {
                match ledger.get_balance(&address, &instrument).await {
                    Ok(balance) => (address, instrument, balance),
                    Err(e) => {
                        warn!(
                            address = %address,
                            instrument = %instrument,
                            error = %e,
                            "Balance lookup failed, counting as zero"
                        );
                        (address, instrument, 0)
                    }
                }
            })
            .buffer_unordered(self.config.capture_concurrency)
            .collect::<Vec<_>>()
            .await;

        Ok(LedgerReading { block, balances })
    }
}
