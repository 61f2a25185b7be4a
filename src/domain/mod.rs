//! Domain types for holder snapshots and reward settlement.
//!
//! This module provides:
//! - Lossless numeric handling via the Decimal wrapper and base-unit conversion
//! - Domain primitives: TimeMs, Address, InstrumentId, TournamentId, Phase, TxHash
//! - Snapshot, holder and holding records with grouping and digest helpers
//! - Eligibility, performance score and reward record types

pub mod decimal;
pub mod primitives;
pub mod reward;
pub mod snapshot;
pub mod units;

pub use decimal::Decimal;
pub use primitives::{Address, AddressParseError, InstrumentId, Phase, TimeMs, TournamentId, TxHash};
pub use reward::{
    EligibilityResult, HoldingContribution, PerformanceScore, PerformanceScores, RewardRecord,
    SettlementStatus,
};
pub use snapshot::{Holder, Holding, Snapshot, SnapshotStats};
pub use units::{TokenUnits, UnitsError};
