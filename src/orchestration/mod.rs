//! Orchestration layer: ledger reads, settlement and the service facade.

pub mod service;
pub mod settlement;
pub mod shutdown;
pub mod snapshot;

pub use service::{RewardService, ServiceError};
pub use settlement::{
    SettlementError, SettlementExecutor, SettlementSummary, SkippedPayout, TransferFailure,
    TransferSuccess, UnprocessedPayout,
};
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use snapshot::{CaptureError, HolderSnapshotBuilder};
