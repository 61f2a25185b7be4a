pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod orchestration;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Address, Decimal, EligibilityResult, InstrumentId, Phase, RewardRecord, Snapshot, TimeMs,
    TournamentId, TxHash,
};
pub use error::AppError;
pub use ledger::{Ledger, LedgerError, MockLedger, RpcLedger};
pub use orchestration::{RewardService, SettlementSummary, Shutdown};
