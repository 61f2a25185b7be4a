//! Database module for SQLite operations.
//!
//! This module provides:
//! - Database initialization and migrations
//! - SQLite pragma configuration
//! - Repository layer for snapshots, performance scores and reward batches

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::{RepoError, Repository, RewardBatchRow, StoredRewardRecord};
