//! Eligibility verdicts, performance scores, reward records and settlement status.

use super::decimal::canonical;
use super::units::amount_str;
use super::{Address, Decimal, InstrumentId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Whether a holder kept enough of their pre-match holdings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityResult {
    pub address: Address,
    pub eligible: bool,
    pub maintained_count: i64,
    pub total_count: i64,
    #[serde(with = "canonical")]
    pub maintained_ratio: Decimal,
}

/// One externally supplied score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceScore {
    pub instrument_id: InstrumentId,
    #[serde(with = "canonical")]
    pub points: Decimal,
}

/// Read-only `instrument -> points` map for one tournament.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerformanceScores {
    points: HashMap<InstrumentId, Decimal>,
}

impl PerformanceScores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, instrument: InstrumentId, points: Decimal) -> Self {
        self.points.insert(instrument, points);
        self
    }

    /// Points for `instrument`; a missing instrument scores zero.
    pub fn points(&self, instrument: &InstrumentId) -> Decimal {
        self.points.get(instrument).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl FromIterator<PerformanceScore> for PerformanceScores {
    fn from_iter<T: IntoIterator<Item = PerformanceScore>>(iter: T) -> Self {
        Self {
            points: iter
                .into_iter()
                .map(|s| (s.instrument_id, s.points))
                .collect(),
        }
    }
}

/// Contribution of a single holding to a holder's score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingContribution {
    pub instrument_id: InstrumentId,
    #[serde(with = "amount_str")]
    pub balance: u128,
    #[serde(with = "canonical")]
    pub points: Decimal,
    #[serde(with = "canonical")]
    pub contribution: Decimal,
}

/// Computed reward for one eligible holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardRecord {
    pub address: Address,
    #[serde(with = "canonical")]
    pub total_score: Decimal,
    #[serde(with = "amount_str")]
    pub total_tokens: u128,
    #[serde(with = "canonical")]
    pub reward_amount: Decimal,
    pub rank: i64,
    pub holding_breakdown: Vec<HoldingContribution>,
}

/// Settlement state of a persisted reward record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Pending => "PENDING",
            SettlementStatus::Processing => "PROCESSING",
            SettlementStatus::Completed => "COMPLETED",
            SettlementStatus::Failed => "FAILED",
            SettlementStatus::Skipped => "SKIPPED",
        }
    }

    /// No further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SettlementStatus::Completed | SettlementStatus::Failed | SettlementStatus::Skipped
        )
    }
}

impl std::fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettlementStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(SettlementStatus::Pending),
            "PROCESSING" => Ok(SettlementStatus::Processing),
            "COMPLETED" => Ok(SettlementStatus::Completed),
            "FAILED" => Ok(SettlementStatus::Failed),
            "SKIPPED" => Ok(SettlementStatus::Skipped),
            other => Err(format!("unknown settlement status: {}", other)),
        }
    }
}
