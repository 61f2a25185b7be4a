use crate::api::{parse_tournament, AppState};
use crate::db::{RewardBatchRow, StoredRewardRecord};
use crate::domain::RewardRecord;
use crate::error::AppError;
use crate::orchestration::SettlementSummary;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct SettlementRequest {
    pub records: Vec<RewardRecord>,
}

#[derive(Debug, Serialize)]
pub struct SettlementBatchResponse {
    pub batch: RewardBatchRow,
    pub records: Vec<StoredRewardRecord>,
}

pub async fn create_settlement(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<SettlementRequest>,
) -> Result<Json<SettlementSummary>, AppError> {
    let tournament = parse_tournament(&id)?;
    if let Some(bad) = body.records.iter().find(|r| r.reward_amount.is_negative()) {
        return Err(AppError::BadRequest(format!(
            "negative reward for {}",
            bad.address
        )));
    }

    let summary = state.service.settle(&tournament, &body.records).await?;
    Ok(Json(summary))
}

pub async fn list_settlements(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<RewardBatchRow>>, AppError> {
    let tournament = parse_tournament(&id)?;
    let batches = state.service.settlement_batches(&tournament).await?;
    Ok(Json(batches))
}

pub async fn get_settlement(
    Path(batch_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<SettlementBatchResponse>, AppError> {
    let (batch, records) = state.service.settlement_batch(&batch_id).await?;
    Ok(Json(SettlementBatchResponse { batch, records }))
}

/// Flat audit row; one per reward record.
#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    batch_id: &'a str,
    tournament_id: &'a str,
    rank: i64,
    address: &'a str,
    reward_amount: String,
    total_score: String,
    total_tokens: String,
    status: &'static str,
    tx_hash: Option<&'a str>,
    error: Option<&'a str>,
    updated_at_ms: i64,
}

pub async fn export_settlement(
    Path(batch_id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let (batch, records) = state.service.settlement_batch(&batch_id).await?;
    let body = render_csv(&batch, &records)?;

    let disposition = format!("attachment; filename=\"settlement-{}.csv\"", batch.batch_id);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

fn render_csv(batch: &RewardBatchRow, records: &[StoredRewardRecord]) -> Result<String, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for stored in records {
        writer
            .serialize(ExportRow {
                batch_id: &stored.batch_id,
                tournament_id: batch.tournament_id.as_str(),
                rank: stored.record.rank,
                address: stored.record.address.as_str(),
                reward_amount: stored.record.reward_amount.to_canonical_string(),
                total_score: stored.record.total_score.to_canonical_string(),
                total_tokens: stored.record.total_tokens.to_string(),
                status: stored.status.as_str(),
                tx_hash: stored.tx_hash.as_ref().map(|h| h.as_str()),
                error: stored.error.as_deref(),
                updated_at_ms: stored.updated_at_ms,
            })
            .map_err(|e| AppError::Internal(format!("CSV export failed: {}", e)))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV export failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("CSV export failed: {}", e)))
}
