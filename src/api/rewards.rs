use crate::api::{parse_tournament, AppState};
use crate::domain::decimal::canonical;
use crate::domain::{Decimal, RewardRecord, TournamentId};
use crate::error::AppError;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    #[serde(with = "canonical")]
    pub total_pool_amount: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub tournament_id: TournamentId,
    #[serde(with = "canonical")]
    pub total_pool_amount: Decimal,
    #[serde(with = "canonical")]
    pub total_allocated: Decimal,
    pub records: Vec<RewardRecord>,
}

/// Compute the ranked rewards for a pool without paying anything out.
pub async fn preview_rewards(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<PreviewRequest>,
) -> Result<Json<PreviewResponse>, AppError> {
    let tournament = parse_tournament(&id)?;

    let records = state
        .service
        .compute_rewards(&tournament, body.total_pool_amount)
        .await?;

    Ok(Json(PreviewResponse {
        total_allocated: Decimal::sum(records.iter().map(|r| r.reward_amount)),
        tournament_id: tournament,
        total_pool_amount: body.total_pool_amount,
        records,
    }))
}
