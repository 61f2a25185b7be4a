use crate::api::{parse_tournament, AppState};
use crate::domain::{PerformanceScore, TournamentId};
use crate::error::AppError;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Deserialize)]
pub struct ScoresRequest {
    pub scores: Vec<PerformanceScore>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoresResponse {
    pub tournament_id: TournamentId,
    pub stored: usize,
}

/// Replace the score table of a tournament.
pub async fn put_scores(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<ScoresRequest>,
) -> Result<Json<ScoresResponse>, AppError> {
    let tournament = parse_tournament(&id)?;

    let mut seen = HashSet::new();
    for score in &body.scores {
        if score.instrument_id.as_str().trim().is_empty() {
            return Err(AppError::BadRequest("instrumentId must not be empty".into()));
        }
        if !seen.insert(&score.instrument_id) {
            return Err(AppError::BadRequest(format!(
                "duplicate score for {}",
                score.instrument_id
            )));
        }
    }

    let stored = state.service.store_scores(&tournament, &body.scores).await?;
    Ok(Json(ScoresResponse {
        tournament_id: tournament,
        stored,
    }))
}
