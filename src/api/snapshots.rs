use crate::api::{parse_phase, parse_tournament, AppState};
use crate::domain::Snapshot;
use crate::error::AppError;
use axum::extract::{Path, State};
use axum::Json;

pub async fn capture_snapshot(
    Path((id, phase)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<Snapshot>, AppError> {
    let tournament = parse_tournament(&id)?;
    let phase = parse_phase(&phase)?;

    let snapshot = state.service.capture_snapshot(&tournament, phase).await?;
    Ok(Json(snapshot))
}

pub async fn get_snapshot(
    Path((id, phase)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<Snapshot>, AppError> {
    let tournament = parse_tournament(&id)?;
    let phase = parse_phase(&phase)?;

    state
        .service
        .get_snapshot(&tournament, phase)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("{} snapshot for {}", phase, tournament)))
}
