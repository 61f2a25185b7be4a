pub mod eligibility;
pub mod health;
pub mod rewards;
pub mod scores;
pub mod settlements;
pub mod snapshots;

use crate::domain::{Phase, TournamentId};
use crate::error::AppError;
use crate::ledger::Ledger;
use crate::orchestration::RewardService;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::str::FromStr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RewardService>,
    pub ledger: Arc<dyn Ledger>,
}

impl AppState {
    pub fn new(service: Arc<RewardService>, ledger: Arc<dyn Ledger>) -> Self {
        Self { service, ledger }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route(
            "/v1/tournaments/:id/snapshots/:phase",
            post(snapshots::capture_snapshot).get(snapshots::get_snapshot),
        )
        .route(
            "/v1/tournaments/:id/eligibility",
            get(eligibility::get_eligibility),
        )
        .route("/v1/tournaments/:id/scores", put(scores::put_scores))
        .route(
            "/v1/tournaments/:id/rewards/preview",
            post(rewards::preview_rewards),
        )
        .route(
            "/v1/tournaments/:id/settlements",
            post(settlements::create_settlement).get(settlements::list_settlements),
        )
        .route("/v1/settlements/:batch_id", get(settlements::get_settlement))
        .route(
            "/v1/settlements/:batch_id/export",
            get(settlements::export_settlement),
        )
        .layer(cors)
        .with_state(state)
}

pub(crate) fn parse_tournament(raw: &str) -> Result<TournamentId, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest("Tournament id must not be empty".into()));
    }
    Ok(TournamentId::new(trimmed.to_string()))
}

pub(crate) fn parse_phase(raw: &str) -> Result<Phase, AppError> {
    Phase::from_str(raw).map_err(AppError::BadRequest)
}
