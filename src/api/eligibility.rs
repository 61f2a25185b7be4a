use crate::api::{parse_tournament, AppState};
use crate::domain::{Address, EligibilityResult};
use crate::error::AppError;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Deserialize)]
pub struct EligibilityQuery {
    pub address: String,
}

pub async fn get_eligibility(
    Path(id): Path<String>,
    Query(params): Query<EligibilityQuery>,
    State(state): State<AppState>,
) -> Result<Json<EligibilityResult>, AppError> {
    let tournament = parse_tournament(&id)?;
    let address = Address::from_str(&params.address)
        .map_err(|e| AppError::BadRequest(format!("Invalid address: {}", e)))?;

    let result = state
        .service
        .evaluate_eligibility(&tournament, &address)
        .await?;
    Ok(Json(result))
}
