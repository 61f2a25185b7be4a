use crate::api::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// Ready once the ledger answers a block-height query.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.ledger.current_block_height().await {
        Ok(block) => (
            StatusCode::OK,
            Json(json!({"status": "ready", "blockHeight": block})),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "unavailable", "error": e.to_string()})),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_returns_ok() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "ok");
    }
}
