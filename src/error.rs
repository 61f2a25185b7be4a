use crate::engine::AllocationError;
use crate::orchestration::{CaptureError, ServiceError, SettlementError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unprocessable: {0}")]
    Unprocessable(String),
    #[error("Upstream error: {0}")]
    Upstream(String),
    #[error("Upstream timeout: {0}")]
    Timeout(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl From<crate::db::RepoError> for AppError {
    fn from(err: crate::db::RepoError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::MissingSnapshot { .. } | ServiceError::BatchNotFound(_) => {
                AppError::NotFound(message)
            }
            ServiceError::Allocation { source, .. } => match source {
                AllocationError::InvalidPool(_) => AppError::BadRequest(message),
                AllocationError::ZeroTotalScore
                | AllocationError::Units(_)
                | AllocationError::Overflow(_) => AppError::Unprocessable(message),
            },
            ServiceError::Capture(capture) => match capture {
                CaptureError::SnapshotExists { .. } => AppError::Conflict(message),
                CaptureError::LedgerUnavailable { .. } => AppError::Upstream(message),
                CaptureError::Timeout { .. } => AppError::Timeout(message),
                CaptureError::Cancelled { .. } => AppError::Unavailable(message),
                CaptureError::Overflow { .. } => AppError::Unprocessable(message),
                CaptureError::Store(_) => AppError::Internal(message),
            },
            ServiceError::Settlement(settlement) => match settlement {
                SettlementError::DuplicateRecipient(_) => AppError::BadRequest(message),
                SettlementError::BatchCreation { .. } => AppError::Internal(message),
            },
            ServiceError::Store(_) => AppError::Internal(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        if status.is_server_error() {
            tracing::error!(status = %status, error = %error_message, "Request failed");
        }

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Phase, TournamentId};

    fn status_of(err: ServiceError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn test_service_errors_map_to_status_codes() {
        let tournament = TournamentId::new("t1".to_string());

        assert_eq!(
            status_of(ServiceError::MissingSnapshot {
                tournament: tournament.clone(),
                phase: Phase::PreMatch,
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ServiceError::Allocation {
                tournament: tournament.clone(),
                source: AllocationError::ZeroTotalScore,
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(ServiceError::Capture(CaptureError::SnapshotExists {
                tournament: tournament.clone(),
                phase: Phase::PostMatch,
            })),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ServiceError::Capture(CaptureError::Timeout {
                tournament,
                phase: Phase::PreMatch,
                timeout_ms: 10,
            })),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_message_keeps_tournament_and_phase() {
        let err = AppError::from(ServiceError::MissingSnapshot {
            tournament: TournamentId::new("final-2026".to_string()),
            phase: Phase::PreMatch,
        });
        let message = err.to_string();
        assert!(message.contains("final-2026"));
        assert!(message.contains("PRE_MATCH"));
    }
}
