use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::{dao::storage::StorageError, state::game_record::TransitionError};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Operation is not permitted from the record's or match's current state.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    /// Caller's side may not perform this operation.
    #[error("unauthorized side: {0}")]
    UnauthorizedSide(String),
    /// Conflicting scoring flags.
    #[error("invalid option: {0}")]
    InvalidOption(String),
    /// Scoring attempted before both lineups were locked.
    #[error("lineup not locked: {0}")]
    LineupNotLocked(String),
    /// The record changed since the caller read it; resync before retrying.
    #[error("stale write: {0}")]
    StaleWrite(String),
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl ServiceError {
    /// Errors after which the caller's local copy of the match must be refetched.
    pub fn requires_resync(&self) -> bool {
        matches!(
            self,
            ServiceError::StaleWrite(_) | ServiceError::InvalidTransition(_)
        )
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict { key } => {
                ServiceError::StaleWrite(format!("`{key}` was modified concurrently"))
            }
            other => ServiceError::Unavailable(other),
        }
    }
}

impl From<TransitionError> for ServiceError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::InvalidTransition(invalid) => {
                ServiceError::InvalidTransition(invalid.to_string())
            }
            unauthorized @ TransitionError::UnauthorizedSide { .. } => {
                ServiceError::UnauthorizedSide(unauthorized.to_string())
            }
            TransitionError::InvalidOption(message) => ServiceError::InvalidOption(message.into()),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest {
            code: "invalid_input",
            message: format!("validation failed: {}", err),
        }
    }
}

/// Application-level errors that are converted to HTTP responses.
///
/// `code` is the machine-readable name of the failure; clients branch on it
/// (a `stale_write` means refetch the match before retrying).
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {message}")]
    BadRequest { code: &'static str, message: String },
    /// Caller is not allowed to act.
    #[error("forbidden: {message}")]
    Forbidden { code: &'static str, message: String },
    /// Requested resource not found.
    #[error("not found: {message}")]
    NotFound { code: &'static str, message: String },
    /// Conflict with current state.
    #[error("conflict: {message}")]
    Conflict { code: &'static str, message: String },
    /// Service unavailable or degraded.
    #[error("service unavailable: {message}")]
    ServiceUnavailable { code: &'static str, message: String },
}

impl AppError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::ServiceUnavailable { code, .. } => code,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::InvalidTransition(_) => AppError::Conflict {
                code: "invalid_transition",
                message,
            },
            ServiceError::UnauthorizedSide(_) => AppError::Forbidden {
                code: "unauthorized_side",
                message,
            },
            ServiceError::InvalidOption(_) => AppError::BadRequest {
                code: "invalid_option",
                message,
            },
            ServiceError::LineupNotLocked(_) => AppError::Conflict {
                code: "lineup_not_locked",
                message,
            },
            ServiceError::StaleWrite(_) => AppError::Conflict {
                code: "stale_write",
                message,
            },
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable {
                code: "unavailable",
                message: source.to_string(),
            },
            ServiceError::Degraded => AppError::ServiceUnavailable {
                code: "degraded",
                message: "degraded mode".into(),
            },
            ServiceError::InvalidInput(_) => AppError::BadRequest {
                code: "invalid_input",
                message,
            },
            ServiceError::NotFound(_) => AppError::NotFound {
                code: "not_found",
                message,
            },
        }
    }
}

/// JSON body returned for every failed request.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Failure name (`invalid_transition`, `unauthorized_side`, `invalid_option`,
    /// `lineup_not_locked`, `stale_write`, `unavailable`, `degraded`,
    /// `invalid_input`, `not_found`).
    pub code: String,
    /// Human readable description.
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let payload = Json(ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::game_record::{GameState, InvalidTransition, Side};

    #[test]
    fn storage_conflict_becomes_stale_write() {
        let err: ServiceError = StorageError::conflict("game::1").into();
        assert!(matches!(err, ServiceError::StaleWrite(_)));
        assert!(err.requires_resync());
        assert_eq!(AppError::from(err).code(), "stale_write");
    }

    #[test]
    fn transition_errors_keep_their_names() {
        let invalid: ServiceError = TransitionError::from(InvalidTransition {
            game_number: 2,
            from: GameState::Unscored,
            event: "confirm",
        })
        .into();
        let app = AppError::from(invalid);
        assert_eq!(app.code(), "invalid_transition");
        assert_eq!(app.status(), StatusCode::CONFLICT);

        let unauthorized: ServiceError = TransitionError::UnauthorizedSide {
            game_number: 2,
            side: Side::Home,
            event: "confirm",
            reason: "already confirmed",
        }
        .into();
        let app = AppError::from(unauthorized);
        assert_eq!(app.code(), "unauthorized_side");
        assert_eq!(app.status(), StatusCode::FORBIDDEN);
    }
}
