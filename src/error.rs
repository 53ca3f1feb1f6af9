use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::actions::Action;
use crate::lifecycle::AppointmentStatus;
use crate::models::Role;

/// Refusals produced by the lifecycle engine. All of them are computed
/// locally from `(role, status, owner)` and never involve the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("cannot {action} an appointment that is {from}")]
    InvalidTransition {
        from: AppointmentStatus,
        action: Action,
    },
    #[error("no action moves an appointment from {from} to {to}")]
    UnreachableStatus {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    #[error("{action} requires a {required} appointment (current status: {status})")]
    PreconditionFailed {
        action: Action,
        required: AppointmentStatus,
        status: AppointmentStatus,
    },
    #[error("{role} may not {action} this appointment")]
    Unauthorized { role: Role, action: Action },
    #[error("clinical update carries no notes, diagnosis or prescription")]
    EmptyClinicalUpdate,
}

impl WorkflowError {
    /// True for refusals caused by the transition graph itself.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(
            self,
            WorkflowError::InvalidTransition { .. } | WorkflowError::UnreachableStatus { .. }
        )
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorObject,
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(&'static str, String),
    Forbidden(&'static str, String),
    BadRequest(&'static str, String),
    NotFound(&'static str, String),
    Conflict(&'static str, String),
    Internal(String),
}

impl ApiError {
    pub fn invalid_credentials() -> Self {
        ApiError::Unauthorized("INVALID_CREDENTIALS", "Email or password is incorrect".into())
    }

    pub fn session_expired() -> Self {
        ApiError::Unauthorized("SESSION_EXPIRED", "Session expired".into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(..) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(..) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(..) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(..) => StatusCode::NOT_FOUND,
            ApiError::Conflict(..) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn to_error_response(code: &str, message: &str) -> Json<ErrorResponse> {
        Json(ErrorResponse {
            error: ErrorObject {
                code: code.to_string(),
                message: message.to_string(),
            },
        })
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        let message = err.to_string();
        match err {
            WorkflowError::InvalidTransition { .. } | WorkflowError::UnreachableStatus { .. } => {
                ApiError::Conflict("INVALID_TRANSITION", message)
            }
            WorkflowError::PreconditionFailed { .. } => {
                ApiError::Conflict("PRECONDITION_FAILED", message)
            }
            WorkflowError::Unauthorized { .. } => ApiError::Forbidden("FORBIDDEN", message),
            WorkflowError::EmptyClinicalUpdate => ApiError::BadRequest("VALIDATION_ERROR", message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            ApiError::Unauthorized(code, msg)
            | ApiError::Forbidden(code, msg)
            | ApiError::BadRequest(code, msg)
            | ApiError::NotFound(code, msg)
            | ApiError::Conflict(code, msg) => {
                (status, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Internal(msg) => {
                tracing::error!(%msg, "internal error");
                (status, ApiError::to_error_response("INTERNAL", &msg)).into_response()
            }
        }
    }
}
