//! JSON error responses: `{"error": {"code": ..., "message": ...}}`.
//!
//! The HTTP status is derived from the code, so handlers only pick a code.

use std::fmt::Display;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use postventa::actions::ActionError;
use postventa::core::identity::IdentityError;
use postventa::core::schedule::ScheduleError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("forbidden", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new("invalid", message)
    }

    /// Unexpected failure; details go to the log, not to the client.
    pub fn internal(err: impl Display) -> Self {
        error!(error = %err, "internal error");
        Self::new("internal", "internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.code {
            "unauthorized" | "invalid_credentials" => StatusCode::UNAUTHORIZED,
            "forbidden" | "inactive" | "not_staff" => StatusCode::FORBIDDEN,
            "not_found" => StatusCode::NOT_FOUND,
            "conflict" | "transition" | "ambiguous" => StatusCode::CONFLICT,
            "invalid" => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        });
        (self.status(), Json(body)).into_response()
    }
}

impl From<ActionError> for ApiError {
    fn from(err: ActionError) -> Self {
        let message = err.to_string();
        match err {
            ActionError::Forbidden(_) => Self::new("forbidden", message),
            ActionError::NotFound { .. } => Self::new("not_found", message),
            ActionError::Conflict(_) => Self::new("conflict", message),
            ActionError::Invalid(_) => Self::new("invalid", message),
            ActionError::Transition(_) => Self::new("transition", message),
            ActionError::Schedule(ScheduleError::Duplicate(_) | ScheduleError::Overlap(_)) => {
                Self::new("conflict", message)
            }
            ActionError::Schedule(_) => Self::new("invalid", message),
            ActionError::Template(err) => Self::internal(err),
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        let message = err.to_string();
        match err {
            // Unknown identifiers and bad passwords look the same to clients.
            IdentityError::NotFound | IdentityError::InvalidCredentials => {
                Self::new("invalid_credentials", "invalid credentials")
            }
            IdentityError::Ambiguous { .. } => Self::new("ambiguous", message),
            IdentityError::Inactive => Self::new("inactive", message),
            IdentityError::NotStaff => Self::new("not_staff", message),
        }
    }
}
