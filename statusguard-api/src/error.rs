/// Error handling for the API server
///
/// All handlers return `Result<T, ApiError>`, which converts to an HTTP status
/// and a JSON body. Engine denials keep their reason code in `reason`, and
/// quota denials add the tier `limit` so clients can explain the rejection.
///
/// # Status Mapping
///
/// | Engine outcome | Status |
/// |---|---|
/// | `NotFound` | 404 |
/// | `NotOwner`, `Forbidden`, `InactiveUser`, `SelfProtection`, `QuotaExceeded` | 403 |
/// | `InvitationExpired`, `AlreadyResponded`, `LastOwnerProtected`, `InvalidTransition` | 409 |
/// | `Invalid` | 422 |
/// | `Conflict` | 409 |
/// | `FeatureDisabled` | 503 |
/// | Database | 500 |
///
/// # Example
///
/// ```
/// use statusguard_api::error::ApiResult;
/// use axum::Json;
/// use serde_json::json;
///
/// async fn handler() -> ApiResult<Json<serde_json::Value>> {
///     Ok(Json(json!({ "ok": true })))
/// }
/// ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use statusguard_shared::auth::jwt::JwtError;
use statusguard_shared::error::{Denial, Error};
use std::fmt;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),

    /// Unauthorized (401)
    Unauthorized(String),

    /// Engine denial (404, 403 or 409 depending on the reason)
    Denied(Denial),

    /// Conflict (409) - duplicate name, existing member, pending invitation
    Conflict(String),

    /// Unprocessable entity (422) - validation errors
    ValidationError(String),

    /// Internal server error (500)
    InternalError(String),

    /// Service unavailable (503) - feature switched off
    ServiceUnavailable(String),
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "not_found", "unauthorized")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Denial reason code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Tier limit for quota denials
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

fn denial_status(denial: &Denial) -> (StatusCode, &'static str) {
    match denial {
        Denial::NotFound => (StatusCode::NOT_FOUND, "not_found"),
        Denial::NotOwner
        | Denial::Forbidden
        | Denial::InactiveUser
        | Denial::SelfProtection
        | Denial::QuotaExceeded { .. } => (StatusCode::FORBIDDEN, "forbidden"),
        Denial::InvitationExpired
        | Denial::AlreadyResponded
        | Denial::LastOwnerProtected
        | Denial::InvalidTransition => (StatusCode::CONFLICT, "conflict"),
    }
}

impl ApiError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Denied(denial) => denial_status(denial).0,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Denied(denial) => write!(f, "Denied: {}", denial),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::ValidationError(msg) => write!(f, "Validation failed: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (error_code, message) = match &self {
            ApiError::BadRequest(msg) => ("bad_request", msg.clone()),
            ApiError::Unauthorized(msg) => ("unauthorized", msg.clone()),
            ApiError::Denied(denial) => (denial_status(denial).1, denial.to_string()),
            ApiError::Conflict(msg) => ("conflict", msg.clone()),
            ApiError::ValidationError(msg) => ("validation_error", msg.clone()),
            ApiError::InternalError(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!("Internal error: {}", msg);
                ("internal_error", "An internal error occurred".to_string())
            }
            ApiError::ServiceUnavailable(msg) => ("service_unavailable", msg.clone()),
        };

        let (reason, limit) = match &self {
            ApiError::Denied(denial) => {
                let limit = match denial {
                    Denial::QuotaExceeded { limit, .. } => Some(*limit),
                    _ => None,
                };
                (Some(denial.code().to_string()), limit)
            }
            _ => (None, None),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            reason,
            limit,
        });

        (status, body).into_response()
    }
}

/// Convert engine errors to API errors
impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Denied(denial) => ApiError::Denied(denial),
            Error::Invalid(msg) => ApiError::ValidationError(msg),
            Error::Conflict(msg) => ApiError::Conflict(msg),
            Error::FeatureDisabled(feature) => {
                ApiError::ServiceUnavailable(format!("The {} feature is disabled", feature))
            }
            Error::Database(err) => ApiError::InternalError(format!("Database error: {}", err)),
        }
    }
}

/// Convert sqlx errors to API errors
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::InternalError(format!("Database error: {}", err))
    }
}

/// Convert JWT errors to API errors
impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => ApiError::Unauthorized("Token expired".to_string()),
            JwtError::InvalidIssuer => ApiError::Unauthorized("Invalid token issuer".to_string()),
            _ => ApiError::Unauthorized(format!("Invalid token: {}", err)),
        }
    }
}
