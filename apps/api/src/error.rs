//! # API Error Type
//!
//! Unified error type for RPC procedures.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Tally                                  │
//! │                                                                         │
//! │  Dashboard                   Rust Backend                               │
//! │  ─────────                   ────────────                               │
//! │                                                                         │
//! │  POST /rpc/commissions.resolve                                          │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Command Function  → Result<T, ApiError>                         │  │
//! │  │         │                                                        │  │
//! │  │  AuthError ─────────────── UNAUTHORIZED / FORBIDDEN ──┐          │  │
//! │  │  CoreError ─────────────── one code per state ────────┤          │  │
//! │  │  DbError::Rejected(core) ─ same as CoreError ─────────┼► ApiError│  │
//! │  │  DbError::Conflict/Busy ── CONFLICT (retry) ──────────┤          │  │
//! │  │  DbError (other) ───────── DATABASE_ERROR (logged) ───┘          │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  { "code": "MISSING_RATE",                                              │
//! │    "message": "No commission rate for employee emp-1 as DEAL_SUPPORT",  │
//! │    "details": { "employeeId": "emp-1", "role": "DEAL_SUPPORT" } }       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tally_core::{CoreError, ValidationError};
use tally_db::DbError;

use crate::auth::AuthError;

/// API error returned from RPC procedures.
///
/// ## Serialization
/// ```json
/// {
///   "code": "NOT_FOUND",
///   "message": "Opportunity not found: opp-1"
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,

    /// Structured context for states the dashboard renders specially
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Opportunity not concluded or without final amount (422)
    NotFinished,

    /// An assigned employee has no rate for their role (422)
    MissingRate,

    /// Recompute refused after a payment (422)
    ResolutionLocked,

    /// Final amount moved since resolution; resolve again first (409)
    ResolutionStale,

    /// Installments would exceed the total commission (422)
    ScheduleExceedsTotal,

    /// Installment has no amount/date (422)
    NotReady,

    /// Installment is PAID (422)
    InstallmentLocked,

    /// Not an edge of the installment state machine (422)
    InvalidTransition,

    /// Percentage out of range or too precise (400)
    InvalidPercentage,

    /// Caller lacks the capability (403)
    Forbidden,

    /// Missing or invalid token (401)
    Unauthorized,

    /// Resource not found (404)
    NotFound,

    /// Input validation failed (400)
    ValidationError,

    /// Stale version, retry (409)
    Conflict,

    /// Request exceeded its deadline (504)
    Timeout,

    /// Database operation failed (500)
    DatabaseError,

    /// Internal server error (500)
    Internal,
}

impl ErrorCode {
    /// HTTP status for this code.
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::NotFinished
            | ErrorCode::MissingRate
            | ErrorCode::ResolutionLocked
            | ErrorCode::ScheduleExceedsTotal
            | ErrorCode::NotReady
            | ErrorCode::InstallmentLocked
            | ErrorCode::InvalidTransition => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::InvalidPercentage | ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict | ErrorCode::ResolutionStale => StatusCode::CONFLICT,
            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::DatabaseError | ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attaches structured details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Creates a not found error.
    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    /// Creates a timeout error.
    pub fn timeout(procedure: &str) -> Self {
        ApiError::new(
            ErrorCode::Timeout,
            format!("{} timed out, retry the request", procedure),
        )
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Internal, message)
    }
}

/// Converts core errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::NotFinished { opportunity_id } => ApiError::new(ErrorCode::NotFinished, message)
                .with_details(json!({ "opportunityId": opportunity_id })),
            CoreError::MissingRate { employee_id, role } => ApiError::new(ErrorCode::MissingRate, message)
                .with_details(json!({ "employeeId": employee_id, "role": role })),
            CoreError::ResolutionLocked { resolution_id } => {
                ApiError::new(ErrorCode::ResolutionLocked, message)
                    .with_details(json!({ "resolutionId": resolution_id }))
            }
            CoreError::ResolutionStale { resolution_id } => {
                ApiError::new(ErrorCode::ResolutionStale, message)
                    .with_details(json!({ "resolutionId": resolution_id }))
            }
            CoreError::AmountOverflow { opportunity_id } => ApiError::validation(message)
                .with_details(json!({ "opportunityId": opportunity_id })),
            CoreError::ScheduleExceedsTotal {
                scheduled_cents,
                total_cents,
            } => ApiError::new(ErrorCode::ScheduleExceedsTotal, message).with_details(json!({
                "scheduledCents": scheduled_cents,
                "totalCents": total_cents,
            })),
            CoreError::NotReady { index } => {
                ApiError::new(ErrorCode::NotReady, message).with_details(json!({ "index": index }))
            }
            CoreError::InstallmentLocked { index } => ApiError::new(ErrorCode::InstallmentLocked, message)
                .with_details(json!({ "index": index })),
            CoreError::InvalidTransition { index, from, to } => {
                ApiError::new(ErrorCode::InvalidTransition, message)
                    .with_details(json!({ "index": index, "from": from, "to": to }))
            }
            CoreError::InvalidPercentage { .. } => ApiError::new(ErrorCode::InvalidPercentage, message),
            CoreError::InvalidInstallmentIndex { .. } => ApiError::validation(message),
            CoreError::OpportunityNotFound(id) => ApiError::not_found("Opportunity", &id),
            CoreError::ResolutionNotFound(id) => ApiError::not_found("Resolution", &id),
            CoreError::Validation(e) => ApiError::validation(e.to_string()),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation(err.to_string())
    }
}

/// Converts database errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Rejected(core) => core.into(),
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            DbError::Conflict { .. } => ApiError::new(ErrorCode::Conflict, err.to_string()),
            DbError::Busy(_) => ApiError::new(ErrorCode::Conflict, "Database busy, retry the request"),
            DbError::UniqueViolation { .. } => ApiError::new(ErrorCode::Conflict, err.to_string()),
            DbError::ForeignKeyViolation { message } => {
                tracing::error!("Foreign key violation: {}", message);
                ApiError::validation("Invalid reference")
            }
            DbError::ConnectionFailed(_) => {
                ApiError::new(ErrorCode::DatabaseError, "Database connection failed")
            }
            DbError::MigrationFailed(_) => {
                ApiError::new(ErrorCode::DatabaseError, "Database migration failed")
            }
            DbError::QueryFailed(e) => {
                // Log the actual error but return a generic message
                tracing::error!("Database query failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
            DbError::Corrupt { entity, id, reason } => {
                tracing::error!(entity = %entity, id = %id, reason = %reason, "Corrupt record");
                ApiError::new(ErrorCode::DatabaseError, "Stored data is inconsistent")
            }
            DbError::PoolExhausted => {
                ApiError::new(ErrorCode::DatabaseError, "Database pool exhausted")
            }
            DbError::Internal(e) => {
                tracing::error!("Internal database error: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

/// Converts authentication errors to API errors.
impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Forbidden(_) => ApiError::new(ErrorCode::Forbidden, err.to_string()),
            _ => ApiError::new(ErrorCode::Unauthorized, err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code.status(), Json(self)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Convenience type alias for procedure results.
pub type ApiResult<T> = Result<T, ApiError>;
