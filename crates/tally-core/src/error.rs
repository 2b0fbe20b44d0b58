//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                         │
//! │  ├── CoreError        - Blocked states and rule violations             │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  tally-db errors (separate crate)                                      │
//! │  └── DbError          - Store failures, stale versions                 │
//! │                                                                         │
//! │  API errors (apps/api)                                                 │
//! │  └── ApiError         - What the dashboard sees (code + message)       │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → ApiError → Frontend     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant of [`CoreError`] is a state the admin UI renders on its
//! own, so none of them may be collapsed into a generic failure.

use thiserror::Error;

use crate::types::{CommissionRole, InstallmentStatus};

// =============================================================================
// Core Error
// =============================================================================

/// Commission engine errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The opportunity is not concluded or has no final amount yet.
    ///
    /// ## When This Occurs
    /// - status is ACTIVE or INACTIVE
    /// - status is CONCLUDED but `final_amount_cents` is still null
    ///
    /// Recoverable: retry once the opportunity concludes.
    #[error("Opportunity {opportunity_id} is not finished")]
    NotFinished { opportunity_id: String },

    /// An assigned employee has no rate for the role they hold.
    ///
    /// Recoverable: an admin sets the rate, then resolution is retried.
    #[error("No commission rate for employee {employee_id} as {role}")]
    MissingRate {
        employee_id: String,
        role: CommissionRole,
    },

    /// Recomputation refused because money has already moved.
    #[error("Resolution {resolution_id} has paid installments and cannot be recomputed")]
    ResolutionLocked { resolution_id: String },

    /// The opportunity's final amount moved since the resolution was
    /// computed, and nothing is PAID yet.
    ///
    /// Recoverable: resolve the opportunity again (which recomputes and
    /// resets the schedule), then re-enter the installments.
    #[error("Resolution {resolution_id} is out of date with its opportunity and must be resolved again")]
    ResolutionStale { resolution_id: String },

    /// Summing the shares does not fit in a 64-bit amount.
    #[error("Commission total for opportunity {opportunity_id} overflows")]
    AmountOverflow { opportunity_id: String },

    /// The installments would promise more than the resolved total.
    ///
    /// ## User Workflow
    /// ```text
    /// total = 10,000
    ///   #1  4,000  PENDING
    ///   #2  4,000  PENDING
    ///   #3  3,000  ← set_installment
    ///      │
    ///      ▼
    /// ScheduleExceedsTotal { scheduled: 11,000, total: 10,000 }
    /// ```
    #[error("Installments would total {scheduled_cents} but commission is {total_cents}")]
    ScheduleExceedsTotal {
        scheduled_cents: i64,
        total_cents: i64,
    },

    /// The installment has no amount/date yet.
    #[error("Installment {index} has no amount and date")]
    NotReady { index: usize },

    /// The installment is PAID and can no longer change.
    #[error("Installment {index} is paid and locked")]
    InstallmentLocked { index: usize },

    /// The requested move is not an edge of the installment state machine.
    #[error("Installment {index} cannot move from {from} to {to}")]
    InvalidTransition {
        index: usize,
        from: InstallmentStatus,
        to: InstallmentStatus,
    },

    /// Percentage outside [0, 100], not finite, or finer than a basis point.
    #[error("Invalid percentage {value}: {reason}")]
    InvalidPercentage { value: String, reason: String },

    /// Installment index outside the schedule.
    #[error("Installment index {index} is out of range (0..{max})")]
    InvalidInstallmentIndex { index: usize, max: usize },

    /// Opportunity cannot be found.
    #[error("Opportunity not found: {0}")]
    OpportunityNotFound(String),

    /// Resolution cannot be found.
    #[error("Resolution not found: {0}")]
    ResolutionNotFound(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any business rule runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid identifier, unknown role).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Only one of two fields that must travel together was supplied.
    #[error("{present} was given without {missing}")]
    BothOrNeither { present: String, missing: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::MissingRate {
            employee_id: "emp-1".to_string(),
            role: CommissionRole::AccountManager,
        };
        assert_eq!(
            err.to_string(),
            "No commission rate for employee emp-1 as ACCOUNT_MANAGER"
        );

        let err = CoreError::ScheduleExceedsTotal {
            scheduled_cents: 1_100_000,
            total_cents: 1_000_000,
        };
        assert_eq!(
            err.to_string(),
            "Installments would total 1100000 but commission is 1000000"
        );
    }

    #[test]
    fn test_transition_message_uses_wire_names() {
        let err = CoreError::InvalidTransition {
            index: 1,
            from: InstallmentStatus::Scheduled,
            to: InstallmentStatus::Pending,
        };
        assert_eq!(
            err.to_string(),
            "Installment 1 cannot move from SCHEDULED to PENDING"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "employee_id".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
