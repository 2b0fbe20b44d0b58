//! # Validation Module
//!
//! Input validation for the commission procedures.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Dashboard (TypeScript)                                       │
//! │  ├── Basic format checks (empty, range)                                │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: RPC handler (Rust)                                           │
//! │  ├── Type validation (deserialization)                                 │
//! │  └── THIS MODULE: percentages, ids, installment input                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (percentage_bps BETWEEN 0 AND 10000)                        │
//! │  ├── CHECK amount/date both-or-neither                                 │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::validation::{validate_employee_id, validate_percentage};
//!
//! validate_employee_id("emp-001").unwrap();
//! assert_eq!(validate_percentage(12.5).unwrap().bps(), 1250);
//! ```

use chrono::NaiveDate;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::Percentage;
use crate::{FULL_PERCENTAGE_BPS, MAX_INSTALLMENTS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest identifier accepted for employees and opportunities.
pub const MAX_ID_LENGTH: usize = 64;

// =============================================================================
// Identifier Validators
// =============================================================================

/// Validates an identifier such as an employee or opportunity id.
///
/// ## Rules
/// - Must not be empty (after trimming)
/// - At most [`MAX_ID_LENGTH`] characters
/// - Letters, numbers, hyphens and underscores only
pub fn validate_id(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > MAX_ID_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_ID_LENGTH,
        });
    }

    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates an employee id.
pub fn validate_employee_id(employee_id: &str) -> ValidationResult<()> {
    validate_id("employee_id", employee_id)
}

/// Validates an opportunity id.
pub fn validate_opportunity_id(opportunity_id: &str) -> ValidationResult<()> {
    validate_id("opportunity_id", opportunity_id)
}

// =============================================================================
// Percentage Validator
// =============================================================================

/// Converts a user-entered percentage into basis points.
///
/// ## Rules
/// - Must be finite
/// - Must be within [0, 100]
/// - At most two decimal places; `12.345` is rejected, not rounded
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_percentage;
///
/// assert_eq!(validate_percentage(10.0).unwrap().bps(), 1000);
/// assert_eq!(validate_percentage(0.0).unwrap().bps(), 0);
/// assert!(validate_percentage(100.01).is_err());
/// assert!(validate_percentage(1.005).is_err());
/// ```
pub fn validate_percentage(value: f64) -> CoreResult<Percentage> {
    let invalid = |reason: &str| CoreError::InvalidPercentage {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    if !value.is_finite() {
        return Err(invalid("must be a finite number"));
    }

    if !(0.0..=100.0).contains(&value) {
        return Err(invalid("must be between 0 and 100"));
    }

    let scaled = value * 100.0;
    let bps = scaled.round();
    // Tolerance absorbs binary representation noise such as 12.34 * 100
    if (scaled - bps).abs() > 1e-6 {
        return Err(invalid("must have at most two decimal places"));
    }

    let bps = bps as u32;
    if bps > FULL_PERCENTAGE_BPS {
        return Err(invalid("must be between 0 and 100"));
    }

    Ok(Percentage::from_bps(bps))
}

/// Validates a stored basis-point value.
pub fn validate_percentage_bps(bps: u32) -> CoreResult<Percentage> {
    if bps > FULL_PERCENTAGE_BPS {
        return Err(CoreError::InvalidPercentage {
            value: format!("{} bps", bps),
            reason: "must be between 0 and 10000 basis points".to_string(),
        });
    }
    Ok(Percentage::from_bps(bps))
}

// =============================================================================
// Installment Validators
// =============================================================================

/// Validates an installment slot index.
pub fn validate_installment_index(index: usize) -> CoreResult<()> {
    if index >= MAX_INSTALLMENTS {
        return Err(CoreError::InvalidInstallmentIndex {
            index,
            max: MAX_INSTALLMENTS,
        });
    }
    Ok(())
}

/// Validates the amount/date pair of a `set_installment` call.
///
/// ## Rules
/// - Amount and date travel together (both-or-neither)
/// - Neither present is also rejected: clearing is its own operation
/// - Amount must be positive
pub fn validate_installment_input(
    amount_cents: Option<i64>,
    payment_date: Option<NaiveDate>,
) -> ValidationResult<(Money, NaiveDate)> {
    match (amount_cents, payment_date) {
        (Some(cents), Some(date)) => {
            if cents <= 0 {
                return Err(ValidationError::MustBePositive {
                    field: "amount_cents".to_string(),
                });
            }
            Ok((Money::from_cents(cents), date))
        }
        (Some(_), None) => Err(ValidationError::BothOrNeither {
            present: "amount_cents".to_string(),
            missing: "payment_date".to_string(),
        }),
        (None, Some(_)) => Err(ValidationError::BothOrNeither {
            present: "payment_date".to_string(),
            missing: "amount_cents".to_string(),
        }),
        (None, None) => Err(ValidationError::Required {
            field: "amount_cents".to_string(),
        }),
    }
}

/// A refund or reversal never becomes a commissionable amount.
pub fn validate_final_amount(final_amount_cents: Option<i64>) -> ValidationResult<()> {
    match final_amount_cents {
        Some(cents) if cents < 0 => Err(ValidationError::InvalidFormat {
            field: "final_amount_cents".to_string(),
            reason: "must not be negative".to_string(),
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
