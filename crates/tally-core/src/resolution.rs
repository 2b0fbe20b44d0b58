//! # Resolution Calculator
//!
//! Turns a concluded opportunity, its role assignments and the rate registry
//! into a commission breakdown.
//!
//! ## Calculation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  evaluate(opportunity, assignments, rates)                              │
//! │                                                                         │
//! │  1. CONCLUDED with final amount?        no ──► NotFinished             │
//! │  2. Collect (employee, role) pairs, sorted + deduplicated              │
//! │  3. Every pair has a rate?              no ──► MissingRate([...])      │
//! │  4. commissionable = final amount (no netting)                         │
//! │  5. share = commissionable × bps / 10 000, half-to-even per share      │
//! │  6. total = Σ rounded shares (never re-rounded)   overflow ──► Overflow│
//! │                                        ───► Resolved(Breakdown)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No assignments is not an error: the breakdown is empty with a zero total.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use ts_rs::TS;

use crate::eligibility::is_resolvable;
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{
    CommissionRate, CommissionResolution, CommissionRole, CommissionShare, Opportunity,
    Percentage, RoleAssignment,
};

// =============================================================================
// Rate Source
// =============================================================================

/// Lookup of the current rate for an (employee, role) pair.
///
/// Implemented for the in-memory shapes the database layer hands over, so
/// the calculator never touches storage itself.
pub trait RateSource {
    fn rate_for(&self, employee_id: &str, role: CommissionRole) -> Option<Percentage>;
}

impl RateSource for HashMap<(String, CommissionRole), Percentage> {
    fn rate_for(&self, employee_id: &str, role: CommissionRole) -> Option<Percentage> {
        self.get(&(employee_id.to_string(), role)).copied()
    }
}

impl RateSource for [CommissionRate] {
    fn rate_for(&self, employee_id: &str, role: CommissionRole) -> Option<Percentage> {
        self.iter()
            .find(|rate| rate.employee_id == employee_id && rate.role == role)
            .map(CommissionRate::percentage)
    }
}

impl RateSource for Vec<CommissionRate> {
    fn rate_for(&self, employee_id: &str, role: CommissionRole) -> Option<Percentage> {
        self.as_slice().rate_for(employee_id, role)
    }
}

// =============================================================================
// Outcome Types
// =============================================================================

/// An assignment that has no rate in the registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MissingRate {
    pub employee_id: String,
    pub role: CommissionRole,
}

/// A computed, not yet persisted, breakdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakdown {
    pub commissionable_amount: Money,
    pub total_commission: Money,
    /// Ordered by (employee_id, role).
    pub shares: Vec<CommissionShare>,
}

/// Result of evaluating an opportunity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    NotFinished,
    /// Every assignment lacking a rate, ordered by (employee_id, role).
    MissingRate(Vec<MissingRate>),
    /// The shares add up past what an i64 amount holds.
    Overflow,
    Resolved(Breakdown),
}

impl ResolutionOutcome {
    /// Converts the outcome into the error taxonomy used by the write path.
    ///
    /// A missing-rate outcome reports its first pair.
    pub fn into_result(self, opportunity_id: &str) -> CoreResult<Breakdown> {
        match self {
            ResolutionOutcome::Resolved(breakdown) => Ok(breakdown),
            ResolutionOutcome::NotFinished => Err(CoreError::NotFinished {
                opportunity_id: opportunity_id.to_string(),
            }),
            ResolutionOutcome::MissingRate(mut missing) => {
                let first = missing.remove(0);
                Err(CoreError::MissingRate {
                    employee_id: first.employee_id,
                    role: first.role,
                })
            }
            ResolutionOutcome::Overflow => Err(CoreError::AmountOverflow {
                opportunity_id: opportunity_id.to_string(),
            }),
        }
    }
}

// =============================================================================
// Calculator
// =============================================================================

/// Evaluates the commission breakdown for `opportunity`.
///
/// Assignments for other opportunities are ignored. Duplicate
/// (employee, role) pairs count once.
pub fn evaluate<R>(
    opportunity: &Opportunity,
    assignments: &[RoleAssignment],
    rates: &R,
) -> ResolutionOutcome
where
    R: RateSource + ?Sized,
{
    let commissionable = match (is_resolvable(opportunity), opportunity.final_amount()) {
        (true, Some(amount)) => amount,
        _ => return ResolutionOutcome::NotFinished,
    };

    let pairs: BTreeSet<(&str, CommissionRole)> = assignments
        .iter()
        .filter(|a| a.opportunity_id == opportunity.id)
        .map(|a| (a.employee_id.as_str(), a.role))
        .collect();

    let mut shares = Vec::with_capacity(pairs.len());
    let mut missing = Vec::new();

    for (employee_id, role) in pairs {
        match rates.rate_for(employee_id, role) {
            Some(rate) => shares.push(CommissionShare {
                employee_id: employee_id.to_string(),
                role,
                percentage_bps: rate.bps(),
                amount_cents: commissionable.apply_percentage(rate).cents(),
            }),
            None => missing.push(MissingRate {
                employee_id: employee_id.to_string(),
                role,
            }),
        }
    }

    if !missing.is_empty() {
        return ResolutionOutcome::MissingRate(missing);
    }

    let Some(total_commission) = Money::checked_sum(shares.iter().map(CommissionShare::amount)) else {
        return ResolutionOutcome::Overflow;
    };

    ResolutionOutcome::Resolved(Breakdown {
        commissionable_amount: commissionable,
        total_commission,
        shares,
    })
}

/// [`evaluate`], converted to a `CoreResult`.
pub fn resolve<R>(
    opportunity: &Opportunity,
    assignments: &[RoleAssignment],
    rates: &R,
) -> CoreResult<Breakdown>
where
    R: RateSource + ?Sized,
{
    evaluate(opportunity, assignments, rates).into_result(&opportunity.id)
}

// =============================================================================
// Re-resolution
// =============================================================================

/// What the write path must do with an existing resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPlan {
    /// No resolution yet.
    Create,
    /// Stored breakdown is current; return it unchanged.
    Keep,
    /// Discard shares and schedule, then compute again.
    Recompute,
}

/// Decides between keeping, creating and recomputing.
///
/// `force` is the explicit admin recompute. A resolution is stale when the
/// opportunity's final amount moved or it stopped being resolvable. A stale
/// or forced resolution with any PAID installment is locked.
pub fn plan(
    existing: Option<&CommissionResolution>,
    opportunity: &Opportunity,
    has_payments: bool,
    force: bool,
) -> CoreResult<ResolutionPlan> {
    let Some(resolution) = existing else {
        return Ok(ResolutionPlan::Create);
    };

    let current = is_resolvable(opportunity) && !resolution.is_stale_for(opportunity);
    if !force && current {
        return Ok(ResolutionPlan::Keep);
    }

    if has_payments {
        return Err(CoreError::ResolutionLocked {
            resolution_id: resolution.id.clone(),
        });
    }

    Ok(ResolutionPlan::Recompute)
}

/// Guards a schedule write against a resolution the opportunity has moved
/// away from.
///
/// Installments are only checked against the stored total, so writing them
/// while the final amount differs would schedule (and later pay) figures
/// nobody owes any more.
pub fn ensure_current(
    resolution: &CommissionResolution,
    opportunity: &Opportunity,
    has_payments: bool,
) -> CoreResult<()> {
    if is_resolvable(opportunity) && !resolution.is_stale_for(opportunity) {
        return Ok(());
    }

    if has_payments {
        Err(CoreError::ResolutionLocked {
            resolution_id: resolution.id.clone(),
        })
    } else {
        Err(CoreError::ResolutionStale {
            resolution_id: resolution.id.clone(),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
