//! # Overview Projections
//!
//! Read-only views over resolved commissions for employees and admins.
//!
//! ## Resolution State
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  classify(record)                                                       │
//! │                                                                         │
//! │  not CONCLUDED / no final amount ─────────────────► NOT_FINISHED       │
//! │  no resolution, rates missing    ─────────────────► MISSING_RATE       │
//! │  amount changed after a payment  ─────────────────► LOCKED             │
//! │  total 0, or all set slots PAID (≥ 1 set) ────────► COMPLETED          │
//! │  anything else                   ─────────────────► PENDING            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The caller resolves lazily before projecting: every resolvable record
//! arrives either with its current resolution, with the missing rates that
//! blocked it, or with a stale resolution that is locked by payments.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::eligibility::is_resolvable;
use crate::resolution::MissingRate;
use crate::schedule::PaymentSchedule;
use crate::types::{
    CommissionResolution, CommissionRole, CommissionShare, Opportunity, OpportunityKind,
    OpportunityStatus, RoleAssignment,
};

// =============================================================================
// Inputs
// =============================================================================

/// Everything the projections need to know about one opportunity.
#[derive(Debug, Clone)]
pub struct OpportunityRecord {
    pub opportunity: Opportunity,
    pub assignments: Vec<RoleAssignment>,
    pub resolution: Option<(CommissionResolution, PaymentSchedule)>,
    /// Rates that blocked resolution, in (employee_id, role) order.
    pub missing_rates: Vec<MissingRate>,
}

// =============================================================================
// Resolution State
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionState {
    NotFinished,
    MissingRate { missing: Vec<MissingRate> },
    Locked,
    Pending,
    Completed,
}

impl ResolutionState {
    /// States an admin has to act on.
    pub fn is_flagged(&self) -> bool {
        matches!(
            self,
            ResolutionState::NotFinished | ResolutionState::MissingRate { .. } | ResolutionState::Locked
        )
    }
}

/// Classifies one opportunity.
pub fn classify(record: &OpportunityRecord) -> ResolutionState {
    if !is_resolvable(&record.opportunity) {
        return ResolutionState::NotFinished;
    }

    match &record.resolution {
        Some((resolution, schedule)) => {
            if resolution.is_stale_for(&record.opportunity) && schedule.has_payments() {
                ResolutionState::Locked
            } else if schedule.is_completed() {
                ResolutionState::Completed
            } else {
                ResolutionState::Pending
            }
        }
        None if !record.missing_rates.is_empty() => ResolutionState::MissingRate {
            missing: record.missing_rates.clone(),
        },
        None => ResolutionState::Pending,
    }
}

// =============================================================================
// Employee Overview
// =============================================================================

/// One opportunity as the assigned employee sees it.
///
/// Carries only the employee's own shares, never colleagues' entitlements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeOverviewRow {
    pub opportunity_id: String,
    pub name: String,
    pub kind: OpportunityKind,
    pub status: OpportunityStatus,
    pub roles: Vec<CommissionRole>,
    pub state: ResolutionState,
    pub resolution_id: Option<String>,
    pub shares: Vec<CommissionShare>,
    pub own_total_cents: i64,
}

/// Builds the overview for `employee_id`, ordered by opportunity name.
///
/// A `MissingRate` state lists only the viewer's own missing pairs. It stays
/// `MissingRate` with an empty list when only colleagues' rates are missing.
pub fn employee_overview(employee_id: &str, records: &[OpportunityRecord]) -> Vec<EmployeeOverviewRow> {
    let mut rows: Vec<EmployeeOverviewRow> = records
        .iter()
        .filter_map(|record| {
            let mut roles: Vec<CommissionRole> = record
                .assignments
                .iter()
                .filter(|a| a.employee_id == employee_id && a.opportunity_id == record.opportunity.id)
                .map(|a| a.role)
                .collect();
            if roles.is_empty() {
                return None;
            }
            roles.sort();
            roles.dedup();

            let state = match classify(record) {
                ResolutionState::MissingRate { missing } => ResolutionState::MissingRate {
                    missing: missing
                        .into_iter()
                        .filter(|pair| pair.employee_id == employee_id)
                        .collect(),
                },
                state => state,
            };
            let (resolution_id, shares) = match &record.resolution {
                Some((resolution, _)) => (
                    Some(resolution.id.clone()),
                    resolution
                        .shares
                        .iter()
                        .filter(|share| share.employee_id == employee_id)
                        .cloned()
                        .collect::<Vec<_>>(),
                ),
                None => (None, Vec::new()),
            };
            let own_total_cents = shares.iter().map(|share| share.amount_cents).sum();

            Some(EmployeeOverviewRow {
                opportunity_id: record.opportunity.id.clone(),
                name: record.opportunity.name.clone(),
                kind: record.opportunity.kind,
                status: record.opportunity.status,
                roles,
                state,
                resolution_id,
                shares,
                own_total_cents,
            })
        })
        .collect();

    rows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.opportunity_id.cmp(&b.opportunity_id)));
    rows
}

// =============================================================================
// Admin Overview
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AdminOverviewRow {
    pub opportunity_id: String,
    pub name: String,
    pub kind: OpportunityKind,
    pub status: OpportunityStatus,
    pub state: ResolutionState,
    pub resolution_id: Option<String>,
    pub total_commission_cents: i64,
    pub total_paid_cents: i64,
    pub total_remaining_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RoleTotal {
    pub role: CommissionRole,
    pub total_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct FlaggedOpportunity {
    pub opportunity_id: String,
    pub name: String,
    pub state: ResolutionState,
}

/// Company-wide commission picture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AdminOverview {
    pub rows: Vec<AdminOverviewRow>,
    /// One entry per role, zero when nothing resolved under it.
    pub role_totals: Vec<RoleTotal>,
    pub pending_count: usize,
    pub completed_count: usize,
    pub flagged: Vec<FlaggedOpportunity>,
}

/// Builds the admin overview.
///
/// Opportunities with neither assignments nor a resolution carry no
/// commission and are left out.
pub fn admin_overview(records: &[OpportunityRecord]) -> AdminOverview {
    let mut role_totals: BTreeMap<CommissionRole, i64> =
        CommissionRole::ALL.into_iter().map(|role| (role, 0)).collect();
    let mut rows = Vec::new();

    for record in records
        .iter()
        .filter(|r| !r.assignments.is_empty() || r.resolution.is_some())
    {
        let state = classify(record);

        let (resolution_id, total, paid, remaining) = match &record.resolution {
            Some((resolution, schedule)) => {
                for share in &resolution.shares {
                    *role_totals.entry(share.role).or_insert(0) += share.amount_cents;
                }
                (
                    Some(resolution.id.clone()),
                    resolution.total_commission_cents,
                    schedule.total_paid().cents(),
                    schedule.total_remaining().cents(),
                )
            }
            None => (None, 0, 0, 0),
        };

        rows.push(AdminOverviewRow {
            opportunity_id: record.opportunity.id.clone(),
            name: record.opportunity.name.clone(),
            kind: record.opportunity.kind,
            status: record.opportunity.status,
            state,
            resolution_id,
            total_commission_cents: total,
            total_paid_cents: paid,
            total_remaining_cents: remaining,
        });
    }

    rows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.opportunity_id.cmp(&b.opportunity_id)));

    let pending_count = rows
        .iter()
        .filter(|row| row.state == ResolutionState::Pending)
        .count();
    let completed_count = rows
        .iter()
        .filter(|row| row.state == ResolutionState::Completed)
        .count();
    let flagged = rows
        .iter()
        .filter(|row| row.state.is_flagged())
        .map(|row| FlaggedOpportunity {
            opportunity_id: row.opportunity_id.clone(),
            name: row.name.clone(),
            state: row.state.clone(),
        })
        .collect();

    AdminOverview {
        rows,
        role_totals: role_totals
            .into_iter()
            .map(|(role, total_cents)| RoleTotal { role, total_cents })
            .collect(),
        pending_count,
        completed_count,
        flagged,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
