//! # Overview Commands
//!
//! Read-side projections over every opportunity an employee (or the whole
//! firm) is involved in. Building an overview resolves lazily: a resolvable
//! opportunity without a resolution gets one on the way, and an opportunity
//! blocked on rates reports every missing (employee, role) pair.

use tracing::debug;

use super::EmployeeInput;
use crate::auth::Caller;
use crate::error::ApiResult;
use crate::AppState;
use tally_core::eligibility::is_resolvable;
use tally_core::overview::{admin_overview, employee_overview, AdminOverview, EmployeeOverviewRow, OpportunityRecord};
use tally_core::resolution::{evaluate, ResolutionOutcome};
use tally_core::{CoreError, Opportunity};
use tally_db::{DbError, DbResult};

/// Gathers everything the projections need for one opportunity.
async fn load_record(state: &AppState, opportunity: Opportunity) -> DbResult<OpportunityRecord> {
    let assignments = state
        .db
        .assignments()
        .list_for_opportunity(&opportunity.id)
        .await?;
    let existing = state.db.resolutions().get_by_opportunity(&opportunity.id).await?;

    let mut record = OpportunityRecord {
        resolution: existing.map(|stored| (stored.resolution, stored.schedule)),
        opportunity,
        assignments,
        missing_rates: Vec::new(),
    };

    if !is_resolvable(&record.opportunity) {
        return Ok(record);
    }
    if record.assignments.is_empty() && record.resolution.is_none() {
        return Ok(record);
    }

    match state.db.resolutions().resolve(&record.opportunity.id, false).await {
        Ok(stored) => {
            record.resolution = Some((stored.resolution, stored.schedule));
        }
        Err(DbError::Rejected(CoreError::MissingRate { .. })) => {
            let rates = state
                .db
                .rates()
                .list_for_opportunity(&record.opportunity.id)
                .await?;
            if let ResolutionOutcome::MissingRate(missing) =
                evaluate(&record.opportunity, &record.assignments, &rates)
            {
                record.missing_rates = missing;
            }
            record.resolution = None;
        }
        // Stale and paid: keep showing the stored one, classified LOCKED.
        Err(DbError::Rejected(CoreError::ResolutionLocked { .. })) => {
            debug!(opportunity_id = %record.opportunity.id, "Resolution locked");
        }
        Err(e) => return Err(e),
    }

    Ok(record)
}

/// `commissions.getEmployeeOverview` (self or admin)
pub async fn get_employee_overview(
    state: &AppState,
    caller: &Caller,
    input: EmployeeInput,
) -> ApiResult<Vec<EmployeeOverviewRow>> {
    caller.require_self_or_admin(&input.employee_id)?;

    let opportunities = state
        .db
        .opportunities()
        .list_for_employee(&input.employee_id)
        .await?;

    let mut records = Vec::with_capacity(opportunities.len());
    for opportunity in opportunities {
        records.push(load_record(state, opportunity).await?);
    }

    Ok(employee_overview(&input.employee_id, &records))
}

/// `commissions.getAdminOverview` (admin)
pub async fn get_admin_overview(state: &AppState, caller: &Caller) -> ApiResult<AdminOverview> {
    caller.require_admin()?;

    let opportunities = state.db.opportunities().list_all().await?;

    let mut records = Vec::with_capacity(opportunities.len());
    for opportunity in opportunities {
        records.push(load_record(state, opportunity).await?);
    }

    let overview = admin_overview(&records);
    debug!(
        opportunities = records.len(),
        pending = overview.pending_count,
        completed = overview.completed_count,
        flagged = overview.flagged.len(),
        "Admin overview built"
    );
    Ok(overview)
}
