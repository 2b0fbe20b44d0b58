//! # Resolution Commands
//!
//! `resolve` is safe to call repeatedly: an existing, current resolution is
//! returned as is. `recompute` forces a fresh snapshot from the current
//! assignments and rates, and is refused once money has been paid.

use serde::Serialize;
use tracing::info;

use super::OpportunityInput;
use crate::auth::Caller;
use crate::error::ApiResult;
use crate::AppState;
use tally_core::schedule::ScheduleSummary;
use tally_core::CommissionResolution;
use tally_db::StoredResolution;

/// A resolution together with its schedule summary.
///
/// ```json
/// {
///   "id": "...", "opportunityId": "opp-1", "totalCommissionCents": 1000000,
///   "shares": [...], "version": 1, "resolvedAt": "...",
///   "schedule": { "totalPaidCents": 0, "completed": false, "installments": [...] }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionView {
    #[serde(flatten)]
    pub resolution: CommissionResolution,
    pub schedule: ScheduleSummary,
}

impl From<StoredResolution> for ResolutionView {
    fn from(stored: StoredResolution) -> Self {
        ResolutionView {
            schedule: stored.schedule.summary(),
            resolution: stored.resolution,
        }
    }
}

/// `commissions.resolve` (team)
pub async fn resolve(state: &AppState, caller: &Caller, input: OpportunityInput) -> ApiResult<ResolutionView> {
    caller.require_team()?;
    run(state, caller, &input.opportunity_id, false).await
}

/// `commissions.recompute` (admin)
pub async fn recompute(
    state: &AppState,
    caller: &Caller,
    input: OpportunityInput,
) -> ApiResult<ResolutionView> {
    caller.require_admin()?;
    run(state, caller, &input.opportunity_id, true).await
}

async fn run(state: &AppState, caller: &Caller, opportunity_id: &str, force: bool) -> ApiResult<ResolutionView> {
    let stored = state.db.resolutions().resolve(opportunity_id, force).await?;

    info!(
        by = %caller.user_id,
        opportunity_id = %opportunity_id,
        resolution_id = %stored.resolution.id,
        version = stored.resolution.version,
        total = %state.config.format_currency(stored.resolution.total_commission_cents),
        forced = force,
        "Commission resolved"
    );
    Ok(stored.into())
}
