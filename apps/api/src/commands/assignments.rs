//! # Role Assignment Commands
//!
//! Admin-only edits of who holds which commission role on an opportunity.
//! Both operations are idempotent. Existing resolutions are not recomputed;
//! an admin runs `commissions.recompute` when the change should apply.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::Caller;
use crate::error::ApiResult;
use crate::AppState;
use tally_core::validation::{validate_employee_id, validate_opportunity_id};
use tally_core::{CommissionRole, RoleAssignment};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleInput {
    pub opportunity_id: String,
    pub employee_id: String,
    pub role: CommissionRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedDto {
    pub removed: bool,
}

/// `commissions.assignRole` (admin)
pub async fn assign_role(state: &AppState, caller: &Caller, input: RoleInput) -> ApiResult<RoleAssignment> {
    caller.require_admin()?;
    validate_opportunity_id(&input.opportunity_id)?;
    validate_employee_id(&input.employee_id)?;

    // Resolve NOT_FOUND before the insert turns it into a foreign key error.
    state.db.opportunities().require(&input.opportunity_id).await?;

    let assignment = state
        .db
        .assignments()
        .assign(&input.opportunity_id, &input.employee_id, input.role)
        .await?;

    info!(
        by = %caller.user_id,
        opportunity_id = %assignment.opportunity_id,
        employee_id = %assignment.employee_id,
        role = %assignment.role,
        "Commission role assigned"
    );
    Ok(assignment)
}

/// `commissions.removeRole` (admin)
pub async fn remove_role(state: &AppState, caller: &Caller, input: RoleInput) -> ApiResult<RemovedDto> {
    caller.require_admin()?;

    let removed = state
        .db
        .assignments()
        .remove(&input.opportunity_id, &input.employee_id, input.role)
        .await?;

    if removed {
        info!(
            by = %caller.user_id,
            opportunity_id = %input.opportunity_id,
            employee_id = %input.employee_id,
            role = %input.role,
            "Commission role removed"
        );
    }
    Ok(RemovedDto { removed })
}
