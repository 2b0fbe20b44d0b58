//! # Rate Commands
//!
//! The rate registry: one global percentage per (employee, role).
//!
//! Rates are validated at the edge (`[0, 100]`, at most two decimals) and
//! stored as basis points. Edits only affect future resolutions.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::EmployeeInput;
use crate::auth::Caller;
use crate::error::ApiResult;
use crate::AppState;
use tally_core::validation::{validate_employee_id, validate_percentage};
use tally_core::{CommissionRate, CommissionRole};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetRateInput {
    pub employee_id: String,
    pub role: CommissionRole,
    /// Percentage in [0, 100], e.g. `2.5` for 2.5%.
    pub percentage: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRateInput {
    pub employee_id: String,
    pub role: CommissionRole,
}

/// A rate lookup. `percentage_bps` is `None` when never set, which is not
/// the same as zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLookup {
    pub employee_id: String,
    pub role: CommissionRole,
    pub percentage_bps: Option<u32>,
}

/// `commissions.setRate` (admin)
pub async fn set_rate(
    state: &AppState,
    caller: &Caller,
    input: SetRateInput,
) -> ApiResult<CommissionRate> {
    caller.require_admin()?;
    validate_employee_id(&input.employee_id)?;
    let percentage = validate_percentage(input.percentage)?;

    let rate = state
        .db
        .rates()
        .set(&input.employee_id, input.role, percentage)
        .await?;

    info!(
        by = %caller.user_id,
        employee_id = %rate.employee_id,
        role = %rate.role,
        percentage = %percentage,
        "Commission rate set"
    );
    Ok(rate)
}

/// `commissions.getRate` (self or admin)
pub async fn get_rate(state: &AppState, caller: &Caller, input: GetRateInput) -> ApiResult<RateLookup> {
    caller.require_self_or_admin(&input.employee_id)?;

    let rate = state.db.rates().get(&input.employee_id, input.role).await?;

    Ok(RateLookup {
        employee_id: input.employee_id,
        role: input.role,
        percentage_bps: rate.map(|r| r.percentage_bps),
    })
}

/// `commissions.listRates` (self or admin)
pub async fn list_rates(
    state: &AppState,
    caller: &Caller,
    input: EmployeeInput,
) -> ApiResult<Vec<CommissionRate>> {
    caller.require_self_or_admin(&input.employee_id)?;
    Ok(state.db.rates().list_for_employee(&input.employee_id).await?)
}
