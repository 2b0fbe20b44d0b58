//! # Payment Schedule Commands
//!
//! Up to three installments per resolution, each moving through
//! `NOT_SET → PENDING → SCHEDULED → PAID`.
//!
//! ## Concurrency
//! Every write carries an optional `expectedVersion`. When present and stale
//! the write fails with `CONFLICT` before any rule is checked. Writes that
//! leave the slot unchanged (confirming twice, paying twice) succeed without
//! bumping the version, so retries after a timeout are safe.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ResolutionInput;
use crate::auth::Caller;
use crate::error::ApiResult;
use crate::AppState;
use tally_core::schedule::ScheduleSummary;
use tally_core::validation::validate_installment_index;
use tally_core::Installment;
use tally_db::StoredResolution;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetInstallmentInput {
    pub resolution_id: String,
    pub index: usize,
    pub amount_cents: Option<i64>,
    pub payment_date: Option<NaiveDate>,
    #[serde(default)]
    pub expected_version: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallmentInput {
    pub resolution_id: String,
    pub index: usize,
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// Schedule summary plus the resolution version to echo on the next write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleView {
    #[serde(flatten)]
    pub summary: ScheduleSummary,
    pub version: i64,
}

impl From<&StoredResolution> for ScheduleView {
    fn from(stored: &StoredResolution) -> Self {
        ScheduleView {
            summary: stored.schedule.summary(),
            version: stored.resolution.version,
        }
    }
}

/// Result of an installment write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallmentUpdate {
    pub installment: Installment,
    pub schedule: ScheduleView,
}

fn updated(
    caller: &Caller,
    action: &'static str,
    (stored, installment): (StoredResolution, Installment),
) -> InstallmentUpdate {
    debug!(
        by = %caller.user_id,
        resolution_id = %stored.resolution.id,
        index = installment.index,
        status = %installment.status,
        version = stored.resolution.version,
        action,
        "Schedule command applied"
    );
    InstallmentUpdate {
        schedule: ScheduleView::from(&stored),
        installment,
    }
}

/// `commissions.getSchedule` (team)
pub async fn get_schedule(state: &AppState, caller: &Caller, input: ResolutionInput) -> ApiResult<ScheduleView> {
    caller.require_team()?;
    let stored = state.db.resolutions().require(&input.resolution_id).await?;
    Ok(ScheduleView::from(&stored))
}

/// `commissions.setInstallment` (admin)
pub async fn set_installment(
    state: &AppState,
    caller: &Caller,
    input: SetInstallmentInput,
) -> ApiResult<InstallmentUpdate> {
    caller.require_admin()?;
    validate_installment_index(input.index)?;

    let result = state
        .db
        .resolutions()
        .set_installment(
            &input.resolution_id,
            input.index,
            input.amount_cents,
            input.payment_date,
            input.expected_version,
        )
        .await?;
    Ok(updated(caller, "set", result))
}

/// `commissions.confirmInstallment` (admin)
pub async fn confirm_installment(
    state: &AppState,
    caller: &Caller,
    input: InstallmentInput,
) -> ApiResult<InstallmentUpdate> {
    caller.require_admin()?;
    validate_installment_index(input.index)?;

    let result = state
        .db
        .resolutions()
        .confirm_installment(&input.resolution_id, input.index, input.expected_version)
        .await?;
    Ok(updated(caller, "confirm", result))
}

/// `commissions.markPaid` (admin)
pub async fn mark_paid(state: &AppState, caller: &Caller, input: InstallmentInput) -> ApiResult<InstallmentUpdate> {
    caller.require_admin()?;
    validate_installment_index(input.index)?;

    let result = state
        .db
        .resolutions()
        .mark_paid(&input.resolution_id, input.index, input.expected_version)
        .await?;
    Ok(updated(caller, "mark_paid", result))
}

/// `commissions.clearInstallment` (admin)
pub async fn clear_installment(
    state: &AppState,
    caller: &Caller,
    input: InstallmentInput,
) -> ApiResult<InstallmentUpdate> {
    caller.require_admin()?;
    validate_installment_index(input.index)?;

    let result = state
        .db
        .resolutions()
        .clear_installment(&input.resolution_id, input.index, input.expected_version)
        .await?;
    Ok(updated(caller, "clear", result))
}
