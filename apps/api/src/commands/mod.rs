//! # RPC Commands
//!
//! One async function per `commissions.*` procedure.
//!
//! ## Command Organization
//! ```text
//! commands/
//! ├── mod.rs          ◄─── You are here (shared inputs)
//! ├── rates.rs        ◄─── setRate, getRate, listRates
//! ├── assignments.rs  ◄─── assignRole, removeRole
//! ├── eligibility.rs  ◄─── listEligible, isResolvable
//! ├── resolution.rs   ◄─── resolve, recompute
//! ├── schedule.rs     ◄─── getSchedule, set/confirm/markPaid/clear
//! └── overview.rs     ◄─── getEmployeeOverview, getAdminOverview
//! ```
//!
//! ## Command Shape
//! ```rust,ignore
//! pub async fn set_rate(
//!     state: &AppState,     // db + config
//!     caller: &Caller,      // authenticated identity (gate first)
//!     input: SetRateInput,  // camelCase JSON body
//! ) -> ApiResult<CommissionRate>
//! ```
//! Every command runs its capability check before touching the database.

use serde::Deserialize;

pub mod assignments;
pub mod eligibility;
pub mod overview;
pub mod resolution;
pub mod rates;
pub mod schedule;

/// `{ "employeeId": "..." }`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeInput {
    pub employee_id: String,
}

/// `{ "opportunityId": "..." }`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityInput {
    pub opportunity_id: String,
}

/// `{ "resolutionId": "..." }`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionInput {
    pub resolution_id: String,
}
