//! # Eligibility Commands

use serde::Serialize;

use super::{EmployeeInput, OpportunityInput};
use crate::auth::Caller;
use crate::error::ApiResult;
use crate::AppState;
use tally_core::eligibility::{eligible_for_employee, is_resolvable, EligibleOpportunity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvableDto {
    pub resolvable: bool,
}

/// `commissions.listEligible` (self or admin)
///
/// Every opportunity on which the employee holds at least one role.
pub async fn list_eligible(
    state: &AppState,
    caller: &Caller,
    input: EmployeeInput,
) -> ApiResult<Vec<EligibleOpportunity>> {
    caller.require_self_or_admin(&input.employee_id)?;

    let opportunities = state
        .db
        .opportunities()
        .list_for_employee(&input.employee_id)
        .await?;
    let assignments = state
        .db
        .assignments()
        .list_for_employee(&input.employee_id)
        .await?;
    let resolved = state.db.resolutions().resolved_opportunity_ids().await?;

    Ok(eligible_for_employee(
        &input.employee_id,
        &opportunities,
        &assignments,
        &resolved,
    ))
}

/// `commissions.isResolvable` (any authenticated caller)
pub async fn check_resolvable(
    state: &AppState,
    _caller: &Caller,
    input: OpportunityInput,
) -> ApiResult<ResolvableDto> {
    let opportunity = state.db.opportunities().require(&input.opportunity_id).await?;
    Ok(ResolvableDto {
        resolvable: is_resolvable(&opportunity),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{admin, opportunity, seeded_state, user};
    use crate::error::ErrorCode;
    use tally_core::{CommissionRole, OpportunityStatus};

    #[tokio::test]
    async fn test_list_eligible_annotates_state() {
        let state = seeded_state().await;
        state
            .db
            .opportunities()
            .upsert(&opportunity("opp-2", "Beacon Buyout", OpportunityStatus::Active, None))
            .await
            .unwrap();
        state
            .db
            .assignments()
            .assign("opp-2", "emp-a", CommissionRole::ClientAcquisition)
            .await
            .unwrap();
        state.db.resolutions().resolve("opp-1", false).await.unwrap();

        let rows = list_eligible(
            &state,
            &user("emp-a"),
            EmployeeInput {
                employee_id: "emp-a".to_string(),
            },
        )
        .await
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Acme Merger");
        assert!(rows[0].resolvable);
        assert!(rows[0].has_resolution);
        assert_eq!(rows[1].name, "Beacon Buyout");
        assert!(!rows[1].resolvable);
        assert_eq!(rows[1].roles, vec![CommissionRole::ClientAcquisition]);
    }

    #[tokio::test]
    async fn test_list_eligible_other_employee_forbidden() {
        let state = seeded_state().await;
        let err = list_eligible(
            &state,
            &user("emp-b"),
            EmployeeInput {
                employee_id: "emp-a".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn test_is_resolvable() {
        let state = seeded_state().await;
        let dto = check_resolvable(
            &state,
            &user("emp-z"),
            OpportunityInput {
                opportunity_id: "opp-1".to_string(),
            },
        )
        .await
        .unwrap();
        assert!(dto.resolvable);

        let err = check_resolvable(
            &state,
            &admin(),
            OpportunityInput {
                opportunity_id: "missing".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}
