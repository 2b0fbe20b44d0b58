//! # Eligibility Filter
//!
//! Decides which opportunities an employee earns commission on and which
//! of those can be resolved right now.
//!
//! ```text
//! assignments(employee) ──► opportunities ──► annotate
//!                                              ├── roles held
//!                                              ├── resolvable? (CONCLUDED + final amount)
//!                                              └── resolution exists?
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{CommissionRole, Opportunity, OpportunityKind, OpportunityStatus, RoleAssignment};

/// Whether a resolution may be computed for the opportunity.
///
/// A negative final amount counts as not finished.
#[inline]
pub fn is_resolvable(opportunity: &Opportunity) -> bool {
    opportunity.status == OpportunityStatus::Concluded
        && matches!(opportunity.final_amount_cents, Some(cents) if cents >= 0)
}

/// Returns the final amount, or `NotFinished` when the opportunity is not
/// resolvable.
pub fn require_resolvable(opportunity: &Opportunity) -> CoreResult<Money> {
    match opportunity.final_amount() {
        Some(amount) if is_resolvable(opportunity) => Ok(amount),
        _ => Err(CoreError::NotFinished {
            opportunity_id: opportunity.id.clone(),
        }),
    }
}

/// An opportunity as seen from one employee's commission view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct EligibleOpportunity {
    pub opportunity_id: String,
    pub name: String,
    pub kind: OpportunityKind,
    pub status: OpportunityStatus,
    /// Roles the employee holds here, sorted.
    pub roles: Vec<CommissionRole>,
    pub resolvable: bool,
    pub has_resolution: bool,
}

/// Builds the eligibility list for `employee_id`.
///
/// Assignments of other employees and assignments whose opportunity is not
/// in `opportunities` are ignored. Output is ordered by opportunity name,
/// then id.
pub fn eligible_for_employee(
    employee_id: &str,
    opportunities: &[Opportunity],
    assignments: &[RoleAssignment],
    resolved_opportunity_ids: &HashSet<String>,
) -> Vec<EligibleOpportunity> {
    let mut roles_by_opportunity: BTreeMap<&str, Vec<CommissionRole>> = BTreeMap::new();
    for assignment in assignments.iter().filter(|a| a.employee_id == employee_id) {
        roles_by_opportunity
            .entry(assignment.opportunity_id.as_str())
            .or_default()
            .push(assignment.role);
    }

    let mut eligible: Vec<EligibleOpportunity> = opportunities
        .iter()
        .filter_map(|opportunity| {
            let mut roles = roles_by_opportunity.get(opportunity.id.as_str())?.clone();
            roles.sort();
            roles.dedup();

            Some(EligibleOpportunity {
                opportunity_id: opportunity.id.clone(),
                name: opportunity.name.clone(),
                kind: opportunity.kind,
                status: opportunity.status,
                roles,
                resolvable: is_resolvable(opportunity),
                has_resolution: resolved_opportunity_ids.contains(&opportunity.id),
            })
        })
        .collect();

    eligible.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| a.opportunity_id.cmp(&b.opportunity_id))
    });
    eligible
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn opportunity(id: &str, status: OpportunityStatus, amount: Option<i64>) -> Opportunity {
        Opportunity {
            id: id.to_string(),
            kind: OpportunityKind::Mna,
            name: format!("Deal {}", id),
            status,
            final_amount_cents: amount,
            closed_at: None,
            updated_at: Utc::now(),
        }
    }

    fn assignment(opportunity_id: &str, employee_id: &str, role: CommissionRole) -> RoleAssignment {
        RoleAssignment {
            opportunity_id: opportunity_id.to_string(),
            employee_id: employee_id.to_string(),
            role,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_is_resolvable() {
        assert!(is_resolvable(&opportunity("o1", OpportunityStatus::Concluded, Some(1))));
        assert!(!is_resolvable(&opportunity("o1", OpportunityStatus::Concluded, None)));
        assert!(!is_resolvable(&opportunity("o1", OpportunityStatus::Active, Some(1))));
        assert!(!is_resolvable(&opportunity("o1", OpportunityStatus::Inactive, None)));
        assert!(is_resolvable(&opportunity("o1", OpportunityStatus::Concluded, Some(0))));
    }

    #[test]
    fn test_negative_final_amount_is_not_finished() {
        let refund = opportunity("o3", OpportunityStatus::Concluded, Some(-500));
        assert!(!is_resolvable(&refund));
        assert_eq!(
            require_resolvable(&refund),
            Err(CoreError::NotFinished {
                opportunity_id: "o3".to_string()
            })
        );
    }

    #[test]
    fn test_require_resolvable_reports_not_finished() {
        let active = opportunity("o1", OpportunityStatus::Active, Some(10_000_000));
        assert_eq!(
            require_resolvable(&active),
            Err(CoreError::NotFinished {
                opportunity_id: "o1".to_string()
            })
        );

        let done = opportunity("o2", OpportunityStatus::Concluded, Some(10_000_000));
        assert_eq!(require_resolvable(&done).unwrap().cents(), 10_000_000);
    }

    #[test]
    fn test_eligible_only_includes_assigned_opportunities() {
        let opportunities = vec![
            opportunity("o1", OpportunityStatus::Concluded, Some(100)),
            opportunity("o2", OpportunityStatus::Active, None),
            opportunity("o3", OpportunityStatus::Concluded, Some(100)),
        ];
        let assignments = vec![
            assignment("o1", "emp-1", CommissionRole::DealSupport),
            assignment("o1", "emp-1", CommissionRole::AccountManager),
            assignment("o2", "emp-1", CommissionRole::ClientAcquisition),
            assignment("o3", "emp-2", CommissionRole::AccountManager),
        ];
        let resolved: HashSet<String> = ["o1".to_string()].into_iter().collect();

        let eligible = eligible_for_employee("emp-1", &opportunities, &assignments, &resolved);

        assert_eq!(eligible.len(), 2);
        assert_eq!(eligible[0].opportunity_id, "o1");
        assert_eq!(
            eligible[0].roles,
            vec![CommissionRole::AccountManager, CommissionRole::DealSupport]
        );
        assert!(eligible[0].resolvable);
        assert!(eligible[0].has_resolution);

        assert_eq!(eligible[1].opportunity_id, "o2");
        assert!(!eligible[1].resolvable);
        assert!(!eligible[1].has_resolution);
    }

    #[test]
    fn test_eligible_empty_without_assignments() {
        let opportunities = vec![opportunity("o1", OpportunityStatus::Concluded, Some(100))];
        assert!(eligible_for_employee("emp-9", &opportunities, &[], &HashSet::new()).is_empty());
    }
}
