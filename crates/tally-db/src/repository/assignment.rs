//! # Role Assignment Repository
//!
//! Which employee holds which commission role on which opportunity.
//!
//! Rows are keyed by the full (opportunity, employee, role) triple, so
//! assigning twice or removing twice is a no-op.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteExecutor, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{CommissionRole, RoleAssignment};

#[derive(Debug, FromRow)]
struct AssignmentRow {
    opportunity_id: String,
    employee_id: String,
    role: CommissionRole,
    created_at: DateTime<Utc>,
}

impl From<AssignmentRow> for RoleAssignment {
    fn from(row: AssignmentRow) -> Self {
        RoleAssignment {
            opportunity_id: row.opportunity_id,
            employee_id: row.employee_id,
            role: row.role,
            created_at: row.created_at,
        }
    }
}

/// Loads the assignments of one opportunity, ordered by (employee_id, role).
pub(crate) async fn fetch_for_opportunity<'c, E>(
    executor: E,
    opportunity_id: &str,
) -> DbResult<Vec<RoleAssignment>>
where
    E: SqliteExecutor<'c>,
{
    let rows: Vec<AssignmentRow> = sqlx::query_as(
        r#"
        SELECT opportunity_id, employee_id, role, created_at
        FROM commission_role_assignments
        WHERE opportunity_id = ?1
        ORDER BY employee_id, role
        "#,
    )
    .bind(opportunity_id)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(RoleAssignment::from).collect())
}

/// Repository for role assignments.
#[derive(Debug, Clone)]
pub struct AssignmentRepository {
    pool: SqlitePool,
}

impl AssignmentRepository {
    /// Creates a new AssignmentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AssignmentRepository { pool }
    }

    /// Assigns a role. Idempotent: an existing row is returned unchanged.
    ///
    /// ## Errors
    /// - `ForeignKeyViolation` when the opportunity doesn't exist
    pub async fn assign(
        &self,
        opportunity_id: &str,
        employee_id: &str,
        role: CommissionRole,
    ) -> DbResult<RoleAssignment> {
        debug!(
            opportunity_id = %opportunity_id,
            employee_id = %employee_id,
            role = %role,
            "Assigning commission role"
        );

        sqlx::query(
            r#"
            INSERT INTO commission_role_assignments (opportunity_id, employee_id, role, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(opportunity_id, employee_id, role) DO NOTHING
            "#,
        )
        .bind(opportunity_id)
        .bind(employee_id)
        .bind(role)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let row: Option<AssignmentRow> = sqlx::query_as(
            r#"
            SELECT opportunity_id, employee_id, role, created_at
            FROM commission_role_assignments
            WHERE opportunity_id = ?1 AND employee_id = ?2 AND role = ?3
            "#,
        )
        .bind(opportunity_id)
        .bind(employee_id)
        .bind(role)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RoleAssignment::from)
            .ok_or_else(|| DbError::not_found("Assignment", format!("{opportunity_id}/{employee_id}/{role}")))
    }

    /// Removes a role. Returns whether a row was deleted.
    pub async fn remove(
        &self,
        opportunity_id: &str,
        employee_id: &str,
        role: CommissionRole,
    ) -> DbResult<bool> {
        debug!(
            opportunity_id = %opportunity_id,
            employee_id = %employee_id,
            role = %role,
            "Removing commission role"
        );

        let result = sqlx::query(
            r#"
            DELETE FROM commission_role_assignments
            WHERE opportunity_id = ?1 AND employee_id = ?2 AND role = ?3
            "#,
        )
        .bind(opportunity_id)
        .bind(employee_id)
        .bind(role)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists the assignments of one opportunity.
    pub async fn list_for_opportunity(&self, opportunity_id: &str) -> DbResult<Vec<RoleAssignment>> {
        fetch_for_opportunity(&self.pool, opportunity_id).await
    }

    /// Lists every assignment held by one employee.
    pub async fn list_for_employee(&self, employee_id: &str) -> DbResult<Vec<RoleAssignment>> {
        let rows: Vec<AssignmentRow> = sqlx::query_as(
            r#"
            SELECT opportunity_id, employee_id, role, created_at
            FROM commission_role_assignments
            WHERE employee_id = ?1
            ORDER BY opportunity_id, role
            "#,
        )
        .bind(employee_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(RoleAssignment::from).collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
