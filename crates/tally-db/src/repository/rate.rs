//! # Rate Registry Repository
//!
//! Global commission rates keyed by (employee, role).
//!
//! ## Semantics
//! - Last writer wins (plain upsert, no version)
//! - A missing row and a 0 bps row are different states: the first blocks
//!   resolution, the second resolves to a zero share
//! - Existing resolutions are unaffected: shares snapshot the percentage

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteExecutor, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{CommissionRate, CommissionRole, Percentage};

#[derive(Debug, FromRow)]
struct RateRow {
    employee_id: String,
    role: CommissionRole,
    percentage_bps: i64,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RateRow> for CommissionRate {
    type Error = DbError;

    fn try_from(row: RateRow) -> Result<Self, Self::Error> {
        let percentage_bps = u32::try_from(row.percentage_bps).map_err(|_| DbError::Corrupt {
            entity: "CommissionRate".to_string(),
            id: format!("{}/{}", row.employee_id, row.role),
            reason: format!("percentage_bps {} out of range", row.percentage_bps),
        })?;

        Ok(CommissionRate {
            employee_id: row.employee_id,
            role: row.role,
            percentage_bps,
            updated_at: row.updated_at,
        })
    }
}

fn into_rates(rows: Vec<RateRow>) -> DbResult<Vec<CommissionRate>> {
    rows.into_iter().map(CommissionRate::try_from).collect()
}

/// Loads the rates relevant to one opportunity's assignments.
pub(crate) async fn fetch_for_opportunity<'c, E>(
    executor: E,
    opportunity_id: &str,
) -> DbResult<Vec<CommissionRate>>
where
    E: SqliteExecutor<'c>,
{
    let rows: Vec<RateRow> = sqlx::query_as(
        r#"
        SELECT DISTINCT r.employee_id, r.role, r.percentage_bps, r.updated_at
        FROM commission_rates r
        JOIN commission_role_assignments a
          ON a.employee_id = r.employee_id AND a.role = r.role
        WHERE a.opportunity_id = ?1
        ORDER BY r.employee_id, r.role
        "#,
    )
    .bind(opportunity_id)
    .fetch_all(executor)
    .await?;

    into_rates(rows)
}

/// Repository for the rate registry.
#[derive(Debug, Clone)]
pub struct RateRepository {
    pool: SqlitePool,
}

impl RateRepository {
    /// Creates a new RateRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RateRepository { pool }
    }

    /// Sets (inserts or overwrites) a rate.
    pub async fn set(
        &self,
        employee_id: &str,
        role: CommissionRole,
        percentage: Percentage,
    ) -> DbResult<CommissionRate> {
        let now = Utc::now();

        debug!(
            employee_id = %employee_id,
            role = %role,
            bps = percentage.bps(),
            "Setting commission rate"
        );

        sqlx::query(
            r#"
            INSERT INTO commission_rates (employee_id, role, percentage_bps, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(employee_id, role) DO UPDATE SET
                percentage_bps = excluded.percentage_bps,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(employee_id)
        .bind(role)
        .bind(i64::from(percentage.bps()))
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(CommissionRate {
            employee_id: employee_id.to_string(),
            role,
            percentage_bps: percentage.bps(),
            updated_at: now,
        })
    }

    /// Gets a rate; `None` when never set.
    pub async fn get(&self, employee_id: &str, role: CommissionRole) -> DbResult<Option<CommissionRate>> {
        let row: Option<RateRow> = sqlx::query_as(
            r#"
            SELECT employee_id, role, percentage_bps, updated_at
            FROM commission_rates
            WHERE employee_id = ?1 AND role = ?2
            "#,
        )
        .bind(employee_id)
        .bind(role)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CommissionRate::try_from).transpose()
    }

    /// Lists all rates of one employee, ordered by role.
    pub async fn list_for_employee(&self, employee_id: &str) -> DbResult<Vec<CommissionRate>> {
        let rows: Vec<RateRow> = sqlx::query_as(
            r#"
            SELECT employee_id, role, percentage_bps, updated_at
            FROM commission_rates
            WHERE employee_id = ?1
            ORDER BY role
            "#,
        )
        .bind(employee_id)
        .fetch_all(&self.pool)
        .await?;

        into_rates(rows)
    }

    /// Lists the rates that apply to one opportunity's assignments.
    pub async fn list_for_opportunity(&self, opportunity_id: &str) -> DbResult<Vec<CommissionRate>> {
        fetch_for_opportunity(&self.pool, opportunity_id).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
