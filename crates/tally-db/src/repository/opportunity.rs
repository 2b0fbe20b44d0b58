//! # Opportunity Repository
//!
//! Local projection of the deal pipeline's opportunities.
//!
//! The commission engine only reads these rows. They are written by the
//! upstream feed (and by the seeder and tests) through [`OpportunityRepository::upsert`].

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteExecutor, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::validation::validate_final_amount;
use tally_core::{CoreError, Opportunity, OpportunityKind, OpportunityStatus};

/// Row shape of the `opportunities` table.
#[derive(Debug, FromRow)]
pub(crate) struct OpportunityRow {
    id: String,
    kind: OpportunityKind,
    name: String,
    status: OpportunityStatus,
    final_amount_cents: Option<i64>,
    closed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl From<OpportunityRow> for Opportunity {
    fn from(row: OpportunityRow) -> Self {
        Opportunity {
            id: row.id,
            kind: row.kind,
            name: row.name,
            status: row.status,
            final_amount_cents: row.final_amount_cents,
            closed_at: row.closed_at,
            updated_at: row.updated_at,
        }
    }
}

const SELECT_OPPORTUNITY: &str = r#"
    SELECT id, kind, name, status, final_amount_cents, closed_at, updated_at
    FROM opportunities
"#;

/// Fetches one opportunity on any executor (pool or open transaction).
pub(crate) async fn fetch_by_id<'c, E>(executor: E, id: &str) -> DbResult<Option<Opportunity>>
where
    E: SqliteExecutor<'c>,
{
    let row: Option<OpportunityRow> =
        sqlx::query_as(&format!("{SELECT_OPPORTUNITY} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(executor)
            .await?;

    Ok(row.map(Opportunity::from))
}

/// Repository for the opportunity read model.
#[derive(Debug, Clone)]
pub struct OpportunityRepository {
    pool: SqlitePool,
}

impl OpportunityRepository {
    /// Creates a new OpportunityRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OpportunityRepository { pool }
    }

    /// Inserts or replaces the projection of an opportunity.
    pub async fn upsert(&self, opportunity: &Opportunity) -> DbResult<()> {
        debug!(
            id = %opportunity.id,
            status = %opportunity.status,
            "Upserting opportunity"
        );
        validate_final_amount(opportunity.final_amount_cents).map_err(CoreError::from)?;

        sqlx::query(
            r#"
            INSERT INTO opportunities (
                id, kind, name, status, final_amount_cents, closed_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                name = excluded.name,
                status = excluded.status,
                final_amount_cents = excluded.final_amount_cents,
                closed_at = excluded.closed_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&opportunity.id)
        .bind(opportunity.kind)
        .bind(&opportunity.name)
        .bind(opportunity.status)
        .bind(opportunity.final_amount_cents)
        .bind(opportunity.closed_at)
        .bind(opportunity.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets an opportunity by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Opportunity>> {
        fetch_by_id(&self.pool, id).await
    }

    /// Gets an opportunity by ID, failing with NotFound when absent.
    pub async fn require(&self, id: &str) -> DbResult<Opportunity> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Opportunity", id))
    }

    /// Lists every opportunity, ordered by name.
    pub async fn list_all(&self) -> DbResult<Vec<Opportunity>> {
        let rows: Vec<OpportunityRow> =
            sqlx::query_as(&format!("{SELECT_OPPORTUNITY} ORDER BY name, id"))
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(Opportunity::from).collect())
    }

    /// Lists opportunities on which the employee holds at least one role.
    pub async fn list_for_employee(&self, employee_id: &str) -> DbResult<Vec<Opportunity>> {
        let rows: Vec<OpportunityRow> = sqlx::query_as(
            r#"
            SELECT o.id, o.kind, o.name, o.status, o.final_amount_cents, o.closed_at, o.updated_at
            FROM opportunities o
            WHERE EXISTS (
                SELECT 1 FROM commission_role_assignments a
                WHERE a.opportunity_id = o.id AND a.employee_id = ?1
            )
            ORDER BY o.name, o.id
            "#,
        )
        .bind(employee_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Opportunity::from).collect())
    }

    /// Deletes an opportunity. Assignments, resolution, shares and
    /// installments cascade.
    pub async fn delete(&self, id: &str) -> DbResult<bool> {
        debug!(id = %id, "Deleting opportunity");

        let result = sqlx::query("DELETE FROM opportunities WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig, DbError};
    use chrono::Utc;
    use tally_core::{CoreError, Opportunity, OpportunityKind, OpportunityStatus};

    fn opportunity(id: &str, name: &str) -> Opportunity {
        Opportunity {
            id: id.to_string(),
            kind: OpportunityKind::RealEstate,
            name: name.to_string(),
            status: OpportunityStatus::Active,
            final_amount_cents: None,
            closed_at: None,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.opportunities();

        let mut opp = opportunity("opp-1", "Harbour Tower");
        repo.upsert(&opp).await.unwrap();

        opp.status = OpportunityStatus::Concluded;
        opp.final_amount_cents = Some(10_000_000);
        opp.closed_at = Some(Utc::now());
        repo.upsert(&opp).await.unwrap();

        let loaded = repo.require("opp-1").await.unwrap();
        assert_eq!(loaded.status, OpportunityStatus::Concluded);
        assert_eq!(loaded.final_amount_cents, Some(10_000_000));
        assert_eq!(loaded.kind, OpportunityKind::RealEstate);
    }

    #[tokio::test]
    async fn test_negative_final_amount_is_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.opportunities();

        let mut opp = opportunity("opp-1", "Harbour Tower");
        opp.status = OpportunityStatus::Concluded;
        opp.final_amount_cents = Some(-250_000);

        let err = repo.upsert(&opp).await.unwrap_err();
        assert!(matches!(err, DbError::Rejected(CoreError::Validation(_))));
        assert!(repo.get_by_id("opp-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_schema_refuses_negative_final_amount() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.opportunities()
            .upsert(&opportunity("opp-1", "Harbour Tower"))
            .await
            .unwrap();

        let result = sqlx::query("UPDATE opportunities SET final_amount_cents = -1 WHERE id = 'opp-1'")
            .execute(db.pool())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_require_missing() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db.opportunities().require("nope").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_all_is_ordered_by_name() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.opportunities();
        repo.upsert(&opportunity("o2", "Zephyr")).await.unwrap();
        repo.upsert(&opportunity("o1", "Acme Merger")).await.unwrap();

        let names: Vec<String> = repo
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.name)
            .collect();
        assert_eq!(names, vec!["Acme Merger", "Zephyr"]);
    }
}
