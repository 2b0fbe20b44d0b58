//! # Resolution Repository
//!
//! Persists commission resolutions, their share snapshots and their payment
//! schedules. Every write is one transaction guarded by the resolution's
//! `version` column.
//!
//! ## Write Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN IMMEDIATE (write lock up front, waits out busy_timeout)          │
//! │    │                                                                    │
//! │    ├── read resolution (+ version) and installments                    │
//! │    ├── schedule writes: opportunity amount moved? → ResolutionStale    │
//! │    ├── run the pure tally-core transition                              │
//! │    │        └── rejected? → rollback, DbError::Rejected(CoreError)     │
//! │    ├── write changed rows                                              │
//! │    └── UPDATE ... SET version = version + 1 WHERE version = ?          │
//! │             └── 0 rows? → rollback, DbError::Conflict (retryable)      │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Resolve Paths
//! - **Create**: no row yet. Two first-time creators race on the unique
//!   `opportunity_id`; the loser re-reads and returns the winner's row.
//! - **Keep**: stored breakdown matches the final amount.
//! - **Recompute**: amount moved (or admin forced it) and nothing is PAID.
//!   Shares are replaced and the schedule resets to three NOT_SET slots.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use std::collections::HashSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::{assignment, opportunity, rate};
use tally_core::resolution::{self as calculator, Breakdown, ResolutionPlan};
use tally_core::{
    CommissionResolution, CommissionRole, CommissionShare, CoreError, Installment,
    InstallmentStatus, Money, PaymentSchedule, MAX_INSTALLMENTS,
};

/// Takes the SQLite write lock when the transaction starts. A deferred
/// transaction that reads first and writes later can fail with
/// SQLITE_BUSY_SNAPSHOT without ever waiting on the busy timeout.
const BEGIN_WRITE: &str = "BEGIN IMMEDIATE";

// =============================================================================
// Stored Resolution
// =============================================================================

/// A resolution together with its payment schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResolution {
    pub resolution: CommissionResolution,
    pub schedule: PaymentSchedule,
}

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, FromRow)]
struct ResolutionRow {
    id: String,
    opportunity_id: String,
    commissionable_amount_cents: i64,
    total_commission_cents: i64,
    version: i64,
    resolved_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct ShareRow {
    employee_id: String,
    role: CommissionRole,
    percentage_bps: i64,
    amount_cents: i64,
}

#[derive(Debug, FromRow)]
struct InstallmentRow {
    idx: i64,
    status: InstallmentStatus,
    amount_cents: Option<i64>,
    payment_date: Option<NaiveDate>,
    paid_at: Option<DateTime<Utc>>,
}

fn corrupt(id: &str, reason: impl Into<String>) -> DbError {
    DbError::Corrupt {
        entity: "Resolution".to_string(),
        id: id.to_string(),
        reason: reason.into(),
    }
}

// =============================================================================
// Connection-level helpers
// =============================================================================

/// Loads shares and installments for a resolution row.
async fn hydrate(conn: &mut SqliteConnection, row: ResolutionRow) -> DbResult<StoredResolution> {
    let share_rows: Vec<ShareRow> = sqlx::query_as(
        r#"
        SELECT employee_id, role, percentage_bps, amount_cents
        FROM commission_shares
        WHERE resolution_id = ?1
        ORDER BY employee_id, role
        "#,
    )
    .bind(&row.id)
    .fetch_all(&mut *conn)
    .await?;

    let installment_rows: Vec<InstallmentRow> = sqlx::query_as(
        r#"
        SELECT idx, status, amount_cents, payment_date, paid_at
        FROM installments
        WHERE resolution_id = ?1
        ORDER BY idx
        "#,
    )
    .bind(&row.id)
    .fetch_all(&mut *conn)
    .await?;

    let shares = share_rows
        .into_iter()
        .map(|share| {
            let percentage_bps = u32::try_from(share.percentage_bps)
                .map_err(|_| corrupt(&row.id, "share percentage out of range"))?;
            Ok(CommissionShare {
                employee_id: share.employee_id,
                role: share.role,
                percentage_bps,
                amount_cents: share.amount_cents,
            })
        })
        .collect::<DbResult<Vec<_>>>()?;

    let installments = installment_rows
        .into_iter()
        .map(|slot| {
            let index = usize::try_from(slot.idx)
                .map_err(|_| corrupt(&row.id, "negative installment index"))?;
            Ok(Installment {
                index,
                status: slot.status,
                amount_cents: slot.amount_cents,
                payment_date: slot.payment_date,
                paid_at: slot.paid_at,
            })
        })
        .collect::<DbResult<Vec<_>>>()?;

    let total = Money::from_cents(row.total_commission_cents);
    let schedule = PaymentSchedule::from_parts(row.id.clone(), total, installments);

    Ok(StoredResolution {
        resolution: CommissionResolution {
            id: row.id,
            opportunity_id: row.opportunity_id,
            commissionable_amount_cents: row.commissionable_amount_cents,
            total_commission_cents: row.total_commission_cents,
            shares,
            version: row.version,
            resolved_at: row.resolved_at,
        },
        schedule,
    })
}

const SELECT_RESOLUTION: &str = r#"
    SELECT id, opportunity_id, commissionable_amount_cents, total_commission_cents,
           version, resolved_at
    FROM commission_resolutions
"#;

async fn fetch_by_id(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<StoredResolution>> {
    let row: Option<ResolutionRow> = sqlx::query_as(&format!("{SELECT_RESOLUTION} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => Ok(Some(hydrate(conn, row).await?)),
        None => Ok(None),
    }
}

async fn fetch_by_opportunity(
    conn: &mut SqliteConnection,
    opportunity_id: &str,
) -> DbResult<Option<StoredResolution>> {
    let row: Option<ResolutionRow> =
        sqlx::query_as(&format!("{SELECT_RESOLUTION} WHERE opportunity_id = ?1"))
            .bind(opportunity_id)
            .fetch_optional(&mut *conn)
            .await?;

    match row {
        Some(row) => Ok(Some(hydrate(conn, row).await?)),
        None => Ok(None),
    }
}

async fn insert_shares(
    conn: &mut SqliteConnection,
    resolution_id: &str,
    shares: &[CommissionShare],
) -> DbResult<()> {
    for share in shares {
        sqlx::query(
            r#"
            INSERT INTO commission_shares (
                resolution_id, employee_id, role, percentage_bps, amount_cents
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(resolution_id)
        .bind(&share.employee_id)
        .bind(share.role)
        .bind(i64::from(share.percentage_bps))
        .bind(share.amount_cents)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn reset_installments(conn: &mut SqliteConnection, resolution_id: &str) -> DbResult<()> {
    sqlx::query("DELETE FROM installments WHERE resolution_id = ?1")
        .bind(resolution_id)
        .execute(&mut *conn)
        .await?;

    for index in 0..MAX_INSTALLMENTS {
        sqlx::query("INSERT INTO installments (resolution_id, idx, status) VALUES (?1, ?2, ?3)")
            .bind(resolution_id)
            .bind(index as i64)
            .bind(InstallmentStatus::NotSet)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn write_installment(
    conn: &mut SqliteConnection,
    resolution_id: &str,
    slot: &Installment,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE installments SET
            status = ?3,
            amount_cents = ?4,
            payment_date = ?5,
            paid_at = ?6
        WHERE resolution_id = ?1 AND idx = ?2
        "#,
    )
    .bind(resolution_id)
    .bind(slot.index as i64)
    .bind(slot.status)
    .bind(slot.amount_cents)
    .bind(slot.payment_date)
    .bind(slot.paid_at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(corrupt(resolution_id, format!("installment row {} missing", slot.index)));
    }
    Ok(())
}

/// Bumps the version if it still equals `expected`.
async fn bump_version(conn: &mut SqliteConnection, resolution_id: &str, expected: i64) -> DbResult<()> {
    let result = sqlx::query(
        "UPDATE commission_resolutions SET version = version + 1 WHERE id = ?1 AND version = ?2",
    )
    .bind(resolution_id)
    .bind(expected)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        warn!(resolution_id = %resolution_id, expected, "Stale resolution version");
        return Err(DbError::conflict("Resolution", resolution_id, expected));
    }
    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for resolutions and payment schedules.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.resolutions();
///
/// let stored = repo.resolve("opp-1", false).await?;
/// repo.set_installment(&stored.resolution.id, 0, Some(400_000), date, None).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ResolutionRepository {
    pool: SqlitePool,
}

impl ResolutionRepository {
    /// Creates a new ResolutionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ResolutionRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Gets a resolution by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<StoredResolution>> {
        let mut conn = self.pool.acquire().await?;
        fetch_by_id(&mut *conn, id).await
    }

    /// Gets a resolution by ID, failing with `ResolutionNotFound`.
    pub async fn require(&self, id: &str) -> DbResult<StoredResolution> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::ResolutionNotFound(id.to_string()).into())
    }

    /// Gets the resolution of an opportunity, if one was ever created.
    pub async fn get_by_opportunity(&self, opportunity_id: &str) -> DbResult<Option<StoredResolution>> {
        let mut conn = self.pool.acquire().await?;
        fetch_by_opportunity(&mut *conn, opportunity_id).await
    }

    /// Lists every stored resolution, ordered by opportunity.
    pub async fn list_all(&self) -> DbResult<Vec<StoredResolution>> {
        let mut conn = self.pool.acquire().await?;

        let rows: Vec<ResolutionRow> =
            sqlx::query_as(&format!("{SELECT_RESOLUTION} ORDER BY opportunity_id"))
                .fetch_all(&mut *conn)
                .await?;

        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            stored.push(hydrate(&mut *conn, row).await?);
        }
        Ok(stored)
    }

    /// IDs of every opportunity that has a resolution.
    pub async fn resolved_opportunity_ids(&self) -> DbResult<HashSet<String>> {
        let ids: Vec<(String,)> = sqlx::query_as("SELECT opportunity_id FROM commission_resolutions")
            .fetch_all(&self.pool)
            .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    // =========================================================================
    // Resolve / Recompute
    // =========================================================================

    /// Returns the current resolution of an opportunity, creating or
    /// recomputing it when needed.
    ///
    /// `force` recomputes even when the stored breakdown looks current
    /// (used after assignment or rate edits).
    ///
    /// ## Errors
    /// - `Rejected(NotFinished)`, `Rejected(MissingRate)`,
    ///   `Rejected(ResolutionLocked)`, `Rejected(OpportunityNotFound)`
    /// - `Conflict` when a concurrent write bumped the version first
    pub async fn resolve(&self, opportunity_id: &str, force: bool) -> DbResult<StoredResolution> {
        let mut tx = self.pool.begin_with(BEGIN_WRITE).await?;

        let opportunity = opportunity::fetch_by_id(&mut *tx, opportunity_id)
            .await?
            .ok_or_else(|| CoreError::OpportunityNotFound(opportunity_id.to_string()))?;

        let existing = fetch_by_opportunity(&mut *tx, opportunity_id).await?;
        let has_payments = existing
            .as_ref()
            .map(|stored| stored.schedule.has_payments())
            .unwrap_or(false);

        let plan = calculator::plan(
            existing.as_ref().map(|stored| &stored.resolution),
            &opportunity,
            has_payments,
            force,
        )?;

        let existing = match (plan, existing) {
            (ResolutionPlan::Keep, Some(stored)) => {
                debug!(opportunity_id = %opportunity_id, "Resolution is current");
                return Ok(stored);
            }
            (_, existing) => existing,
        };

        let assignments = assignment::fetch_for_opportunity(&mut *tx, opportunity_id).await?;
        let rates = rate::fetch_for_opportunity(&mut *tx, opportunity_id).await?;
        let breakdown = calculator::resolve(&opportunity, &assignments, &rates)?;

        let stored = match existing {
            None => match self.insert(&mut *tx, opportunity_id, &breakdown).await {
                Ok(stored) => stored,
                Err(DbError::UniqueViolation { .. }) => {
                    drop(tx);
                    info!(opportunity_id = %opportunity_id, "Lost creation race, re-reading");
                    return self
                        .get_by_opportunity(opportunity_id)
                        .await?
                        .ok_or_else(|| DbError::not_found("Resolution", opportunity_id));
                }
                Err(err) => return Err(err),
            },
            Some(previous) => self.replace(&mut *tx, previous, &breakdown).await?,
        };

        tx.commit().await?;

        info!(
            opportunity_id = %opportunity_id,
            resolution_id = %stored.resolution.id,
            total_cents = stored.resolution.total_commission_cents,
            shares = stored.resolution.shares.len(),
            "Commission resolved"
        );
        Ok(stored)
    }

    async fn insert(
        &self,
        conn: &mut SqliteConnection,
        opportunity_id: &str,
        breakdown: &Breakdown,
    ) -> DbResult<StoredResolution> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        debug!(id = %id, opportunity_id = %opportunity_id, "Creating resolution");

        sqlx::query(
            r#"
            INSERT INTO commission_resolutions (
                id, opportunity_id, commissionable_amount_cents, total_commission_cents,
                version, resolved_at
            ) VALUES (?1, ?2, ?3, ?4, 1, ?5)
            "#,
        )
        .bind(&id)
        .bind(opportunity_id)
        .bind(breakdown.commissionable_amount.cents())
        .bind(breakdown.total_commission.cents())
        .bind(now)
        .execute(&mut *conn)
        .await?;

        insert_shares(conn, &id, &breakdown.shares).await?;
        reset_installments(conn, &id).await?;

        Ok(StoredResolution {
            schedule: PaymentSchedule::empty(id.clone(), breakdown.total_commission),
            resolution: CommissionResolution {
                id,
                opportunity_id: opportunity_id.to_string(),
                commissionable_amount_cents: breakdown.commissionable_amount.cents(),
                total_commission_cents: breakdown.total_commission.cents(),
                shares: breakdown.shares.clone(),
                version: 1,
                resolved_at: now,
            },
        })
    }

    async fn replace(
        &self,
        conn: &mut SqliteConnection,
        previous: StoredResolution,
        breakdown: &Breakdown,
    ) -> DbResult<StoredResolution> {
        let id = previous.resolution.id;
        let expected = previous.resolution.version;
        let now = Utc::now();

        debug!(
            id = %id,
            old_amount_cents = previous.resolution.commissionable_amount_cents,
            new_amount_cents = breakdown.commissionable_amount.cents(),
            "Recomputing resolution"
        );

        let result = sqlx::query(
            r#"
            UPDATE commission_resolutions SET
                commissionable_amount_cents = ?3,
                total_commission_cents = ?4,
                resolved_at = ?5,
                version = version + 1
            WHERE id = ?1 AND version = ?2
            "#,
        )
        .bind(&id)
        .bind(expected)
        .bind(breakdown.commissionable_amount.cents())
        .bind(breakdown.total_commission.cents())
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            warn!(resolution_id = %id, expected, "Stale resolution version on recompute");
            return Err(DbError::conflict("Resolution", id, expected));
        }

        sqlx::query("DELETE FROM commission_shares WHERE resolution_id = ?1")
            .bind(&id)
            .execute(&mut *conn)
            .await?;
        insert_shares(conn, &id, &breakdown.shares).await?;
        reset_installments(conn, &id).await?;

        Ok(StoredResolution {
            schedule: PaymentSchedule::empty(id.clone(), breakdown.total_commission),
            resolution: CommissionResolution {
                id,
                opportunity_id: previous.resolution.opportunity_id,
                commissionable_amount_cents: breakdown.commissionable_amount.cents(),
                total_commission_cents: breakdown.total_commission.cents(),
                shares: breakdown.shares.clone(),
                version: expected + 1,
                resolved_at: now,
            },
        })
    }

    // =========================================================================
    // Schedule writes
    // =========================================================================

    /// Sets amount and date on an installment.
    pub async fn set_installment(
        &self,
        resolution_id: &str,
        index: usize,
        amount_cents: Option<i64>,
        payment_date: Option<NaiveDate>,
        expected_version: Option<i64>,
    ) -> DbResult<(StoredResolution, Installment)> {
        self.update_schedule(resolution_id, index, expected_version, |schedule| {
            schedule
                .set_installment(index, amount_cents, payment_date)
                .map(|_| ())
        })
        .await
    }

    /// Confirms a PENDING installment.
    pub async fn confirm_installment(
        &self,
        resolution_id: &str,
        index: usize,
        expected_version: Option<i64>,
    ) -> DbResult<(StoredResolution, Installment)> {
        self.update_schedule(resolution_id, index, expected_version, |schedule| {
            schedule.confirm(index).map(|_| ())
        })
        .await
    }

    /// Marks an installment PAID, stamping `paid_at` with the current time.
    pub async fn mark_paid(
        &self,
        resolution_id: &str,
        index: usize,
        expected_version: Option<i64>,
    ) -> DbResult<(StoredResolution, Installment)> {
        let now = Utc::now();
        self.update_schedule(resolution_id, index, expected_version, |schedule| {
            schedule.mark_paid(index, now).map(|_| ())
        })
        .await
    }

    /// Resets an installment to NOT_SET.
    pub async fn clear_installment(
        &self,
        resolution_id: &str,
        index: usize,
        expected_version: Option<i64>,
    ) -> DbResult<(StoredResolution, Installment)> {
        self.update_schedule(resolution_id, index, expected_version, |schedule| {
            schedule.clear(index).map(|_| ())
        })
        .await
    }

    /// Applies one schedule transition under the write protocol.
    ///
    /// A transition that leaves the slot unchanged (confirming a SCHEDULED
    /// slot, paying a PAID one) writes nothing and keeps the version.
    ///
    /// The opportunity is re-read in the same transaction. If its final
    /// amount no longer matches the resolution the write is refused with
    /// `ResolutionStale` (or `ResolutionLocked` once something is PAID).
    async fn update_schedule<F>(
        &self,
        resolution_id: &str,
        index: usize,
        expected_version: Option<i64>,
        transition: F,
    ) -> DbResult<(StoredResolution, Installment)>
    where
        F: FnOnce(&mut PaymentSchedule) -> Result<(), CoreError>,
    {
        let mut tx = self.pool.begin_with(BEGIN_WRITE).await?;

        let mut stored = fetch_by_id(&mut *tx, resolution_id)
            .await?
            .ok_or_else(|| CoreError::ResolutionNotFound(resolution_id.to_string()))?;

        let version = stored.resolution.version;
        if let Some(expected) = expected_version {
            if expected != version {
                warn!(resolution_id = %resolution_id, expected, actual = version, "Stale client version");
                return Err(DbError::conflict("Resolution", resolution_id, expected));
            }
        }

        stored
            .schedule
            .check_invariants()
            .map_err(|e| corrupt(resolution_id, e.to_string()))?;

        let opportunity_id = &stored.resolution.opportunity_id;
        let opportunity = opportunity::fetch_by_id(&mut *tx, opportunity_id)
            .await?
            .ok_or_else(|| CoreError::OpportunityNotFound(opportunity_id.clone()))?;
        if let Err(e) = calculator::ensure_current(
            &stored.resolution,
            &opportunity,
            stored.schedule.has_payments(),
        ) {
            warn!(
                resolution_id = %resolution_id,
                stored_amount_cents = stored.resolution.commissionable_amount_cents,
                final_amount_cents = ?opportunity.final_amount_cents,
                "Schedule write against out-of-date resolution"
            );
            return Err(e.into());
        }

        let before = stored.schedule.installment(index)?.clone();
        transition(&mut stored.schedule)?;
        let after = stored.schedule.installment(index)?.clone();

        if before == after {
            debug!(resolution_id = %resolution_id, index, "Installment unchanged");
            return Ok((stored, after));
        }

        write_installment(&mut *tx, resolution_id, &after).await?;
        bump_version(&mut *tx, resolution_id, version).await?;
        tx.commit().await?;

        stored.resolution.version = version + 1;

        info!(
            resolution_id = %resolution_id,
            index,
            from = %before.status,
            to = %after.status,
            "Installment updated"
        );
        Ok((stored, after))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use tally_core::{Opportunity, OpportunityKind, OpportunityStatus, Percentage};

    fn date(day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2025, 9, day)
    }

    fn opportunity(status: OpportunityStatus, amount: Option<i64>) -> Opportunity {
        Opportunity {
            id: "opp-1".to_string(),
            kind: OpportunityKind::Mna,
            name: "Acme Merger".to_string(),
            status,
            final_amount_cents: amount,
            closed_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Concluded 100,000.00 deal, emp-a as account manager at 10%.
    async fn setup() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed(&db).await;
        db
    }

    async fn seed(db: &Database) {
        db.opportunities()
            .upsert(&opportunity(OpportunityStatus::Concluded, Some(10_000_000)))
            .await
            .unwrap();
        db.assignments()
            .assign("opp-1", "emp-a", CommissionRole::AccountManager)
            .await
            .unwrap();
        db.rates()
            .set("emp-a", CommissionRole::AccountManager, Percentage::from_bps(1000))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_resolve_creates_breakdown_and_empty_schedule() {
        let db = setup().await;
        let stored = db.resolutions().resolve("opp-1", false).await.unwrap();

        assert_eq!(stored.resolution.commissionable_amount_cents, 10_000_000);
        assert_eq!(stored.resolution.total_commission_cents, 1_000_000);
        assert_eq!(stored.resolution.shares.len(), 1);
        assert_eq!(stored.resolution.version, 1);
        assert_eq!(stored.schedule.installments.len(), 3);
        assert!(stored
            .schedule
            .installments
            .iter()
            .all(|slot| slot.status == InstallmentStatus::NotSet));

        let reloaded = db.resolutions().require(&stored.resolution.id).await.unwrap();
        assert_eq!(reloaded.resolution.shares, stored.resolution.shares);
        assert_eq!(reloaded.schedule, stored.schedule);
    }

    #[tokio::test]
    async fn test_resolve_twice_is_identical() {
        let db = setup().await;
        let first = db.resolutions().resolve("opp-1", false).await.unwrap();
        let second = db.resolutions().resolve("opp-1", false).await.unwrap();
        assert_eq!(first.resolution.id, second.resolution.id);
        assert_eq!(first.resolution.shares, second.resolution.shares);
        assert_eq!(first.resolution.version, second.resolution.version);
    }

    #[tokio::test]
    async fn test_resolve_missing_rate_persists_nothing() {
        let db = setup().await;
        db.assignments()
            .assign("opp-1", "emp-b", CommissionRole::DealSupport)
            .await
            .unwrap();

        let err = db.resolutions().resolve("opp-1", false).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Rejected(CoreError::MissingRate { ref employee_id, role: CommissionRole::DealSupport })
                if employee_id == "emp-b"
        ));
        assert!(db.resolutions().get_by_opportunity("opp-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_active_is_not_finished() {
        let db = setup().await;
        db.opportunities()
            .upsert(&opportunity(OpportunityStatus::Active, None))
            .await
            .unwrap();

        let err = db.resolutions().resolve("opp-1", false).await.unwrap_err();
        assert!(matches!(err, DbError::Rejected(CoreError::NotFinished { .. })));
    }

    #[tokio::test]
    async fn test_resolve_unknown_opportunity() {
        let db = setup().await;
        let err = db.resolutions().resolve("nope", false).await.unwrap_err();
        assert!(matches!(err, DbError::Rejected(CoreError::OpportunityNotFound(_))));
    }

    #[tokio::test]
    async fn test_rate_change_does_not_touch_snapshot() {
        let db = setup().await;
        let stored = db.resolutions().resolve("opp-1", false).await.unwrap();

        db.rates()
            .set("emp-a", CommissionRole::AccountManager, Percentage::from_bps(2000))
            .await
            .unwrap();

        let again = db.resolutions().resolve("opp-1", false).await.unwrap();
        assert_eq!(again.resolution.shares[0].percentage_bps, 1000);
        assert_eq!(again.resolution.id, stored.resolution.id);

        // Explicit recompute picks up the new rate.
        let recomputed = db.resolutions().resolve("opp-1", true).await.unwrap();
        assert_eq!(recomputed.resolution.shares[0].percentage_bps, 2000);
        assert_eq!(recomputed.resolution.total_commission_cents, 2_000_000);
        assert_eq!(recomputed.resolution.version, 2);
    }

    #[tokio::test]
    async fn test_amount_change_recomputes_and_resets_schedule() {
        let db = setup().await;
        let repo = db.resolutions();
        let stored = repo.resolve("opp-1", false).await.unwrap();
        let id = stored.resolution.id.clone();

        repo.set_installment(&id, 0, Some(400_000), date(1), None).await.unwrap();

        db.opportunities()
            .upsert(&opportunity(OpportunityStatus::Concluded, Some(12_000_000)))
            .await
            .unwrap();

        let recomputed = repo.resolve("opp-1", false).await.unwrap();
        assert_eq!(recomputed.resolution.id, id);
        assert_eq!(recomputed.resolution.total_commission_cents, 1_200_000);
        assert_eq!(recomputed.schedule.total_scheduled(), Money::zero());

        let reloaded = repo.require(&id).await.unwrap();
        assert_eq!(reloaded.schedule.installments[0].status, InstallmentStatus::NotSet);
    }

    #[tokio::test]
    async fn test_amount_change_after_payment_is_locked() {
        let db = setup().await;
        let repo = db.resolutions();
        let id = repo.resolve("opp-1", false).await.unwrap().resolution.id;

        repo.set_installment(&id, 0, Some(400_000), date(1), None).await.unwrap();
        repo.mark_paid(&id, 0, None).await.unwrap();

        db.opportunities()
            .upsert(&opportunity(OpportunityStatus::Concluded, Some(12_000_000)))
            .await
            .unwrap();

        let err = repo.resolve("opp-1", false).await.unwrap_err();
        assert!(matches!(err, DbError::Rejected(CoreError::ResolutionLocked { .. })));

        let err = repo.resolve("opp-1", true).await.unwrap_err();
        assert!(matches!(err, DbError::Rejected(CoreError::ResolutionLocked { .. })));

        let err = repo
            .set_installment(&id, 1, Some(100_000), date(2), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Rejected(CoreError::ResolutionLocked { .. })));

        let kept = repo.require(&id).await.unwrap();
        assert_eq!(kept.resolution.commissionable_amount_cents, 10_000_000);
    }

    #[tokio::test]
    async fn test_schedule_writes_refused_after_downward_revision() {
        let db = setup().await;
        let repo = db.resolutions();
        let id = repo.resolve("opp-1", false).await.unwrap().resolution.id;
        repo.set_installment(&id, 0, Some(600_000), date(1), None).await.unwrap();

        // 100,000.00 revised to 10,000.00: only 1,000.00 is owed now.
        db.opportunities()
            .upsert(&opportunity(OpportunityStatus::Concluded, Some(1_000_000)))
            .await
            .unwrap();

        let err = repo
            .set_installment(&id, 1, Some(300_000), date(2), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Rejected(CoreError::ResolutionStale { .. })));
        let err = repo.confirm_installment(&id, 0, None).await.unwrap_err();
        assert!(matches!(err, DbError::Rejected(CoreError::ResolutionStale { .. })));
        let err = repo.mark_paid(&id, 0, None).await.unwrap_err();
        assert!(matches!(err, DbError::Rejected(CoreError::ResolutionStale { .. })));

        let untouched = repo.require(&id).await.unwrap();
        assert_eq!(untouched.resolution.version, 2);
        assert!(!untouched.schedule.has_payments());

        let recomputed = repo.resolve("opp-1", false).await.unwrap();
        assert_eq!(recomputed.resolution.total_commission_cents, 100_000);

        let err = repo
            .set_installment(&id, 0, Some(600_000), date(1), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Rejected(CoreError::ScheduleExceedsTotal {
                scheduled_cents: 600_000,
                total_cents: 100_000
            })
        ));

        repo.set_installment(&id, 0, Some(100_000), date(1), None).await.unwrap();
        let (stored, slot) = repo.mark_paid(&id, 0, None).await.unwrap();
        assert_eq!(slot.status, InstallmentStatus::Paid);
        assert_eq!(stored.schedule.total_paid().cents(), 100_000);
    }

    #[tokio::test]
    async fn test_schedule_writes_refused_once_reopened() {
        let db = setup().await;
        let repo = db.resolutions();
        let id = repo.resolve("opp-1", false).await.unwrap().resolution.id;

        db.opportunities()
            .upsert(&opportunity(OpportunityStatus::Active, Some(10_000_000)))
            .await
            .unwrap();

        let err = repo
            .set_installment(&id, 0, Some(100_000), date(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Rejected(CoreError::ResolutionStale { .. })));
    }

    #[tokio::test]
    async fn test_schedule_exceeding_total_rolls_back() {
        let db = setup().await;
        let repo = db.resolutions();
        let id = repo.resolve("opp-1", false).await.unwrap().resolution.id;

        repo.set_installment(&id, 0, Some(400_000), date(1), None).await.unwrap();
        repo.set_installment(&id, 1, Some(400_000), date(2), None).await.unwrap();
        let err = repo
            .set_installment(&id, 2, Some(300_000), date(3), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Rejected(CoreError::ScheduleExceedsTotal {
                scheduled_cents: 1_100_000,
                total_cents: 1_000_000
            })
        ));

        let stored = repo.require(&id).await.unwrap();
        assert_eq!(stored.schedule.total_scheduled().cents(), 800_000);
        assert_eq!(stored.schedule.installments[2].status, InstallmentStatus::NotSet);
    }

    #[tokio::test]
    async fn test_full_installment_lifecycle_bumps_version() {
        let db = setup().await;
        let repo = db.resolutions();
        let id = repo.resolve("opp-1", false).await.unwrap().resolution.id;

        let (stored, slot) = repo
            .set_installment(&id, 0, Some(1_000_000), date(1), Some(1))
            .await
            .unwrap();
        assert_eq!(slot.status, InstallmentStatus::Pending);
        assert_eq!(stored.resolution.version, 2);

        let (stored, slot) = repo.confirm_installment(&id, 0, Some(2)).await.unwrap();
        assert_eq!(slot.status, InstallmentStatus::Scheduled);
        assert_eq!(stored.resolution.version, 3);

        // Idempotent confirm keeps the version.
        let (stored, _) = repo.confirm_installment(&id, 0, None).await.unwrap();
        assert_eq!(stored.resolution.version, 3);

        let (stored, slot) = repo.mark_paid(&id, 0, Some(3)).await.unwrap();
        assert_eq!(slot.status, InstallmentStatus::Paid);
        assert!(slot.paid_at.is_some());
        assert!(stored.schedule.is_completed());

        let err = repo
            .set_installment(&id, 0, Some(10), date(2), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Rejected(CoreError::InstallmentLocked { index: 0 })));
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let db = setup().await;
        let repo = db.resolutions();
        let id = repo.resolve("opp-1", false).await.unwrap().resolution.id;

        repo.set_installment(&id, 0, Some(100), date(1), Some(1)).await.unwrap();

        let err = repo
            .set_installment(&id, 1, Some(100), date(2), Some(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict { expected: 1, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_clear_then_not_ready() {
        let db = setup().await;
        let repo = db.resolutions();
        let id = repo.resolve("opp-1", false).await.unwrap().resolution.id;

        repo.set_installment(&id, 2, Some(100), date(1), None).await.unwrap();
        let (_, slot) = repo.clear_installment(&id, 2, None).await.unwrap();
        assert_eq!(slot, Installment::empty(2));

        let err = repo.confirm_installment(&id, 2, None).await.unwrap_err();
        assert!(matches!(err, DbError::Rejected(CoreError::NotReady { index: 2 })));
    }

    #[tokio::test]
    async fn test_unknown_resolution() {
        let db = setup().await;
        let err = db
            .resolutions()
            .confirm_installment("missing", 0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Rejected(CoreError::ResolutionNotFound(_))));
    }

    #[tokio::test]
    async fn test_resolution_cascades_with_opportunity() {
        let db = setup().await;
        let id = db.resolutions().resolve("opp-1", false).await.unwrap().resolution.id;

        assert!(db
            .resolutions()
            .resolved_opportunity_ids()
            .await
            .unwrap()
            .contains("opp-1"));

        db.opportunities().delete("opp-1").await.unwrap();
        assert!(db.resolutions().get_by_id(&id).await.unwrap().is_none());
        assert!(db.resolutions().list_all().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_on_file_database() {
        let path = std::env::temp_dir().join(format!("tally-{}.db", Uuid::new_v4()));
        let db = Database::new(DbConfig::new(path.clone()).max_connections(8))
            .await
            .unwrap();
        seed(&db).await;

        // First-time creators race on the same opportunity.
        let creators: Vec<_> = (0..4)
            .map(|_| {
                let repo = db.resolutions();
                tokio::spawn(async move { repo.resolve("opp-1", false).await })
            })
            .collect();
        let mut ids = HashSet::new();
        for handle in creators {
            ids.insert(handle.await.unwrap().unwrap().resolution.id);
        }
        assert_eq!(ids.len(), 1);
        let id = ids.into_iter().next().unwrap();

        // Three admins editing different slots at once, round after round.
        let mut applied = 0;
        for round in 0..10i64 {
            let writers: Vec<_> = (0..MAX_INSTALLMENTS)
                .map(|index| {
                    let repo = db.resolutions();
                    let id = id.clone();
                    tokio::spawn(async move {
                        repo.set_installment(&id, index, Some(1_000 + round), date(index as u32 + 1), None)
                            .await
                    })
                })
                .collect();

            for handle in writers {
                match handle.await.unwrap() {
                    Ok(_) => applied += 1,
                    Err(err) => assert!(err.is_retryable(), "non-retryable write failure: {:?}", err),
                }
            }
        }

        let stored = db.resolutions().require(&id).await.unwrap();
        assert!(applied > 0);
        assert_eq!(stored.resolution.version, 1 + applied);
        assert!(stored.schedule.check_invariants().is_ok());
        assert!(stored.schedule.total_scheduled() <= stored.resolution.total_commission());

        db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }
}
