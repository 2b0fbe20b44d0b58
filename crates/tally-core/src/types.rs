//! # Domain Types
//!
//! Core domain types used throughout the commission engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   Opportunity   │   │ RoleAssignment  │   │ CommissionRate  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │◄──│  opportunity_id │   │  employee_id    │       │
//! │  │  kind / status  │   │  employee_id    │──►│  role           │       │
//! │  │  final_amount   │   │  role           │   │  percentage_bps │       │
//! │  └────────┬────────┘   └─────────────────┘   └─────────────────┘       │
//! │           │ 1:1                                                         │
//! │  ┌────────▼────────────┐      ┌─────────────────┐                       │
//! │  │ CommissionResolution│ 1:N  │ CommissionShare │  snapshot of rate     │
//! │  │  ─────────────────  │─────►│  ─────────────  │  at resolution time   │
//! │  │  commissionable     │      │  percentage_bps │                       │
//! │  │  total / version    │      │  amount_cents   │                       │
//! │  └────────┬────────────┘      └─────────────────┘                       │
//! │           │ 1:3                                                         │
//! │  ┌────────▼────────┐                                                    │
//! │  │   Installment   │  NOT_SET → PENDING → SCHEDULED → PAID             │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire vs. Storage Names
//! Enums travel as `SCREAMING_SNAKE_CASE` (`"ACCOUNT_MANAGER"`) and are
//! stored as `snake_case` TEXT (`account_manager`).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::FULL_PERCENTAGE_BPS;

// =============================================================================
// Percentage
// =============================================================================

/// A commission percentage represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 1000 bps = 10%, 250 bps = 2.5%
///
/// Rates are entered with at most two decimals, so basis points represent
/// every accepted input exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Percentage(u32);

impl Percentage {
    /// Creates a percentage from basis points.
    ///
    /// Range checking happens in [`crate::validation::validate_percentage`];
    /// this constructor trusts its input (it is used for stored values).
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Percentage(bps)
    }

    /// Returns the value in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the percentage as a float, for display only.
    pub fn as_percent(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Percentage(0)
    }

    #[inline]
    pub const fn full() -> Self {
        Percentage(FULL_PERCENTAGE_BPS)
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

// =============================================================================
// Opportunity Kind
// =============================================================================

/// The product line an opportunity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpportunityKind {
    /// Mergers and acquisitions mandate.
    Mna,
    /// Real estate investment.
    RealEstate,
}

impl fmt::Display for OpportunityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OpportunityKind::Mna => "MNA",
            OpportunityKind::RealEstate => "REAL_ESTATE",
        })
    }
}

// =============================================================================
// Opportunity Status
// =============================================================================

/// Lifecycle status of an opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpportunityStatus {
    /// Deal still in progress.
    Active,
    /// Deal parked.
    Inactive,
    /// Deal closed. Only concluded deals can carry a final amount.
    Concluded,
}

impl Default for OpportunityStatus {
    fn default() -> Self {
        OpportunityStatus::Active
    }
}

impl fmt::Display for OpportunityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OpportunityStatus::Active => "ACTIVE",
            OpportunityStatus::Inactive => "INACTIVE",
            OpportunityStatus::Concluded => "CONCLUDED",
        })
    }
}

// =============================================================================
// Commission Role
// =============================================================================

/// The capacity in which an employee earns commission on an opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissionRole {
    /// Owns the client relationship.
    AccountManager,
    /// Brought the client in.
    ClientAcquisition,
    /// Worked the deal.
    DealSupport,
}

impl CommissionRole {
    /// Every role, in ordering order.
    pub const ALL: [CommissionRole; 3] = [
        CommissionRole::AccountManager,
        CommissionRole::ClientAcquisition,
        CommissionRole::DealSupport,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            CommissionRole::AccountManager => "ACCOUNT_MANAGER",
            CommissionRole::ClientAcquisition => "CLIENT_ACQUISITION",
            CommissionRole::DealSupport => "DEAL_SUPPORT",
        }
    }
}

impl fmt::Display for CommissionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommissionRole {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommissionRole::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::InvalidFormat {
                field: "role".to_string(),
                reason: format!("unknown commission role '{}'", s),
            })
    }
}

// =============================================================================
// Installment Status
// =============================================================================

/// Status of one installment slot.
///
/// ## State Machine
/// ```text
///            set                confirm              mark_paid
/// NOT_SET ────────► PENDING ─────────────► SCHEDULED ──────────► PAID
///    ▲                 │  │                     │                  (locked)
///    │     clear       │  └─────────── mark_paid ─────────────────►
///    └─────────────────┴─────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstallmentStatus {
    /// No amount or date yet.
    NotSet,
    /// Amount and date set, awaiting confirmation.
    Pending,
    /// Confirmed for payment.
    Scheduled,
    /// Money has moved. Terminal.
    Paid,
}

impl InstallmentStatus {
    /// Whether the slot carries an amount and date.
    #[inline]
    pub const fn is_set(&self) -> bool {
        !matches!(self, InstallmentStatus::NotSet)
    }
}

impl Default for InstallmentStatus {
    fn default() -> Self {
        InstallmentStatus::NotSet
    }
}

impl fmt::Display for InstallmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InstallmentStatus::NotSet => "NOT_SET",
            InstallmentStatus::Pending => "PENDING",
            InstallmentStatus::Scheduled => "SCHEDULED",
            InstallmentStatus::Paid => "PAID",
        })
    }
}

// =============================================================================
// Opportunity
// =============================================================================

/// Read model of an investment opportunity.
///
/// The engine never edits these fields; opportunity CRUD belongs to the
/// deal pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    pub id: String,
    pub kind: OpportunityKind,
    pub name: String,
    pub status: OpportunityStatus,
    pub final_amount_cents: Option<i64>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Opportunity {
    /// Final amount as [`Money`], when known.
    pub fn final_amount(&self) -> Option<Money> {
        self.final_amount_cents.map(Money::from_cents)
    }
}

// =============================================================================
// Role Assignment
// =============================================================================

/// One employee holding one role on one opportunity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignment {
    pub opportunity_id: String,
    pub employee_id: String,
    pub role: CommissionRole,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Commission Rate
// =============================================================================

/// Global rate for an (employee, role) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CommissionRate {
    pub employee_id: String,
    pub role: CommissionRole,
    pub percentage_bps: u32,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl CommissionRate {
    pub fn percentage(&self) -> Percentage {
        Percentage::from_bps(self.percentage_bps)
    }
}

// =============================================================================
// Commission Share
// =============================================================================

/// One line of a resolved breakdown.
/// Uses snapshot pattern to freeze the rate at resolution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CommissionShare {
    pub employee_id: String,
    pub role: CommissionRole,
    /// Rate at the time of resolution (snapshot).
    pub percentage_bps: u32,
    pub amount_cents: i64,
}

impl CommissionShare {
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Commission Resolution
// =============================================================================

/// The persisted commission breakdown for one concluded opportunity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CommissionResolution {
    pub id: String,
    pub opportunity_id: String,
    /// The final amount this breakdown was computed from.
    pub commissionable_amount_cents: i64,
    pub total_commission_cents: i64,
    /// Ordered by (employee_id, role).
    pub shares: Vec<CommissionShare>,
    /// Optimistic concurrency counter, bumped on every write.
    pub version: i64,
    #[ts(as = "String")]
    pub resolved_at: DateTime<Utc>,
}

impl CommissionResolution {
    pub fn total_commission(&self) -> Money {
        Money::from_cents(self.total_commission_cents)
    }

    /// Whether the breakdown no longer matches the opportunity's final amount.
    pub fn is_stale_for(&self, opportunity: &Opportunity) -> bool {
        opportunity.final_amount_cents != Some(self.commissionable_amount_cents)
    }
}

// =============================================================================
// Installment
// =============================================================================

/// One of the three slots of a payment schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Installment {
    /// Slot index, 0-based.
    pub index: usize,
    pub status: InstallmentStatus,
    pub amount_cents: Option<i64>,
    #[ts(as = "Option<String>")]
    pub payment_date: Option<NaiveDate>,
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
}

impl Installment {
    /// An empty NOT_SET slot.
    pub fn empty(index: usize) -> Self {
        Installment {
            index,
            status: InstallmentStatus::NotSet,
            amount_cents: None,
            payment_date: None,
            paid_at: None,
        }
    }

    /// Amount counted against the total (zero while NOT_SET).
    pub fn committed_amount(&self) -> Money {
        match (self.status.is_set(), self.amount_cents) {
            (true, Some(cents)) => Money::from_cents(cents),
            _ => Money::zero(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_display() {
        assert_eq!(Percentage::from_bps(1000).to_string(), "10.00%");
        assert_eq!(Percentage::from_bps(250).to_string(), "2.50%");
        assert_eq!(Percentage::full().to_string(), "100.00%");
    }

    #[test]
    fn test_role_wire_names() {
        let json = serde_json::to_string(&CommissionRole::ClientAcquisition).unwrap();
        assert_eq!(json, "\"CLIENT_ACQUISITION\"");

        let kind: OpportunityKind = serde_json::from_str("\"REAL_ESTATE\"").unwrap();
        assert_eq!(kind, OpportunityKind::RealEstate);
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!(
            "deal_support".parse::<CommissionRole>().unwrap(),
            CommissionRole::DealSupport
        );
        assert!("SALES".parse::<CommissionRole>().is_err());
    }

    #[test]
    fn test_role_ordering_follows_declaration() {
        let mut roles = vec![
            CommissionRole::DealSupport,
            CommissionRole::AccountManager,
            CommissionRole::ClientAcquisition,
        ];
        roles.sort();
        assert_eq!(roles, CommissionRole::ALL.to_vec());
    }

    #[test]
    fn test_installment_committed_amount() {
        let mut slot = Installment::empty(0);
        assert_eq!(slot.committed_amount(), Money::zero());

        slot.status = InstallmentStatus::Pending;
        slot.amount_cents = Some(400_000);
        assert_eq!(slot.committed_amount().cents(), 400_000);
    }

    #[test]
    fn test_struct_fields_are_camel_case() {
        let share = CommissionShare {
            employee_id: "emp-1".to_string(),
            role: CommissionRole::AccountManager,
            percentage_bps: 1000,
            amount_cents: 1_000_000,
        };
        let value = serde_json::to_value(&share).unwrap();
        assert_eq!(value["employeeId"], "emp-1");
        assert_eq!(value["percentageBps"], 1000);
        assert_eq!(value["role"], "ACCOUNT_MANAGER");
    }
}
