//! # Payment Schedule
//!
//! The three-slot disbursement calendar of a resolved commission and the
//! state machine each slot follows.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   ┌─────────┐  set   ┌─────────┐ confirm ┌───────────┐ mark_paid ┌──────┐
//! │   │ NOT_SET │───────►│ PENDING │────────►│ SCHEDULED │──────────►│ PAID │
//! │   └─────────┘        └─────────┘         └───────────┘           └──────┘
//! │        ▲               │  │  ▲ set (edit)      │                    ▲
//! │        │     clear     │  │  └─┘               │                    │
//! │        └───────────────┴──┼────────────────────┘                    │
//! │                           └──────────── mark_paid ──────────────────┘
//! │                                                                         │
//! │  PAID is terminal: set / clear / confirm fail with InstallmentLocked.  │
//! │  SCHEDULED never drops back implicitly: set fails, clear first.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants (checked on every write)
//! - Σ amount of non-NOT_SET slots ≤ total commission
//! - amount and date are both present or both absent
//! - NOT_SET ⇔ no amount/date; PAID ⇔ `paid_at` stamped

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{Installment, InstallmentStatus};
use crate::validation::{validate_installment_index, validate_installment_input};
use crate::MAX_INSTALLMENTS;

// =============================================================================
// Payment Schedule
// =============================================================================

/// The installments of one resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSchedule {
    pub resolution_id: String,
    pub total_commission_cents: i64,
    /// Always `MAX_INSTALLMENTS` slots, slot `i` at position `i`.
    pub installments: Vec<Installment>,
}

impl PaymentSchedule {
    /// A schedule with every slot NOT_SET.
    pub fn empty(resolution_id: impl Into<String>, total_commission: Money) -> Self {
        PaymentSchedule {
            resolution_id: resolution_id.into(),
            total_commission_cents: total_commission.cents(),
            installments: (0..MAX_INSTALLMENTS).map(Installment::empty).collect(),
        }
    }

    /// Rebuilds a schedule from stored slots.
    ///
    /// Missing slots come back NOT_SET; slots outside the index range are
    /// dropped.
    pub fn from_parts(
        resolution_id: impl Into<String>,
        total_commission: Money,
        stored: Vec<Installment>,
    ) -> Self {
        let mut schedule = PaymentSchedule::empty(resolution_id, total_commission);
        for installment in stored {
            if installment.index < MAX_INSTALLMENTS {
                let index = installment.index;
                schedule.installments[index] = installment;
            }
        }
        schedule
    }

    pub fn total_commission(&self) -> Money {
        Money::from_cents(self.total_commission_cents)
    }

    /// Returns the slot at `index`.
    pub fn installment(&self, index: usize) -> CoreResult<&Installment> {
        validate_installment_index(index)?;
        Ok(&self.installments[index])
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Sets amount and date on a slot, leaving it PENDING.
    ///
    /// ## Rules
    /// - amount and date are both required, amount > 0
    /// - NOT_SET / PENDING → PENDING
    /// - SCHEDULED → `InvalidTransition` (clear first)
    /// - PAID → `InstallmentLocked`
    /// - the resulting scheduled sum must not exceed the total
    pub fn set_installment(
        &mut self,
        index: usize,
        amount_cents: Option<i64>,
        payment_date: Option<NaiveDate>,
    ) -> CoreResult<&Installment> {
        validate_installment_index(index)?;
        let (amount, date) = validate_installment_input(amount_cents, payment_date)?;

        match self.installments[index].status {
            InstallmentStatus::Paid => return Err(CoreError::InstallmentLocked { index }),
            InstallmentStatus::Scheduled => {
                return Err(CoreError::InvalidTransition {
                    index,
                    from: InstallmentStatus::Scheduled,
                    to: InstallmentStatus::Pending,
                })
            }
            InstallmentStatus::NotSet | InstallmentStatus::Pending => {}
        }

        let others: Money = self
            .installments
            .iter()
            .filter(|slot| slot.index != index)
            .map(Installment::committed_amount)
            .sum();
        match others.checked_add(amount) {
            Some(scheduled) if scheduled <= self.total_commission() => {}
            _ => {
                return Err(CoreError::ScheduleExceedsTotal {
                    scheduled_cents: others.saturating_add(amount).cents(),
                    total_cents: self.total_commission_cents,
                })
            }
        }

        let slot = &mut self.installments[index];
        slot.status = InstallmentStatus::Pending;
        slot.amount_cents = Some(amount.cents());
        slot.payment_date = Some(date);
        slot.paid_at = None;
        Ok(&self.installments[index])
    }

    /// Confirms a PENDING slot for payment.
    ///
    /// Already SCHEDULED is a no-op.
    pub fn confirm(&mut self, index: usize) -> CoreResult<&Installment> {
        validate_installment_index(index)?;

        match self.installments[index].status {
            InstallmentStatus::NotSet => return Err(CoreError::NotReady { index }),
            InstallmentStatus::Paid => return Err(CoreError::InstallmentLocked { index }),
            InstallmentStatus::Scheduled => {}
            InstallmentStatus::Pending => {
                self.installments[index].status = InstallmentStatus::Scheduled;
            }
        }

        Ok(&self.installments[index])
    }

    /// Records a payment. PENDING may skip confirmation.
    ///
    /// Already PAID is a no-op and keeps the original `paid_at`.
    pub fn mark_paid(&mut self, index: usize, now: DateTime<Utc>) -> CoreResult<&Installment> {
        validate_installment_index(index)?;

        match self.installments[index].status {
            InstallmentStatus::NotSet => return Err(CoreError::NotReady { index }),
            InstallmentStatus::Paid => {}
            InstallmentStatus::Pending | InstallmentStatus::Scheduled => {
                let slot = &mut self.installments[index];
                slot.status = InstallmentStatus::Paid;
                slot.paid_at = Some(now);
            }
        }

        Ok(&self.installments[index])
    }

    /// Resets a slot to NOT_SET, unless it is PAID.
    pub fn clear(&mut self, index: usize) -> CoreResult<&Installment> {
        validate_installment_index(index)?;

        if self.installments[index].status == InstallmentStatus::Paid {
            return Err(CoreError::InstallmentLocked { index });
        }

        self.installments[index] = Installment::empty(index);
        Ok(&self.installments[index])
    }

    // =========================================================================
    // Derived Values
    // =========================================================================

    /// Σ amount of every slot that is not NOT_SET.
    pub fn total_scheduled(&self) -> Money {
        self.installments.iter().map(Installment::committed_amount).sum()
    }

    /// Σ amount of PAID slots.
    pub fn total_paid(&self) -> Money {
        self.installments
            .iter()
            .filter(|slot| slot.status == InstallmentStatus::Paid)
            .map(Installment::committed_amount)
            .sum()
    }

    /// Total commission minus what has been paid.
    pub fn total_remaining(&self) -> Money {
        self.total_commission() - self.total_paid()
    }

    /// Whether any slot is PAID. A resolution with payments is immutable.
    pub fn has_payments(&self) -> bool {
        self.installments
            .iter()
            .any(|slot| slot.status == InstallmentStatus::Paid)
    }

    /// Zero total, or at least one slot set and every set slot PAID.
    pub fn is_completed(&self) -> bool {
        if self.total_commission().is_zero() {
            return true;
        }
        let mut set = self.installments.iter().filter(|slot| slot.status.is_set()).peekable();
        set.peek().is_some() && set.all(|slot| slot.status == InstallmentStatus::Paid)
    }

    /// Read-side view with derived totals.
    pub fn summary(&self) -> ScheduleSummary {
        ScheduleSummary {
            resolution_id: self.resolution_id.clone(),
            total_commission_cents: self.total_commission_cents,
            total_scheduled_cents: self.total_scheduled().cents(),
            total_paid_cents: self.total_paid().cents(),
            total_remaining_cents: self.total_remaining().cents(),
            completed: self.is_completed(),
            installments: self.installments.clone(),
        }
    }

    /// Verifies every schedule invariant.
    ///
    /// Transitions keep these by construction; the database layer calls
    /// this on rows it loads before writing them back.
    pub fn check_invariants(&self) -> CoreResult<()> {
        if self.installments.len() != MAX_INSTALLMENTS {
            return Err(CoreError::InvalidInstallmentIndex {
                index: self.installments.len(),
                max: MAX_INSTALLMENTS,
            });
        }

        for (position, slot) in self.installments.iter().enumerate() {
            if slot.index != position {
                return Err(CoreError::InvalidInstallmentIndex {
                    index: slot.index,
                    max: MAX_INSTALLMENTS,
                });
            }

            match (slot.amount_cents, slot.payment_date) {
                (Some(_), None) => {
                    return Err(ValidationError::BothOrNeither {
                        present: "amount_cents".to_string(),
                        missing: "payment_date".to_string(),
                    }
                    .into())
                }
                (None, Some(_)) => {
                    return Err(ValidationError::BothOrNeither {
                        present: "payment_date".to_string(),
                        missing: "amount_cents".to_string(),
                    }
                    .into())
                }
                (None, None) if slot.status.is_set() => {
                    return Err(CoreError::NotReady { index: position })
                }
                (Some(_), Some(_)) if !slot.status.is_set() => {
                    return Err(ValidationError::InvalidFormat {
                        field: "status".to_string(),
                        reason: format!("installment {} has an amount but is NOT_SET", position),
                    }
                    .into())
                }
                _ => {}
            }

            if (slot.status == InstallmentStatus::Paid) != slot.paid_at.is_some() {
                return Err(ValidationError::InvalidFormat {
                    field: "paid_at".to_string(),
                    reason: format!("installment {} paid_at does not match status", position),
                }
                .into());
            }
        }

        let scheduled = self.total_scheduled();
        if scheduled > self.total_commission() {
            return Err(CoreError::ScheduleExceedsTotal {
                scheduled_cents: scheduled.cents(),
                total_cents: self.total_commission_cents,
            });
        }

        Ok(())
    }
}

// =============================================================================
// Schedule Summary
// =============================================================================

/// A schedule together with its derived totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSummary {
    pub resolution_id: String,
    pub total_commission_cents: i64,
    pub total_scheduled_cents: i64,
    pub total_paid_cents: i64,
    pub total_remaining_cents: i64,
    pub completed: bool,
    pub installments: Vec<Installment>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(total_cents: i64) -> PaymentSchedule {
        PaymentSchedule::empty("res-1", Money::from_cents(total_cents))
    }

    fn date(day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2025, 6, day)
    }

    #[test]
    fn test_empty_schedule_has_three_unset_slots() {
        let s = schedule(1_000_000);
        assert_eq!(s.installments.len(), MAX_INSTALLMENTS);
        assert!(s
            .installments
            .iter()
            .all(|slot| slot.status == InstallmentStatus::NotSet));
        assert!(s.check_invariants().is_ok());
        assert!(!s.is_completed());
    }

    #[test]
    fn test_schedule_exceeding_total_is_rejected() {
        let mut s = schedule(1_000_000);
        s.set_installment(0, Some(400_000), date(1)).unwrap();
        s.set_installment(1, Some(400_000), date(2)).unwrap();

        let err = s.set_installment(2, Some(300_000), date(3)).unwrap_err();
        assert_eq!(
            err,
            CoreError::ScheduleExceedsTotal {
                scheduled_cents: 1_100_000,
                total_cents: 1_000_000,
            }
        );
        assert_eq!(s.installments[2].status, InstallmentStatus::NotSet);
        assert_eq!(s.total_scheduled().cents(), 800_000);
    }

    #[test]
    fn test_huge_amount_is_rejected_not_wrapped() {
        let mut s = schedule(1_000_000);
        s.set_installment(0, Some(400_000), date(1)).unwrap();

        let err = s.set_installment(1, Some(i64::MAX), date(2)).unwrap_err();
        assert_eq!(
            err,
            CoreError::ScheduleExceedsTotal {
                scheduled_cents: i64::MAX,
                total_cents: 1_000_000,
            }
        );
        assert_eq!(s.total_scheduled().cents(), 400_000);
    }

    #[test]
    fn test_schedule_may_equal_total() {
        let mut s = schedule(1_000_000);
        s.set_installment(0, Some(400_000), date(1)).unwrap();
        s.set_installment(1, Some(400_000), date(2)).unwrap();
        s.set_installment(2, Some(200_000), date(3)).unwrap();
        assert_eq!(s.total_scheduled(), s.total_commission());
        assert!(s.check_invariants().is_ok());
    }

    #[test]
    fn test_editing_pending_slot_replaces_its_amount() {
        let mut s = schedule(1_000_000);
        s.set_installment(0, Some(900_000), date(1)).unwrap();
        // Own previous amount does not count against the new one.
        s.set_installment(0, Some(1_000_000), date(5)).unwrap();
        assert_eq!(s.total_scheduled().cents(), 1_000_000);
        assert_eq!(s.installments[0].payment_date, date(5));
    }

    #[test]
    fn test_set_requires_both_amount_and_date() {
        let mut s = schedule(1_000_000);
        assert!(matches!(
            s.set_installment(0, Some(100), None),
            Err(CoreError::Validation(ValidationError::BothOrNeither { .. }))
        ));
        assert!(matches!(
            s.set_installment(0, None, date(1)),
            Err(CoreError::Validation(ValidationError::BothOrNeither { .. }))
        ));
        assert!(matches!(
            s.set_installment(0, Some(-5), date(1)),
            Err(CoreError::Validation(ValidationError::MustBePositive { .. }))
        ));
    }

    #[test]
    fn test_paid_installment_is_locked() {
        let mut s = schedule(1_000_000);
        s.set_installment(0, Some(400_000), date(1)).unwrap();
        s.confirm(0).unwrap();
        s.mark_paid(0, Utc::now()).unwrap();

        assert_eq!(
            s.set_installment(0, Some(300_000), date(2)),
            Err(CoreError::InstallmentLocked { index: 0 })
        );
        assert_eq!(s.clear(0), Err(CoreError::InstallmentLocked { index: 0 }));
        assert_eq!(s.confirm(0), Err(CoreError::InstallmentLocked { index: 0 }));
        assert_eq!(s.installments[0].status, InstallmentStatus::Paid);
    }

    #[test]
    fn test_scheduled_slot_cannot_be_edited_without_clear() {
        let mut s = schedule(1_000_000);
        s.set_installment(1, Some(400_000), date(1)).unwrap();
        s.confirm(1).unwrap();

        assert_eq!(
            s.set_installment(1, Some(500_000), date(2)),
            Err(CoreError::InvalidTransition {
                index: 1,
                from: InstallmentStatus::Scheduled,
                to: InstallmentStatus::Pending,
            })
        );

        s.clear(1).unwrap();
        s.set_installment(1, Some(500_000), date(2)).unwrap();
        assert_eq!(s.installments[1].status, InstallmentStatus::Pending);
    }

    #[test]
    fn test_confirm_and_mark_paid_edges() {
        let mut s = schedule(1_000_000);
        assert_eq!(s.confirm(0), Err(CoreError::NotReady { index: 0 }));
        assert!(matches!(
            s.mark_paid(0, Utc::now()),
            Err(CoreError::NotReady { index: 0 })
        ));

        s.set_installment(0, Some(100_000), date(1)).unwrap();
        s.confirm(0).unwrap();
        let again = s.confirm(0).unwrap().clone();
        assert_eq!(again.status, InstallmentStatus::Scheduled);

        // PENDING → PAID shortcut
        s.set_installment(1, Some(100_000), date(2)).unwrap();
        let paid_at = Utc::now();
        s.mark_paid(1, paid_at).unwrap();
        assert_eq!(s.installments[1].paid_at, Some(paid_at));

        // Idempotent: original timestamp survives
        s.mark_paid(1, paid_at + chrono::Duration::days(1)).unwrap();
        assert_eq!(s.installments[1].paid_at, Some(paid_at));
    }

    #[test]
    fn test_invalid_index() {
        let mut s = schedule(1_000_000);
        assert_eq!(
            s.confirm(3),
            Err(CoreError::InvalidInstallmentIndex { index: 3, max: 3 })
        );
        assert!(s.installment(7).is_err());
    }

    #[test]
    fn test_derived_totals_and_completion() {
        let mut s = schedule(1_000_000);
        s.set_installment(0, Some(600_000), date(1)).unwrap();
        s.set_installment(1, Some(400_000), date(2)).unwrap();
        s.mark_paid(0, Utc::now()).unwrap();

        assert_eq!(s.total_paid().cents(), 600_000);
        assert_eq!(s.total_remaining().cents(), 400_000);
        assert!(s.has_payments());
        assert!(!s.is_completed());

        s.mark_paid(1, Utc::now()).unwrap();
        assert!(s.is_completed());

        let summary = s.summary();
        assert_eq!(summary.total_remaining_cents, 0);
        assert!(summary.completed);
    }

    #[test]
    fn test_zero_total_is_completed() {
        assert!(schedule(0).is_completed());
    }

    #[test]
    fn test_status_never_regresses_from_paid() {
        let mut s = schedule(1_000_000);
        s.set_installment(2, Some(10), date(1)).unwrap();
        s.mark_paid(2, Utc::now()).unwrap();

        let _ = s.set_installment(2, Some(20), date(2));
        let _ = s.confirm(2);
        let _ = s.clear(2);
        assert_eq!(s.installments[2].status, InstallmentStatus::Paid);
        assert_eq!(s.installments[2].amount_cents, Some(10));
    }

    #[test]
    fn test_from_parts_fills_missing_slots() {
        let mut stored = Installment::empty(1);
        stored.status = InstallmentStatus::Pending;
        stored.amount_cents = Some(50);
        stored.payment_date = date(1);

        let s = PaymentSchedule::from_parts("res-1", Money::from_cents(100), vec![stored]);
        assert_eq!(s.installments.len(), 3);
        assert_eq!(s.installments[1].amount_cents, Some(50));
        assert_eq!(s.installments[0].status, InstallmentStatus::NotSet);
        assert!(s.check_invariants().is_ok());
    }

    #[test]
    fn test_check_invariants_detects_half_set_slot() {
        let mut s = schedule(100);
        s.installments[0].amount_cents = Some(10);
        assert!(s.check_invariants().is_err());
    }
}
