//! # tally-core: Pure Commission Logic
//!
//! This crate holds every rule of the commission engine as pure functions
//! with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Admin dashboard / investor UI                   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ POST /rpc/commissions.*                │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    apps/api (axum)                              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │  ┌──────────┐ ┌────────────┐ ┌──────────┐ ┌──────────────────┐ │   │
//! │  │  │  types   │ │ resolution │ │ schedule │ │ eligibility /    │ │   │
//! │  │  │  money   │ │ calculator │ │  state   │ │ overview         │ │   │
//! │  │  └──────────┘ └────────────┘ └──────────┘ └──────────────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tally-db (Database Layer)                    │   │
//! │  │          SQLite queries, migrations, transactional repos        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Opportunity, CommissionRate, Installment, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//! - [`eligibility`] - Which opportunities are commission-eligible / resolvable
//! - [`resolution`] - The commission breakdown calculator
//! - [`schedule`] - Payment schedule state machine
//! - [`overview`] - Reporting projections
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::money::Money;
//! use tally_core::types::Percentage;
//!
//! let final_amount = Money::from_cents(10_000_000); // 100,000.00
//! let rate = Percentage::from_bps(1000);            // 10%
//!
//! assert_eq!(final_amount.apply_percentage(rate).cents(), 1_000_000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod eligibility;
pub mod error;
pub mod money;
pub mod overview;
pub mod resolution;
pub mod schedule;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use schedule::PaymentSchedule;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Number of installment slots every payment schedule carries.
///
/// Slots are addressed by index `0..MAX_INSTALLMENTS` and presented to
/// users as first / second / third.
pub const MAX_INSTALLMENTS: usize = 3;

/// Basis points in 100%.
pub const FULL_PERCENTAGE_BPS: u32 = 10_000;
