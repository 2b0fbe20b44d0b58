//! # Repository Module
//!
//! Database repository implementations for the commission engine.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Layout                                    │
//! │                                                                         │
//! │  RPC procedure                                                         │
//! │       │                                                                 │
//! │       │  db.resolutions().resolve("opp-1", false)                      │
//! │       ▼                                                                 │
//! │  ResolutionRepository ──┬── opportunity::fetch_by_id                   │
//! │                         ├── assignment::fetch_for_opportunity          │
//! │                         └── rate::fetch_for_opportunity                │
//! │       │                      (same open transaction)                   │
//! │       ▼                                                                 │
//! │  tally-core rules (plan / resolve / schedule transitions)              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `pub(crate)` fetch helpers take any `SqliteExecutor`, so the same SQL
//! serves both the pool and an open transaction.
//!
//! ## Available Repositories
//!
//! - [`opportunity::OpportunityRepository`] - Opportunity read model
//! - [`assignment::AssignmentRepository`] - Role assignments
//! - [`rate::RateRepository`] - Rate registry
//! - [`resolution::ResolutionRepository`] - Resolutions and payment schedules

pub mod assignment;
pub mod opportunity;
pub mod rate;
pub mod resolution;
