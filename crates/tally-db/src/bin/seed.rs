//! # Seed Data Generator
//!
//! Populates the database with demo opportunities, role assignments and
//! rates for development.
//!
//! ## Usage
//! ```bash
//! # Seed the default database
//! cargo run -p tally-db --bin seed
//!
//! # Specify database path
//! cargo run -p tally-db --bin seed -- --db ./data/tally.db
//! ```
//!
//! ## Generated Data
//! - A mix of M&A and real-estate opportunities in every status
//! - Concluded deals with and without a final amount
//! - One concluded deal whose deal-support rate is deliberately missing,
//!   so the admin overview has something to flag

use anyhow::Context;
use chrono::{Duration, Utc};
use std::env;
use tally_core::{CommissionRole, Opportunity, OpportunityKind, OpportunityStatus, Percentage};
use tally_db::{Database, DbConfig};
use tracing::{info, warn};

/// (id, name, kind, status, final amount in cents)
const OPPORTUNITIES: &[(&str, &str, OpportunityKind, OpportunityStatus, Option<i64>)] = &[
    ("opp-acme", "Acme Merger", OpportunityKind::Mna, OpportunityStatus::Concluded, Some(10_000_000)),
    ("opp-harbour", "Harbour Tower", OpportunityKind::RealEstate, OpportunityStatus::Concluded, Some(25_000_050)),
    ("opp-orion", "Orion Carve-out", OpportunityKind::Mna, OpportunityStatus::Concluded, Some(4_200_000)),
    ("opp-quay", "Quayside Lofts", OpportunityKind::RealEstate, OpportunityStatus::Concluded, None),
    ("opp-beacon", "Beacon Buyout", OpportunityKind::Mna, OpportunityStatus::Active, None),
    ("opp-elm", "Elm Street Retail", OpportunityKind::RealEstate, OpportunityStatus::Inactive, None),
];

/// (opportunity, employee, role)
const ASSIGNMENTS: &[(&str, &str, CommissionRole)] = &[
    ("opp-acme", "emp-alice", CommissionRole::AccountManager),
    ("opp-acme", "emp-bruno", CommissionRole::ClientAcquisition),
    ("opp-harbour", "emp-alice", CommissionRole::AccountManager),
    ("opp-harbour", "emp-chen", CommissionRole::DealSupport),
    ("opp-orion", "emp-bruno", CommissionRole::AccountManager),
    ("opp-orion", "emp-dana", CommissionRole::DealSupport),
    ("opp-quay", "emp-chen", CommissionRole::ClientAcquisition),
    ("opp-beacon", "emp-alice", CommissionRole::ClientAcquisition),
];

/// (employee, role, basis points). emp-dana has no DEAL_SUPPORT rate.
const RATES: &[(&str, CommissionRole, u32)] = &[
    ("emp-alice", CommissionRole::AccountManager, 1000),
    ("emp-alice", CommissionRole::ClientAcquisition, 500),
    ("emp-bruno", CommissionRole::ClientAcquisition, 250),
    ("emp-bruno", CommissionRole::AccountManager, 800),
    ("emp-chen", CommissionRole::DealSupport, 150),
    ("emp-chen", CommissionRole::ClientAcquisition, 300),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut db_path = String::from("./tally_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tally Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./tally_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(database = %db_path, "Seeding commission data");

    let db = Database::new(DbConfig::new(&db_path))
        .await
        .with_context(|| format!("opening {db_path}"))?;

    if !db.opportunities().list_all().await?.is_empty() {
        warn!("Database already has opportunities, skipping seed (delete the file to regenerate)");
        return Ok(());
    }

    let now = Utc::now();
    for (offset, (id, name, kind, status, amount)) in OPPORTUNITIES.iter().enumerate() {
        let closed_at = (*status == OpportunityStatus::Concluded)
            .then(|| now - Duration::days(30 * (offset as i64 + 1)));

        db.opportunities()
            .upsert(&Opportunity {
                id: id.to_string(),
                kind: *kind,
                name: name.to_string(),
                status: *status,
                final_amount_cents: *amount,
                closed_at,
                updated_at: now,
            })
            .await
            .with_context(|| format!("inserting opportunity {id}"))?;
    }
    info!(count = OPPORTUNITIES.len(), "Opportunities created");

    for (opportunity_id, employee_id, role) in ASSIGNMENTS {
        db.assignments()
            .assign(opportunity_id, employee_id, *role)
            .await
            .with_context(|| format!("assigning {employee_id} on {opportunity_id}"))?;
    }
    info!(count = ASSIGNMENTS.len(), "Role assignments created");

    for (employee_id, role, bps) in RATES {
        db.rates()
            .set(employee_id, *role, Percentage::from_bps(*bps))
            .await
            .with_context(|| format!("setting rate for {employee_id}"))?;
    }
    info!(count = RATES.len(), "Rates created");

    // Resolve what can be resolved so the dashboard has schedules to edit.
    for (id, ..) in OPPORTUNITIES {
        match db.resolutions().resolve(id, false).await {
            Ok(stored) => info!(
                opportunity_id = %id,
                total_cents = stored.resolution.total_commission_cents,
                "Resolved"
            ),
            Err(err) => info!(opportunity_id = %id, reason = %err, "Left unresolved"),
        }
    }

    db.close().await;
    info!("Seed complete");
    Ok(())
}
