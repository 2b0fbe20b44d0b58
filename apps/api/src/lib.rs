//! # Tally API
//!
//! RPC server for the commission engine.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         API Surface                                     │
//! │                                                                         │
//! │  POST /rpc/commissions.<procedure>     GET /health                     │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ┌───────────────┐   Caller (JWT)   ┌──────────────────────────────┐   │
//! │  │  routes.rs    │─────────────────►│  commands/*                  │   │
//! │  │  dispatch +   │                  │                              │   │
//! │  │  deadline     │                  │ • rates        • resolution  │   │
//! │  └───────────────┘                  │ • assignments  • schedule    │   │
//! │                                     │ • eligibility  • overview    │   │
//! │                                     └──────────────┬───────────────┘   │
//! │                                                    │                    │
//! │                     tally-core (rules) ◄───────────┤                    │
//! │                     tally-db (SQLite)  ◄───────────┘                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! See [`config::ApiConfig`]. Environment variables:
//! - `TALLY_CONFIG` - Path to `tally.toml`
//! - `TALLY_BIND_ADDR` / `TALLY_PORT` - Listen address
//! - `TALLY_DB_PATH` - SQLite file (`:memory:` for ephemeral)
//! - `TALLY_JWT_SECRET` - HS256 secret shared with the identity service
//! - `TALLY_REQUEST_TIMEOUT_SECS` - Per-request deadline (default: 15)

pub mod auth;
pub mod commands;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use tally_db::{Database, DbConfig, DbResult};
use tracing::info;

// Re-exports
pub use auth::{AccessRole, Caller, JwtManager};
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::router;

const IN_MEMORY_DB: &str = ":memory:";

/// Shared application state.
pub struct AppState {
    pub db: Database,
    pub config: ApiConfig,
    pub jwt: JwtManager,
}

impl AppState {
    /// Opens the database (running migrations) and builds the state.
    pub async fn connect(config: ApiConfig) -> DbResult<Arc<Self>> {
        let db_config = if config.db_path.as_os_str() == IN_MEMORY_DB {
            DbConfig::in_memory()
        } else {
            DbConfig::new(&config.db_path).max_connections(config.max_connections)
        };

        let db = Database::new(db_config).await?;
        info!(path = %config.db_path.display(), "Database ready");

        Ok(Arc::new(Self::new(db, config)))
    }

    pub fn new(db: Database, config: ApiConfig) -> Self {
        let jwt = JwtManager::new(config.jwt_secret.clone(), config.jwt_lifetime_secs);
        AppState { db, config, jwt }
    }
}
