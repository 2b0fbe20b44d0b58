//! # Tally API Server
//!
//! ## Usage
//! ```bash
//! # Serve with tally.toml / TALLY_* settings
//! cargo run -p tally-api
//!
//! # Mint a development token
//! cargo run -p tally-api -- issue-token user-1 admin
//! cargo run -p tally-api -- issue-token user-2 team emp-alice
//! ```

use std::env;

use anyhow::Context;
use tally_api::{router, AccessRole, ApiConfig, AppState, JwtManager};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tally_api=debug,tally_db=debug,sqlx=warn".into()),
        )
        .init();

    let config = ApiConfig::load(None).context("Failed to load configuration")?;

    let args: Vec<String> = env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("issue-token") {
        return issue_token(&config, &args[1..]);
    }

    info!(
        addr = %config.socket_addr(),
        db = %config.db_path.display(),
        timeout_secs = config.request_timeout_secs,
        "Starting Tally API"
    );

    let state = AppState::connect(config.clone())
        .await
        .context("Failed to open database")?;

    let addr = config.socket_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!(addr = %addr, "Listening");

    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    state.db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// `issue-token <user-id> <admin|team|user> [employee-id]`
fn issue_token(config: &ApiConfig, args: &[String]) -> anyhow::Result<()> {
    let (user_id, access) = match args {
        [user_id, access, ..] => (user_id, access),
        _ => anyhow::bail!("Usage: tally-api issue-token <user-id> <admin|team|user> [employee-id]"),
    };
    let access: AccessRole = access.parse()?;
    let employee_id = args.get(2).map(String::as_str);

    let jwt = JwtManager::new(config.jwt_secret.clone(), config.jwt_lifetime_secs);
    let token = jwt.issue(user_id, employee_id, access)?;
    println!("{}", token);
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
