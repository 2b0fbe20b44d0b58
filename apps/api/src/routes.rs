//! # HTTP Routes
//!
//! ```text
//! POST /rpc/{procedure}   JSON body in, JSON result or ApiError out
//! GET  /health            "OK" while the database answers
//! ```
//!
//! Every RPC call runs under the configured request deadline. A call that
//! misses it answers `TIMEOUT`; all writes are idempotent, so the client
//! simply retries.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::Caller;
use crate::commands::{assignments, eligibility, overview, rates, resolution, schedule};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/rpc/{procedure}", post(rpc_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Health check endpoint.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.db.health_check().await {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "DATABASE UNAVAILABLE")
    }
}

/// RPC entry point.
async fn rpc_handler(
    State(state): State<Arc<AppState>>,
    Path(procedure): Path<String>,
    caller: Caller,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let deadline = state.config.request_timeout();

    match tokio::time::timeout(deadline, dispatch(&state, &caller, &procedure, &body)).await {
        Ok(Ok(value)) => {
            debug!(procedure = %procedure, user = %caller.user_id, "RPC ok");
            Ok(Json(value))
        }
        Ok(Err(e)) => {
            debug!(procedure = %procedure, user = %caller.user_id, code = ?e.code, "RPC failed");
            Err(e)
        }
        Err(_) => {
            warn!(procedure = %procedure, timeout = ?deadline, "RPC timed out");
            Err(ApiError::timeout(&procedure))
        }
    }
}

/// Routes a procedure name to its command.
pub async fn dispatch(state: &AppState, caller: &Caller, procedure: &str, body: &[u8]) -> ApiResult<Value> {
    match procedure {
        "commissions.setRate" => respond(rates::set_rate(state, caller, parse(body)?).await?),
        "commissions.getRate" => respond(rates::get_rate(state, caller, parse(body)?).await?),
        "commissions.listRates" => respond(rates::list_rates(state, caller, parse(body)?).await?),

        "commissions.assignRole" => respond(assignments::assign_role(state, caller, parse(body)?).await?),
        "commissions.removeRole" => respond(assignments::remove_role(state, caller, parse(body)?).await?),

        "commissions.listEligible" => {
            respond(eligibility::list_eligible(state, caller, parse(body)?).await?)
        }
        "commissions.isResolvable" => {
            respond(eligibility::check_resolvable(state, caller, parse(body)?).await?)
        }

        "commissions.resolve" => respond(resolution::resolve(state, caller, parse(body)?).await?),
        "commissions.recompute" => respond(resolution::recompute(state, caller, parse(body)?).await?),

        "commissions.getSchedule" => respond(schedule::get_schedule(state, caller, parse(body)?).await?),
        "commissions.setInstallment" => {
            respond(schedule::set_installment(state, caller, parse(body)?).await?)
        }
        "commissions.confirmInstallment" => {
            respond(schedule::confirm_installment(state, caller, parse(body)?).await?)
        }
        "commissions.markPaid" => respond(schedule::mark_paid(state, caller, parse(body)?).await?),
        "commissions.clearInstallment" => {
            respond(schedule::clear_installment(state, caller, parse(body)?).await?)
        }

        "commissions.getEmployeeOverview" => {
            respond(overview::get_employee_overview(state, caller, parse(body)?).await?)
        }
        "commissions.getAdminOverview" => respond(overview::get_admin_overview(state, caller).await?),

        _ => Err(ApiError::not_found("Procedure", procedure)),
    }
}

/// Decodes a request body. An empty body reads as `{}`.
fn parse<T: DeserializeOwned>(body: &[u8]) -> ApiResult<T> {
    let body = if body.is_empty() { b"{}".as_slice() } else { body };
    serde_json::from_slice(body).map_err(|e| ApiError::validation(format!("Invalid request body: {}", e)))
}

fn respond<T: Serialize>(value: T) -> ApiResult<Value> {
    serde_json::to_value(value).map_err(|e| ApiError::internal(format!("Failed to encode response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{admin, seeded_state, team, user};
    use crate::error::ErrorCode;
    use serde_json::json;

    async fn call(state: &AppState, caller: &Caller, procedure: &str, body: Value) -> ApiResult<Value> {
        let body = serde_json::to_vec(&body).unwrap();
        dispatch(state, caller, procedure, &body).await
    }

    #[tokio::test]
    async fn test_resolve_then_pay_over_rpc() {
        let state = seeded_state().await;

        let resolved = call(&state, &team("emp-a"), "commissions.resolve", json!({ "opportunityId": "opp-1" }))
            .await
            .unwrap();
        let id = resolved["id"].as_str().unwrap().to_string();
        assert_eq!(resolved["totalCommissionCents"], 1_000_000);

        let update = call(
            &state,
            &admin(),
            "commissions.setInstallment",
            json!({
                "resolutionId": id,
                "index": 0,
                "amountCents": 250_000,
                "paymentDate": "2026-04-30",
            }),
        )
        .await
        .unwrap();
        assert_eq!(update["installment"]["status"], "PENDING");
        assert_eq!(update["installment"]["paymentDate"], "2026-04-30");

        let paid = call(
            &state,
            &admin(),
            "commissions.markPaid",
            json!({ "resolutionId": id, "index": 0 }),
        )
        .await
        .unwrap();
        assert_eq!(paid["installment"]["status"], "PAID");
        assert_eq!(paid["schedule"]["totalRemainingCents"], 750_000);
        assert_eq!(paid["schedule"]["version"], 3);
    }

    #[tokio::test]
    async fn test_set_rate_over_rpc() {
        let state = seeded_state().await;
        let rate = call(
            &state,
            &admin(),
            "commissions.setRate",
            json!({ "employeeId": "emp-b", "role": "CLIENT_ACQUISITION", "percentage": 1.25 }),
        )
        .await
        .unwrap();
        assert_eq!(rate["percentageBps"], 125);

        let lookup = call(
            &state,
            &user("emp-b"),
            "commissions.getRate",
            json!({ "employeeId": "emp-b", "role": "DEAL_SUPPORT" }),
        )
        .await
        .unwrap();
        assert!(lookup["percentageBps"].is_null());
    }

    #[tokio::test]
    async fn test_admin_overview_accepts_empty_body() {
        let state = seeded_state().await;
        let overview = dispatch(&state, &admin(), "commissions.getAdminOverview", b"")
            .await
            .unwrap();
        assert_eq!(overview["pendingCount"], 1);
    }

    #[tokio::test]
    async fn test_unknown_procedure_and_bad_body() {
        let state = seeded_state().await;

        let err = call(&state, &admin(), "commissions.explode", json!({})).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);

        let err = call(&state, &admin(), "commissions.resolve", json!({ "opportunity": 1 }))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);

        let err = call(
            &state,
            &admin(),
            "commissions.assignRole",
            json!({ "opportunityId": "opp-1", "employeeId": "emp-b", "role": "CEO" }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_health() {
        let state = seeded_state().await;
        let response = health_handler(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
