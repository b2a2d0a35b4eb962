//! System endpoints: health check and the published club policy.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
}

/// `GET /health` — Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, and current timestamp.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// The club rules the ledger is currently running with.
#[derive(Debug, Serialize, ToSchema)]
struct PointsPolicyResponse {
    points_per_slot: i64,
    ticket_cost_points: i64,
    points_per_currency_unit: i64,
    min_leaderboard_points: i64,
    priority_fraction: f64,
    cutoff_day: u32,
    cutoff_hour: u32,
    decay_grace_days: i64,
    decay_penalty_points: i64,
}

/// `GET /config/points-policy` — The active club rules.
#[utoipa::path(
    get,
    path = "/config/points-policy",
    tag = "System",
    summary = "Get the points policy",
    description = "Returns the club constants the ledger applies: slot size, ticket cost, leaderboard qualification, cutoff schedule, and decay rules.",
    responses(
        (status = 200, description = "Active policy", body = PointsPolicyResponse),
    )
)]
pub async fn points_policy_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(PointsPolicyResponse {
            points_per_slot: state.points.points_per_slot,
            ticket_cost_points: state.points.ticket_cost_points,
            points_per_currency_unit: state.points.points_per_currency_unit,
            min_leaderboard_points: state.ranking_policy.min_points,
            priority_fraction: state.ranking_policy.priority_fraction,
            cutoff_day: state.ranking_policy.cutoff_day,
            cutoff_hour: state.ranking_policy.cutoff_hour,
            decay_grace_days: state.decay_policy.grace_days,
            decay_penalty_points: state.decay_policy.penalty_points,
        }),
    )
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/config/points-policy", get(points_policy_handler))
}
