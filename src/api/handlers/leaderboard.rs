//! Leaderboard read and recompute handlers.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::api::auth::AuthClaims;
use crate::app_state::AppState;
use crate::error::{ErrorResponse, LedgerError};
use crate::service::Leaderboard;

/// Query parameters for `GET /leaderboard`.
#[derive(Debug, Deserialize, IntoParams)]
pub struct LeaderboardParams {
    /// One-off qualification bar override; bypasses the cached board.
    #[serde(default)]
    pub min_points: Option<i64>,
}

/// `GET /leaderboard` — The current monthly standings.
///
/// # Errors
///
/// Returns [`LedgerError`] on internal failures.
#[utoipa::path(
    get,
    path = "/api/v1/leaderboard",
    tag = "Leaderboard",
    summary = "Get the leaderboard",
    description = "Returns the cached board, computing it first if no cutoff has passed yet. Passing `min_points` computes a one-off preview at that qualification bar without touching the cache.",
    params(LeaderboardParams),
    responses(
        (status = 200, description = "Ranked standings", body = Leaderboard),
    )
)]
pub async fn get_leaderboard(
    State(state): State<AppState>,
    Query(params): Query<LeaderboardParams>,
) -> Result<impl IntoResponse, LedgerError> {
    if let Some(min_points) = params.min_points {
        return Ok(Json(state.ranking.preview(min_points).await));
    }
    let board = match state.ranking.current().await {
        Some(board) => board,
        None => state.ranking.compute().await,
    };
    Ok(Json(board))
}

/// `POST /leaderboard/recompute` — Force a recomputation now.
///
/// # Errors
///
/// Returns [`LedgerError::Forbidden`] without the `admin` role.
#[utoipa::path(
    post,
    path = "/api/v1/leaderboard/recompute",
    tag = "Leaderboard",
    summary = "Recompute the leaderboard",
    description = "Recomputes the board from live balances at the configured qualification bar, replaces the cache, and announces the recomputation on the event stream.",
    responses(
        (status = 200, description = "Freshly computed standings", body = Leaderboard),
        (status = 403, description = "Admin role required", body = ErrorResponse),
    )
)]
pub async fn recompute_leaderboard(
    State(state): State<AppState>,
    claims: AuthClaims,
) -> Result<impl IntoResponse, LedgerError> {
    claims.require_admin("leaderboard recompute")?;
    let board = state.ranking.compute().await;
    Ok(Json(board))
}

/// Leaderboard routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/leaderboard", get(get_leaderboard))
        .route("/leaderboard/recompute", post(recompute_leaderboard))
}
