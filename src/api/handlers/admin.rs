//! Administrative handlers: corrections, unfreezing, and decay sweeps.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::api::auth::AuthClaims;
use crate::api::dto::{AdjustmentRequest, AdjustmentResponse, UnfreezeResponse};
use crate::app_state::AppState;
use crate::domain::{EntryKind, MemberId};
use crate::error::{ErrorResponse, LedgerError};
use crate::service::DecayCycleReport;

/// `POST /members/{id}/adjustments` — Append a corrective entry.
///
/// Corrective kinds bypass a freeze so an admin can repair a corrupted
/// ledger with offsetting entries.
///
/// # Errors
///
/// Returns [`LedgerError::Forbidden`] without the `admin` role,
/// [`LedgerError::InvalidRequest`] on a non-corrective kind or a delta
/// with the wrong sign, and [`LedgerError::MemberNotFound`] for unknown
/// ids.
#[utoipa::path(
    post,
    path = "/api/v1/members/{id}/adjustments",
    tag = "Admin",
    summary = "Append a corrective entry",
    description = "Appends a `manual_adjustment` or `allocation_refund` entry. These kinds are the only ones accepted while a ledger is frozen, which makes them the repair path for corrupted balances.",
    params(
        ("id" = uuid::Uuid, Path, description = "Member UUID"),
    ),
    request_body = AdjustmentRequest,
    responses(
        (status = 200, description = "Correction appended", body = AdjustmentResponse),
        (status = 400, description = "Non-corrective kind or invalid delta", body = ErrorResponse),
        (status = 403, description = "Admin role required", body = ErrorResponse),
        (status = 404, description = "Member not found", body = ErrorResponse),
    )
)]
pub async fn append_adjustment(
    State(state): State<AppState>,
    claims: AuthClaims,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<AdjustmentRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    claims.require_admin("ledger correction")?;
    let kind = EntryKind::parse(&req.kind)
        .ok_or_else(|| LedgerError::InvalidRequest(format!("unknown entry kind: {}", req.kind)))?;
    let (entry, new_points) = state
        .ledger
        .append_correction(
            MemberId::from_uuid(id),
            kind,
            req.points_delta,
            &req.reference,
        )
        .await?;
    Ok(Json(AdjustmentResponse { entry, new_points }))
}

/// `POST /members/{id}/unfreeze` — Lift a freeze after repair.
///
/// # Errors
///
/// Returns [`LedgerError::Forbidden`] without the `admin` role,
/// [`LedgerError::InvalidRequest`] when the ledger is not frozen, and
/// [`LedgerError::Consistency`] when the balance still folds negative.
#[utoipa::path(
    post,
    path = "/api/v1/members/{id}/unfreeze",
    tag = "Admin",
    summary = "Unfreeze a ledger",
    description = "Revalidates the frozen ledger and lifts the freeze when the balance folds non-negative again. Fails and stays frozen otherwise.",
    params(
        ("id" = uuid::Uuid, Path, description = "Member UUID"),
    ),
    responses(
        (status = 200, description = "Freeze lifted", body = UnfreezeResponse),
        (status = 400, description = "Ledger is not frozen", body = ErrorResponse),
        (status = 403, description = "Admin role required", body = ErrorResponse),
        (status = 404, description = "Member not found", body = ErrorResponse),
        (status = 500, description = "Balance still folds negative", body = ErrorResponse),
    )
)]
pub async fn unfreeze_member(
    State(state): State<AppState>,
    claims: AuthClaims,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, LedgerError> {
    claims.require_admin("ledger unfreeze")?;
    let member_id = MemberId::from_uuid(id);
    let points = state.ledger.unfreeze(member_id).await?;
    Ok(Json(UnfreezeResponse { member_id, points }))
}

/// Request body for `POST /decay/run`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DecayRunRequest {
    /// Day to sweep up to, inclusive. Defaults to today (UTC).
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
}

/// `POST /decay/run` — Run a decay sweep now.
///
/// # Errors
///
/// Returns [`LedgerError::Forbidden`] without the `admin` role.
#[utoipa::path(
    post,
    path = "/api/v1/decay/run",
    tag = "Admin",
    summary = "Run a decay sweep",
    description = "Sweeps every member for overdue inactivity penalties up to the given day. Penalty entries are unique per member and day, so rerunning a sweep never double-charges.",
    request_body = DecayRunRequest,
    responses(
        (status = 200, description = "Sweep report", body = DecayCycleReport),
        (status = 403, description = "Admin role required", body = ErrorResponse),
    )
)]
pub async fn run_decay(
    State(state): State<AppState>,
    claims: AuthClaims,
    Json(req): Json<DecayRunRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    claims.require_admin("decay sweep")?;
    let as_of = req.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let report = state.decay.run_cycle(as_of).await;
    Ok(Json(report))
}

/// Administrative routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/members/{id}/adjustments", post(append_adjustment))
        .route("/members/{id}/unfreeze", post(unfreeze_member))
        .route("/decay/run", post(run_decay))
}
