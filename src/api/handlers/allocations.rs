//! Slot claim, release, and fulfilment handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::auth::AuthClaims;
use crate::api::dto::{FulfilRequest, FulfilResponse};
use crate::app_state::AppState;
use crate::domain::{Allocation, EventId, MemberId};
use crate::error::{ErrorResponse, LedgerError};

/// `POST /events/{id}/claim` — Hold slots on an event.
///
/// Claiming reserves capacity without spending points; the debit happens
/// at fulfilment.
///
/// # Errors
///
/// Returns [`LedgerError::InsufficientBalance`] when free slots do not
/// cover the event's slot cost, [`LedgerError::EventFull`] when capacity
/// ran out, [`LedgerError::AlreadyHeld`] on a repeat claim,
/// [`LedgerError::EventNotOpen`] outside the open state, and
/// [`LedgerError::LedgerFrozen`] while the ledger is frozen.
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/claim",
    tag = "Allocations",
    summary = "Claim a slot",
    description = "Reserves the event's slot cost out of the caller's free slots. No points are spent until fulfilment, but the hold counts against both the member's free slots and the event's capacity.",
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
    ),
    responses(
        (status = 201, description = "Slot held", body = Allocation),
        (status = 404, description = "Event or member not found", body = ErrorResponse),
        (status = 409, description = "Already holding or frozen", body = ErrorResponse),
        (status = 422, description = "Not enough free slots or event full", body = ErrorResponse),
    )
)]
pub async fn claim_slot(
    State(state): State<AppState>,
    claims: AuthClaims,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, LedgerError> {
    let member_id = claims.member()?;
    let allocation = state
        .coordinator
        .claim(member_id, EventId::from_uuid(id))
        .await?;
    Ok((StatusCode::CREATED, Json(allocation)))
}

/// `POST /events/{id}/release` — Give a held slot back.
///
/// # Errors
///
/// Returns [`LedgerError::NoActiveAllocation`] when the caller holds
/// nothing on the event.
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/release",
    tag = "Allocations",
    summary = "Release a held slot",
    description = "Returns the caller's held slots to the event's capacity. The allocation record is kept for audit, and the member may claim the event again afterwards.",
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
    ),
    responses(
        (status = 200, description = "Hold released", body = Allocation),
        (status = 404, description = "Event or member not found", body = ErrorResponse),
        (status = 409, description = "Nothing held on this event", body = ErrorResponse),
    )
)]
pub async fn release_slot(
    State(state): State<AppState>,
    claims: AuthClaims,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, LedgerError> {
    let member_id = claims.member()?;
    let allocation = state
        .coordinator
        .release(member_id, EventId::from_uuid(id))
        .await?;
    Ok(Json(allocation))
}

/// `POST /events/{id}/fulfil` — Turn a held slot into a ticket.
///
/// Debits the ticket cost in points and marks the allocation fulfilled.
///
/// # Errors
///
/// Returns [`LedgerError::Forbidden`] without the `admin` role,
/// [`LedgerError::NoActiveAllocation`] when the member holds nothing on
/// the event, and [`LedgerError::Consistency`] when the debit would
/// corrupt the ledger.
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/fulfil",
    tag = "Allocations",
    summary = "Fulfil a held slot",
    description = "Issues the ticket: appends the allocation-spend entry for the event's full slot cost and marks the hold fulfilled. Fulfilled allocations are terminal.",
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
    ),
    request_body = FulfilRequest,
    responses(
        (status = 200, description = "Ticket issued", body = FulfilResponse),
        (status = 403, description = "Admin role required", body = ErrorResponse),
        (status = 404, description = "Event or member not found", body = ErrorResponse),
        (status = 409, description = "Nothing held on this event", body = ErrorResponse),
    )
)]
pub async fn fulfil_slot(
    State(state): State<AppState>,
    claims: AuthClaims,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<FulfilRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    claims.require_admin("fulfilment")?;
    let (allocation, new_points) = state
        .coordinator
        .fulfil(MemberId::from_uuid(req.member_id), EventId::from_uuid(id))
        .await?;
    Ok(Json(FulfilResponse {
        allocation,
        new_points,
    }))
}

/// Allocation routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events/{id}/claim", post(claim_slot))
        .route("/events/{id}/release", post(release_slot))
        .route("/events/{id}/fulfil", post(fulfil_slot))
}
