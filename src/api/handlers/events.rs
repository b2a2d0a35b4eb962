//! Club event administration and read handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::auth::AuthClaims;
use crate::api::dto::{CreateEventRequest, EventListParams, EventStatusRequest};
use crate::app_state::AppState;
use crate::domain::{Allocation, ClubEvent, EventId, EventStatus, EventSummary};
use crate::error::{ErrorResponse, LedgerError};

/// `POST /events` — Open a ticketed event for claims.
///
/// # Errors
///
/// Returns [`LedgerError::Forbidden`] without the `admin` role and
/// [`LedgerError::InvalidRequest`] on an empty name, a zero capacity, or
/// a slot cost that is zero or exceeds the capacity.
#[utoipa::path(
    post,
    path = "/api/v1/events",
    tag = "Events",
    summary = "Open an event",
    description = "Creates a club event with a fixed slot capacity and a per-claim slot cost. The event starts in the `open` state and accepts claims immediately.",
    request_body = CreateEventRequest,
    responses(
        (status = 201, description = "Event opened", body = ClubEvent),
        (status = 400, description = "Invalid name, capacity, or slot cost", body = ErrorResponse),
        (status = 403, description = "Admin role required", body = ErrorResponse),
    )
)]
pub async fn create_event(
    State(state): State<AppState>,
    claims: AuthClaims,
    Json(req): Json<CreateEventRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    claims.require_admin("event creation")?;
    let event = state
        .coordinator
        .open_event(&req.name, req.start_at, req.capacity, req.slot_cost)
        .await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// `GET /events` — List event summaries.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidRequest`] on an unknown status filter.
#[utoipa::path(
    get,
    path = "/api/v1/events",
    tag = "Events",
    summary = "List events",
    description = "Returns summaries of all events ordered by start time, optionally filtered by lifecycle status.",
    params(EventListParams),
    responses(
        (status = 200, description = "Event summaries", body = [EventSummary]),
        (status = 400, description = "Unknown status filter", body = ErrorResponse),
    )
)]
pub async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<EventListParams>,
) -> Result<impl IntoResponse, LedgerError> {
    let filter = match params.status.as_deref() {
        Some(s) => Some(EventStatus::parse(s).ok_or_else(|| {
            LedgerError::InvalidRequest(format!("unknown event status filter: {s}"))
        })?),
        None => None,
    };
    let events = state.coordinator.list_events(filter).await;
    Ok(Json(events))
}

/// `GET /events/{id}` — Event summary with capacity accounting.
///
/// # Errors
///
/// Returns [`LedgerError::EventNotFound`] for unknown ids.
#[utoipa::path(
    get,
    path = "/api/v1/events/{id}",
    tag = "Events",
    summary = "Get event summary",
    description = "Returns the event with committed and remaining slot counts and the held/fulfilled allocation tallies.",
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
    ),
    responses(
        (status = 200, description = "Event summary", body = EventSummary),
        (status = 404, description = "Event not found", body = ErrorResponse),
    )
)]
pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, LedgerError> {
    let summary = state.coordinator.event_summary(EventId::from_uuid(id)).await?;
    Ok(Json(summary))
}

/// `POST /events/{id}/status` — Drive the event lifecycle.
///
/// Cancelling an event force-releases every held allocation.
///
/// # Errors
///
/// Returns [`LedgerError::Forbidden`] without the `admin` role,
/// [`LedgerError::InvalidRequest`] on an unknown target status or an
/// illegal transition, and [`LedgerError::EventNotFound`] for unknown ids.
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/status",
    tag = "Events",
    summary = "Change event status",
    description = "Moves the event through its lifecycle. Open and closed may swap; closed may complete; open or closed may cancel. Cancellation force-releases all held slots.",
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
    ),
    request_body = EventStatusRequest,
    responses(
        (status = 200, description = "Updated event summary", body = EventSummary),
        (status = 400, description = "Unknown status or illegal transition", body = ErrorResponse),
        (status = 403, description = "Admin role required", body = ErrorResponse),
        (status = 404, description = "Event not found", body = ErrorResponse),
    )
)]
pub async fn set_event_status(
    State(state): State<AppState>,
    claims: AuthClaims,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<EventStatusRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    claims.require_admin("event lifecycle")?;
    let to = EventStatus::parse(&req.status).ok_or_else(|| {
        LedgerError::InvalidRequest(format!("unknown event status: {}", req.status))
    })?;
    let summary = state
        .coordinator
        .set_event_status(EventId::from_uuid(id), to)
        .await?;
    Ok(Json(summary))
}

/// `GET /events/{id}/allocations` — The event's allocation roster.
///
/// # Errors
///
/// Returns [`LedgerError::EventNotFound`] for unknown ids.
#[utoipa::path(
    get,
    path = "/api/v1/events/{id}/allocations",
    tag = "Events",
    summary = "List event allocations",
    description = "Returns every allocation made against the event, newest first, including released and fulfilled ones.",
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
    ),
    responses(
        (status = 200, description = "Event allocations", body = [Allocation]),
        (status = 404, description = "Event not found", body = ErrorResponse),
    )
)]
pub async fn get_event_allocations(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, LedgerError> {
    let roster = state
        .coordinator
        .event_allocations(EventId::from_uuid(id))
        .await?;
    Ok(Json(roster))
}

/// Event routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events", post(create_event).get(list_events))
        .route("/events/{id}", get(get_event))
        .route("/events/{id}/status", post(set_event_status))
        .route("/events/{id}/allocations", get(get_event_allocations))
}
