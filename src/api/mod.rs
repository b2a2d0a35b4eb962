//! REST API layer: identity extraction, route handlers, DTOs, and
//! router composition.
//!
//! All endpoints are mounted under `/api/v1`, with the system endpoints
//! at the root.

pub mod auth;
pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
}

/// OpenAPI document covering the whole REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "Stokvel Points & Allocation Ledger",
        description = "Append-only points ledger with slot allocations, a monthly leaderboard, and inactivity decay for community savings clubs."
    ),
    paths(
        handlers::members::register_member,
        handlers::members::list_members,
        handlers::members::get_member,
        handlers::members::update_member,
        handlers::members::deactivate_member,
        handlers::members::get_balance,
        handlers::members::get_ledger,
        handlers::members::get_member_allocations,
        handlers::contributions::record_contribution,
        handlers::events::create_event,
        handlers::events::list_events,
        handlers::events::get_event,
        handlers::events::set_event_status,
        handlers::events::get_event_allocations,
        handlers::allocations::claim_slot,
        handlers::allocations::release_slot,
        handlers::allocations::fulfil_slot,
        handlers::leaderboard::get_leaderboard,
        handlers::leaderboard::recompute_leaderboard,
        handlers::admin::append_adjustment,
        handlers::admin::unfreeze_member,
        handlers::admin::run_decay,
        handlers::system::health_handler,
        handlers::system::points_policy_handler,
    ),
    tags(
        (name = "Members", description = "Member lifecycle and read models"),
        (name = "Contributions", description = "Payment-gateway contribution ingestion"),
        (name = "Events", description = "Club event administration"),
        (name = "Allocations", description = "Slot claims, releases, and fulfilment"),
        (name = "Leaderboard", description = "Monthly standings and priority"),
        (name = "Admin", description = "Corrections, unfreezing, and decay sweeps"),
        (name = "System", description = "Health and policy introspection"),
    )
)]
pub struct ApiDoc;
