//! REST endpoint handlers organized by resource.

pub mod admin;
pub mod allocations;
pub mod contributions;
pub mod events;
pub mod leaderboard;
pub mod members;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(members::routes())
        .merge(contributions::routes())
        .merge(events::routes())
        .merge(allocations::routes())
        .merge(leaderboard::routes())
        .merge(admin::routes())
}
