//! Club event administration DTOs.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

/// Request body for `POST /events`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateEventRequest {
    /// Human-readable event name.
    pub name: String,
    /// Scheduled start of the event.
    pub start_at: DateTime<Utc>,
    /// Total slots on offer.
    pub capacity: u32,
    /// Slots consumed by a single claim.
    #[serde(default = "default_slot_cost")]
    pub slot_cost: u32,
}

const fn default_slot_cost() -> u32 {
    1
}

/// Query parameters for `GET /events`.
#[derive(Debug, Deserialize, IntoParams)]
pub struct EventListParams {
    /// Optional status filter: `open`, `closed`, `completed` or `cancelled`.
    #[serde(default)]
    pub status: Option<String>,
}

/// Request body for `POST /events/{id}/status`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct EventStatusRequest {
    /// Target status: `open`, `closed`, `completed` or `cancelled`.
    pub status: String,
}
