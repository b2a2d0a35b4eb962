//! Allocation lifecycle DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::Allocation;

/// Request body for `POST /events/{id}/fulfil`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct FulfilRequest {
    /// Member whose held allocation is being fulfilled.
    pub member_id: Uuid,
}

/// Response body for `POST /events/{id}/fulfil`.
#[derive(Debug, Serialize, ToSchema)]
pub struct FulfilResponse {
    /// The fulfilled allocation.
    pub allocation: Allocation,
    /// Member balance after the ticket spend.
    pub new_points: i64,
}
