//! Member-related DTOs: registration, profile updates, admin writes.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::common_dto::{PaginationMeta, PaginationParams};
use crate::domain::{LedgerEntry, MemberId, MemberSummary};

/// Request body for `POST /members`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterMemberRequest {
    /// Display name shown on the leaderboard.
    pub display_name: String,
    /// Monthly contribution target in currency units.
    #[serde(default)]
    pub monthly_target: i64,
    /// Optional referral code captured at signup.
    #[serde(default)]
    pub referral_code: Option<String>,
}

/// Request body for `PUT /members/{id}`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateMemberRequest {
    /// New display name, if changing.
    #[serde(default)]
    pub display_name: Option<String>,
    /// New monthly target, if changing.
    #[serde(default)]
    pub monthly_target: Option<i64>,
}

/// Query parameters for `GET /members`.
#[derive(Debug, Deserialize, IntoParams)]
pub struct MemberListParams {
    /// Page number (1-indexed). Defaults to 1.
    #[serde(default = "default_page")]
    pub page: u32,
    /// Items per page (max 100). Defaults to 20.
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    /// When true, deactivated members are omitted.
    #[serde(default)]
    pub active_only: bool,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    20
}

impl MemberListParams {
    /// The pagination part of the query, for clamping and offsets.
    #[must_use]
    pub fn pagination(&self) -> PaginationParams {
        PaginationParams {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

/// Paginated list response for `GET /members`.
#[derive(Debug, Serialize, ToSchema)]
pub struct MemberListResponse {
    /// Member summaries for the page.
    pub data: Vec<MemberSummary>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
}

/// Request body for `POST /members/{id}/adjustments`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AdjustmentRequest {
    /// Corrective entry kind: `manual_adjustment` or `allocation_refund`.
    pub kind: String,
    /// Signed points delta.
    pub points_delta: i64,
    /// Audit reference for the correction.
    pub reference: String,
}

/// Response body for ledger-writing admin endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct AdjustmentResponse {
    /// The appended entry.
    pub entry: LedgerEntry,
    /// Balance after the append.
    pub new_points: i64,
}

/// Response body for `POST /members/{id}/unfreeze`.
#[derive(Debug, Serialize, ToSchema)]
pub struct UnfreezeResponse {
    /// The unfrozen member.
    pub member_id: MemberId,
    /// Balance confirmed by the post-repair fold.
    pub points: i64,
}
