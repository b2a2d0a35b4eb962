//! Contribution ingestion and ledger history DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::common_dto::PaginationMeta;
use crate::domain::LedgerEntry;

/// Request body for `POST /contributions`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ContributionRequest {
    /// Member the payment belongs to.
    pub member_id: Uuid,
    /// Confirmed payment amount in currency units.
    pub amount: i64,
    /// Payment reference from the upstream processor.
    pub external_reference: String,
}

/// Response body for `POST /contributions`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ContributionResponse {
    /// The credited (or previously credited) entry.
    pub entry: LedgerEntry,
    /// Balance after the credit.
    pub new_points: i64,
    /// True when the reference was already on the ledger.
    pub already_recorded: bool,
}

/// Paginated ledger statement for `GET /members/{id}/ledger`.
#[derive(Debug, Serialize, ToSchema)]
pub struct LedgerHistoryResponse {
    /// Entries in append order.
    pub data: Vec<LedgerEntry>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
}
