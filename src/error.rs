//! Ledger error types with HTTP status code mapping.
//!
//! [`LedgerError`] is the central error type for the service. Each variant
//! maps to a specific HTTP status code and structured JSON error response.
//! Rejections that members can act on (insufficient balance, event full,
//! duplicate claim) each carry their own variant and message so that callers
//! can always tell the reasons apart.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{EntryKind, EventId, MemberId};

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 4001,
///     "message": "insufficient balance: operation needs 2 slots, 1 available",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see code ranges on [`LedgerError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category          | HTTP Status                  |
/// |-----------|-------------------|------------------------------|
/// | 1000–1999 | Validation        | 400 Bad Request / 403        |
/// | 2000–2999 | State / Not Found | 404 Not Found / 409 Conflict |
/// | 3000–3999 | Server / Store    | 500 / 503                    |
/// | 4000–4999 | Ledger Rules      | 422 Unprocessable Entity     |
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Member with the given ID was not found.
    #[error("member not found: {0}")]
    MemberNotFound(MemberId),

    /// Club event with the given ID was not found.
    #[error("event not found: {0}")]
    EventNotFound(EventId),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Caller lacks the role claim required for this operation.
    #[error("forbidden: {0} requires an elevated role")]
    Forbidden(&'static str),

    /// A uniqueness-requiring ledger entry with this reference already exists.
    ///
    /// Replaying the same contribution confirmation or decay period must not
    /// double-apply; callers that expect redelivery treat this as success.
    #[error("duplicate {kind} for reference {reference}: already recorded")]
    DuplicateReference {
        /// Entry kind that was replayed.
        kind: EntryKind,
        /// The reference that already exists for this member and kind.
        reference: String,
    },

    /// The identity has already been registered as a member.
    #[error("member already registered: {0}")]
    MemberAlreadyRegistered(MemberId),

    /// The member already holds (or has been issued) a spot for this event.
    #[error("you already have a spot for this event")]
    AlreadyHeld {
        /// Member attempting the duplicate claim.
        member_id: MemberId,
        /// Event already claimed.
        event_id: EventId,
    },

    /// No held allocation exists to release or fulfil.
    #[error("no active spot held for this event")]
    NoActiveAllocation {
        /// Member without a held allocation.
        member_id: MemberId,
        /// Event queried.
        event_id: EventId,
    },

    /// The member's ledger is halted pending manual review.
    #[error("ledger is frozen pending review: {reason}")]
    LedgerFrozen {
        /// Member whose writes are halted.
        member_id: MemberId,
        /// Why the freeze happened.
        reason: String,
    },

    /// The member's balance does not cover the requested operation.
    #[error("you don't have enough balance: operation needs {needed}, {available} available")]
    InsufficientBalance {
        /// Slots (or points, at fulfilment) the operation requires.
        needed: i64,
        /// Slots (or points) the member currently has uncommitted.
        available: i64,
    },

    /// The event has no remaining capacity for this claim.
    #[error("this event is full")]
    EventFull {
        /// Event that is at capacity.
        event_id: EventId,
        /// Configured capacity in slots.
        capacity: u32,
    },

    /// The event is not accepting claims in its current status.
    #[error("event is {status} and not accepting claims")]
    EventNotOpen {
        /// Event in a non-open status.
        event_id: EventId,
        /// The status that blocks the claim.
        status: String,
    },

    /// The member has been deactivated and may not transact.
    #[error("member account is deactivated")]
    MemberDeactivated(MemberId),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The durable store did not answer within the configured budget.
    #[error("store unavailable after {attempts} attempts")]
    StoreUnavailable {
        /// How many attempts were made before giving up.
        attempts: u32,
    },

    /// Fatal invariant violation: never recovered silently.
    ///
    /// Raised when a ledger fold goes negative or an event's committed
    /// allocations exceed its capacity. The affected member is frozen and
    /// the full context is logged before this error is surfaced.
    #[error("ledger consistency violation: {details}")]
    Consistency {
        /// Member whose state is inconsistent, when member-scoped.
        member_id: Option<MemberId>,
        /// Description of the violated invariant.
        details: String,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::Forbidden(_) => 1002,
            Self::MemberNotFound(_) => 2001,
            Self::EventNotFound(_) => 2002,
            Self::NoActiveAllocation { .. } => 2003,
            Self::DuplicateReference { .. } => 2004,
            Self::AlreadyHeld { .. } => 2005,
            Self::LedgerFrozen { .. } => 2006,
            Self::MemberAlreadyRegistered(_) => 2007,
            Self::InsufficientBalance { .. } => 4001,
            Self::EventFull { .. } => 4002,
            Self::EventNotOpen { .. } => 4003,
            Self::MemberDeactivated(_) => 4004,
            Self::Internal(_) => 3000,
            Self::Persistence(_) => 3001,
            Self::Consistency { .. } => 3002,
            Self::StoreUnavailable { .. } => 3003,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::MemberNotFound(_) | Self::EventNotFound(_) => StatusCode::NOT_FOUND,
            Self::NoActiveAllocation { .. }
            | Self::DuplicateReference { .. }
            | Self::AlreadyHeld { .. }
            | Self::LedgerFrozen { .. }
            | Self::MemberAlreadyRegistered(_) => StatusCode::CONFLICT,
            Self::InsufficientBalance { .. }
            | Self::EventFull { .. }
            | Self::EventNotOpen { .. }
            | Self::MemberDeactivated(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Persistence(_) | Self::Internal(_) | Self::Consistency { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
