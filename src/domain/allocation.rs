//! Allocation records: a member's claim on an event's limited slots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{EventId, MemberId};

/// Lifecycle of an allocation.
///
/// `Held` is the only active state. `Released` returns the reserved slots
/// (voluntarily or forced by reconciliation); `Fulfilled` is terminal and
/// irreversible, reached when the ticket is issued and paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStatus {
    /// Slots reserved, points not yet spent.
    Held,
    /// Hold given back; the slots count against capacity no longer.
    Released,
    /// Ticket issued and points spent. Terminal.
    Fulfilled,
}

impl AllocationStatus {
    /// Stable string form used in persistence and events.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Held => "held",
            Self::Released => "released",
            Self::Fulfilled => "fulfilled",
        }
    }

    /// Parses the stable string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "held" => Some(Self::Held),
            "released" => Some(Self::Released),
            "fulfilled" => Some(Self::Fulfilled),
            _ => None,
        }
    }

    /// Whether this status consumes event capacity.
    ///
    /// Released allocations stay on the books for audit but free their
    /// slots.
    #[must_use]
    pub fn counts_against_capacity(&self) -> bool {
        matches!(self, Self::Held | Self::Fulfilled)
    }

    /// Whether a member with an allocation in this status blocks a new
    /// claim on the same event.
    #[must_use]
    pub fn blocks_reclaim(&self) -> bool {
        matches!(self, Self::Held | Self::Fulfilled)
    }
}

impl std::fmt::Display for AllocationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A member's claim on an event slot.
///
/// Claiming reserves slots without spending points; the point debit only
/// happens at fulfilment. A released allocation is kept for audit, and the
/// member may claim the same event again afterwards, producing a new
/// record.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Allocation {
    /// Unique allocation identifier (persistence key).
    pub id: Uuid,
    /// The claiming member.
    pub member_id: MemberId,
    /// The claimed event.
    pub event_id: EventId,
    /// Slot units reserved, copied from the event at claim time.
    pub slot_cost: u32,
    /// Current lifecycle state.
    pub status: AllocationStatus,
    /// Claim timestamp (immutable).
    pub created_at: DateTime<Utc>,
    /// Last status transition timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Allocation {
    /// Creates a fresh `held` allocation.
    #[must_use]
    pub fn held(member_id: MemberId, event_id: EventId, slot_cost: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            member_id,
            event_id,
            slot_cost,
            status: AllocationStatus::Held,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this allocation currently reserves slots.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.status == AllocationStatus::Held
    }

    /// Transitions `held -> released`. Caller must have checked the status.
    pub fn release(&mut self) {
        self.status = AllocationStatus::Released;
        self.updated_at = Utc::now();
    }

    /// Transitions `held -> fulfilled`. Caller must have checked the status.
    pub fn fulfil(&mut self) {
        self.status = AllocationStatus::Fulfilled;
        self.updated_at = Utc::now();
    }
}
