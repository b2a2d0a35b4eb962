//! Club events and the per-event allocation aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::allocation::{Allocation, AllocationStatus};
use super::{EventId, MemberId};

/// Lifecycle of a club event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Accepting claims.
    Open,
    /// Claims paused; may reopen or move to a terminal state.
    Closed,
    /// The event took place. Terminal.
    Completed,
    /// Called off; holds are force-released. Terminal.
    Cancelled,
}

impl EventStatus {
    /// Stable string form used in persistence and events.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses the stable string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "closed" => Some(Self::Closed),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether new claims are accepted in this state.
    #[must_use]
    pub fn accepts_claims(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Valid lifecycle transitions. Terminal states allow none.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Open, Self::Closed | Self::Cancelled)
                | (Self::Closed, Self::Open | Self::Completed | Self::Cancelled)
        )
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event members can claim limited slots on.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ClubEvent {
    /// Unique event identifier (immutable after creation).
    pub id: EventId,

    /// Human-readable event name.
    pub name: String,

    /// Scheduled start time.
    pub start_at: DateTime<Utc>,

    /// Total slot units available (immutable after creation).
    pub capacity: u32,

    /// Slot units one claim reserves (immutable after creation).
    pub slot_cost: u32,

    /// Current lifecycle state.
    pub status: EventStatus,

    /// ISO-8601 creation timestamp (immutable after creation).
    pub created_at: DateTime<Utc>,
}

impl ClubEvent {
    /// Creates an open event.
    #[must_use]
    pub fn new(id: EventId, name: String, start_at: DateTime<Utc>, capacity: u32, slot_cost: u32) -> Self {
        Self {
            id,
            name,
            start_at,
            capacity,
            slot_cost,
            status: EventStatus::Open,
            created_at: Utc::now(),
        }
    }
}

/// Aggregate stored per event in the [`super::EventRegistry`].
///
/// The allocation list is the event-side source of truth for capacity:
/// everything that counts against capacity is in here, and mutation only
/// happens under the event's write lock, which serializes concurrent
/// claims.
#[derive(Debug)]
pub struct EventEntry {
    /// The event itself.
    pub event: ClubEvent,

    /// All allocations ever made on this event, including released ones.
    pub allocations: Vec<Allocation>,
}

impl EventEntry {
    /// Wraps a freshly created event with no allocations.
    #[must_use]
    pub fn new(event: ClubEvent) -> Self {
        Self {
            event,
            allocations: Vec::new(),
        }
    }

    /// Slot units consumed by held and fulfilled allocations.
    #[must_use]
    pub fn committed_slots(&self) -> u32 {
        self.allocations
            .iter()
            .filter(|a| a.status.counts_against_capacity())
            .map(|a| a.slot_cost)
            .sum()
    }

    /// Capacity left for new claims. Negative means oversell, which is a
    /// consistency violation rather than a valid state.
    #[must_use]
    pub fn remaining_capacity(&self) -> i64 {
        i64::from(self.event.capacity) - i64::from(self.committed_slots())
    }

    /// The member's allocation that blocks a new claim, if any.
    #[must_use]
    pub fn blocking_allocation(&self, member_id: MemberId) -> Option<&Allocation> {
        self.allocations
            .iter()
            .find(|a| a.member_id == member_id && a.status.blocks_reclaim())
    }

    /// Mutable handle to the member's currently held allocation.
    pub fn held_allocation_mut(&mut self, member_id: MemberId) -> Option<&mut Allocation> {
        self.allocations
            .iter_mut()
            .find(|a| a.member_id == member_id && a.is_held())
    }

    /// Members with a currently held allocation, used on cancellation.
    #[must_use]
    pub fn held_member_ids(&self) -> Vec<MemberId> {
        self.allocations
            .iter()
            .filter(|a| a.is_held())
            .map(|a| a.member_id)
            .collect()
    }

    /// Projects the event plus allocation tallies into a summary.
    #[must_use]
    pub fn summary(&self) -> EventSummary {
        let held = self
            .allocations
            .iter()
            .filter(|a| a.status == AllocationStatus::Held)
            .count();
        let fulfilled = self
            .allocations
            .iter()
            .filter(|a| a.status == AllocationStatus::Fulfilled)
            .count();
        EventSummary {
            id: self.event.id,
            name: self.event.name.clone(),
            start_at: self.event.start_at,
            capacity: self.event.capacity,
            slot_cost: self.event.slot_cost,
            status: self.event.status,
            committed_slots: self.committed_slots(),
            remaining_capacity: self.remaining_capacity(),
            held_count: held,
            fulfilled_count: fulfilled,
            created_at: self.event.created_at,
        }
    }
}

/// Lightweight summary of an event for list endpoints.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EventSummary {
    /// Event identifier.
    pub id: EventId,
    /// Event name.
    pub name: String,
    /// Scheduled start time.
    pub start_at: DateTime<Utc>,
    /// Total slot units.
    pub capacity: u32,
    /// Slot units per claim.
    pub slot_cost: u32,
    /// Lifecycle state.
    pub status: EventStatus,
    /// Slot units consumed by held plus fulfilled allocations.
    pub committed_slots: u32,
    /// Slot units left for new claims.
    pub remaining_capacity: i64,
    /// Number of currently held allocations.
    pub held_count: usize,
    /// Number of fulfilled allocations.
    pub fulfilled_count: usize,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}
