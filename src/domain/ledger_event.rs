//! Domain events reflecting ledger and allocation state mutations.
//!
//! Every state change emits a [`LedgerEvent`] through the
//! [`super::EventBus`]. Events are broadcast to WebSocket subscribers and
//! persisted to the PostgreSQL event log when persistence is enabled.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{EntryKind, EventId, EventStatus, MemberId};

/// Domain event emitted after every state mutation.
///
/// Events carry enough payload for a subscriber to update a projection
/// without a follow-up query.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// Emitted when a member registers.
    MemberRegistered {
        /// Member identifier.
        member_id: MemberId,
        /// Display name as registered.
        display_name: String,
        /// Registration timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a member is soft-deactivated.
    MemberDeactivated {
        /// Member identifier.
        member_id: MemberId,
        /// Deactivation timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted after a ledger entry is appended.
    EntryAppended {
        /// Member whose ledger grew.
        member_id: MemberId,
        /// Identifier of the appended entry.
        entry_id: Uuid,
        /// Entry kind.
        kind: EntryKind,
        /// Signed point delta.
        points_delta: i64,
        /// Idempotence / audit reference.
        reference: String,
        /// Balance after the append.
        new_points: i64,
        /// Append timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a consistency violation halts a member's writes.
    LedgerFrozen {
        /// Member identifier.
        member_id: MemberId,
        /// Why the ledger was frozen.
        reason: String,
        /// Freeze timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when an admin clears a freeze after review.
    LedgerUnfrozen {
        /// Member identifier.
        member_id: MemberId,
        /// Revalidated balance.
        points: i64,
        /// Unfreeze timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a new event opens for claims.
    EventOpened {
        /// Event identifier.
        event_id: EventId,
        /// Event name.
        name: String,
        /// Total slot units.
        capacity: u32,
        /// Slot units per claim.
        slot_cost: u32,
        /// Scheduled start time.
        start_at: DateTime<Utc>,
        /// Creation timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted on event lifecycle transitions.
    EventStatusChanged {
        /// Event identifier.
        event_id: EventId,
        /// State before the transition.
        from: EventStatus,
        /// State after the transition.
        to: EventStatus,
        /// Transition timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted after a successful slot claim.
    SlotClaimed {
        /// Claiming member.
        member_id: MemberId,
        /// Claimed event.
        event_id: EventId,
        /// Identifier of the created allocation.
        allocation_id: Uuid,
        /// Slot units reserved.
        slot_cost: u32,
        /// Capacity left after the claim.
        remaining_capacity: i64,
        /// Claim timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a hold is given back.
    SlotReleased {
        /// Releasing member.
        member_id: MemberId,
        /// Event released from.
        event_id: EventId,
        /// Identifier of the released allocation.
        allocation_id: Uuid,
        /// `true` when reconciliation or cancellation forced the release.
        forced: bool,
        /// Release timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a held slot is fulfilled and points are spent.
    SlotFulfilled {
        /// Member whose ticket was issued.
        member_id: MemberId,
        /// Fulfilled event.
        event_id: EventId,
        /// Identifier of the fulfilled allocation.
        allocation_id: Uuid,
        /// Points debited from the ledger.
        points_spent: i64,
        /// Fulfilment timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted after each decay sweep with its tallies.
    DecayCycleCompleted {
        /// Members examined.
        members_processed: usize,
        /// Penalty entries appended.
        penalties_applied: usize,
        /// Total points deducted.
        penalty_points: i64,
        /// Holds force-released by reconciliation.
        forced_releases: usize,
        /// Cycle completion timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted after the leaderboard is recomputed.
    LeaderboardRecomputed {
        /// Members meeting the minimum-points bar.
        qualifying_count: usize,
        /// Rank at or above which members are priority-eligible.
        priority_threshold: usize,
        /// Recomputation timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl LedgerEvent {
    /// The member this event concerns, if member-scoped.
    #[must_use]
    pub fn member_id(&self) -> Option<MemberId> {
        match self {
            Self::MemberRegistered { member_id, .. }
            | Self::MemberDeactivated { member_id, .. }
            | Self::EntryAppended { member_id, .. }
            | Self::LedgerFrozen { member_id, .. }
            | Self::LedgerUnfrozen { member_id, .. }
            | Self::SlotClaimed { member_id, .. }
            | Self::SlotReleased { member_id, .. }
            | Self::SlotFulfilled { member_id, .. } => Some(*member_id),
            Self::EventOpened { .. }
            | Self::EventStatusChanged { .. }
            | Self::DecayCycleCompleted { .. }
            | Self::LeaderboardRecomputed { .. } => None,
        }
    }

    /// The event this event concerns, if event-scoped.
    #[must_use]
    pub fn event_id(&self) -> Option<EventId> {
        match self {
            Self::EventOpened { event_id, .. }
            | Self::EventStatusChanged { event_id, .. }
            | Self::SlotClaimed { event_id, .. }
            | Self::SlotReleased { event_id, .. }
            | Self::SlotFulfilled { event_id, .. } => Some(*event_id),
            Self::MemberRegistered { .. }
            | Self::MemberDeactivated { .. }
            | Self::EntryAppended { .. }
            | Self::LedgerFrozen { .. }
            | Self::LedgerUnfrozen { .. }
            | Self::DecayCycleCompleted { .. }
            | Self::LeaderboardRecomputed { .. } => None,
        }
    }

    /// Globally broadcast events reach every subscriber regardless of
    /// filters.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.member_id().is_none() && self.event_id().is_none()
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::MemberRegistered { .. } => "member_registered",
            Self::MemberDeactivated { .. } => "member_deactivated",
            Self::EntryAppended { .. } => "entry_appended",
            Self::LedgerFrozen { .. } => "ledger_frozen",
            Self::LedgerUnfrozen { .. } => "ledger_unfrozen",
            Self::EventOpened { .. } => "event_opened",
            Self::EventStatusChanged { .. } => "event_status_changed",
            Self::SlotClaimed { .. } => "slot_claimed",
            Self::SlotReleased { .. } => "slot_released",
            Self::SlotFulfilled { .. } => "slot_fulfilled",
            Self::DecayCycleCompleted { .. } => "decay_cycle_completed",
            Self::LeaderboardRecomputed { .. } => "leaderboard_recomputed",
        }
    }
}
