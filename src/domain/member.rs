//! Member aggregate combining the profile with ledger and hold state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::{EventId, MemberId, MemberLedger};
use crate::error::LedgerError;

/// Member profile as registered at signup.
///
/// Cumulative point state is never stored here; it is always derived from
/// the ledger fold. Members are soft-deactivated, never deleted.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Member {
    /// Unique member identifier (immutable after registration).
    pub id: MemberId,

    /// Display name shown on leaderboards.
    pub display_name: String,

    /// Monthly contribution target in currency units.
    pub monthly_target: i64,

    /// Referral code of the member who introduced this one, if any.
    pub referral_code: Option<String>,

    /// Soft-deactivation flag. Inactive members keep their ledger but are
    /// excluded from claims, ranking, and decay.
    pub active: bool,

    /// ISO-8601 registration timestamp (immutable after registration).
    pub joined_at: DateTime<Utc>,
}

impl Member {
    /// Creates an active member registered now.
    #[must_use]
    pub fn new(id: MemberId, display_name: String, monthly_target: i64, referral_code: Option<String>) -> Self {
        Self {
            id,
            display_name,
            monthly_target,
            referral_code,
            active: true,
            joined_at: Utc::now(),
        }
    }
}

/// Aggregate stored per member in the [`super::LedgerBook`].
///
/// The `held` index mirrors the member's active allocations so that
/// slot-sufficiency checks during a claim never need to visit other
/// events' locks. The allocation coordinator keeps it in step with the
/// event-side allocation lists.
#[derive(Debug)]
pub struct MemberEntry {
    /// The registered profile.
    pub member: Member,

    /// Append-only point history; the single source of balance truth.
    pub ledger: MemberLedger,

    /// Slot units reserved per event with an active hold.
    held: HashMap<EventId, u32>,
}

impl MemberEntry {
    /// Wraps a freshly registered member with an empty ledger.
    #[must_use]
    pub fn new(member: Member) -> Self {
        Self {
            member,
            ledger: MemberLedger::new(),
            held: HashMap::new(),
        }
    }

    /// Total slot units reserved by active holds across all events.
    #[must_use]
    pub fn held_slots(&self) -> u32 {
        self.held.values().sum()
    }

    /// Whether this member holds a slot on the given event.
    #[must_use]
    pub fn has_hold(&self, event_id: EventId) -> bool {
        self.held.contains_key(&event_id)
    }

    /// Records a hold after a successful claim.
    pub fn add_hold(&mut self, event_id: EventId, slot_cost: u32) {
        self.held.insert(event_id, slot_cost);
    }

    /// Drops a hold on release or fulfilment, returning the reserved cost.
    pub fn remove_hold(&mut self, event_id: EventId) -> Option<u32> {
        self.held.remove(&event_id)
    }

    /// Event ids with an active hold, most useful for reconciliation.
    #[must_use]
    pub fn held_event_ids(&self) -> Vec<EventId> {
        self.held.keys().copied().collect()
    }

    /// Slots not reserved by holds, available for further claims.
    ///
    /// Can be transiently negative after decay shrinks a balance below the
    /// already-held cost; reconciliation force-releases holds until it is
    /// non-negative again.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Consistency`] when the ledger fold is negative.
    pub fn available_slots(&mut self, points_per_slot: i64) -> Result<i64, LedgerError> {
        let points = self.ledger.points(self.member.id)?;
        let balance = super::Balance::from_points(self.member.id, points, points_per_slot);
        Ok(i64::from(balance.slots) - i64::from(self.held_slots()))
    }

    /// Projects the profile plus derived balance into a summary.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Consistency`] when the ledger fold is negative.
    pub fn summary(&mut self, points_per_slot: i64) -> Result<MemberSummary, LedgerError> {
        let points = self.ledger.points(self.member.id)?;
        let balance = super::Balance::from_points(self.member.id, points, points_per_slot);
        Ok(MemberSummary {
            id: self.member.id,
            display_name: self.member.display_name.clone(),
            active: self.member.active,
            points: balance.points,
            slots: balance.slots,
            held_slots: self.held_slots(),
            frozen: self.ledger.frozen_reason().is_some(),
            entry_count: self.ledger.len(),
            last_contribution_at: self.ledger.last_contribution_at(),
            joined_at: self.member.joined_at,
        })
    }
}

/// Lightweight summary of a member for list endpoints.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MemberSummary {
    /// Member identifier.
    pub id: MemberId,
    /// Display name.
    pub display_name: String,
    /// Whether the member is active.
    pub active: bool,
    /// Current point balance (ledger fold).
    pub points: i64,
    /// Whole slots covered by the balance.
    pub slots: u32,
    /// Slot units reserved by active holds.
    pub held_slots: u32,
    /// Whether the ledger is frozen pending review.
    pub frozen: bool,
    /// Number of ledger entries.
    pub entry_count: usize,
    /// Most recent contribution timestamp.
    pub last_contribution_at: Option<DateTime<Utc>>,
    /// Registration timestamp.
    pub joined_at: DateTime<Utc>,
}
