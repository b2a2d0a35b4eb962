//! Database row models for the ledger tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A member row from the `members` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRow {
    /// Member identifier (primary key).
    pub id: Uuid,
    /// Display name.
    pub display_name: String,
    /// Monthly contribution target in currency units.
    pub monthly_target: i64,
    /// Optional referral code.
    pub referral_code: Option<String>,
    /// Soft-deactivation flag.
    pub active: bool,
    /// Registration timestamp.
    pub joined_at: DateTime<Utc>,
}

/// A ledger entry row from the `ledger_entries` table.
///
/// `seq` is the global append order assigned by the store; restore replays
/// entries in `seq` order so per-member history matches the original
/// append order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryRow {
    /// Entry identifier (primary key, stable across write retries).
    pub id: Uuid,
    /// Global append sequence.
    pub seq: i64,
    /// Owning member.
    pub member_id: Uuid,
    /// Entry kind discriminator (e.g. `"contribution"`).
    pub kind: String,
    /// Signed point delta.
    pub points_delta: i64,
    /// Idempotence / audit reference.
    pub reference: String,
    /// Append timestamp.
    pub created_at: DateTime<Utc>,
}

/// A club event row from the `club_events` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRow {
    /// Event identifier (primary key).
    pub id: Uuid,
    /// Event name.
    pub name: String,
    /// Scheduled start time.
    pub start_at: DateTime<Utc>,
    /// Total slot units.
    pub capacity: i32,
    /// Slot units per claim.
    pub slot_cost: i32,
    /// Lifecycle status discriminator (e.g. `"open"`).
    pub status: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// An allocation row from the `allocations` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRow {
    /// Allocation identifier (primary key).
    pub id: Uuid,
    /// Claiming member.
    pub member_id: Uuid,
    /// Claimed event.
    pub event_id: Uuid,
    /// Slot units reserved.
    pub slot_cost: i32,
    /// Status discriminator (e.g. `"held"`).
    pub status: String,
    /// Claim timestamp.
    pub created_at: DateTime<Utc>,
    /// Last status transition timestamp.
    pub updated_at: DateTime<Utc>,
}

/// A stored domain event row from the `domain_events` audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Auto-increment row ID.
    pub id: i64,
    /// Event type discriminator (e.g. `"slot_claimed"`).
    pub event_type: String,
    /// Member the event concerns, when member-scoped.
    pub member_id: Option<Uuid>,
    /// Event the event concerns, when event-scoped.
    pub event_id: Option<Uuid>,
    /// JSONB payload with event-specific data.
    pub payload: serde_json::Value,
    /// Server-side creation timestamp.
    pub created_at: DateTime<Utc>,
}
