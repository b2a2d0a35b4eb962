//! Immutable ledger entries and their kinds.
//!
//! A [`LedgerEntry`] is the only thing that can change a member's points:
//! balances are always a fold over entries, never a settable field.
//! Entries are append-only — corrections are new offsetting entries, not
//! mutations.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::MemberId;

/// Kind discriminator for a ledger entry.
///
/// The kind constrains the sign of `points_delta` and decides whether the
/// `(kind, reference)` pair must be unique per member — the property that
/// makes webhook redelivery and decay-cycle retries safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Confirmed monthly contribution: positive, unique per payment reference.
    Contribution,
    /// Points spent when a held slot is fulfilled into a ticket: negative.
    AllocationSpend,
    /// Administrative reversal of a spend: positive.
    AllocationRefund,
    /// Inactivity penalty: negative, unique per penalty day.
    DecayPenalty,
    /// Administrative correction: any non-zero delta.
    ManualAdjustment,
}

impl EntryKind {
    /// Returns the kind as a static string slice (storage discriminator).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Contribution => "contribution",
            Self::AllocationSpend => "allocation_spend",
            Self::AllocationRefund => "allocation_refund",
            Self::DecayPenalty => "decay_penalty",
            Self::ManualAdjustment => "manual_adjustment",
        }
    }

    /// Parses a storage discriminator back into a kind.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "contribution" => Some(Self::Contribution),
            "allocation_spend" => Some(Self::AllocationSpend),
            "allocation_refund" => Some(Self::AllocationRefund),
            "decay_penalty" => Some(Self::DecayPenalty),
            "manual_adjustment" => Some(Self::ManualAdjustment),
            _ => None,
        }
    }

    /// Whether `(kind, reference)` must be unique within a member's ledger.
    ///
    /// True for contributions (one credit per payment confirmation) and
    /// decay penalties (one penalty per member per day). Administrative
    /// kinds may legitimately reuse a reference.
    #[must_use]
    pub const fn requires_unique_reference(&self) -> bool {
        matches!(self, Self::Contribution | Self::DecayPenalty)
    }

    /// Whether this kind may be appended while the member's ledger is
    /// frozen pending review (only administrative corrections may).
    #[must_use]
    pub const fn is_corrective(&self) -> bool {
        matches!(self, Self::ManualAdjustment | Self::AllocationRefund)
    }

    /// Validates the sign of a delta for this kind.
    #[must_use]
    pub const fn delta_sign_valid(&self, points_delta: i64) -> bool {
        match self {
            Self::Contribution | Self::AllocationRefund => points_delta > 0,
            Self::AllocationSpend | Self::DecayPenalty => points_delta < 0,
            Self::ManualAdjustment => points_delta != 0,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable, append-only record of a point-affecting fact.
///
/// Never mutated or deleted after being appended; the sum of `points_delta`
/// over a member's entries at any timestamp is that member's balance at
/// that time.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LedgerEntry {
    /// Entry identifier, generated once at append time. Durable-store
    /// retries reuse it, making the insert idempotent.
    pub id: uuid::Uuid,
    /// Member whose balance this entry affects.
    pub member_id: MemberId,
    /// What kind of fact this entry records.
    pub kind: EntryKind,
    /// Signed points change.
    pub points_delta: i64,
    /// External correlation id: payment reference, event id, penalty day,
    /// or admin note.
    pub reference: String,
    /// Append timestamp (server clock).
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Creates a new entry stamped with the current time.
    #[must_use]
    pub fn new(member_id: MemberId, kind: EntryKind, points_delta: i64, reference: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            member_id,
            kind,
            points_delta,
            reference,
            created_at: Utc::now(),
        }
    }
}
