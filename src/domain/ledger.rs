//! Per-member append-only ledger with idempotence and fold projection.
//!
//! [`MemberLedger`] is the single writer surface for point-affecting state:
//! every credit and debit becomes an immutable [`LedgerEntry`] here, and the
//! balance is always the fold over those entries. The struct lives inside a
//! per-member lock in [`super::LedgerBook`], which is what serializes
//! concurrent appends for one member.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::{EntryKind, LedgerEntry, MemberId};
use crate::error::LedgerError;

/// Append-only entry log for one member.
///
/// Holds the `(kind, reference)` uniqueness index that makes contribution
/// webhooks and decay cycles replay-safe, a cached fold result invalidated
/// on every append, and the freeze flag that halts writes after a detected
/// consistency violation.
#[derive(Debug, Default)]
pub struct MemberLedger {
    entries: Vec<LedgerEntry>,
    unique_refs: HashSet<(EntryKind, String)>,
    cached_points: Option<i64>,
    frozen: Option<String>,
}

impl MemberLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries in append order.
    #[must_use]
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Number of entries appended so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entry has been appended yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Why this ledger is frozen, if it is.
    #[must_use]
    pub fn frozen_reason(&self) -> Option<&str> {
        self.frozen.as_deref()
    }

    /// Halts further non-corrective writes pending manual review.
    pub fn freeze(&mut self, reason: String) {
        self.frozen = Some(reason);
    }

    /// Whether an entry with this `(kind, reference)` already exists.
    ///
    /// Only tracked for kinds where [`EntryKind::requires_unique_reference`]
    /// holds.
    #[must_use]
    pub fn has_reference(&self, kind: EntryKind, reference: &str) -> bool {
        self.unique_refs
            .contains(&(kind, reference.to_string()))
    }

    /// Runs every append-time check without mutating the entry log.
    ///
    /// On a frozen ledger only corrective kinds are accepted, and the
    /// balance-sufficiency check is skipped for them: a repair may step
    /// through intermediate totals that a healthy ledger would reject, and
    /// [`MemberLedger::unfreeze`] revalidates the end state. The caller
    /// must hold this member's write lock so that validation and the
    /// subsequent [`MemberLedger::apply`] are atomic with respect to other
    /// appends; the write path persists the entry between the two.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::LedgerFrozen`] when the ledger is halted and the
    ///   kind is not corrective.
    /// - [`LedgerError::InvalidRequest`] on a delta whose sign is wrong for
    ///   the kind.
    /// - [`LedgerError::DuplicateReference`] when a uniqueness-requiring
    ///   `(kind, reference)` already exists.
    /// - [`LedgerError::InsufficientBalance`] when the append would fold to
    ///   a negative balance.
    /// - [`LedgerError::Consistency`] when the existing history already
    ///   folds negative (corrupted store).
    pub fn validate(&mut self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        if !entry.kind.is_corrective()
            && let Some(reason) = &self.frozen
        {
            return Err(LedgerError::LedgerFrozen {
                member_id: entry.member_id,
                reason: reason.clone(),
            });
        }
        if !entry.kind.delta_sign_valid(entry.points_delta) {
            return Err(LedgerError::InvalidRequest(format!(
                "{} entries cannot carry a delta of {}",
                entry.kind, entry.points_delta
            )));
        }
        if entry.kind.requires_unique_reference()
            && self.has_reference(entry.kind, &entry.reference)
        {
            return Err(LedgerError::DuplicateReference {
                kind: entry.kind,
                reference: entry.reference.clone(),
            });
        }
        if self.frozen.is_none() {
            let current = self.points(entry.member_id)?;
            if current + entry.points_delta < 0 {
                return Err(LedgerError::InsufficientBalance {
                    needed: -entry.points_delta,
                    available: current,
                });
            }
        }
        Ok(())
    }

    /// Pushes an already-validated entry, invalidating the cached balance.
    ///
    /// Also the startup-restore path: restored entries were validated when
    /// first appended, and the fold guard in [`MemberLedger::points`]
    /// still catches a corrupted history.
    pub fn apply(&mut self, entry: LedgerEntry) {
        if entry.kind.requires_unique_reference() {
            self.unique_refs
                .insert((entry.kind, entry.reference.clone()));
        }
        self.entries.push(entry);
        self.cached_points = None;
    }

    /// Validates and appends in one step.
    ///
    /// # Errors
    ///
    /// Same as [`MemberLedger::validate`].
    pub fn append(&mut self, entry: LedgerEntry) -> Result<(), LedgerError> {
        self.validate(&entry)?;
        self.apply(entry);
        Ok(())
    }

    /// Folds the ledger into a points total, serving the cache when warm.
    ///
    /// Every writer validates before appending, so a negative total means
    /// the history itself is corrupt. It is reported and the ledger frozen,
    /// never clamped to zero.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Consistency`] when the fold is negative; the ledger
    /// is frozen as a side effect.
    pub fn points(&mut self, member_id: MemberId) -> Result<i64, LedgerError> {
        if let Some(points) = self.cached_points {
            return Ok(points);
        }
        let total: i64 = self.entries.iter().map(|e| e.points_delta).sum();
        if total < 0 {
            let details = format!(
                "ledger folds to {total} points across {} entries",
                self.entries.len()
            );
            self.frozen = Some(details.clone());
            return Err(LedgerError::Consistency {
                member_id: Some(member_id),
                details,
            });
        }
        self.cached_points = Some(total);
        Ok(total)
    }

    /// Folds the ledger without the corruption guard.
    ///
    /// Used where the total is needed even mid-repair, when the guarded
    /// fold would refuse (event payloads, replay responses).
    #[must_use]
    pub fn raw_points(&self) -> i64 {
        self.entries.iter().map(|e| e.points_delta).sum()
    }

    /// Clears the freeze if the history folds clean again.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Consistency`] when the fold is still negative; the
    /// freeze stays in place.
    pub fn unfreeze(&mut self, member_id: MemberId) -> Result<i64, LedgerError> {
        self.frozen = None;
        self.cached_points = None;
        self.points(member_id)
    }

    /// Timestamp of the member's most recent contribution, if any.
    #[must_use]
    pub fn last_contribution_at(&self) -> Option<DateTime<Utc>> {
        self.entries
            .iter()
            .filter(|e| e.kind == EntryKind::Contribution)
            .map(|e| e.created_at)
            .max()
    }

    /// Timestamp at which the running total first reached `min_points`.
    ///
    /// This is the leaderboard tie-break: among equal point totals, the
    /// member who qualified earliest ranks first.
    #[must_use]
    pub fn qualified_at(&self, min_points: i64) -> Option<DateTime<Utc>> {
        let mut running: i64 = 0;
        for entry in &self.entries {
            running += entry.points_delta;
            if running >= min_points {
                return Some(entry.created_at);
            }
        }
        None
    }
}
