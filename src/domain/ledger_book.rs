//! Concurrent member storage with per-member fine-grained locking.
//!
//! [`LedgerBook`] stores every registered member in a `HashMap` where each
//! entry is individually protected by a [`tokio::sync::RwLock`]. This
//! allows concurrent reads on the same member and concurrent writes on
//! different members, while appends for one member are serialized by that
//! member's write lock.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::MemberId;
use super::member::{MemberEntry, MemberSummary};
use crate::error::LedgerError;

/// Central store for all registered members and their ledgers.
///
/// Uses a `RwLock<HashMap<...>>` for the outer map and per-entry
/// `Arc<RwLock<MemberEntry>>` for fine-grained per-member locking.
/// Members are never removed; deactivation flips `Member::active` inside
/// the entry.
///
/// # Concurrency
///
/// - Multiple tasks may read the same member concurrently.
/// - Writes to different members are concurrent.
/// - Writes to the same member are serialized, which is what makes ledger
///   append validation race-free.
#[derive(Debug)]
pub struct LedgerBook {
    members: RwLock<HashMap<MemberId, Arc<RwLock<MemberEntry>>>>,
}

impl LedgerBook {
    /// Creates an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self {
            members: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts a newly registered member.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::MemberAlreadyRegistered`] if the member id
    /// is already present; concurrent registrations of the same identity
    /// race to this check.
    pub async fn insert(&self, entry: MemberEntry) -> Result<MemberId, LedgerError> {
        let member_id = entry.member.id;
        let mut map = self.members.write().await;
        if map.contains_key(&member_id) {
            return Err(LedgerError::MemberAlreadyRegistered(member_id));
        }
        map.insert(member_id, Arc::new(RwLock::new(entry)));
        Ok(member_id)
    }

    /// Returns a shared handle to the member entry behind its lock.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::MemberNotFound`] if no member with the given
    /// id exists.
    pub async fn get(&self, member_id: MemberId) -> Result<Arc<RwLock<MemberEntry>>, LedgerError> {
        let map = self.members.read().await;
        map.get(&member_id)
            .cloned()
            .ok_or(LedgerError::MemberNotFound(member_id))
    }

    /// Snapshot of all member ids.
    ///
    /// Batch jobs (ranking, decay) iterate this snapshot and lock each
    /// member individually rather than holding the outer lock across the
    /// whole sweep.
    pub async fn member_ids(&self) -> Vec<MemberId> {
        self.members.read().await.keys().copied().collect()
    }

    /// Returns summaries of all members, optionally only active ones.
    ///
    /// A member whose fold fails is still listed, with a zeroed balance;
    /// the failed fold freezes the ledger, so the summary carries
    /// `frozen: true` for review.
    pub async fn list(&self, active_only: bool, points_per_slot: i64) -> Vec<MemberSummary> {
        let handles: Vec<Arc<RwLock<MemberEntry>>> = {
            let map = self.members.read().await;
            map.values().cloned().collect()
        };
        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            let mut entry = handle.write().await;
            if active_only && !entry.member.active {
                continue;
            }
            match entry.summary(points_per_slot) {
                Ok(summary) => summaries.push(summary),
                Err(_) => summaries.push(MemberSummary {
                    id: entry.member.id,
                    display_name: entry.member.display_name.clone(),
                    active: entry.member.active,
                    points: 0,
                    slots: 0,
                    held_slots: entry.held_slots(),
                    frozen: true,
                    entry_count: entry.ledger.len(),
                    last_contribution_at: entry.ledger.last_contribution_at(),
                    joined_at: entry.member.joined_at,
                }),
            }
        }
        summaries.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
        summaries
    }

    /// Returns the number of registered members.
    pub async fn len(&self) -> usize {
        self.members.read().await.len()
    }

    /// Returns `true` if no member is registered.
    pub async fn is_empty(&self) -> bool {
        self.members.read().await.is_empty()
    }
}

impl Default for LedgerBook {
    fn default() -> Self {
        Self::new()
    }
}
