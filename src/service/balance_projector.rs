//! Read-side projections over the ledger book.
//!
//! Balances and statements are always derived by folding entries; nothing
//! here writes to a ledger. The projector also produces the standing rows
//! the ranking engine sorts into a leaderboard.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::PointsPolicy;
use crate::domain::{Balance, EventBus, LedgerBook, LedgerEntry, MemberId};
use crate::error::LedgerError;
use crate::service::report_fold_failure;

/// One active member's standing, as fed into leaderboard computation.
#[derive(Debug, Clone)]
pub struct MemberStanding {
    /// Member this row describes.
    pub member_id: MemberId,
    /// Display name carried through to the leaderboard.
    pub display_name: String,
    /// Folded points total at snapshot time.
    pub points: i64,
    /// When the running total first reached the qualification threshold.
    pub qualified_at: Option<DateTime<Utc>>,
}

/// Derives balances, statements and ranking snapshots from the book.
#[derive(Debug, Clone)]
pub struct BalanceProjector {
    book: Arc<LedgerBook>,
    event_bus: EventBus,
    points: PointsPolicy,
}

impl BalanceProjector {
    /// Creates a new `BalanceProjector`.
    #[must_use]
    pub fn new(book: Arc<LedgerBook>, event_bus: EventBus, points: PointsPolicy) -> Self {
        Self {
            book,
            event_bus,
            points,
        }
    }

    /// Folds a member's ledger into a point balance and slot count.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::MemberNotFound`] if the id is unknown.
    /// - [`LedgerError::Consistency`] when the fold is negative; the
    ///   ledger is frozen as a side effect.
    pub async fn balance_of(&self, member_id: MemberId) -> Result<Balance, LedgerError> {
        let handle = self.book.get(member_id).await?;
        let mut entry = handle.write().await;
        let was_frozen = entry.ledger.frozen_reason().is_some();
        let points = entry.ledger.points(member_id).map_err(|err| {
            report_fold_failure(&self.event_bus, member_id, was_frozen, &err);
            err
        })?;
        Ok(Balance::from_points(
            member_id,
            points,
            self.points.points_per_slot,
        ))
    }

    /// A page of a member's ledger statement in append order, plus the
    /// total entry count.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::MemberNotFound`] if the id is unknown.
    pub async fn ledger_entries(
        &self,
        member_id: MemberId,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<LedgerEntry>, usize), LedgerError> {
        let handle = self.book.get(member_id).await?;
        let entry = handle.read().await;
        let total = entry.ledger.len();
        let page: Vec<LedgerEntry> = entry
            .ledger
            .entries()
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok((page, total))
    }

    /// Standings of every active member at or above `min_points`.
    ///
    /// Members whose ledger fails to fold are frozen, reported, and left
    /// out of the snapshot; deactivated members are skipped outright.
    pub async fn standings(&self, min_points: i64) -> Vec<MemberStanding> {
        let member_ids = self.book.member_ids().await;
        let mut rows = Vec::with_capacity(member_ids.len());
        for member_id in member_ids {
            let Ok(handle) = self.book.get(member_id).await else {
                continue;
            };
            let mut entry = handle.write().await;
            if !entry.member.active {
                continue;
            }
            let was_frozen = entry.ledger.frozen_reason().is_some();
            let points = match entry.ledger.points(member_id) {
                Ok(points) => points,
                Err(err) => {
                    report_fold_failure(&self.event_bus, member_id, was_frozen, &err);
                    continue;
                }
            };
            if points < min_points {
                continue;
            }
            rows.push(MemberStanding {
                member_id,
                display_name: entry.member.display_name.clone(),
                points,
                qualified_at: entry.ledger.qualified_at(min_points),
            });
        }
        rows
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{EntryKind, Member, MemberEntry};

    async fn seed_member(book: &LedgerBook, name: &str, deltas: &[i64]) -> MemberId {
        let member_id = MemberId::new();
        let member = Member::new(member_id, name.to_string(), 1000, None);
        let inserted = book.insert(MemberEntry::new(member)).await;
        assert!(inserted.is_ok());
        let Ok(handle) = book.get(member_id).await else {
            panic!("member just inserted");
        };
        let mut entry = handle.write().await;
        for (i, delta) in deltas.iter().enumerate() {
            entry.ledger.apply(LedgerEntry::new(
                member_id,
                if *delta >= 0 {
                    EntryKind::Contribution
                } else {
                    EntryKind::ManualAdjustment
                },
                *delta,
                format!("{name}-{i}"),
            ));
        }
        member_id
    }

    fn make_projector(book: Arc<LedgerBook>) -> BalanceProjector {
        BalanceProjector::new(book, EventBus::new(100), PointsPolicy::default())
    }

    #[tokio::test]
    async fn balance_folds_entries() {
        let book = Arc::new(LedgerBook::new());
        let member_id = seed_member(&book, "thabo", &[500, 600, -95]).await;
        let projector = make_projector(Arc::clone(&book));

        let balance = projector.balance_of(member_id).await;
        let Ok(balance) = balance else {
            panic!("balance should fold");
        };
        assert_eq!(balance.points, 1005);
        assert_eq!(balance.slots, 2);
    }

    #[tokio::test]
    async fn statement_pages_in_append_order() {
        let book = Arc::new(LedgerBook::new());
        let member_id = seed_member(&book, "zola", &[100, 200, 300, 400]).await;
        let projector = make_projector(Arc::clone(&book));

        let page = projector.ledger_entries(member_id, 1, 2).await;
        let Ok((entries, total)) = page else {
            panic!("paging should succeed");
        };
        assert_eq!(total, 4);
        assert_eq!(
            entries.iter().map(|e| e.points_delta).collect::<Vec<_>>(),
            vec![200, 300]
        );
    }

    #[tokio::test]
    async fn standings_filter_threshold_and_inactive() {
        let book = Arc::new(LedgerBook::new());
        let qualified = seed_member(&book, "ayanda", &[750]).await;
        let below = seed_member(&book, "busi", &[499]).await;
        let inactive = seed_member(&book, "cebo", &[900]).await;
        let Ok(handle) = book.get(inactive).await else {
            panic!("member exists");
        };
        handle.write().await.member.active = false;

        let projector = make_projector(Arc::clone(&book));
        let rows = projector.standings(500).await;
        assert_eq!(rows.len(), 1);
        let Some(row) = rows.first() else {
            panic!("one standing expected");
        };
        assert_eq!(row.member_id, qualified);
        assert_eq!(row.points, 750);
        assert!(row.qualified_at.is_some());
        assert!(!rows.iter().any(|r| r.member_id == below));
    }

    #[tokio::test]
    async fn standings_exclude_corrupt_ledgers() {
        let book = Arc::new(LedgerBook::new());
        let broken = seed_member(&book, "dumi", &[-40]).await;
        let healthy = seed_member(&book, "esihle", &[600]).await;

        let projector = make_projector(Arc::clone(&book));
        let rows = projector.standings(500).await;
        assert_eq!(rows.len(), 1);
        assert!(rows.iter().all(|r| r.member_id != broken));
        assert!(rows.iter().any(|r| r.member_id == healthy));

        // The broken ledger is now frozen for review.
        let Ok(handle) = book.get(broken).await else {
            panic!("member exists");
        };
        assert!(handle.read().await.ledger.frozen_reason().is_some());
    }
}
