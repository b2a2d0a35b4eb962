//! Ledger service: member lifecycle and the single entry-append path.
//!
//! Every point-affecting write in the system funnels through
//! [`LedgerService::append_entry`]: validate under the member lock, persist
//! to the store, apply to memory, publish. Contribution ingestion and admin
//! adjustments are thin wrappers over that path.

use std::sync::Arc;

use chrono::Utc;

use crate::config::PointsPolicy;
use crate::domain::{
    EntryKind, EventBus, LedgerBook, LedgerEntry, LedgerEvent, Member, MemberEntry, MemberId,
    MemberSummary,
};
use crate::error::LedgerError;
use crate::persistence::PostgresStore;
use crate::service::report_fold_failure;

/// What a single decay-penalty attempt did.
///
/// Skips are outcomes rather than errors so the scheduler can tally them:
/// a replayed day is counted as skipped, while a drained balance stops
/// the member's day loop early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PenaltyOutcome {
    /// A penalty entry was appended, deducting this many points.
    Applied(i64),
    /// This member and day already carry a penalty entry.
    AlreadyPenalised,
    /// The balance is zero; decay never drives it negative.
    ZeroBalance,
}

/// Result of a contribution ingestion call.
///
/// Webhook redelivery is expected, so a replayed reference is an outcome,
/// not an error: the original entry comes back with `already_recorded`
/// set and no second credit happens.
#[derive(Debug, Clone)]
pub struct ContributionOutcome {
    /// The entry recorded for this reference (the original one on replay).
    pub entry: LedgerEntry,
    /// Balance after ingestion.
    pub new_points: i64,
    /// `true` when the reference had already been credited.
    pub already_recorded: bool,
}

/// Orchestration layer for member lifecycle and ledger writes.
///
/// Stateless coordinator: owns references to the [`LedgerBook`] for state,
/// the optional [`PostgresStore`] for durability, and the [`EventBus`] for
/// event emission. Every mutation follows the pattern: acquire the member
/// lock → validate → persist → apply → publish.
#[derive(Debug, Clone)]
pub struct LedgerService {
    book: Arc<LedgerBook>,
    store: Option<Arc<PostgresStore>>,
    event_bus: EventBus,
    points: PointsPolicy,
}

impl LedgerService {
    /// Creates a new `LedgerService`.
    #[must_use]
    pub fn new(
        book: Arc<LedgerBook>,
        store: Option<Arc<PostgresStore>>,
        event_bus: EventBus,
        points: PointsPolicy,
    ) -> Self {
        Self {
            book,
            store,
            event_bus,
            points,
        }
    }

    /// Returns a reference to the inner [`EventBus`].
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Returns a reference to the inner [`LedgerBook`].
    #[must_use]
    pub fn book(&self) -> &Arc<LedgerBook> {
        &self.book
    }

    /// Registers the calling identity with a profile.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidRequest`] on an empty display name or a
    ///   negative monthly target.
    /// - [`LedgerError::MemberAlreadyRegistered`] when the id already has
    ///   a ledger.
    /// - [`LedgerError::StoreUnavailable`] when persistence gives up.
    pub async fn register_member(
        &self,
        member_id: MemberId,
        display_name: &str,
        monthly_target: i64,
        referral_code: Option<String>,
    ) -> Result<Member, LedgerError> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(LedgerError::InvalidRequest(
                "display_name must not be empty".to_string(),
            ));
        }
        if monthly_target < 0 {
            return Err(LedgerError::InvalidRequest(
                "monthly_target must not be negative".to_string(),
            ));
        }
        if self.book.get(member_id).await.is_ok() {
            return Err(LedgerError::MemberAlreadyRegistered(member_id));
        }

        let member = Member::new(
            member_id,
            display_name.to_string(),
            monthly_target,
            referral_code,
        );
        if let Some(store) = &self.store {
            store.insert_member(&member).await?;
        }
        self.book.insert(MemberEntry::new(member.clone())).await?;

        let _ = self.event_bus.publish(LedgerEvent::MemberRegistered {
            member_id,
            display_name: member.display_name.clone(),
            timestamp: Utc::now(),
        });

        tracing::info!(%member_id, display_name = %member.display_name, "member registered");
        Ok(member)
    }

    /// Returns a member's profile.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::MemberNotFound`] if the id is unknown.
    pub async fn get_member(&self, member_id: MemberId) -> Result<Member, LedgerError> {
        let handle = self.book.get(member_id).await?;
        let entry = handle.read().await;
        Ok(entry.member.clone())
    }

    /// Projects a member's profile plus derived balance.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::MemberNotFound`] if the id is unknown.
    /// - [`LedgerError::Consistency`] when the ledger fold is negative.
    pub async fn member_summary(&self, member_id: MemberId) -> Result<MemberSummary, LedgerError> {
        let handle = self.book.get(member_id).await?;
        let mut entry = handle.write().await;
        let was_frozen = entry.ledger.frozen_reason().is_some();
        entry.summary(self.points.points_per_slot).map_err(|err| {
            report_fold_failure(&self.event_bus, member_id, was_frozen, &err);
            err
        })
    }

    /// Summaries of all members, optionally only active ones.
    pub async fn list_members(&self, active_only: bool) -> Vec<MemberSummary> {
        self.book
            .list(active_only, self.points.points_per_slot)
            .await
    }

    /// Updates the mutable parts of a member's profile.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::MemberNotFound`] if the id is unknown.
    /// - [`LedgerError::InvalidRequest`] on an empty name or negative
    ///   target.
    pub async fn update_profile(
        &self,
        member_id: MemberId,
        display_name: Option<String>,
        monthly_target: Option<i64>,
    ) -> Result<Member, LedgerError> {
        if let Some(name) = &display_name
            && name.trim().is_empty()
        {
            return Err(LedgerError::InvalidRequest(
                "display_name must not be empty".to_string(),
            ));
        }
        if let Some(target) = monthly_target
            && target < 0
        {
            return Err(LedgerError::InvalidRequest(
                "monthly_target must not be negative".to_string(),
            ));
        }

        let handle = self.book.get(member_id).await?;
        let mut entry = handle.write().await;
        let mut updated = entry.member.clone();
        if let Some(name) = display_name {
            updated.display_name = name.trim().to_string();
        }
        if let Some(target) = monthly_target {
            updated.monthly_target = target;
        }
        if let Some(store) = &self.store {
            store.update_member_profile(&updated).await?;
        }
        entry.member = updated.clone();
        Ok(updated)
    }

    /// Soft-deactivates a member. Idempotent; the ledger is retained.
    ///
    /// The caller is responsible for releasing the member's holds through
    /// the allocation coordinator.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::MemberNotFound`] if the id is unknown.
    /// - [`LedgerError::StoreUnavailable`] when persistence gives up.
    pub async fn deactivate_member(&self, member_id: MemberId) -> Result<(), LedgerError> {
        let handle = self.book.get(member_id).await?;
        let mut entry = handle.write().await;
        if !entry.member.active {
            return Ok(());
        }
        if let Some(store) = &self.store {
            store.update_member_active(*member_id.as_uuid(), false).await?;
        }
        entry.member.active = false;
        drop(entry);

        let _ = self.event_bus.publish(LedgerEvent::MemberDeactivated {
            member_id,
            timestamp: Utc::now(),
        });

        tracing::info!(%member_id, "member deactivated");
        Ok(())
    }

    /// Ingests a confirmed contribution, converting currency to points.
    ///
    /// Replaying the same payment reference yields the original entry with
    /// `already_recorded` set instead of a second credit.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::MemberNotFound`] if the id is unknown.
    /// - [`LedgerError::InvalidRequest`] on a non-positive amount or empty
    ///   reference.
    /// - [`LedgerError::LedgerFrozen`] while the member is under review.
    /// - [`LedgerError::StoreUnavailable`] when persistence gives up.
    pub async fn record_contribution(
        &self,
        member_id: MemberId,
        amount: i64,
        reference: &str,
    ) -> Result<ContributionOutcome, LedgerError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(LedgerError::InvalidRequest(
                "reference must not be empty".to_string(),
            ));
        }
        if amount <= 0 {
            return Err(LedgerError::InvalidRequest(
                "amount must be positive".to_string(),
            ));
        }
        let points = amount
            .checked_mul(self.points.points_per_currency_unit)
            .ok_or_else(|| LedgerError::InvalidRequest("amount out of range".to_string()))?;

        let entry = LedgerEntry::new(
            member_id,
            EntryKind::Contribution,
            points,
            reference.to_string(),
        );
        let recorded = entry.clone();
        match self.append_entry(entry).await {
            Ok(new_points) => Ok(ContributionOutcome {
                entry: recorded,
                new_points,
                already_recorded: false,
            }),
            Err(LedgerError::DuplicateReference { .. }) => {
                let handle = self.book.get(member_id).await?;
                let member = handle.read().await;
                let original = member
                    .ledger
                    .entries()
                    .iter()
                    .find(|e| e.kind == EntryKind::Contribution && e.reference == reference)
                    .cloned()
                    .ok_or_else(|| {
                        LedgerError::Internal(
                            "duplicate reference without a matching entry".to_string(),
                        )
                    })?;
                let new_points = member.ledger.raw_points();
                tracing::info!(%member_id, reference, "contribution replay ignored");
                Ok(ContributionOutcome {
                    entry: original,
                    new_points,
                    already_recorded: true,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Appends an administrative correction (`manual_adjustment` or
    /// `allocation_refund`). These are the only kinds accepted by a frozen
    /// ledger, so this is also the repair path after a consistency halt.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::MemberNotFound`] if the id is unknown.
    /// - [`LedgerError::InvalidRequest`] on a non-corrective kind, an
    ///   invalid delta sign, or an empty reference.
    /// - [`LedgerError::InsufficientBalance`] when a negative delta would
    ///   overdraw a healthy ledger.
    /// - [`LedgerError::StoreUnavailable`] when persistence gives up.
    pub async fn append_correction(
        &self,
        member_id: MemberId,
        kind: EntryKind,
        points_delta: i64,
        reference: &str,
    ) -> Result<(LedgerEntry, i64), LedgerError> {
        if !kind.is_corrective() {
            return Err(LedgerError::InvalidRequest(format!(
                "kind {kind} is not an administrative correction"
            )));
        }
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(LedgerError::InvalidRequest(
                "reference must not be empty".to_string(),
            ));
        }
        let entry = LedgerEntry::new(member_id, kind, points_delta, reference.to_string());
        let recorded = entry.clone();
        let new_points = self.append_entry(entry).await?;
        tracing::info!(%member_id, %kind, points_delta, reference, "correction applied");
        Ok((recorded, new_points))
    }

    /// Applies one day's decay penalty, capped at the remaining balance.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::MemberNotFound`] if the id is unknown.
    /// - [`LedgerError::LedgerFrozen`] while the member is under review.
    /// - [`LedgerError::Consistency`] when the ledger fold is negative.
    /// - [`LedgerError::StoreUnavailable`] when persistence gives up.
    pub async fn record_decay_penalty(
        &self,
        member_id: MemberId,
        day: chrono::NaiveDate,
        penalty_points: i64,
    ) -> Result<PenaltyOutcome, LedgerError> {
        let reference = format!("decay:{day}");
        let handle = self.book.get(member_id).await?;
        let delta = {
            let mut member = handle.write().await;
            if member.ledger.has_reference(EntryKind::DecayPenalty, &reference) {
                return Ok(PenaltyOutcome::AlreadyPenalised);
            }
            let was_frozen = member.ledger.frozen_reason().is_some();
            let current = member.ledger.points(member_id).map_err(|err| {
                report_fold_failure(&self.event_bus, member_id, was_frozen, &err);
                err
            })?;
            if current == 0 {
                return Ok(PenaltyOutcome::ZeroBalance);
            }
            -penalty_points.min(current)
        };

        let entry = LedgerEntry::new(member_id, EntryKind::DecayPenalty, delta, reference);
        self.append_entry(entry).await?;
        Ok(PenaltyOutcome::Applied(-delta))
    }

    /// Clears a freeze after the history folds clean again.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::MemberNotFound`] if the id is unknown.
    /// - [`LedgerError::InvalidRequest`] when the ledger is not frozen.
    /// - [`LedgerError::Consistency`] when the fold is still negative; the
    ///   freeze stays in place.
    pub async fn unfreeze(&self, member_id: MemberId) -> Result<i64, LedgerError> {
        let handle = self.book.get(member_id).await?;
        let mut entry = handle.write().await;
        if entry.ledger.frozen_reason().is_none() {
            return Err(LedgerError::InvalidRequest(
                "ledger is not frozen".to_string(),
            ));
        }
        let points = entry.ledger.unfreeze(member_id)?;
        drop(entry);

        let _ = self.event_bus.publish(LedgerEvent::LedgerUnfrozen {
            member_id,
            points,
            timestamp: Utc::now(),
        });

        tracing::info!(%member_id, points, "ledger unfrozen after review");
        Ok(points)
    }

    /// The shared append path: validate under the member lock, persist,
    /// apply, publish. Returns the balance after the append.
    ///
    /// # Errors
    ///
    /// Validation errors from [`crate::domain::MemberLedger::validate`],
    /// or [`LedgerError::StoreUnavailable`] when persistence gives up.
    pub async fn append_entry(&self, entry: LedgerEntry) -> Result<i64, LedgerError> {
        let handle = self.book.get(entry.member_id).await?;
        let mut member = handle.write().await;
        let was_frozen = member.ledger.frozen_reason().is_some();
        if let Err(err) = member.ledger.validate(&entry) {
            report_fold_failure(&self.event_bus, entry.member_id, was_frozen, &err);
            return Err(err);
        }
        if let Some(store) = &self.store {
            store.insert_entry(&entry).await?;
        }
        let recorded = entry.clone();
        member.ledger.apply(entry);
        let new_points = member.ledger.raw_points();
        drop(member);

        let _ = self.event_bus.publish(LedgerEvent::EntryAppended {
            member_id: recorded.member_id,
            entry_id: recorded.id,
            kind: recorded.kind,
            points_delta: recorded.points_delta,
            reference: recorded.reference,
            new_points,
            timestamp: Utc::now(),
        });

        Ok(new_points)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn make_service() -> LedgerService {
        LedgerService::new(
            Arc::new(LedgerBook::new()),
            None,
            EventBus::new(1000),
            PointsPolicy::default(),
        )
    }

    async fn register(service: &LedgerService) -> MemberId {
        let member_id = MemberId::new();
        let result = service
            .register_member(member_id, "Naledi", 1000, None)
            .await;
        assert!(result.is_ok());
        member_id
    }

    #[tokio::test]
    async fn register_emits_event() {
        let service = make_service();
        let mut rx = service.event_bus().subscribe();

        let member_id = register(&service).await;

        let event = rx.recv().await;
        let Ok(event) = event else {
            panic!("expected event");
        };
        assert_eq!(event.event_type_str(), "member_registered");
        assert_eq!(event.member_id(), Some(member_id));
    }

    #[tokio::test]
    async fn double_registration_is_rejected() {
        let service = make_service();
        let member_id = register(&service).await;
        let again = service
            .register_member(member_id, "Naledi again", 500, None)
            .await;
        assert!(matches!(
            again,
            Err(LedgerError::MemberAlreadyRegistered(id)) if id == member_id
        ));
    }

    #[tokio::test]
    async fn contribution_credits_points() {
        let service = make_service();
        let member_id = register(&service).await;

        let outcome = service.record_contribution(member_id, 750, "pay-1").await;
        let Ok(outcome) = outcome else {
            panic!("contribution should succeed");
        };
        assert_eq!(outcome.new_points, 750);
        assert!(!outcome.already_recorded);
        assert_eq!(outcome.entry.points_delta, 750);
    }

    #[tokio::test]
    async fn contribution_replay_is_idempotent() {
        let service = make_service();
        let member_id = register(&service).await;

        let first = service.record_contribution(member_id, 500, "pay-1").await;
        assert!(first.is_ok());
        let replay = service.record_contribution(member_id, 500, "pay-1").await;
        let Ok(replay) = replay else {
            panic!("replay should be an outcome, not an error");
        };
        assert!(replay.already_recorded);
        assert_eq!(replay.new_points, 500);

        let summary = service.member_summary(member_id).await;
        let Ok(summary) = summary else {
            panic!("summary should project");
        };
        assert_eq!(summary.points, 500);
        assert_eq!(summary.entry_count, 1);
    }

    #[tokio::test]
    async fn adjustment_cannot_overdraw() {
        let service = make_service();
        let member_id = register(&service).await;
        let credited = service.record_contribution(member_id, 100, "pay-1").await;
        assert!(credited.is_ok());

        let overdraw = service
            .append_correction(member_id, EntryKind::ManualAdjustment, -200, "audit-1")
            .await;
        assert!(matches!(
            overdraw,
            Err(LedgerError::InsufficientBalance { .. })
        ));

        let adjusted = service
            .append_correction(member_id, EntryKind::ManualAdjustment, -50, "audit-2")
            .await;
        let Ok((_, new_points)) = adjusted else {
            panic!("adjustment should succeed");
        };
        assert_eq!(new_points, 50);
    }

    #[tokio::test]
    async fn corrections_must_use_corrective_kinds() {
        let service = make_service();
        let member_id = register(&service).await;
        let result = service
            .append_correction(member_id, EntryKind::Contribution, 100, "audit-1")
            .await;
        assert!(matches!(result, Err(LedgerError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn decay_penalty_caps_at_balance_and_skips_replays() {
        let service = make_service();
        let member_id = register(&service).await;
        let credited = service.record_contribution(member_id, 10, "pay-1").await;
        assert!(credited.is_ok());

        let day = chrono::NaiveDate::from_ymd_opt(2026, 8, 1);
        let Some(day) = day else {
            panic!("valid date");
        };
        // Penalty of 15 against a balance of 10 deducts only 10.
        let applied = service.record_decay_penalty(member_id, day, 15).await;
        assert_eq!(applied.ok(), Some(PenaltyOutcome::Applied(10)));

        // Same day again: skipped.
        let replay = service.record_decay_penalty(member_id, day, 15).await;
        assert_eq!(replay.ok(), Some(PenaltyOutcome::AlreadyPenalised));

        // Balance now zero: the next day is skipped entirely.
        let next = chrono::NaiveDate::from_ymd_opt(2026, 8, 2);
        let Some(next) = next else {
            panic!("valid date");
        };
        let zero_day = service.record_decay_penalty(member_id, next, 15).await;
        assert_eq!(zero_day.ok(), Some(PenaltyOutcome::ZeroBalance));

        let summary = service.member_summary(member_id).await;
        let Ok(summary) = summary else {
            panic!("summary should project");
        };
        assert_eq!(summary.points, 0);
    }

    #[tokio::test]
    async fn deactivation_is_idempotent() {
        let service = make_service();
        let member_id = register(&service).await;

        assert!(service.deactivate_member(member_id).await.is_ok());
        assert!(service.deactivate_member(member_id).await.is_ok());

        let member = service.get_member(member_id).await;
        let Ok(member) = member else {
            panic!("member should exist");
        };
        assert!(!member.active);
    }

    #[tokio::test]
    async fn unfreeze_requires_a_frozen_ledger() {
        let service = make_service();
        let member_id = register(&service).await;
        let result = service.unfreeze(member_id).await;
        assert!(matches!(result, Err(LedgerError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn profile_update_changes_name_and_target() {
        let service = make_service();
        let member_id = register(&service).await;

        let updated = service
            .update_profile(member_id, Some("Naledi M.".to_string()), Some(1500))
            .await;
        let Ok(updated) = updated else {
            panic!("update should succeed");
        };
        assert_eq!(updated.display_name, "Naledi M.");
        assert_eq!(updated.monthly_target, 1500);
    }
}
