//! Inactivity decay: daily penalties after the grace window.
//!
//! A member's decay baseline is their most recent contribution (or their
//! join date before any contribution). Once `grace_days` have passed,
//! every further day costs `penalty_points`, capped so the balance never
//! goes negative. Penalty idempotence comes from the per-day reference
//! `decay:<date>`, so re-running a cycle is safe.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use utoipa::ToSchema;

use crate::config::DecayPolicy;
use crate::domain::{EventBus, LedgerBook, LedgerEvent, MemberId};
use crate::service::allocation_coordinator::AllocationCoordinator;
use crate::service::ledger_service::{LedgerService, PenaltyOutcome};

/// Tallies of one decay sweep.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DecayCycleReport {
    /// The date the sweep was evaluated against.
    pub as_of: NaiveDate,
    /// Active members examined.
    pub members_processed: usize,
    /// Penalty entries appended.
    pub penalties_applied: usize,
    /// Total points deducted.
    pub penalty_points: i64,
    /// Days skipped because a penalty already existed.
    pub skipped_existing: usize,
    /// Members whose processing errored (logged, not aborted).
    pub members_failed: usize,
    /// Holds force-released by post-penalty reconciliation.
    pub forced_releases: usize,
}

impl DecayCycleReport {
    fn new(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            members_processed: 0,
            penalties_applied: 0,
            penalty_points: 0,
            skipped_existing: 0,
            members_failed: 0,
            forced_releases: 0,
        }
    }
}

/// Runs decay sweeps, on a schedule and on demand.
#[derive(Debug, Clone)]
pub struct DecayScheduler {
    book: Arc<LedgerBook>,
    ledger: Arc<LedgerService>,
    coordinator: Arc<AllocationCoordinator>,
    event_bus: EventBus,
    decay: DecayPolicy,
}

impl DecayScheduler {
    /// Creates a new `DecayScheduler`.
    #[must_use]
    pub fn new(
        book: Arc<LedgerBook>,
        ledger: Arc<LedgerService>,
        coordinator: Arc<AllocationCoordinator>,
        event_bus: EventBus,
        decay: DecayPolicy,
    ) -> Self {
        Self {
            book,
            ledger,
            coordinator,
            event_bus,
            decay,
        }
    }

    /// Sweeps every active member's overdue days up to `as_of`.
    ///
    /// Each member is an independent unit of work: an error is logged and
    /// counted, never aborting the rest of the batch. Members who lost
    /// slots underneath existing holds are reconciled afterwards.
    pub async fn run_cycle(&self, as_of: NaiveDate) -> DecayCycleReport {
        let mut report = DecayCycleReport::new(as_of);

        for member_id in self.book.member_ids().await {
            let Some(baseline) = self.member_baseline(member_id).await else {
                continue;
            };
            report.members_processed += 1;

            let first_penalty_day = baseline + Duration::days(self.decay.grace_days + 1);
            if first_penalty_day > as_of {
                continue;
            }

            let mut day = first_penalty_day;
            let mut applied_any = false;
            let mut failed = false;
            while day <= as_of {
                match self
                    .ledger
                    .record_decay_penalty(member_id, day, self.decay.penalty_points)
                    .await
                {
                    Ok(PenaltyOutcome::Applied(points)) => {
                        report.penalties_applied += 1;
                        report.penalty_points += points;
                        applied_any = true;
                    }
                    Ok(PenaltyOutcome::AlreadyPenalised) => {
                        report.skipped_existing += 1;
                    }
                    Ok(PenaltyOutcome::ZeroBalance) => break,
                    Err(err) => {
                        tracing::warn!(%member_id, %day, error = %err, "decay penalty failed");
                        report.members_failed += 1;
                        failed = true;
                        break;
                    }
                }
                day += Duration::days(1);
            }

            if applied_any && !failed {
                match self.coordinator.reconcile(member_id).await {
                    Ok(forced) => report.forced_releases += forced as usize,
                    Err(err) => {
                        tracing::warn!(%member_id, error = %err, "post-decay reconcile failed");
                        report.members_failed += 1;
                    }
                }
            }
        }

        let _ = self.event_bus.publish(LedgerEvent::DecayCycleCompleted {
            members_processed: report.members_processed,
            penalties_applied: report.penalties_applied,
            penalty_points: report.penalty_points,
            forced_releases: report.forced_releases,
            timestamp: Utc::now(),
        });

        tracing::info!(
            %as_of,
            processed = report.members_processed,
            applied = report.penalties_applied,
            points = report.penalty_points,
            failed = report.members_failed,
            forced = report.forced_releases,
            "decay cycle completed"
        );
        report
    }

    /// Background loop: one sweep immediately, then one per interval.
    pub async fn run_loop(&self) {
        let period = std::time::Duration::from_secs(self.decay.interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = self.run_cycle(Utc::now().date_naive()).await;
            if report.members_failed > 0 {
                tracing::warn!(
                    failed = report.members_failed,
                    "decay cycle finished with failures"
                );
            }
        }
    }

    /// The member's decay baseline date, or `None` when the member should
    /// be skipped (deactivated, frozen, or unknown).
    async fn member_baseline(&self, member_id: MemberId) -> Option<NaiveDate> {
        let handle = self.book.get(member_id).await.ok()?;
        let entry = handle.read().await;
        if !entry.member.active {
            return None;
        }
        if entry.ledger.frozen_reason().is_some() {
            tracing::debug!(%member_id, "skipping frozen ledger in decay sweep");
            return None;
        }
        let baseline: DateTime<Utc> = entry
            .ledger
            .last_contribution_at()
            .unwrap_or(entry.member.joined_at);
        Some(baseline.date_naive())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::config::PointsPolicy;
    use crate::domain::{EntryKind, EventRegistry};

    struct Fixture {
        book: Arc<LedgerBook>,
        ledger: Arc<LedgerService>,
        coordinator: Arc<AllocationCoordinator>,
        scheduler: DecayScheduler,
    }

    fn make_fixture() -> Fixture {
        let book = Arc::new(LedgerBook::new());
        let registry = Arc::new(EventRegistry::new());
        let bus = EventBus::new(1000);
        let ledger = Arc::new(LedgerService::new(
            Arc::clone(&book),
            None,
            bus.clone(),
            PointsPolicy::default(),
        ));
        let coordinator = Arc::new(AllocationCoordinator::new(
            Arc::clone(&book),
            Arc::clone(&registry),
            None,
            bus.clone(),
            PointsPolicy::default(),
        ));
        let scheduler = DecayScheduler::new(
            Arc::clone(&book),
            Arc::clone(&ledger),
            Arc::clone(&coordinator),
            bus,
            DecayPolicy::default(),
        );
        Fixture {
            book,
            ledger,
            coordinator,
            scheduler,
        }
    }

    async fn register_with_points(fixture: &Fixture, points: i64) -> MemberId {
        let member_id = MemberId::new();
        let registered = fixture
            .ledger
            .register_member(member_id, "Sipho", 1000, None)
            .await;
        assert!(registered.is_ok());
        if points > 0 {
            let credited = fixture
                .ledger
                .record_contribution(member_id, points, format!("seed-{member_id}").as_str())
                .await;
            assert!(credited.is_ok());
        }
        member_id
    }

    fn days_from_now(days: i64) -> NaiveDate {
        Utc::now().date_naive() + Duration::days(days)
    }

    #[tokio::test]
    async fn members_inside_grace_are_untouched() {
        let fixture = make_fixture();
        let member_id = register_with_points(&fixture, 600).await;

        let report = fixture.scheduler.run_cycle(days_from_now(40)).await;
        assert_eq!(report.members_processed, 1);
        assert_eq!(report.penalties_applied, 0);

        let balance = fixture.ledger.member_summary(member_id).await;
        assert_eq!(balance.ok().map(|s| s.points), Some(600));
    }

    #[tokio::test]
    async fn overdue_days_each_cost_a_penalty() {
        let fixture = make_fixture();
        let member_id = register_with_points(&fixture, 600).await;

        // Contribution today; grace ends at day 40; days 41..=43 are due.
        let report = fixture.scheduler.run_cycle(days_from_now(43)).await;
        assert_eq!(report.penalties_applied, 3);
        assert_eq!(report.penalty_points, 45);
        assert_eq!(report.members_failed, 0);

        let balance = fixture.ledger.member_summary(member_id).await;
        assert_eq!(balance.ok().map(|s| s.points), Some(555));
    }

    #[tokio::test]
    async fn rerunning_a_cycle_is_idempotent() {
        let fixture = make_fixture();
        let member_id = register_with_points(&fixture, 600).await;
        let as_of = days_from_now(43);

        let first = fixture.scheduler.run_cycle(as_of).await;
        assert_eq!(first.penalties_applied, 3);

        let second = fixture.scheduler.run_cycle(as_of).await;
        assert_eq!(second.penalties_applied, 0);
        assert_eq!(second.skipped_existing, 3);

        let balance = fixture.ledger.member_summary(member_id).await;
        assert_eq!(balance.ok().map(|s| s.points), Some(555));
    }

    #[tokio::test]
    async fn decay_stops_at_zero_balance() {
        let fixture = make_fixture();
        let member_id = register_with_points(&fixture, 20).await;

        // 20 points, 15/day: day one takes 15, day two the remaining 5,
        // later days are skipped at zero.
        let report = fixture.scheduler.run_cycle(days_from_now(50)).await;
        assert_eq!(report.penalties_applied, 2);
        assert_eq!(report.penalty_points, 20);

        let balance = fixture.ledger.member_summary(member_id).await;
        assert_eq!(balance.ok().map(|s| s.points), Some(0));
    }

    #[tokio::test]
    async fn deactivated_members_are_skipped() {
        let fixture = make_fixture();
        let member_id = register_with_points(&fixture, 600).await;
        assert!(fixture.ledger.deactivate_member(member_id).await.is_ok());

        let report = fixture.scheduler.run_cycle(days_from_now(60)).await;
        assert_eq!(report.members_processed, 0);
        assert_eq!(report.penalties_applied, 0);
    }

    #[tokio::test]
    async fn penalties_that_strand_holds_trigger_forced_release() {
        let fixture = make_fixture();
        let member_id = register_with_points(&fixture, 500).await;
        let event = fixture
            .coordinator
            .open_event("Year-end gala", Utc::now(), 5, 1)
            .await;
        let Ok(event) = event else {
            panic!("event should open");
        };
        assert!(fixture.coordinator.claim(member_id, event.id).await.is_ok());

        // One overdue day: 485 points, zero slots, one stranded hold.
        let report = fixture.scheduler.run_cycle(days_from_now(41)).await;
        assert_eq!(report.penalties_applied, 1);
        assert_eq!(report.forced_releases, 1);

        let Ok(handle) = fixture.book.get(member_id).await else {
            panic!("member exists");
        };
        assert_eq!(handle.read().await.held_slots(), 0);

        let summary = fixture.coordinator.event_summary(event.id).await;
        assert_eq!(summary.ok().map(|s| s.held_count), Some(0));
    }

    #[tokio::test]
    async fn fresh_contribution_resets_the_baseline() {
        let fixture = make_fixture();
        let member_id = register_with_points(&fixture, 600).await;

        // Backdate the join far into the past; the contribution made at
        // registration time is what the baseline follows.
        {
            let Ok(handle) = fixture.book.get(member_id).await else {
                panic!("member exists");
            };
            handle.write().await.member.joined_at = Utc::now() - Duration::days(365);
        }

        let report = fixture.scheduler.run_cycle(days_from_now(10)).await;
        assert_eq!(report.penalties_applied, 0);
    }

    #[tokio::test]
    async fn members_without_contributions_decay_from_join_date() {
        let fixture = make_fixture();
        let member_id = register_with_points(&fixture, 0).await;
        // Give points without a contribution entry.
        let granted = fixture
            .ledger
            .append_correction(member_id, EntryKind::ManualAdjustment, 100, "grant-1")
            .await;
        assert!(granted.is_ok());
        {
            let Ok(handle) = fixture.book.get(member_id).await else {
                panic!("member exists");
            };
            handle.write().await.member.joined_at = Utc::now() - Duration::days(45);
        }

        // Joined 45 days ago, never contributed: days 41..=45 are due.
        let report = fixture.scheduler.run_cycle(days_from_now(0)).await;
        assert_eq!(report.penalties_applied, 5);
        assert_eq!(report.penalty_points, 75);

        let balance = fixture.ledger.member_summary(member_id).await;
        assert_eq!(balance.ok().map(|s| s.points), Some(25));
    }

    #[tokio::test]
    async fn cycle_publishes_completion_event() {
        let fixture = make_fixture();
        let _ = register_with_points(&fixture, 600).await;
        let mut rx = fixture.ledger.event_bus().subscribe();

        let _ = fixture.scheduler.run_cycle(days_from_now(41)).await;

        // Skip the entry-append events until the completion marker.
        loop {
            let event = rx.recv().await;
            let Ok(event) = event else {
                panic!("bus closed before completion event");
            };
            if event.event_type_str() == "decay_cycle_completed" {
                break;
            }
        }
    }
}
