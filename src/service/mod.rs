//! Service layer: business logic orchestration.
//!
//! Five coordinators share the domain stores: [`LedgerService`] owns the
//! append path, [`BalanceProjector`] folds balances, [`RankingEngine`]
//! builds the leaderboard, [`AllocationCoordinator`] manages slot claims,
//! and [`DecayScheduler`] applies inactivity penalties. All of them emit
//! events through the [`crate::domain::EventBus`].

pub mod allocation_coordinator;
pub mod balance_projector;
pub mod decay_scheduler;
pub mod ledger_service;
pub mod ranking_engine;

pub use allocation_coordinator::AllocationCoordinator;
pub use balance_projector::{BalanceProjector, MemberStanding};
pub use decay_scheduler::{DecayCycleReport, DecayScheduler};
pub use ledger_service::{ContributionOutcome, LedgerService, PenaltyOutcome};
pub use ranking_engine::{Leaderboard, LeaderboardRow, RankingEngine};

use chrono::Utc;

use crate::domain::{EventBus, LedgerEvent, MemberId};
use crate::error::LedgerError;

/// Reports a fold failure exactly once per freeze.
///
/// A negative fold freezes the member inside the domain layer; the first
/// observer logs the full context and publishes [`LedgerEvent::LedgerFrozen`].
/// Later observers see `was_frozen` and stay quiet, so a frozen member does
/// not spam the log on every read.
pub(crate) fn report_fold_failure(
    bus: &EventBus,
    member_id: MemberId,
    was_frozen: bool,
    err: &LedgerError,
) {
    if was_frozen {
        return;
    }
    if let LedgerError::Consistency { details, .. } = err {
        tracing::error!(%member_id, details, "ledger fold violation, member frozen");
        let _ = bus.publish(LedgerEvent::LedgerFrozen {
            member_id,
            reason: details.clone(),
            timestamp: Utc::now(),
        });
    }
}
