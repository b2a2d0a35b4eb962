//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::config::{DecayPolicy, PointsPolicy, RankingPolicy};
use crate::domain::EventBus;
use crate::service::{
    AllocationCoordinator, BalanceProjector, DecayScheduler, LedgerService, RankingEngine,
};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Member lifecycle and the ledger append path.
    pub ledger: Arc<LedgerService>,
    /// Balance and statement projections.
    pub projector: Arc<BalanceProjector>,
    /// Leaderboard computation and cache.
    pub ranking: Arc<RankingEngine>,
    /// Slot claims and event lifecycle.
    pub coordinator: Arc<AllocationCoordinator>,
    /// Inactivity decay sweeps.
    pub decay: Arc<DecayScheduler>,
    /// Event bus for WebSocket subscriptions.
    pub event_bus: EventBus,
    /// Points arithmetic policy, exposed read-only over the API.
    pub points: PointsPolicy,
    /// Leaderboard policy, exposed read-only over the API.
    pub ranking_policy: RankingPolicy,
    /// Decay policy, exposed read-only over the API.
    pub decay_policy: DecayPolicy,
}
