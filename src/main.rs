//! stokvel-ledger server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints, plus the
//! background decay and leaderboard-cutoff workers.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use stokvel_ledger::api;
use stokvel_ledger::app_state::AppState;
use stokvel_ledger::config::LedgerConfig;
use stokvel_ledger::domain::{EventBus, EventRegistry, LedgerBook};
use stokvel_ledger::persistence::PostgresStore;
use stokvel_ledger::service::{
    AllocationCoordinator, BalanceProjector, DecayScheduler, LedgerService, RankingEngine,
};
use stokvel_ledger::ws::handler::ws_handler;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = LedgerConfig::from_env()?;
    tracing::info!(addr = %config.listen_addr, "starting stokvel-ledger");

    // Build domain layer, restoring from the store when persistence is on
    let (store, book, registry) = if config.persistence_enabled {
        let store = PostgresStore::connect(&config).await?;
        store.ensure_schema().await?;
        let restored = store.load_state().await?;
        let members = restored.book.len().await;
        tracing::info!(
            members,
            entries = restored.entries_restored,
            "ledger state restored"
        );
        (
            Some(Arc::new(store)),
            Arc::new(restored.book),
            Arc::new(restored.registry),
        )
    } else {
        tracing::warn!("persistence disabled, ledger state is in-memory only");
        (None, Arc::new(LedgerBook::new()), Arc::new(EventRegistry::new()))
    };
    let event_bus = EventBus::new(config.event_bus_capacity);

    // Build service layer
    let ledger = Arc::new(LedgerService::new(
        Arc::clone(&book),
        store.clone(),
        event_bus.clone(),
        config.points,
    ));
    let projector = Arc::new(BalanceProjector::new(
        Arc::clone(&book),
        event_bus.clone(),
        config.points,
    ));
    let ranking = Arc::new(RankingEngine::new(
        Arc::clone(&projector),
        event_bus.clone(),
        config.ranking,
    ));
    let coordinator = Arc::new(AllocationCoordinator::new(
        Arc::clone(&book),
        Arc::clone(&registry),
        store.clone(),
        event_bus.clone(),
        config.points,
    ));
    let decay = Arc::new(DecayScheduler::new(
        Arc::clone(&book),
        Arc::clone(&ledger),
        Arc::clone(&coordinator),
        event_bus.clone(),
        config.decay,
    ));

    // Background workers
    let decay_worker = Arc::clone(&decay);
    tokio::spawn(async move { decay_worker.run_loop().await });
    let cutoff_worker = Arc::clone(&ranking);
    tokio::spawn(async move { cutoff_worker.run_cutoff_loop().await });
    if let Some(event_store) = store.clone() {
        let mut events = event_bus.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let payload = match serde_json::to_value(&event) {
                            Ok(value) => value,
                            Err(err) => {
                                tracing::warn!(error = %err, "event serialization failed");
                                continue;
                            }
                        };
                        let member_id = event.member_id().map(uuid::Uuid::from);
                        let event_id = event.event_id().map(uuid::Uuid::from);
                        if let Err(err) = event_store
                            .save_event(event.event_type_str(), member_id, event_id, &payload)
                            .await
                        {
                            tracing::warn!(error = %err, "event log append failed");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "event log writer lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    // Build application state
    let app_state = AppState {
        ledger,
        projector,
        ranking,
        coordinator,
        decay,
        event_bus,
        points: config.points,
        ranking_policy: config.ranking,
        decay_policy: config.decay,
    };

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws_handler));

    #[cfg(feature = "swagger-ui")]
    let app = app.merge(
        utoipa_swagger_ui::SwaggerUi::new("/docs")
            .url("/api-docs/openapi.json", <api::ApiDoc as utoipa::OpenApi>::openapi()),
    );

    let app = app
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
