//! # stokvel-ledger
//!
//! Points and allocation ledger service for community savings clubs
//! (stokvels).
//!
//! Members earn points through confirmed monthly contributions, hold
//! event slots against them, and lose them to inactivity decay. Balances
//! are never stored as fields: every read folds the member's append-only
//! ledger, which is what makes webhook replays and decay reruns safe.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler (ws/)
//!     │
//!     ├── LedgerService / AllocationCoordinator (service/)
//!     ├── RankingEngine / DecayScheduler (service/)
//!     ├── EventBus (domain/)
//!     │
//!     ├── LedgerBook / EventRegistry (domain/)
//!     │
//!     └── PostgreSQL Persistence
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
pub mod ws;
