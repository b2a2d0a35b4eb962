//! Persistence layer: PostgreSQL tables for members, ledger entries,
//! events, and allocations, plus the domain event audit log.
//!
//! The concrete implementation uses `sqlx::PgPool` for async PostgreSQL
//! access. The store is the durability layer only; all request-path reads
//! are served from the in-memory book and registry it restores at startup.

pub mod models;
pub mod postgres;

pub use postgres::{PostgresStore, RestoredState};
