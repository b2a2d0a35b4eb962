//! PostgreSQL implementation of the persistence layer.
//!
//! The store is write-through: every accepted mutation is persisted before
//! it is applied to the in-memory state, so a restart can rebuild the book
//! and registry from the tables alone. Writes are idempotent (`ON CONFLICT
//! DO NOTHING` keyed on stable uuids, absolute status updates) and are
//! retried a bounded number of times before the operation is surfaced as
//! [`LedgerError::StoreUnavailable`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use super::models::{AllocationRow, EntryRow, EventRow, MemberRow};
use crate::config::LedgerConfig;
use crate::domain::{
    Allocation, AllocationStatus, ClubEvent, EntryKind, EventEntry, EventRegistry, EventStatus,
    LedgerBook, LedgerEntry, Member, MemberEntry,
};
use crate::error::LedgerError;

/// Writes are attempted this many times before giving up.
const MAX_WRITE_ATTEMPTS: u32 = 3;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS members (
        id UUID PRIMARY KEY,
        display_name TEXT NOT NULL,
        monthly_target BIGINT NOT NULL DEFAULT 0,
        referral_code TEXT,
        active BOOLEAN NOT NULL DEFAULT TRUE,
        joined_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS ledger_entries (
        id UUID PRIMARY KEY,
        seq BIGSERIAL,
        member_id UUID NOT NULL REFERENCES members(id),
        kind TEXT NOT NULL,
        points_delta BIGINT NOT NULL,
        reference TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    // Store-level backstop for the append idempotence rule.
    "CREATE UNIQUE INDEX IF NOT EXISTS ledger_entries_unique_ref
        ON ledger_entries (member_id, kind, reference)
        WHERE kind IN ('contribution', 'decay_penalty')",
    "CREATE INDEX IF NOT EXISTS ledger_entries_member_seq
        ON ledger_entries (member_id, seq)",
    "CREATE TABLE IF NOT EXISTS club_events (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        start_at TIMESTAMPTZ NOT NULL,
        capacity INTEGER NOT NULL,
        slot_cost INTEGER NOT NULL,
        status TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS allocations (
        id UUID PRIMARY KEY,
        member_id UUID NOT NULL REFERENCES members(id),
        event_id UUID NOT NULL REFERENCES club_events(id),
        slot_cost INTEGER NOT NULL,
        status TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    // At most one capacity-consuming allocation per member and event.
    "CREATE UNIQUE INDEX IF NOT EXISTS allocations_active_unique
        ON allocations (member_id, event_id)
        WHERE status IN ('held', 'fulfilled')",
    "CREATE TABLE IF NOT EXISTS domain_events (
        id BIGSERIAL PRIMARY KEY,
        event_type TEXT NOT NULL,
        member_id UUID,
        event_id UUID,
        payload JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
];

/// In-memory state rebuilt from the tables at startup.
#[derive(Debug)]
pub struct RestoredState {
    /// Member ledgers with their holds re-indexed.
    pub book: LedgerBook,
    /// Events with their allocation lists.
    pub registry: EventRegistry,
    /// Ledger entries replayed.
    pub entries_restored: usize,
}

/// PostgreSQL-backed persistence layer using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PostgresStore {
    /// Connects a pool using the database settings in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] when the pool cannot be
    /// established.
    pub async fn connect(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(|e| LedgerError::Persistence(e.to_string()))?;
        Ok(Self {
            pool,
            statement_timeout: Duration::from_millis(config.store_timeout_ms),
        })
    }

    /// Wraps an existing pool, mainly for tests.
    #[must_use]
    pub fn with_pool(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }

    /// Creates tables and indexes if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on database failure.
    pub async fn ensure_schema(&self) -> Result<(), LedgerError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| LedgerError::Persistence(e.to_string()))?;
        }
        Ok(())
    }

    /// Retries a write with a per-attempt timeout and linear backoff.
    ///
    /// Only idempotent statements go through here; a retry after an
    /// ambiguous failure must not double-apply.
    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut run: F) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        let mut last_error = String::new();
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            match tokio::time::timeout(self.statement_timeout, run()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    tracing::warn!(op, attempt, error = %e, "store write failed");
                    last_error = e.to_string();
                }
                Err(_) => {
                    tracing::warn!(op, attempt, "store write timed out");
                    last_error = "statement timed out".to_string();
                }
            }
            if attempt < MAX_WRITE_ATTEMPTS {
                tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
            }
        }
        tracing::error!(op, error = %last_error, "store unavailable, giving up");
        Err(LedgerError::StoreUnavailable {
            attempts: MAX_WRITE_ATTEMPTS,
        })
    }

    /// Inserts a member row.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StoreUnavailable`] when all attempts fail.
    pub async fn insert_member(&self, member: &Member) -> Result<(), LedgerError> {
        self.with_retry("insert_member", || {
            let pool = self.pool.clone();
            let member = member.clone();
            async move {
                sqlx::query(
                    "INSERT INTO members (id, display_name, monthly_target, referral_code, active, joined_at) \
                     VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (id) DO NOTHING",
                )
                .bind(*member.id.as_uuid())
                .bind(member.display_name)
                .bind(member.monthly_target)
                .bind(member.referral_code)
                .bind(member.active)
                .bind(member.joined_at)
                .execute(&pool)
                .await
                .map(|_| ())
            }
        })
        .await
    }

    /// Flips a member's active flag.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StoreUnavailable`] when all attempts fail.
    pub async fn update_member_active(
        &self,
        member_id: Uuid,
        active: bool,
    ) -> Result<(), LedgerError> {
        self.with_retry("update_member_active", || {
            let pool = self.pool.clone();
            async move {
                sqlx::query("UPDATE members SET active = $2 WHERE id = $1")
                    .bind(member_id)
                    .bind(active)
                    .execute(&pool)
                    .await
                    .map(|_| ())
            }
        })
        .await
    }

    /// Rewrites the mutable profile columns of a member row.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StoreUnavailable`] when all attempts fail.
    pub async fn update_member_profile(&self, member: &Member) -> Result<(), LedgerError> {
        self.with_retry("update_member_profile", || {
            let pool = self.pool.clone();
            let member = member.clone();
            async move {
                sqlx::query(
                    "UPDATE members SET display_name = $2, monthly_target = $3 WHERE id = $1",
                )
                .bind(*member.id.as_uuid())
                .bind(member.display_name)
                .bind(member.monthly_target)
                .execute(&pool)
                .await
                .map(|_| ())
            }
        })
        .await
    }

    /// Appends a ledger entry row.
    ///
    /// The entry keeps its uuid across retries, so a replayed insert after
    /// an ambiguous failure hits `ON CONFLICT (id) DO NOTHING`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StoreUnavailable`] when all attempts fail.
    pub async fn insert_entry(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        self.with_retry("insert_entry", || {
            let pool = self.pool.clone();
            let entry = entry.clone();
            async move {
                sqlx::query(
                    "INSERT INTO ledger_entries (id, member_id, kind, points_delta, reference, created_at) \
                     VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (id) DO NOTHING",
                )
                .bind(entry.id)
                .bind(*entry.member_id.as_uuid())
                .bind(entry.kind.as_str())
                .bind(entry.points_delta)
                .bind(entry.reference)
                .bind(entry.created_at)
                .execute(&pool)
                .await
                .map(|_| ())
            }
        })
        .await
    }

    /// Inserts a club event row.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StoreUnavailable`] when all attempts fail.
    pub async fn insert_event(&self, event: &ClubEvent) -> Result<(), LedgerError> {
        self.with_retry("insert_event", || {
            let pool = self.pool.clone();
            let event = event.clone();
            async move {
                sqlx::query(
                    "INSERT INTO club_events (id, name, start_at, capacity, slot_cost, status, created_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7) ON CONFLICT (id) DO NOTHING",
                )
                .bind(*event.id.as_uuid())
                .bind(event.name)
                .bind(event.start_at)
                .bind(i64::from(event.capacity))
                .bind(i64::from(event.slot_cost))
                .bind(event.status.as_str())
                .bind(event.created_at)
                .execute(&pool)
                .await
                .map(|_| ())
            }
        })
        .await
    }

    /// Updates an event's lifecycle status.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StoreUnavailable`] when all attempts fail.
    pub async fn update_event_status(
        &self,
        event_id: Uuid,
        status: EventStatus,
    ) -> Result<(), LedgerError> {
        self.with_retry("update_event_status", || {
            let pool = self.pool.clone();
            async move {
                sqlx::query("UPDATE club_events SET status = $2 WHERE id = $1")
                    .bind(event_id)
                    .bind(status.as_str())
                    .execute(&pool)
                    .await
                    .map(|_| ())
            }
        })
        .await
    }

    /// Inserts an allocation row.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StoreUnavailable`] when all attempts fail.
    pub async fn insert_allocation(&self, allocation: &Allocation) -> Result<(), LedgerError> {
        self.with_retry("insert_allocation", || {
            let pool = self.pool.clone();
            let allocation = allocation.clone();
            async move {
                sqlx::query(
                    "INSERT INTO allocations (id, member_id, event_id, slot_cost, status, created_at, updated_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7) ON CONFLICT (id) DO NOTHING",
                )
                .bind(allocation.id)
                .bind(*allocation.member_id.as_uuid())
                .bind(*allocation.event_id.as_uuid())
                .bind(i64::from(allocation.slot_cost))
                .bind(allocation.status.as_str())
                .bind(allocation.created_at)
                .bind(allocation.updated_at)
                .execute(&pool)
                .await
                .map(|_| ())
            }
        })
        .await
    }

    /// Updates an allocation's status.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StoreUnavailable`] when all attempts fail.
    pub async fn update_allocation_status(
        &self,
        allocation_id: Uuid,
        status: AllocationStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        self.with_retry("update_allocation_status", || {
            let pool = self.pool.clone();
            async move {
                sqlx::query("UPDATE allocations SET status = $2, updated_at = $3 WHERE id = $1")
                    .bind(allocation_id)
                    .bind(status.as_str())
                    .bind(updated_at)
                    .execute(&pool)
                    .await
                    .map(|_| ())
            }
        })
        .await
    }

    /// Persists a fulfilment atomically: the spend entry and the status
    /// flip commit or roll back together.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StoreUnavailable`] when all attempts fail.
    pub async fn fulfil_allocation(
        &self,
        entry: &LedgerEntry,
        allocation_id: Uuid,
        updated_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        self.with_retry("fulfil_allocation", || {
            let pool = self.pool.clone();
            let entry = entry.clone();
            async move {
                let mut tx = pool.begin().await?;
                sqlx::query(
                    "INSERT INTO ledger_entries (id, member_id, kind, points_delta, reference, created_at) \
                     VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (id) DO NOTHING",
                )
                .bind(entry.id)
                .bind(*entry.member_id.as_uuid())
                .bind(entry.kind.as_str())
                .bind(entry.points_delta)
                .bind(entry.reference)
                .bind(entry.created_at)
                .execute(&mut *tx)
                .await?;
                sqlx::query(
                    "UPDATE allocations SET status = 'fulfilled', updated_at = $2 WHERE id = $1",
                )
                .bind(allocation_id)
                .bind(updated_at)
                .execute(&mut *tx)
                .await?;
                tx.commit().await
            }
        })
        .await
    }

    /// Appends a domain event to the audit log. Best-effort, single
    /// attempt: the log is an observer, not a source of truth.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on database failure.
    pub async fn save_event(
        &self,
        event_type: &str,
        member_id: Option<Uuid>,
        event_id: Option<Uuid>,
        payload: &serde_json::Value,
    ) -> Result<i64, LedgerError> {
        let row = sqlx::query_scalar::<_, i64>(
            "INSERT INTO domain_events (event_type, member_id, event_id, payload) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(event_type)
        .bind(member_id)
        .bind(event_id)
        .bind(payload)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| LedgerError::Persistence(e.to_string()))?;
        Ok(row)
    }

    /// Loads all member rows.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on database failure.
    pub async fn load_members(&self) -> Result<Vec<MemberRow>, LedgerError> {
        let rows = sqlx::query_as::<_, (Uuid, String, i64, Option<String>, bool, DateTime<Utc>)>(
            "SELECT id, display_name, monthly_target, referral_code, active, joined_at \
             FROM members ORDER BY joined_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LedgerError::Persistence(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(
                |(id, display_name, monthly_target, referral_code, active, joined_at)| MemberRow {
                    id,
                    display_name,
                    monthly_target,
                    referral_code,
                    active,
                    joined_at,
                },
            )
            .collect())
    }

    /// Loads all ledger entry rows in global append order.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on database failure.
    pub async fn load_entries(&self) -> Result<Vec<EntryRow>, LedgerError> {
        let rows = sqlx::query_as::<_, (Uuid, i64, Uuid, String, i64, String, DateTime<Utc>)>(
            "SELECT id, seq, member_id, kind, points_delta, reference, created_at \
             FROM ledger_entries ORDER BY seq ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LedgerError::Persistence(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(
                |(id, seq, member_id, kind, points_delta, reference, created_at)| EntryRow {
                    id,
                    seq,
                    member_id,
                    kind,
                    points_delta,
                    reference,
                    created_at,
                },
            )
            .collect())
    }

    /// Loads all event rows.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on database failure.
    pub async fn load_events(&self) -> Result<Vec<EventRow>, LedgerError> {
        let rows = sqlx::query_as::<_, (Uuid, String, DateTime<Utc>, i32, i32, String, DateTime<Utc>)>(
            "SELECT id, name, start_at, capacity, slot_cost, status, created_at \
             FROM club_events ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LedgerError::Persistence(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(
                |(id, name, start_at, capacity, slot_cost, status, created_at)| EventRow {
                    id,
                    name,
                    start_at,
                    capacity,
                    slot_cost,
                    status,
                    created_at,
                },
            )
            .collect())
    }

    /// Loads all allocation rows in claim order.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on database failure.
    pub async fn load_allocations(&self) -> Result<Vec<AllocationRow>, LedgerError> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid, Uuid, i32, String, DateTime<Utc>, DateTime<Utc>)>(
            "SELECT id, member_id, event_id, slot_cost, status, created_at, updated_at \
             FROM allocations ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LedgerError::Persistence(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(
                |(id, member_id, event_id, slot_cost, status, created_at, updated_at)| {
                    AllocationRow {
                        id,
                        member_id,
                        event_id,
                        slot_cost,
                        status,
                        created_at,
                        updated_at,
                    }
                },
            )
            .collect())
    }

    /// Rebuilds the in-memory book and registry from the tables.
    ///
    /// Entries are replayed in `seq` order so each member's history keeps
    /// its original append order; held allocations are re-indexed on the
    /// member side. Corrupt rows (unknown discriminators, negative sizes)
    /// abort the restore rather than loading a partial state.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on database failure or a row
    /// that does not parse back into the domain model.
    pub async fn load_state(&self) -> Result<RestoredState, LedgerError> {
        let book = LedgerBook::new();
        for row in self.load_members().await? {
            let entry = MemberEntry::new(Member {
                id: row.id.into(),
                display_name: row.display_name,
                monthly_target: row.monthly_target,
                referral_code: row.referral_code,
                active: row.active,
                joined_at: row.joined_at,
            });
            book.insert(entry).await?;
        }

        let mut entries_restored = 0;
        for row in self.load_entries().await? {
            let kind = EntryKind::parse(&row.kind).ok_or_else(|| {
                LedgerError::Persistence(format!("unknown entry kind in store: {}", row.kind))
            })?;
            let handle = book.get(row.member_id.into()).await?;
            let mut member = handle.write().await;
            member.ledger.apply(LedgerEntry {
                id: row.id,
                member_id: row.member_id.into(),
                kind,
                points_delta: row.points_delta,
                reference: row.reference,
                created_at: row.created_at,
            });
            entries_restored += 1;
        }

        let registry = EventRegistry::new();
        for row in self.load_events().await? {
            let status = EventStatus::parse(&row.status).ok_or_else(|| {
                LedgerError::Persistence(format!("unknown event status in store: {}", row.status))
            })?;
            let capacity = u32::try_from(row.capacity).map_err(|_| {
                LedgerError::Persistence(format!("negative capacity in store: {}", row.capacity))
            })?;
            let slot_cost = u32::try_from(row.slot_cost).map_err(|_| {
                LedgerError::Persistence(format!("negative slot cost in store: {}", row.slot_cost))
            })?;
            registry
                .insert(EventEntry::new(ClubEvent {
                    id: row.id.into(),
                    name: row.name,
                    start_at: row.start_at,
                    capacity,
                    slot_cost,
                    status,
                    created_at: row.created_at,
                }))
                .await?;
        }

        for row in self.load_allocations().await? {
            let status = AllocationStatus::parse(&row.status).ok_or_else(|| {
                LedgerError::Persistence(format!(
                    "unknown allocation status in store: {}",
                    row.status
                ))
            })?;
            let slot_cost = u32::try_from(row.slot_cost).map_err(|_| {
                LedgerError::Persistence(format!("negative slot cost in store: {}", row.slot_cost))
            })?;
            let allocation = Allocation {
                id: row.id,
                member_id: row.member_id.into(),
                event_id: row.event_id.into(),
                slot_cost,
                status,
                created_at: row.created_at,
                updated_at: row.updated_at,
            };

            if status == AllocationStatus::Held {
                let handle = book.get(allocation.member_id).await?;
                let mut member = handle.write().await;
                member.add_hold(allocation.event_id, slot_cost);
            }

            let handle = registry.get(allocation.event_id).await?;
            let mut event = handle.write().await;
            event.allocations.push(allocation);
        }

        Ok(RestoredState {
            book,
            registry,
            entries_restored,
        })
    }
}
