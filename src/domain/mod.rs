//! Domain layer: core types, ledgers, registries, and the event system.
//!
//! This module contains the service-side domain model: member and event
//! identity, the per-member append-only ledger and its balance fold,
//! allocations with their lifecycle, the concurrent stores for members
//! and events, and the broadcast bus for domain events.

pub mod allocation;
pub mod balance;
pub mod club_event;
pub mod entry;
pub mod event_bus;
pub mod event_registry;
pub mod ids;
pub mod ledger;
pub mod ledger_book;
pub mod ledger_event;
pub mod member;

pub use allocation::{Allocation, AllocationStatus};
pub use balance::Balance;
pub use club_event::{ClubEvent, EventEntry, EventStatus, EventSummary};
pub use entry::{EntryKind, LedgerEntry};
pub use event_bus::EventBus;
pub use event_registry::EventRegistry;
pub use ids::{EventId, MemberId};
pub use ledger::MemberLedger;
pub use ledger_book::LedgerBook;
pub use ledger_event::LedgerEvent;
pub use member::{Member, MemberEntry, MemberSummary};
