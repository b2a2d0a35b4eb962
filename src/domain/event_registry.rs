//! Concurrent event storage with per-event fine-grained locking.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::EventId;
use super::club_event::{EventEntry, EventStatus, EventSummary};
use crate::error::LedgerError;

/// Central store for all club events and their allocations.
///
/// Same locking scheme as [`super::LedgerBook`]: outer `RwLock<HashMap>`
/// for membership, per-entry `Arc<RwLock<EventEntry>>` so that claims on
/// the same event are serialized while different events proceed
/// concurrently.
#[derive(Debug)]
pub struct EventRegistry {
    events: RwLock<HashMap<EventId, Arc<RwLock<EventEntry>>>>,
}

impl EventRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts a new event entry.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidRequest`] if the event id is already
    /// registered (should never happen with UUID v4).
    pub async fn insert(&self, entry: EventEntry) -> Result<EventId, LedgerError> {
        let event_id = entry.event.id;
        let mut map = self.events.write().await;
        if map.contains_key(&event_id) {
            return Err(LedgerError::InvalidRequest(format!(
                "event {event_id} already exists"
            )));
        }
        map.insert(event_id, Arc::new(RwLock::new(entry)));
        Ok(event_id)
    }

    /// Returns a shared handle to the event entry behind its lock.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::EventNotFound`] if no event with the given
    /// id exists.
    pub async fn get(&self, event_id: EventId) -> Result<Arc<RwLock<EventEntry>>, LedgerError> {
        let map = self.events.read().await;
        map.get(&event_id)
            .cloned()
            .ok_or(LedgerError::EventNotFound(event_id))
    }

    /// Snapshot of all event ids, for batch scans outside the map lock.
    pub async fn event_ids(&self) -> Vec<EventId> {
        self.events.read().await.keys().copied().collect()
    }

    /// Returns summaries of all events, optionally filtered by status.
    pub async fn list(&self, status_filter: Option<EventStatus>) -> Vec<EventSummary> {
        let handles: Vec<Arc<RwLock<EventEntry>>> = {
            let map = self.events.read().await;
            map.values().cloned().collect()
        };
        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            let entry = handle.read().await;
            if let Some(filter) = status_filter
                && entry.event.status != filter
            {
                continue;
            }
            summaries.push(entry.summary());
        }
        summaries.sort_by(|a, b| a.start_at.cmp(&b.start_at));
        summaries
    }

    /// Returns the number of events in the registry.
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    /// Returns `true` if the registry contains no events.
    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}
