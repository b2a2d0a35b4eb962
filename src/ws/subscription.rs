//! Per-connection subscription manager.
//!
//! Tracks which members and events a WebSocket client follows and
//! provides server-side event filtering. Global announcements (decay
//! cycles, leaderboard recomputations) bypass the filter and reach every
//! connected client.

use std::collections::HashSet;

use crate::domain::{EventId, LedgerEvent, MemberId};

/// Manages the subscription filter for a single WebSocket connection.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    /// Followed member IDs. Ignored while `subscribe_all` is set.
    member_ids: HashSet<MemberId>,
    /// Followed event IDs. Ignored while `subscribe_all` is set.
    event_ids: HashSet<EventId>,
    /// Whether the client follows everything (wildcard `"*"`).
    subscribe_all: bool,
}

impl SubscriptionManager {
    /// Creates a new empty subscription manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds IDs to the filter. `wildcard` enables follow-everything.
    pub fn subscribe(&mut self, members: &[MemberId], events: &[EventId], wildcard: bool) {
        if wildcard {
            self.subscribe_all = true;
        }
        for id in members {
            self.member_ids.insert(*id);
        }
        for id in events {
            self.event_ids.insert(*id);
        }
    }

    /// Removes IDs from the filter. The wildcard, once set, stays set.
    pub fn unsubscribe(&mut self, members: &[MemberId], events: &[EventId]) {
        for id in members {
            self.member_ids.remove(id);
        }
        for id in events {
            self.event_ids.remove(id);
        }
    }

    /// Whether the given event passes this connection's filter.
    #[must_use]
    pub fn matches(&self, event: &LedgerEvent) -> bool {
        if event.is_global() || self.subscribe_all {
            return true;
        }
        if let Some(id) = event.member_id()
            && self.member_ids.contains(&id)
        {
            return true;
        }
        if let Some(id) = event.event_id()
            && self.event_ids.contains(&id)
        {
            return true;
        }
        false
    }

    /// Number of explicitly followed IDs, members plus events.
    #[must_use]
    pub fn count(&self) -> usize {
        self.member_ids.len() + self.event_ids.len()
    }

    /// Returns `true` if the wildcard subscription is active.
    #[must_use]
    pub fn is_subscribed_all(&self) -> bool {
        self.subscribe_all
    }
}
