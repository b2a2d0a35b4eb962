//! Slot claims, releases, fulfilment and event lifecycle.
//!
//! Claiming reserves slot units against a member's derived slot count
//! without touching the ledger; points are only spent when an admin
//! fulfils the hold into a ticket. Lock order is always member → event,
//! which keeps concurrent claims, releases and reconciliation deadlock
//! free while serializing capacity checks per event.

use std::sync::Arc;

use chrono::Utc;

use crate::config::PointsPolicy;
use crate::domain::{
    Allocation, AllocationStatus, ClubEvent, EntryKind, EventBus, EventEntry, EventId,
    EventRegistry, EventStatus, EventSummary, LedgerBook, LedgerEntry, LedgerEvent, MemberEntry,
    MemberId,
};
use crate::error::LedgerError;
use crate::persistence::PostgresStore;
use crate::service::report_fold_failure;

/// Coordinates slot claims against events and the event lifecycle.
#[derive(Debug, Clone)]
pub struct AllocationCoordinator {
    book: Arc<LedgerBook>,
    registry: Arc<EventRegistry>,
    store: Option<Arc<PostgresStore>>,
    event_bus: EventBus,
    points: PointsPolicy,
}

impl AllocationCoordinator {
    /// Creates a new `AllocationCoordinator`.
    #[must_use]
    pub fn new(
        book: Arc<LedgerBook>,
        registry: Arc<EventRegistry>,
        store: Option<Arc<PostgresStore>>,
        event_bus: EventBus,
        points: PointsPolicy,
    ) -> Self {
        Self {
            book,
            registry,
            store,
            event_bus,
            points,
        }
    }

    /// Opens a new event for claims.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidRequest`] on an empty name, zero capacity,
    ///   zero slot cost, or a slot cost exceeding capacity.
    /// - [`LedgerError::StoreUnavailable`] when persistence gives up.
    pub async fn open_event(
        &self,
        name: &str,
        start_at: chrono::DateTime<Utc>,
        capacity: u32,
        slot_cost: u32,
    ) -> Result<ClubEvent, LedgerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::InvalidRequest(
                "name must not be empty".to_string(),
            ));
        }
        if capacity == 0 {
            return Err(LedgerError::InvalidRequest(
                "capacity must be at least 1".to_string(),
            ));
        }
        if slot_cost == 0 {
            return Err(LedgerError::InvalidRequest(
                "slot_cost must be at least 1".to_string(),
            ));
        }
        if slot_cost > capacity {
            return Err(LedgerError::InvalidRequest(format!(
                "slot_cost {slot_cost} exceeds capacity {capacity}"
            )));
        }

        let event = ClubEvent::new(EventId::new(), name.to_string(), start_at, capacity, slot_cost);
        if let Some(store) = &self.store {
            store.insert_event(&event).await?;
        }
        self.registry.insert(EventEntry::new(event.clone())).await?;

        let _ = self.event_bus.publish(LedgerEvent::EventOpened {
            event_id: event.id,
            name: event.name.clone(),
            capacity,
            slot_cost,
            start_at,
            timestamp: Utc::now(),
        });

        tracing::info!(event_id = %event.id, name = %event.name, capacity, slot_cost, "event opened");
        Ok(event)
    }

    /// Summary of one event, including remaining capacity.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::EventNotFound`] if the id is unknown.
    pub async fn event_summary(&self, event_id: EventId) -> Result<EventSummary, LedgerError> {
        let handle = self.registry.get(event_id).await?;
        let entry = handle.read().await;
        Ok(entry.summary())
    }

    /// Summaries of all events, optionally filtered by status.
    pub async fn list_events(&self, status: Option<EventStatus>) -> Vec<EventSummary> {
        self.registry.list(status).await
    }

    /// The full allocation roster of one event, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::EventNotFound`] if the id is unknown.
    pub async fn event_allocations(&self, event_id: EventId) -> Result<Vec<Allocation>, LedgerError> {
        let handle = self.registry.get(event_id).await?;
        let entry = handle.read().await;
        let mut roster = entry.allocations.clone();
        roster.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(roster)
    }

    /// All allocations a member has ever made, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::MemberNotFound`] if the id is unknown.
    pub async fn member_allocations(
        &self,
        member_id: MemberId,
    ) -> Result<Vec<Allocation>, LedgerError> {
        // Existence check so unknown ids 404 instead of listing nothing.
        let _ = self.book.get(member_id).await?;
        let mut result = Vec::new();
        for event_id in self.registry.event_ids().await {
            let Ok(handle) = self.registry.get(event_id).await else {
                continue;
            };
            let entry = handle.read().await;
            result.extend(
                entry
                    .allocations
                    .iter()
                    .filter(|a| a.member_id == member_id)
                    .cloned(),
            );
        }
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    /// Claims slot units on an open event.
    ///
    /// Reserve semantics: the claim records a `held` allocation and counts
    /// against both the event's capacity and the member's uncommitted
    /// slots, but appends no ledger entry.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::MemberNotFound`] / [`LedgerError::EventNotFound`]
    ///   on unknown ids.
    /// - [`LedgerError::MemberDeactivated`] for a deactivated member.
    /// - [`LedgerError::LedgerFrozen`] while the member is under review.
    /// - [`LedgerError::EventNotOpen`] unless the event accepts claims.
    /// - [`LedgerError::AlreadyHeld`] when a held or fulfilled allocation
    ///   exists for this member and event.
    /// - [`LedgerError::EventFull`] when capacity cannot cover the claim.
    /// - [`LedgerError::InsufficientBalance`] when uncommitted slots
    ///   cannot cover the claim.
    /// - [`LedgerError::Consistency`] on pre-existing oversell.
    /// - [`LedgerError::StoreUnavailable`] when persistence gives up.
    pub async fn claim(
        &self,
        member_id: MemberId,
        event_id: EventId,
    ) -> Result<Allocation, LedgerError> {
        let member_handle = self.book.get(member_id).await?;
        let event_handle = self.registry.get(event_id).await?;

        let mut member = member_handle.write().await;
        if !member.member.active {
            return Err(LedgerError::MemberDeactivated(member_id));
        }
        if let Some(reason) = member.ledger.frozen_reason() {
            return Err(LedgerError::LedgerFrozen {
                member_id,
                reason: reason.to_string(),
            });
        }

        let mut event = event_handle.write().await;
        if !event.event.status.accepts_claims() {
            return Err(LedgerError::EventNotOpen {
                event_id,
                status: event.event.status.to_string(),
            });
        }
        if event.blocking_allocation(member_id).is_some() {
            return Err(LedgerError::AlreadyHeld {
                member_id,
                event_id,
            });
        }

        let remaining = event.remaining_capacity();
        if remaining < 0 {
            let details = format!(
                "event {event_id} is oversold: committed {} slots against capacity {}",
                event.committed_slots(),
                event.event.capacity
            );
            tracing::error!(%event_id, details, "allocation consistency violation");
            return Err(LedgerError::Consistency {
                member_id: None,
                details,
            });
        }
        let slot_cost = event.event.slot_cost;
        if remaining < i64::from(slot_cost) {
            return Err(LedgerError::EventFull {
                event_id,
                capacity: event.event.capacity,
            });
        }

        let available = member
            .available_slots(self.points.points_per_slot)
            .map_err(|err| {
                report_fold_failure(&self.event_bus, member_id, false, &err);
                err
            })?;
        if available < i64::from(slot_cost) {
            return Err(LedgerError::InsufficientBalance {
                needed: i64::from(slot_cost),
                available,
            });
        }

        let allocation = Allocation::held(member_id, event_id, slot_cost);
        if let Some(store) = &self.store {
            store.insert_allocation(&allocation).await?;
        }
        event.allocations.push(allocation.clone());
        member.add_hold(event_id, slot_cost);
        let remaining_after = event.remaining_capacity();
        drop(event);
        drop(member);

        let _ = self.event_bus.publish(LedgerEvent::SlotClaimed {
            member_id,
            event_id,
            allocation_id: allocation.id,
            slot_cost,
            remaining_capacity: remaining_after,
            timestamp: Utc::now(),
        });

        tracing::info!(
            %member_id,
            %event_id,
            allocation_id = %allocation.id,
            slot_cost,
            remaining = remaining_after,
            "slot claimed"
        );
        Ok(allocation)
    }

    /// Voluntarily releases a held allocation, freeing its slot units.
    ///
    /// Callable at any time before fulfilment, including on closed or
    /// cancelled events. Never writes a ledger entry.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::MemberNotFound`] / [`LedgerError::EventNotFound`]
    ///   on unknown ids.
    /// - [`LedgerError::NoActiveAllocation`] without a held allocation.
    /// - [`LedgerError::StoreUnavailable`] when persistence gives up.
    pub async fn release(
        &self,
        member_id: MemberId,
        event_id: EventId,
    ) -> Result<Allocation, LedgerError> {
        let member_handle = self.book.get(member_id).await?;
        let mut member = member_handle.write().await;
        let released = self.release_held(&mut member, event_id, false).await?;
        released.ok_or(LedgerError::NoActiveAllocation {
            member_id,
            event_id,
        })
    }

    /// Fulfils a held allocation into an issued ticket (admin path).
    ///
    /// Spends `ticket_cost_points × slot_cost` from the ledger and flips
    /// the allocation to its terminal `fulfilled` status; both writes go
    /// to the store in one transaction.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::MemberNotFound`] / [`LedgerError::EventNotFound`]
    ///   on unknown ids.
    /// - [`LedgerError::NoActiveAllocation`] without a held allocation.
    /// - [`LedgerError::LedgerFrozen`] while the member is under review.
    /// - [`LedgerError::InsufficientBalance`] when points no longer cover
    ///   the ticket cost.
    /// - [`LedgerError::StoreUnavailable`] when persistence gives up.
    pub async fn fulfil(
        &self,
        member_id: MemberId,
        event_id: EventId,
    ) -> Result<(Allocation, i64), LedgerError> {
        let member_handle = self.book.get(member_id).await?;
        let event_handle = self.registry.get(event_id).await?;

        let mut member = member_handle.write().await;
        let mut event = event_handle.write().await;

        let Some(held) = event.held_allocation_mut(member_id) else {
            return Err(LedgerError::NoActiveAllocation {
                member_id,
                event_id,
            });
        };
        let allocation_id = held.id;
        let slot_cost = held.slot_cost;

        let cost_points = self
            .points
            .ticket_cost_points
            .checked_mul(i64::from(slot_cost))
            .ok_or_else(|| LedgerError::Internal("ticket cost overflow".to_string()))?;
        let entry = LedgerEntry::new(
            member_id,
            EntryKind::AllocationSpend,
            -cost_points,
            format!("event:{event_id}"),
        );

        let was_frozen = member.ledger.frozen_reason().is_some();
        if let Err(err) = member.ledger.validate(&entry) {
            report_fold_failure(&self.event_bus, member_id, was_frozen, &err);
            return Err(err);
        }

        let now = Utc::now();
        if let Some(store) = &self.store {
            store.fulfil_allocation(&entry, allocation_id, now).await?;
        }

        let recorded = entry.clone();
        member.ledger.apply(entry);
        let new_points = member.ledger.raw_points();
        member.remove_hold(event_id);
        let fulfilled = match event.held_allocation_mut(member_id) {
            Some(allocation) => {
                allocation.fulfil();
                allocation.clone()
            }
            // The hold cannot vanish while both locks are held.
            None => {
                return Err(LedgerError::Internal(
                    "held allocation disappeared during fulfilment".to_string(),
                ));
            }
        };
        drop(event);
        drop(member);

        let _ = self.event_bus.publish(LedgerEvent::SlotFulfilled {
            member_id,
            event_id,
            allocation_id,
            points_spent: cost_points,
            timestamp: now,
        });
        let _ = self.event_bus.publish(LedgerEvent::EntryAppended {
            member_id,
            entry_id: recorded.id,
            kind: recorded.kind,
            points_delta: recorded.points_delta,
            reference: recorded.reference,
            new_points,
            timestamp: now,
        });

        tracing::info!(
            %member_id,
            %event_id,
            allocation_id = %allocation_id,
            points_spent = cost_points,
            new_points,
            "slot fulfilled"
        );
        Ok((fulfilled, new_points))
    }

    /// Transitions an event's lifecycle status.
    ///
    /// Cancellation force-releases every held allocation after the flip;
    /// a voluntary release racing the sweep is tolerated.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::EventNotFound`] if the id is unknown.
    /// - [`LedgerError::InvalidRequest`] on an invalid transition.
    /// - [`LedgerError::StoreUnavailable`] when persistence gives up.
    pub async fn set_event_status(
        &self,
        event_id: EventId,
        to: EventStatus,
    ) -> Result<EventSummary, LedgerError> {
        let handle = self.registry.get(event_id).await?;
        let mut event = handle.write().await;
        let from = event.event.status;
        if !from.can_transition_to(to) {
            return Err(LedgerError::InvalidRequest(format!(
                "cannot transition event from {from} to {to}"
            )));
        }
        if let Some(store) = &self.store {
            store.update_event_status(*event_id.as_uuid(), to).await?;
        }
        event.event.status = to;
        let held_members = if to == EventStatus::Cancelled {
            event.held_member_ids()
        } else {
            Vec::new()
        };
        drop(event);

        let _ = self.event_bus.publish(LedgerEvent::EventStatusChanged {
            event_id,
            from,
            to,
            timestamp: Utc::now(),
        });
        tracing::info!(%event_id, %from, %to, "event status changed");

        for member_id in held_members {
            let Ok(member_handle) = self.book.get(member_id).await else {
                continue;
            };
            let mut member = member_handle.write().await;
            if let Err(err) = self.release_held(&mut member, event_id, true).await {
                tracing::warn!(%member_id, %event_id, error = %err, "forced release failed");
            }
        }

        let entry = handle.read().await;
        Ok(entry.summary())
    }

    /// Force-releases held allocations, newest first, until the member's
    /// holds fit their slot count again.
    ///
    /// Invoked after decay penalties shrink a balance underneath existing
    /// holds. Returns how many allocations were released.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::MemberNotFound`] if the id is unknown.
    /// - [`LedgerError::Consistency`] when the ledger fold is negative.
    /// - [`LedgerError::StoreUnavailable`] when persistence gives up.
    pub async fn reconcile(&self, member_id: MemberId) -> Result<u32, LedgerError> {
        let member_handle = self.book.get(member_id).await?;
        let mut member = member_handle.write().await;
        let mut forced = 0u32;

        loop {
            let was_frozen = member.ledger.frozen_reason().is_some();
            let available = member
                .available_slots(self.points.points_per_slot)
                .map_err(|err| {
                    report_fold_failure(&self.event_bus, member_id, was_frozen, &err);
                    err
                })?;
            if available >= 0 {
                break;
            }

            let Some(event_id) = self.newest_hold(&member).await else {
                tracing::warn!(
                    %member_id,
                    available,
                    "hold index out of step with allocations, stopping reconcile"
                );
                break;
            };
            match self.release_held(&mut member, event_id, true).await? {
                Some(_) => forced += 1,
                None => {
                    // Index said held but the event side disagreed; drop
                    // the stale index entry so the loop can make progress.
                    member.remove_hold(event_id);
                }
            }
        }

        if forced > 0 {
            tracing::info!(%member_id, forced, "over-allocation reconciled");
        }
        Ok(forced)
    }

    /// Force-releases every hold a member has, used on deactivation.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::MemberNotFound`] if the id is unknown.
    /// - [`LedgerError::StoreUnavailable`] when persistence gives up.
    pub async fn release_all_for_member(&self, member_id: MemberId) -> Result<u32, LedgerError> {
        let member_handle = self.book.get(member_id).await?;
        let mut member = member_handle.write().await;
        let mut forced = 0u32;
        for event_id in member.held_event_ids() {
            match self.release_held(&mut member, event_id, true).await? {
                Some(_) => forced += 1,
                None => {
                    member.remove_hold(event_id);
                }
            }
        }
        Ok(forced)
    }

    /// The event id of the member's most recently created hold.
    async fn newest_hold(&self, member: &MemberEntry) -> Option<EventId> {
        let member_id = member.member.id;
        let mut newest: Option<(EventId, chrono::DateTime<Utc>)> = None;
        for event_id in member.held_event_ids() {
            let Ok(handle) = self.registry.get(event_id).await else {
                continue;
            };
            let event = handle.read().await;
            let Some(allocation) = event
                .allocations
                .iter()
                .find(|a| a.member_id == member_id && a.is_held())
            else {
                continue;
            };
            if newest.is_none_or(|(_, at)| allocation.created_at > at) {
                newest = Some((event_id, allocation.created_at));
            }
        }
        newest.map(|(event_id, _)| event_id)
    }

    /// Releases the member's held allocation on one event, if present.
    ///
    /// Caller holds the member write guard; this takes the event lock,
    /// preserving the member → event order. Returns `None` when nothing
    /// was held (races with voluntary releases end up here).
    async fn release_held(
        &self,
        member: &mut MemberEntry,
        event_id: EventId,
        forced: bool,
    ) -> Result<Option<Allocation>, LedgerError> {
        let member_id = member.member.id;
        let event_handle = self.registry.get(event_id).await?;
        let mut event = event_handle.write().await;
        let Some(held) = event.held_allocation_mut(member_id) else {
            return Ok(None);
        };
        let allocation_id = held.id;

        let now = Utc::now();
        if let Some(store) = &self.store {
            store
                .update_allocation_status(allocation_id, AllocationStatus::Released, now)
                .await?;
        }
        let released = match event.held_allocation_mut(member_id) {
            Some(allocation) => {
                allocation.release();
                allocation.clone()
            }
            None => return Ok(None),
        };
        member.remove_hold(event_id);
        drop(event);

        let _ = self.event_bus.publish(LedgerEvent::SlotReleased {
            member_id,
            event_id,
            allocation_id,
            forced,
            timestamp: now,
        });

        tracing::info!(%member_id, %event_id, allocation_id = %allocation_id, forced, "slot released");
        Ok(Some(released))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::Member;

    struct Fixture {
        book: Arc<LedgerBook>,
        coordinator: AllocationCoordinator,
    }

    fn make_fixture() -> Fixture {
        let book = Arc::new(LedgerBook::new());
        let registry = Arc::new(EventRegistry::new());
        let bus = EventBus::new(1000);
        let coordinator = AllocationCoordinator::new(
            Arc::clone(&book),
            registry,
            None,
            bus,
            PointsPolicy::default(),
        );
        Fixture { book, coordinator }
    }

    async fn seed_member(fixture: &Fixture, points: i64) -> MemberId {
        let member_id = MemberId::new();
        let member = Member::new(member_id, "Lindiwe".to_string(), 1000, None);
        let inserted = fixture.book.insert(MemberEntry::new(member)).await;
        assert!(inserted.is_ok());
        if points > 0 {
            let Ok(handle) = fixture.book.get(member_id).await else {
                panic!("member just inserted");
            };
            handle.write().await.ledger.apply(LedgerEntry::new(
                member_id,
                EntryKind::Contribution,
                points,
                format!("seed-{member_id}"),
            ));
        }
        member_id
    }

    async fn open_event(fixture: &Fixture, capacity: u32, slot_cost: u32) -> EventId {
        let event = fixture
            .coordinator
            .open_event("December braai", Utc::now(), capacity, slot_cost)
            .await;
        let Ok(event) = event else {
            panic!("event should open");
        };
        event.id
    }

    #[tokio::test]
    async fn claim_reserves_without_spending() {
        let fixture = make_fixture();
        let member_id = seed_member(&fixture, 500).await;
        let event_id = open_event(&fixture, 10, 1).await;

        let allocation = fixture.coordinator.claim(member_id, event_id).await;
        let Ok(allocation) = allocation else {
            panic!("claim should succeed");
        };
        assert_eq!(allocation.status, AllocationStatus::Held);
        assert_eq!(allocation.slot_cost, 1);

        // Points untouched; the slot is reserved, not spent.
        let Ok(handle) = fixture.book.get(member_id).await else {
            panic!("member exists");
        };
        let mut member = handle.write().await;
        assert_eq!(member.ledger.points(member_id).ok(), Some(500));
        assert_eq!(member.held_slots(), 1);
        assert_eq!(member.available_slots(500).ok(), Some(0));
    }

    #[tokio::test]
    async fn zero_balance_claim_is_rejected() {
        let fixture = make_fixture();
        let member_id = seed_member(&fixture, 0).await;
        let event_id = open_event(&fixture, 10, 1).await;

        let result = fixture.coordinator.claim(member_id, event_id).await;
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientBalance {
                needed: 1,
                available: 0
            })
        ));

        // No allocation record was created.
        let roster = fixture.coordinator.event_allocations(event_id).await;
        assert_eq!(roster.ok().map(|r| r.len()), Some(0));
    }

    #[tokio::test]
    async fn double_claim_is_rejected() {
        let fixture = make_fixture();
        let member_id = seed_member(&fixture, 1000).await;
        let event_id = open_event(&fixture, 10, 1).await;

        assert!(fixture.coordinator.claim(member_id, event_id).await.is_ok());
        let again = fixture.coordinator.claim(member_id, event_id).await;
        assert!(matches!(again, Err(LedgerError::AlreadyHeld { .. })));
    }

    #[tokio::test]
    async fn capacity_is_never_oversold() {
        let fixture = make_fixture();
        let event_id = open_event(&fixture, 1, 1).await;

        let mut handles = Vec::new();
        for _ in 0..32 {
            let member_id = seed_member(&fixture, 500).await;
            let coordinator = fixture.coordinator.clone();
            handles.push(tokio::spawn(async move {
                coordinator.claim(member_id, event_id).await
            }));
        }

        let mut successes = 0;
        let mut full = 0;
        for handle in handles {
            let Ok(result) = handle.await else {
                panic!("claim task panicked");
            };
            match result {
                Ok(_) => successes += 1,
                Err(LedgerError::EventFull { .. }) => full += 1,
                Err(err) => panic!("unexpected claim error: {err}"),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(full, 31);

        let summary = fixture.coordinator.event_summary(event_id).await;
        let Ok(summary) = summary else {
            panic!("event exists");
        };
        assert_eq!(summary.committed_slots, 1);
        assert_eq!(summary.remaining_capacity, 0);
    }

    #[tokio::test]
    async fn release_without_hold_is_an_error() {
        let fixture = make_fixture();
        let member_id = seed_member(&fixture, 500).await;
        let event_id = open_event(&fixture, 5, 1).await;

        let result = fixture.coordinator.release(member_id, event_id).await;
        assert!(matches!(
            result,
            Err(LedgerError::NoActiveAllocation { .. })
        ));
    }

    #[tokio::test]
    async fn release_frees_capacity_and_allows_reclaim() {
        let fixture = make_fixture();
        let member_id = seed_member(&fixture, 500).await;
        let event_id = open_event(&fixture, 1, 1).await;

        assert!(fixture.coordinator.claim(member_id, event_id).await.is_ok());
        let released = fixture.coordinator.release(member_id, event_id).await;
        let Ok(released) = released else {
            panic!("release should succeed");
        };
        assert_eq!(released.status, AllocationStatus::Released);

        // Slots and capacity are both back; a fresh claim succeeds.
        let reclaim = fixture.coordinator.claim(member_id, event_id).await;
        assert!(reclaim.is_ok());
    }

    #[tokio::test]
    async fn fulfilment_spends_ticket_cost() {
        let fixture = make_fixture();
        let member_id = seed_member(&fixture, 500).await;
        let event_id = open_event(&fixture, 10, 1).await;

        assert!(fixture.coordinator.claim(member_id, event_id).await.is_ok());
        let fulfilled = fixture.coordinator.fulfil(member_id, event_id).await;
        let Ok((allocation, new_points)) = fulfilled else {
            panic!("fulfilment should succeed");
        };
        assert_eq!(allocation.status, AllocationStatus::Fulfilled);
        // 500 contributed, 495 spent on the ticket: 5 points remain.
        assert_eq!(new_points, 5);

        // The fulfilled spot still counts against capacity.
        let summary = fixture.coordinator.event_summary(event_id).await;
        let Ok(summary) = summary else {
            panic!("event exists");
        };
        assert_eq!(summary.committed_slots, 1);
        assert_eq!(summary.fulfilled_count, 1);

        // Fulfilled is terminal: neither release nor re-fulfil works.
        let release = fixture.coordinator.release(member_id, event_id).await;
        assert!(matches!(
            release,
            Err(LedgerError::NoActiveAllocation { .. })
        ));
        let again = fixture.coordinator.fulfil(member_id, event_id).await;
        assert!(matches!(again, Err(LedgerError::NoActiveAllocation { .. })));
    }

    #[tokio::test]
    async fn claim_requires_open_event() {
        let fixture = make_fixture();
        let member_id = seed_member(&fixture, 500).await;
        let event_id = open_event(&fixture, 5, 1).await;

        let closed = fixture
            .coordinator
            .set_event_status(event_id, EventStatus::Closed)
            .await;
        assert!(closed.is_ok());

        let result = fixture.coordinator.claim(member_id, event_id).await;
        assert!(matches!(result, Err(LedgerError::EventNotOpen { .. })));

        // Reopening restores claims.
        let reopened = fixture
            .coordinator
            .set_event_status(event_id, EventStatus::Open)
            .await;
        assert!(reopened.is_ok());
        assert!(fixture.coordinator.claim(member_id, event_id).await.is_ok());
    }

    #[tokio::test]
    async fn cancellation_force_releases_holds() {
        let fixture = make_fixture();
        let first = seed_member(&fixture, 500).await;
        let second = seed_member(&fixture, 500).await;
        let event_id = open_event(&fixture, 5, 1).await;

        assert!(fixture.coordinator.claim(first, event_id).await.is_ok());
        assert!(fixture.coordinator.claim(second, event_id).await.is_ok());

        let summary = fixture
            .coordinator
            .set_event_status(event_id, EventStatus::Cancelled)
            .await;
        let Ok(summary) = summary else {
            panic!("cancellation should succeed");
        };
        assert_eq!(summary.status, EventStatus::Cancelled);
        assert_eq!(summary.held_count, 0);
        assert_eq!(summary.committed_slots, 0);

        // Member-side hold indexes are cleared too.
        for member_id in [first, second] {
            let Ok(handle) = fixture.book.get(member_id).await else {
                panic!("member exists");
            };
            assert_eq!(handle.read().await.held_slots(), 0);
        }
    }

    #[tokio::test]
    async fn invalid_status_transitions_are_rejected() {
        let fixture = make_fixture();
        let event_id = open_event(&fixture, 5, 1).await;

        let done = fixture
            .coordinator
            .set_event_status(event_id, EventStatus::Completed)
            .await;
        assert!(matches!(done, Err(LedgerError::InvalidRequest(_))));

        let cancelled = fixture
            .coordinator
            .set_event_status(event_id, EventStatus::Cancelled)
            .await;
        assert!(cancelled.is_ok());
        let revived = fixture
            .coordinator
            .set_event_status(event_id, EventStatus::Open)
            .await;
        assert!(matches!(revived, Err(LedgerError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn reconcile_releases_newest_hold_first() {
        let fixture = make_fixture();
        // Two slots' worth of points, then two single-slot holds.
        let member_id = seed_member(&fixture, 1000).await;
        let older = open_event(&fixture, 5, 1).await;
        let newer = open_event(&fixture, 5, 1).await;

        assert!(fixture.coordinator.claim(member_id, older).await.is_ok());
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(fixture.coordinator.claim(member_id, newer).await.is_ok());

        // A penalty drops the balance to one slot's worth.
        {
            let Ok(handle) = fixture.book.get(member_id).await else {
                panic!("member exists");
            };
            handle.write().await.ledger.apply(LedgerEntry::new(
                member_id,
                EntryKind::DecayPenalty,
                -500,
                "decay:2026-08-01".to_string(),
            ));
        }

        let forced = fixture.coordinator.reconcile(member_id).await;
        assert_eq!(forced.ok(), Some(1));

        // The newer hold went; the older one survives.
        let Ok(handle) = fixture.book.get(member_id).await else {
            panic!("member exists");
        };
        let member = handle.read().await;
        assert!(member.has_hold(older));
        assert!(!member.has_hold(newer));
    }

    #[tokio::test]
    async fn deactivated_member_cannot_claim() {
        let fixture = make_fixture();
        let member_id = seed_member(&fixture, 500).await;
        let event_id = open_event(&fixture, 5, 1).await;
        {
            let Ok(handle) = fixture.book.get(member_id).await else {
                panic!("member exists");
            };
            handle.write().await.member.active = false;
        }

        let result = fixture.coordinator.claim(member_id, event_id).await;
        assert!(matches!(result, Err(LedgerError::MemberDeactivated(_))));
    }

    #[tokio::test]
    async fn slot_cost_cannot_exceed_capacity() {
        let fixture = make_fixture();
        let result = fixture
            .coordinator
            .open_event("Big spender", Utc::now(), 2, 3)
            .await;
        assert!(matches!(result, Err(LedgerError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn multi_slot_claims_count_full_cost() {
        let fixture = make_fixture();
        // 1500 points = 3 slots; a 2-slot-cost event claim holds 2.
        let member_id = seed_member(&fixture, 1500).await;
        let event_id = open_event(&fixture, 4, 2).await;

        let claimed = fixture.coordinator.claim(member_id, event_id).await;
        assert!(claimed.is_ok());

        let Ok(handle) = fixture.book.get(member_id).await else {
            panic!("member exists");
        };
        let mut member = handle.write().await;
        assert_eq!(member.held_slots(), 2);
        assert_eq!(member.available_slots(500).ok(), Some(1));
        drop(member);

        // A second member with one slot cannot afford the 2-slot cost.
        let poor = seed_member(&fixture, 500).await;
        let result = fixture.coordinator.claim(poor, event_id).await;
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientBalance {
                needed: 2,
                available: 1
            })
        ));
    }
}
