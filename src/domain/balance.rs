//! Derived point balance and slot count.
//!
//! A [`Balance`] is always computed by folding a member's ledger entries;
//! it is cached per member as a read optimization and invalidated on every
//! append, never stored as an independently settable field.

use serde::Serialize;
use utoipa::ToSchema;

use super::MemberId;

/// A member's projected balance at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Balance {
    /// Member this balance belongs to.
    pub member_id: MemberId,
    /// Folded points total. Never negative — a negative fold is a fatal
    /// consistency error upstream, not a clamped value here.
    pub points: i64,
    /// Whole slots derived from points: `floor(points / points_per_slot)`.
    pub slots: u32,
}

impl Balance {
    /// Derives a balance from a non-negative points total.
    ///
    /// `points_per_slot` comes from [`crate::config::PointsPolicy`]; the
    /// default club rule is 500 points per slot.
    #[must_use]
    pub fn from_points(member_id: MemberId, points: i64, points_per_slot: i64) -> Self {
        let slots = if points_per_slot > 0 && points >= 0 {
            u32::try_from(points / points_per_slot).unwrap_or(u32::MAX)
        } else {
            0
        };
        Self {
            member_id,
            points,
            slots,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_floor_of_points_over_rate() {
        let id = MemberId::new();
        assert_eq!(Balance::from_points(id, 0, 500).slots, 0);
        assert_eq!(Balance::from_points(id, 499, 500).slots, 0);
        assert_eq!(Balance::from_points(id, 500, 500).slots, 1);
        assert_eq!(Balance::from_points(id, 999, 500).slots, 1);
        assert_eq!(Balance::from_points(id, 1000, 500).slots, 2);
        assert_eq!(Balance::from_points(id, 2605, 500).slots, 5);
    }

    #[test]
    fn five_points_after_fulfilment_is_zero_slots() {
        // 500 contributed, 495 spent on a ticket: 5 points, no slot.
        let balance = Balance::from_points(MemberId::new(), 5, 500);
        assert_eq!(balance.points, 5);
        assert_eq!(balance.slots, 0);
    }

    #[test]
    fn alternate_rate_is_respected() {
        let balance = Balance::from_points(MemberId::new(), 1000, 250);
        assert_eq!(balance.slots, 4);
    }
}
