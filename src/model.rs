//! Tickets, orders and parcels.

use heapless::LinearMap;

use crate::config::{BREAD_TYPES, MAX_BREAD_TYPES};

/// Backend-issued ticket identifier.
pub type TicketId = u32;

/// Backend-issued bread type identifier.
pub type BreadTypeId = u16;

/// Per-slot bread counts, in display order.
pub type BreadCounts = [u8; BREAD_TYPES];

/// Bread type → count, as the backend speaks about orders.
pub type BreadRequirements = LinearMap<BreadTypeId, u8, MAX_BREAD_TYPES>;

pub fn total(counts: &BreadCounts) -> u16 {
    counts.iter().map(|&c| u16::from(c)).sum()
}

/// Where a ticket is in its life. Only moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TicketLifecycle {
    Queued,
    CookingWait,
    ReadyToScan,
    Served,
    Skipped,
}

impl TicketLifecycle {
    fn rank(self) -> u8 {
        match self {
            TicketLifecycle::Queued => 0,
            TicketLifecycle::CookingWait => 1,
            TicketLifecycle::ReadyToScan => 2,
            TicketLifecycle::Served | TicketLifecycle::Skipped => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 3
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ticket {
    pub id: TicketId,
    pub requirements: BreadRequirements,
    lifecycle: TicketLifecycle,
}

impl Ticket {
    pub fn new(id: TicketId, requirements: BreadRequirements) -> Self {
        Self {
            id,
            requirements,
            lifecycle: TicketLifecycle::Queued,
        }
    }

    pub fn lifecycle(&self) -> TicketLifecycle {
        self.lifecycle
    }

    /// Move to `next`. Backward moves, repeats and anything after a
    /// terminal state are refused and leave the ticket untouched.
    pub fn advance(&mut self, next: TicketLifecycle) -> bool {
        if self.lifecycle.is_terminal() || next.rank() <= self.lifecycle.rank() {
            return false;
        }
        self.lifecycle = next;
        true
    }
}

/// Counts the customer is building on the key matrix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PendingOrder {
    counts: BreadCounts,
}

impl PendingOrder {
    pub const fn new() -> Self {
        Self {
            counts: [0; BREAD_TYPES],
        }
    }

    pub fn counts(&self) -> BreadCounts {
        self.counts
    }

    pub fn total(&self) -> u16 {
        total(&self.counts)
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Add one of `slot`. No-op (returns `false`) when the slot or the whole
    /// order is at its limit, or the slot does not exist.
    pub fn increment(&mut self, slot: usize, max_per_type: u8, max_total: u8) -> bool {
        let Some(count) = self.counts.get(slot).copied() else {
            return false;
        };
        if count >= max_per_type || self.total() >= u16::from(max_total) {
            return false;
        }
        self.counts[slot] = count + 1;
        true
    }

    /// Remove one of `slot`. No-op at zero.
    pub fn decrement(&mut self, slot: usize) -> bool {
        match self.counts.get_mut(slot) {
            Some(count) if *count > 0 => {
                *count -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.counts = [0; BREAD_TYPES];
    }
}

/// Bread handed to a customer, waiting for the baker's acknowledgment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeliveryParcel {
    pub counts: BreadCounts,
    pub pending: bool,
}

impl DeliveryParcel {
    pub const fn empty() -> Self {
        Self {
            counts: [0; BREAD_TYPES],
            pending: false,
        }
    }

    /// Pending with something to show.
    pub fn is_showing(&self) -> bool {
        self.pending && total(&self.counts) > 0
    }

    pub fn clear(&mut self) {
        *self = Self::empty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MAX_PER_TYPE, MAX_TOTAL};

    #[test]
    fn lifecycle_moves_forward_only() {
        let mut t = Ticket::new(7, BreadRequirements::new());
        assert!(t.advance(TicketLifecycle::CookingWait));
        assert!(!t.advance(TicketLifecycle::Queued));
        assert!(!t.advance(TicketLifecycle::CookingWait));
        assert!(t.advance(TicketLifecycle::ReadyToScan));
        assert!(t.advance(TicketLifecycle::Served));
        assert!(!t.advance(TicketLifecycle::Skipped));
        assert_eq!(t.lifecycle(), TicketLifecycle::Served);
    }

    #[test]
    fn lifecycle_may_skip_intermediate_states() {
        let mut t = Ticket::new(7, BreadRequirements::new());
        assert!(t.advance(TicketLifecycle::ReadyToScan));
        assert!(t.advance(TicketLifecycle::Skipped));
        assert!(t.lifecycle().is_terminal());
    }

    #[test]
    fn order_respects_total_limit() {
        let mut order = PendingOrder::new();
        for _ in 0..MAX_TOTAL {
            assert!(order.increment(0, MAX_PER_TYPE, MAX_TOTAL));
        }
        assert!(!order.increment(1, MAX_PER_TYPE, MAX_TOTAL));
        assert_eq!(order.total(), u16::from(MAX_TOTAL));
    }

    #[test]
    fn order_respects_per_type_limit() {
        let mut order = PendingOrder::new();
        assert!(order.increment(2, 2, 5));
        assert!(order.increment(2, 2, 5));
        assert!(!order.increment(2, 2, 5));
        assert!(order.increment(1, 2, 5));
        assert_eq!(order.counts(), [0, 1, 2]);
    }

    #[test]
    fn order_ignores_unknown_slot_and_underflow() {
        let mut order = PendingOrder::new();
        assert!(!order.increment(BREAD_TYPES, MAX_PER_TYPE, MAX_TOTAL));
        assert!(!order.decrement(0));
        assert!(!order.decrement(BREAD_TYPES));
        assert!(order.is_empty());
    }

    #[test]
    fn arbitrary_sequences_stay_in_bounds() {
        // Deterministic pseudo-random walk over increments and decrements.
        let mut order = PendingOrder::new();
        let mut seed: u32 = 0x2545_f491;
        for _ in 0..2_000 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let slot = (seed % BREAD_TYPES as u32) as usize;
            if seed & 0x100 == 0 {
                order.increment(slot, 3, MAX_TOTAL);
            } else {
                order.decrement(slot);
            }
            assert!(order.counts().iter().all(|&c| c <= 3));
            assert!(order.total() <= u16::from(MAX_TOTAL));
        }
    }

    #[test]
    fn parcel_showing_needs_pending_and_counts() {
        let mut parcel = DeliveryParcel::empty();
        assert!(!parcel.is_showing());
        parcel.pending = true;
        assert!(!parcel.is_showing());
        parcel.counts = [1, 0, 0];
        assert!(parcel.is_showing());
        parcel.clear();
        assert_eq!(parcel, DeliveryParcel::empty());
    }
}
