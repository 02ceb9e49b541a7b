//! Guaranteed time slot table of the DSME extension
//!
//! Slots of all superframes of a multi-superframe are numbered consecutively:
//! `slot = superframe * slots_per_superframe + slot_in_superframe`. Slot negotiation itself
//! (GTS request/reply/notify commands) happens outside this crate and reports its results here.

use heapless::Vec;

use crate::slot_bitmap::SlotBitmap;

/// Slot table with room for `32 * W` slots
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GtsSlots<const W: usize> {
    slots_per_superframe: usize,
    /// Slots in use anywhere in the neighborhood, as announced by neighbors
    occupied: SlotBitmap<W>,
    /// Slots allocated to this node
    allocated: SlotBitmap<W>,
}

impl<const W: usize> GtsSlots<W> {
    /// Creates an empty table. The total slot count is clamped to the bitmap capacity.
    pub fn new(slots_per_superframe: usize, superframes: usize) -> Self {
        let length = slots_per_superframe.saturating_mul(superframes);
        Self {
            slots_per_superframe,
            occupied: SlotBitmap::with_length(length, false),
            allocated: SlotBitmap::with_length(length, false),
        }
    }

    pub fn len(&self) -> usize {
        self.allocated.length()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slot number of `slot_in_superframe` within `superframe`
    pub fn slot(&self, superframe: usize, slot_in_superframe: usize) -> usize {
        superframe * self.slots_per_superframe + slot_in_superframe
    }

    pub fn occupied(&self) -> &SlotBitmap<W> {
        &self.occupied
    }

    pub fn allocated(&self) -> &SlotBitmap<W> {
        &self.allocated
    }

    /// Up to `N` slots that are neither occupied nor allocated, lowest first
    pub fn find_free<const N: usize>(&self) -> Vec<usize, N> {
        let mut busy = self.occupied;
        busy.set_operation_join(&self.allocated, 0);
        busy.unset_bits().take(N).collect()
    }

    pub fn allocate<const MW: usize>(&mut self, mask: &SlotBitmap<MW>, offset: usize) {
        self.allocated.set_operation_join(mask, offset);
        debug!("GTS: {} slots allocated", self.allocated.count(true));
    }

    pub fn deallocate<const MW: usize>(&mut self, mask: &SlotBitmap<MW>, offset: usize) {
        self.allocated.set_operation_complement(mask, offset);
        debug!("GTS: {} slots allocated", self.allocated.count(true));
    }

    pub fn mark_occupied<const MW: usize>(&mut self, mask: &SlotBitmap<MW>, offset: usize) {
        self.occupied.set_operation_join(mask, offset);
    }

    pub fn release_occupied<const MW: usize>(&mut self, mask: &SlotBitmap<MW>, offset: usize) {
        self.occupied.set_operation_complement(mask, offset);
    }

    /// Whether this node may transmit data in `slot`
    pub fn is_allocated(&self, slot: usize) -> bool {
        self.allocated.get(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_free() {
        let mut slots = GtsSlots::<2>::new(7, 4);
        assert_eq!(slots.len(), 28);

        let mut neighbors = SlotBitmap::<1>::with_length(3, true);
        slots.mark_occupied(&neighbors, slots.slot(0, 0));
        let mut own = SlotBitmap::<1>::with_length(2, true);
        own.set(1, false);
        slots.allocate(&own, slots.slot(0, 4));

        let free = slots.find_free::<4>();
        assert_eq!(&free[..], &[3, 5, 6, 7]);
        assert!(slots.is_allocated(4));
        assert!(!slots.is_allocated(5));

        neighbors.set(0, false);
        slots.release_occupied(&neighbors, 0);
        assert_eq!(&slots.find_free::<2>()[..], &[1, 2]);
        assert_eq!(slots.occupied().count(true), 1);
    }

    #[test]
    fn test_deallocate() {
        let mut slots = GtsSlots::<1>::new(16, 2);
        let mask = SlotBitmap::<1>::with_length(4, true);
        slots.allocate(&mask, slots.slot(1, 0));
        assert_eq!(slots.allocated().count(true), 4);
        assert!(slots.is_allocated(16));

        slots.deallocate(&mask, 16);
        assert!(slots.allocated().is_zero());
        assert_eq!(slots.find_free::<32>().len(), 32);

        // Clamped to the bitmap capacity
        let slots = GtsSlots::<1>::new(16, 4);
        assert_eq!(slots.len(), 32);
    }
}
