//! Per-neighbor FIFO queues over one shared capacity
//!
//! Each known neighbor owns a FIFO chain of entries. All chains draw their entries from one free
//! list of `Q` entries, so a busy neighbor can use the whole capacity while idle neighbors cost
//! nothing. Pushing onto a full manager tail-drops the new value.

use crate::core::ShortAddress;
use crate::utils::MultiClassQueue;

/// Reference to a neighbor table entry
///
/// A handle goes stale once its neighbor is erased. Operations on a stale handle panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NeighborHandle {
    index: u8,
    generation: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NeighborTableFull;

#[derive(Default)]
struct Neighbor {
    address: Option<ShortAddress>,
    generation: u16,
    len: usize,
}

/// Neighbor table with `K` entries and `Q` shared queue entries
pub struct NeighborQueues<T, const K: usize, const Q: usize> {
    neighbors: [Neighbor; K],
    chains: MultiClassQueue<K, Q>,
    values: [Option<T>; Q],
    count: usize,
}

impl<T, const K: usize, const Q: usize> NeighborQueues<T, K, Q> {
    pub fn new() -> Self {
        Self {
            neighbors: core::array::from_fn(|_| Neighbor::default()),
            chains: MultiClassQueue::new(),
            values: core::array::from_fn(|_| None),
            count: 0,
        }
    }

    /// Returns the handle of `address`, registering the neighbor if it is unknown.
    pub fn add_neighbor(
        &mut self,
        address: ShortAddress,
    ) -> Result<NeighborHandle, NeighborTableFull> {
        if let Some(handle) = self.find_by_address(address) {
            return Ok(handle);
        }

        let (index, neighbor) = self
            .neighbors
            .iter_mut()
            .enumerate()
            .find(|(_, neighbor)| neighbor.address.is_none())
            .ok_or(NeighborTableFull)?;
        neighbor.address = Some(address);
        neighbor.len = 0;
        self.count += 1;

        debug!("Neighbor {} added", address.into_u16());
        Ok(NeighborHandle {
            index: unwrap!(u8::try_from(index)),
            generation: neighbor.generation,
        })
    }

    /// Removes a neighbor and hands its queued values to `discard`.
    pub fn erase_neighbor(&mut self, handle: NeighborHandle, discard: impl FnMut(T)) {
        self.checked_neighbor(handle);
        self.drain(handle.index, false, discard);

        let neighbor = self.checked_neighbor_mut(handle);
        let address = neighbor.address.take();
        neighbor.generation = neighbor.generation.wrapping_add(1);
        self.count -= 1;
        if let Some(address) = address {
            debug!("Neighbor {} erased", address.into_u16());
        }
    }

    pub fn find_by_address(&self, address: ShortAddress) -> Option<NeighborHandle> {
        self.neighbors
            .iter()
            .enumerate()
            .find(|(_, neighbor)| neighbor.address == Some(address))
            .map(|(index, neighbor)| NeighborHandle {
                index: index as u8,
                generation: neighbor.generation,
            })
    }

    pub fn address(&self, handle: NeighborHandle) -> ShortAddress {
        unwrap!(self.checked_neighbor(handle).address)
    }

    /// Appends a value to the neighbor queue.
    ///
    /// Returns the value back when the shared capacity is exhausted.
    pub fn push_back(&mut self, handle: NeighborHandle, value: T) -> Result<(), T> {
        self.checked_neighbor(handle);
        let Some(entry) = self.chains.allocate() else {
            return Err(value);
        };

        self.values[usize::from(entry)] = Some(value);
        self.chains.push_back(handle.index, entry);
        self.neighbors[usize::from(handle.index)].len += 1;
        Ok(())
    }

    /// Removes the oldest value of the neighbor queue. Its entry is free for any neighbor.
    pub fn pop_front(&mut self, handle: NeighborHandle) -> Option<T> {
        self.checked_neighbor(handle);
        let entry = self.chains.front(handle.index)?;
        Some(self.release_entry(handle.index, entry))
    }

    pub fn front(&self, handle: NeighborHandle) -> Option<&T> {
        self.checked_neighbor(handle);
        let entry = self.chains.front(handle.index)?;
        self.values[usize::from(entry)].as_ref()
    }

    pub fn is_queue_empty(&self, handle: NeighborHandle) -> bool {
        self.packets_in_queue(handle) == 0
    }

    pub fn packets_in_queue(&self, handle: NeighborHandle) -> usize {
        self.checked_neighbor(handle).len
    }

    pub fn num_neighbors(&self) -> usize {
        self.count
    }

    /// Number of entries still available to all neighbors
    pub fn free_capacity(&self) -> usize {
        self.chains.free_count()
    }

    /// Empties every queue, except for the front values if `keep_front` is set.
    pub fn flush_queues(&mut self, keep_front: bool, mut discard: impl FnMut(T)) {
        for index in 0..K {
            if self.neighbors[index].address.is_some() {
                self.drain(index as u8, keep_front, &mut discard);
            }
        }
    }

    /// Next neighbor after `after` with a non-empty queue, in table order and wrapping around
    ///
    /// `after` itself is considered last, so a single busy neighbor is found again.
    pub fn next_ready(&self, after: Option<NeighborHandle>) -> Option<NeighborHandle> {
        let start = after.map_or(0, |handle| usize::from(handle.index) + 1);
        (0..K)
            .map(|offset| (start + offset) % K)
            .find(|&index| {
                let neighbor = &self.neighbors[index];
                neighbor.address.is_some() && neighbor.len > 0
            })
            .map(|index| NeighborHandle {
                index: index as u8,
                generation: self.neighbors[index].generation,
            })
    }

    fn drain(&mut self, class: u8, keep_front: bool, mut discard: impl FnMut(T)) {
        let mut next = self.chains.front(class);
        if keep_front {
            next = next.and_then(|entry| self.chains.next(entry));
        }
        while let Some(entry) = next {
            next = self.chains.next(entry);
            discard(self.release_entry(class, entry));
        }
    }

    fn release_entry(&mut self, class: u8, entry: u8) -> T {
        self.chains.release(entry);
        self.neighbors[usize::from(class)].len -= 1;
        unwrap!(self.values[usize::from(entry)].take())
    }

    fn checked_neighbor(&self, handle: NeighborHandle) -> &Neighbor {
        let neighbor = &self.neighbors[usize::from(handle.index)];
        assert!(
            neighbor.address.is_some() && neighbor.generation == handle.generation,
            "stale neighbor handle"
        );
        neighbor
    }

    fn checked_neighbor_mut(&mut self, handle: NeighborHandle) -> &mut Neighbor {
        let neighbor = &mut self.neighbors[usize::from(handle.index)];
        assert!(
            neighbor.address.is_some() && neighbor.generation == handle.generation,
            "stale neighbor handle"
        );
        neighbor
    }
}

impl<T, const K: usize, const Q: usize> Default for NeighborQueues<T, K, Q> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use std::vec::Vec;

    const A: ShortAddress = ShortAddress::new(0x0a);
    const B: ShortAddress = ShortAddress::new(0x0b);
    const C: ShortAddress = ShortAddress::new(0x0c);

    fn drain_all<const K: usize, const Q: usize>(
        queues: &mut NeighborQueues<u32, K, Q>,
        handle: NeighborHandle,
    ) -> Vec<u32> {
        core::iter::from_fn(|| queues.pop_front(handle)).collect()
    }

    #[test]
    fn test_cross_neighbor_reuse() {
        let mut queues = NeighborQueues::<u32, 2, 4>::new();
        let a = queues.add_neighbor(A).unwrap();
        let b = queues.add_neighbor(B).unwrap();

        queues.push_back(a, 100).unwrap();
        for value in 0..3 {
            queues.push_back(b, value).unwrap();
        }
        assert_eq!(queues.pop_front(a), Some(100));
        assert_eq!(queues.pop_front(a), None);

        // Takes over the entry freed by the pop
        queues.push_back(b, 10).unwrap();
        assert_eq!(queues.push_back(b, 11), Err(11));
        assert_eq!(drain_all(&mut queues, b), [0, 1, 2, 10]);

        queues.push_back(b, 20).unwrap();
        queues.push_back(b, 21).unwrap();
        assert_eq!(queues.pop_front(b), Some(20));
        assert_eq!(queues.pop_front(b), Some(21));
        assert_eq!(queues.pop_front(b), None);
        assert!(queues.is_queue_empty(a));
    }

    #[test]
    fn test_interleaved_order() {
        let mut queues = NeighborQueues::<u32, 3, 6>::new();
        let handles = [A, B, C].map(|address| queues.add_neighbor(address).unwrap());
        for value in 0..6 {
            queues.push_back(handles[value as usize % 3], value).unwrap();
        }
        assert_eq!(queues.packets_in_queue(handles[1]), 2);
        assert_eq!(drain_all(&mut queues, handles[2]), [2, 5]);
        queues.push_back(handles[0], 6).unwrap();
        assert_eq!(drain_all(&mut queues, handles[0]), [0, 3, 6]);
        assert_eq!(drain_all(&mut queues, handles[1]), [1, 4]);
        assert_eq!(queues.free_capacity(), 6);
    }

    #[test]
    fn test_tail_drop() {
        let mut queues = NeighborQueues::<u32, 2, 4>::new();
        let a = queues.add_neighbor(A).unwrap();
        let b = queues.add_neighbor(B).unwrap();
        for value in 0..3 {
            queues.push_back(a, value).unwrap();
        }
        queues.push_back(b, 3).unwrap();
        assert_eq!(queues.push_back(a, 4), Err(4));
        assert_eq!(queues.push_back(b, 5), Err(5));

        assert_eq!(drain_all(&mut queues, a), [0, 1, 2]);
        assert_eq!(drain_all(&mut queues, b), [3]);
    }

    #[test]
    fn test_tail_drop_single_neighbor() {
        let mut queues = NeighborQueues::<u32, 2, 4>::new();
        let a = queues.add_neighbor(A).unwrap();
        for value in 0..4 {
            queues.push_back(a, value).unwrap();
        }
        assert_eq!(queues.push_back(a, 4), Err(4));
        assert_eq!(queues.packets_in_queue(a), 4);
        assert_eq!(queues.free_capacity(), 0);
        assert_eq!(drain_all(&mut queues, a), [0, 1, 2, 3]);
    }

    #[test]
    fn test_flush_full_queue() {
        let mut queues = NeighborQueues::<u32, 2, 4>::new();
        let a = queues.add_neighbor(A).unwrap();
        for value in 0..4 {
            queues.push_back(a, value).unwrap();
        }
        let mut discarded = Vec::new();
        queues.flush_queues(true, |value| discarded.push(value));
        assert_eq!(discarded, [1, 2, 3]);
        assert_eq!(queues.pop_front(a), Some(0));
        assert_eq!(queues.pop_front(a), None);

        for value in 10..14 {
            queues.push_back(a, value).unwrap();
        }
        discarded.clear();
        queues.flush_queues(false, |value| discarded.push(value));
        assert_eq!(discarded, [10, 11, 12, 13]);
        assert_eq!(queues.packets_in_queue(a), 0);
        assert_eq!(queues.pop_front(a), None);
        assert_eq!(queues.free_capacity(), 4);
    }

    #[test]
    fn test_flush_queues() {
        let mut queues = NeighborQueues::<u32, 2, 8>::new();
        let a = queues.add_neighbor(A).unwrap();
        let b = queues.add_neighbor(B).unwrap();
        for value in 0..3 {
            queues.push_back(a, value).unwrap();
            queues.push_back(b, 10 + value).unwrap();
        }

        let mut discarded = Vec::new();
        queues.flush_queues(true, |value| discarded.push(value));
        discarded.sort();
        assert_eq!(discarded, [1, 2, 11, 12]);
        assert_eq!(queues.packets_in_queue(a), 1);
        assert_eq!(queues.front(b), Some(&10));

        discarded.clear();
        queues.flush_queues(false, |value| discarded.push(value));
        discarded.sort();
        assert_eq!(discarded, [0, 10]);
        assert!(queues.is_queue_empty(a));
        assert!(queues.is_queue_empty(b));
        assert_eq!(queues.free_capacity(), 8);
        assert_eq!(queues.num_neighbors(), 2);
    }

    #[test]
    fn test_neighbor_table() {
        let mut queues = NeighborQueues::<u32, 2, 4>::new();
        let a = queues.add_neighbor(A).unwrap();
        assert_eq!(queues.add_neighbor(A), Ok(a));
        let b = queues.add_neighbor(B).unwrap();
        assert_eq!(queues.add_neighbor(C), Err(NeighborTableFull));
        assert_eq!(queues.find_by_address(B), Some(b));
        assert_eq!(queues.address(b), B);

        queues.push_back(a, 1).unwrap();
        queues.push_back(a, 2).unwrap();
        let mut discarded = Vec::new();
        queues.erase_neighbor(a, |value| discarded.push(value));
        assert_eq!(discarded, [1, 2]);
        assert_eq!(queues.num_neighbors(), 1);
        assert_eq!(queues.find_by_address(A), None);

        let c = queues.add_neighbor(C).unwrap();
        assert_ne!(c, a);
        assert_eq!(queues.free_capacity(), 4);
    }

    #[test]
    #[should_panic]
    fn test_stale_handle() {
        let mut queues = NeighborQueues::<u32, 1, 1>::new();
        let a = queues.add_neighbor(A).unwrap();
        queues.erase_neighbor(a, |_| ());
        let _ = queues.add_neighbor(B).unwrap();
        let _ = queues.push_back(a, 1);
    }

    #[test]
    fn test_round_robin() {
        let mut queues = NeighborQueues::<u32, 3, 6>::new();
        let a = queues.add_neighbor(A).unwrap();
        let b = queues.add_neighbor(B).unwrap();
        let c = queues.add_neighbor(C).unwrap();
        assert_eq!(queues.next_ready(None), None);

        queues.push_back(a, 0).unwrap();
        queues.push_back(c, 1).unwrap();
        assert_eq!(queues.next_ready(None), Some(a));
        assert_eq!(queues.next_ready(Some(a)), Some(c));
        assert_eq!(queues.next_ready(Some(c)), Some(a));
        assert_eq!(queues.next_ready(Some(b)), Some(c));

        queues.pop_front(a);
        assert_eq!(queues.next_ready(Some(c)), Some(c));
    }
}
