//! Fixed-capacity pool of in-flight frame buffers
//!
//! Every frame the MAC handles lives in one pool slot from the moment it is submitted (or
//! received) until its completion (or delivery). Slots are addressed by move-only [`PoolSlot`]
//! handles carrying a generation, so a handle can be released exactly once and a stale handle is
//! caught before it touches a reused buffer.

use core::cell::RefCell;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::frame::Psdu;
use crate::utils::MultiClassQueue;

/// Exclusive handle of an acquired pool slot
///
/// The handle is neither `Clone` nor `Copy`. Returning it to [`MessagePool::release`] consumes it.
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[must_use]
pub struct PoolSlot {
    index: u8,
    generation: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PoolExhausted;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PoolError {
    /// All slots are in use
    Exhausted,
    /// The data does not fit into a PHY frame
    TooLong,
}

impl From<PoolExhausted> for PoolError {
    fn from(_: PoolExhausted) -> Self {
        PoolError::Exhausted
    }
}

struct Slot {
    generation: u16,
    live: bool,
    psdu: Psdu,
}

pub struct MessagePool<const N: usize> {
    slots: [Slot; N],
    free: MultiClassQueue<0, N>,
    live: usize,
}

impl<const N: usize> MessagePool<N> {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| Slot {
                generation: 0,
                live: false,
                psdu: Psdu::new_empty(),
            }),
            free: MultiClassQueue::new(),
            live: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of acquired slots
    pub fn live(&self) -> usize {
        self.live
    }

    /// Takes an empty slot. Never blocks.
    pub fn acquire(&mut self) -> Result<PoolSlot, PoolExhausted> {
        let index = self.free.allocate().ok_or(PoolExhausted)?;
        let slot = &mut self.slots[usize::from(index)];
        assert!(!slot.live);
        slot.live = true;
        self.live += 1;
        assert!(self.live <= N);

        trace!("Pool: acquired slot {}, {} live", index, self.live);
        Ok(PoolSlot {
            index,
            generation: slot.generation,
        })
    }

    /// Takes a slot and fills it with `data`.
    ///
    /// Oversized data is rejected without consuming a slot.
    pub fn acquire_loaded(&mut self, data: &[u8]) -> Result<PoolSlot, PoolError> {
        if data.len() > Psdu::MAX {
            return Err(PoolError::TooLong);
        }
        let slot = self.acquire()?;
        unwrap!(self.get_mut(&slot).extend_from_slice(data));
        Ok(slot)
    }

    /// Returns a slot to the pool. The buffer is reset before it can be acquired again.
    ///
    /// Panics on a handle that does not refer to a live slot of this pool.
    pub fn release(&mut self, handle: PoolSlot) {
        let slot = self.checked_slot(&handle);
        slot.live = false;
        slot.generation = slot.generation.wrapping_add(1);
        slot.psdu = Psdu::new_empty();

        self.free.release(handle.index);
        assert!(self.live > 0);
        self.live -= 1;
        trace!("Pool: released slot {}, {} live", handle.index, self.live);
    }

    pub fn get(&self, handle: &PoolSlot) -> &Psdu {
        let slot = &self.slots[usize::from(handle.index)];
        assert!(slot.live && slot.generation == handle.generation, "stale pool slot");
        &slot.psdu
    }

    pub fn get_mut(&mut self, handle: &PoolSlot) -> &mut Psdu {
        &mut self.checked_slot(handle).psdu
    }

    fn checked_slot(&mut self, handle: &PoolSlot) -> &mut Slot {
        assert!(usize::from(handle.index) < N, "foreign pool slot");
        let slot = &mut self.slots[usize::from(handle.index)];
        assert!(slot.live, "pool slot is not in use");
        assert!(slot.generation == handle.generation, "stale pool slot");
        slot
    }
}

impl<const N: usize> Default for MessagePool<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Message pool reachable from interrupt and task context
///
/// Every operation runs in one short critical section of the raw mutex `M`.
pub struct SharedPool<M: RawMutex, const N: usize> {
    inner: Mutex<M, RefCell<MessagePool<N>>>,
}

impl<M: RawMutex, const N: usize> SharedPool<M, N> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(MessagePool::new())),
        }
    }

    pub fn lock<R>(&self, f: impl FnOnce(&mut MessagePool<N>) -> R) -> R {
        self.inner.lock(|pool| f(&mut pool.borrow_mut()))
    }

    pub fn acquire(&self) -> Result<PoolSlot, PoolExhausted> {
        self.lock(|pool| pool.acquire())
    }

    pub fn acquire_loaded(&self, data: &[u8]) -> Result<PoolSlot, PoolError> {
        self.lock(|pool| pool.acquire_loaded(data))
    }

    pub fn release(&self, slot: PoolSlot) {
        self.lock(|pool| pool.release(slot))
    }

    /// Copies the frame out of the pool.
    pub fn read(&self, slot: &PoolSlot) -> Psdu {
        self.lock(|pool| *pool.get(slot))
    }

    pub fn live(&self) -> usize {
        self.lock(|pool| pool.live())
    }
}

impl<M: RawMutex, const N: usize> Default for SharedPool<M, N> {
    fn default() -> Self {
        Self::new()
    }
}
