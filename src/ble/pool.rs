//! Connection pool - fixed-capacity table of peer slots.
//!
//! A slot is bound to a link handle when the radio reports a successful
//! connect and unbound only when the matching disconnect arrives.  The
//! pool never queues: when every slot is taken, allocation fails and the
//! caller tears the link down.

use crate::ble::{LinkHandle, PeerName};
use crate::buffer::DataBuffer;
use crate::error::Error;

/// Lifecycle of one slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlotState {
    Empty,
    /// Link up, workflow not started yet.
    Connecting,
    /// Relay service discovery in flight.
    Discovering,
    /// Notifications enabled; data flows into the buffer.
    Subscribed,
    /// We asked for a disconnect and wait for the stack to confirm it.
    Releasing,
}

#[derive(Clone, Debug)]
pub struct PeerSlot {
    index: usize,
    pub handle: LinkHandle,
    /// Radio-layer generation of the bound link.
    pub generation: u32,
    pub name: PeerName,
    pub data: DataBuffer,
    pub state: SlotState,
}

impl PeerSlot {
    const fn empty(index: usize) -> Self {
        Self {
            index,
            handle: LinkHandle::INVALID,
            generation: 0,
            name: PeerName::new(),
            data: DataBuffer::new(),
            state: SlotState::Empty,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_occupied(&self) -> bool {
        self.state != SlotState::Empty
    }

    fn reset(&mut self) {
        self.handle = LinkHandle::INVALID;
        self.generation = 0;
        self.name.clear();
        self.data.clear();
        self.state = SlotState::Empty;
    }
}

pub struct ConnectionPool<const N: usize> {
    slots: [PeerSlot; N],
}

impl<const N: usize> ConnectionPool<N> {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(PeerSlot::empty),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Bind `handle` to the first empty slot.
    ///
    /// Fails without touching any slot when the pool is full or when the
    /// handle is already bound.
    pub fn allocate(&mut self, handle: LinkHandle) -> Result<usize, Error> {
        if !handle.is_valid() || self.find(handle).is_some() {
            return Err(Error::HandleInUse);
        }
        let index = self
            .slots
            .iter()
            .position(|s| !s.is_occupied())
            .ok_or(Error::PoolExhausted)?;

        let slot = &mut self.slots[index];
        slot.reset();
        slot.handle = handle;
        slot.state = SlotState::Connecting;
        Ok(index)
    }

    /// Return the slot bound to `handle` to `Empty` and clear its buffer.
    /// Unknown handles are ignored.
    pub fn release(&mut self, handle: LinkHandle) -> Option<usize> {
        let index = self.find(handle)?;
        self.slots[index].reset();
        Some(index)
    }

    pub fn find(&self, handle: LinkHandle) -> Option<usize> {
        if !handle.is_valid() {
            return None;
        }
        self.slots
            .iter()
            .position(|s| s.is_occupied() && s.handle == handle)
    }

    /// Slot bound to exactly this link, i.e. `handle` at `generation`.
    pub fn find_link(&self, handle: LinkHandle, generation: u32) -> Option<usize> {
        self.find(handle)
            .filter(|&index| self.slots[index].generation == generation)
    }

    pub fn slot(&self, index: usize) -> Option<&PeerSlot> {
        self.slots.get(index)
    }

    pub fn slot_mut(&mut self, index: usize) -> Option<&mut PeerSlot> {
        self.slots.get_mut(index)
    }

    /// Slot bound to `handle`, if any.
    pub fn by_handle_mut(&mut self, handle: LinkHandle) -> Option<&mut PeerSlot> {
        let index = self.find(handle)?;
        self.slots.get_mut(index)
    }

    pub fn set_state(&mut self, handle: LinkHandle, state: SlotState) -> Result<usize, Error> {
        let slot = self.by_handle_mut(handle).ok_or(Error::UnknownHandle)?;
        slot.state = state;
        Ok(slot.index)
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_occupied()).count()
    }

    pub fn is_full(&self) -> bool {
        self.occupied_count() == N
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerSlot> {
        self.slots.iter()
    }
}

impl<const N: usize> Default for ConnectionPool<N> {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn handles<const N: usize>(pool: &ConnectionPool<N>) -> std::vec::Vec<Option<u16>> {
        pool.iter()
            .map(|s| s.is_occupied().then_some(s.handle.0))
            .collect()
    }

    #[test]
    fn sequential_connects_fill_lowest_slots() {
        let mut pool = ConnectionPool::<4>::new();
        assert_eq!(pool.allocate(LinkHandle(10)), Ok(0));
        assert_eq!(pool.allocate(LinkHandle(11)), Ok(1));
        assert_eq!(pool.allocate(LinkHandle(12)), Ok(2));
        assert_eq!(pool.occupied_count(), 3);
        assert_eq!(pool.slot(1).unwrap().state, SlotState::Connecting);
    }

    #[test]
    fn released_slot_is_reused_with_cleared_buffer() {
        let mut pool = ConnectionPool::<4>::new();
        for h in 0..3 {
            pool.allocate(LinkHandle(h)).unwrap();
        }
        pool.by_handle_mut(LinkHandle(1)).unwrap().data.overwrite(b"stale");

        assert_eq!(pool.release(LinkHandle(1)), Some(1));
        assert!(pool.slot(1).unwrap().data.is_empty());

        assert_eq!(pool.allocate(LinkHandle(7)), Ok(1));
        assert!(pool.slot(1).unwrap().data.is_empty());
        assert_eq!(pool.find(LinkHandle(7)), Some(1));
        assert_eq!(pool.find(LinkHandle(1)), None);
    }

    #[test]
    fn full_pool_rejects_without_mutation() {
        let mut pool = ConnectionPool::<4>::new();
        for h in 0..4 {
            pool.allocate(LinkHandle(h)).unwrap();
        }
        let before = handles(&pool);
        assert_eq!(pool.allocate(LinkHandle(9)), Err(Error::PoolExhausted));
        assert_eq!(handles(&pool), before);
        assert!(pool.is_full());
    }

    #[test]
    fn duplicate_handle_is_rejected() {
        let mut pool = ConnectionPool::<4>::new();
        pool.allocate(LinkHandle(3)).unwrap();
        assert_eq!(pool.allocate(LinkHandle(3)), Err(Error::HandleInUse));
        assert_eq!(pool.occupied_count(), 1);
    }

    #[test]
    fn invalid_handle_never_allocates_or_matches() {
        let mut pool = ConnectionPool::<2>::new();
        assert_eq!(pool.allocate(LinkHandle::INVALID), Err(Error::HandleInUse));
        // Empty slots carry INVALID but must not be found through it.
        assert_eq!(pool.find(LinkHandle::INVALID), None);
    }

    #[test]
    fn release_of_unknown_handle_is_noop() {
        let mut pool = ConnectionPool::<2>::new();
        pool.allocate(LinkHandle(1)).unwrap();
        assert_eq!(pool.release(LinkHandle(42)), None);
        assert_eq!(pool.occupied_count(), 1);
    }

    #[test]
    fn release_clears_from_any_state() {
        let mut pool = ConnectionPool::<2>::new();
        for state in [
            SlotState::Connecting,
            SlotState::Discovering,
            SlotState::Subscribed,
            SlotState::Releasing,
        ] {
            pool.allocate(LinkHandle(5)).unwrap();
            pool.set_state(LinkHandle(5), state).unwrap();
            assert_eq!(pool.release(LinkHandle(5)), Some(0));
            assert_eq!(pool.slot(0).unwrap().state, SlotState::Empty);
        }
    }

    #[test]
    fn find_link_matches_generation() {
        let mut pool = ConnectionPool::<2>::new();
        let index = pool.allocate(LinkHandle(3)).unwrap();
        pool.slot_mut(index).unwrap().generation = 8;
        assert_eq!(pool.find_link(LinkHandle(3), 8), Some(0));
        assert_eq!(pool.find_link(LinkHandle(3), 7), None);
        pool.release(LinkHandle(3));
        assert_eq!(pool.slot(0).unwrap().generation, 0);
    }

    #[test]
    fn slot_index_is_stable() {
        let mut pool = ConnectionPool::<3>::new();
        pool.allocate(LinkHandle(1)).unwrap();
        pool.allocate(LinkHandle(2)).unwrap();
        pool.release(LinkHandle(1));
        assert_eq!(pool.find(LinkHandle(2)), Some(1));
        assert_eq!(pool.slot(1).unwrap().index(), 1);
    }

    #[test]
    fn handles_stay_unique_under_churn() {
        let mut pool = ConnectionPool::<4>::new();
        let mut seq: u16 = 0;
        for round in 0..50u16 {
            // Alternate between connecting a fresh handle and dropping one.
            if round % 3 == 2 {
                let victim = pool
                    .iter()
                    .find(|s| s.is_occupied())
                    .map(|s| s.handle);
                if let Some(h) = victim {
                    pool.release(h);
                }
            } else {
                let _ = pool.allocate(LinkHandle(seq % 6));
                seq += 1;
            }
            assert!(pool.occupied_count() <= pool.capacity());
            let mut live: std::vec::Vec<u16> = handles(&pool).into_iter().flatten().collect();
            let n = live.len();
            live.sort();
            live.dedup();
            assert_eq!(live.len(), n);
        }
    }
}
