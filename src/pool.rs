//! Slot-block recycling, shared between maps.
//!
//! Growing a map swaps its slot block for one twice the size; without a
//! pool every grow hits the allocator and every shrink-to-drop releases
//! a block the next map will immediately re-request. [`SlotPool`] shelves
//! retired blocks by capacity and hands them back on demand, so a
//! workload that churns maps of similar sizes settles into reuse.
//!
//! A pool handle is a cheap clone over shared shelves. Maps receive one
//! by injection at construction; everything the map allocates goes back
//! to the same shelves it came from.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use hashbrown::HashMap;

use crate::weak_hash_map::Slot;

/// A shared shelf of retired slot blocks, keyed by capacity.
///
/// Clones share shelves: blocks recycled through one handle are
/// available to every map holding a clone. The pool is single-threaded,
/// like the maps it serves.
pub struct SlotPool<K, V> {
    shelves: Rc<RefCell<Shelves<K, V>>>,
}

struct Shelves<K, V> {
    free: HashMap<usize, Vec<Vec<Slot<K, V>>>>,
}

impl<K, V> SlotPool<K, V> {
    pub fn new() -> Self {
        SlotPool {
            shelves: Rc::new(RefCell::new(Shelves { free: HashMap::new() })),
        }
    }

    /// Hand out a block of exactly `capacity` empty slots, reusing a
    /// shelved block when one of that capacity is idle.
    pub(crate) fn acquire(&self, capacity: usize) -> Vec<Slot<K, V>> {
        let shelved = self.shelves.borrow_mut().free.get_mut(&capacity).and_then(Vec::pop);
        match shelved {
            Some(block) => {
                debug_assert_eq!(block.len(), capacity);
                debug_assert!(block.iter().all(Option::is_none));
                block
            }
            None => {
                let mut block = Vec::new();
                block.resize_with(capacity, || None);
                block
            }
        }
    }

    /// Take a block back. Entries still in it are dropped here, before
    /// the shelf is locked: a key or value drop may reenter the pool
    /// through another handle, and must find it unlocked.
    pub(crate) fn recycle(&self, mut block: Vec<Slot<K, V>>) {
        if block.is_empty() {
            return;
        }
        for slot in block.iter_mut() {
            *slot = None;
        }
        let capacity = block.len();
        self.shelves
            .borrow_mut()
            .free
            .entry(capacity)
            .or_default()
            .push(block);
    }

    /// Total shelved blocks, across all capacities.
    pub fn idle_blocks(&self) -> usize {
        self.shelves.borrow().free.values().map(Vec::len).sum()
    }

    /// Shelved blocks of one capacity.
    pub fn idle_blocks_of(&self, capacity: usize) -> usize {
        self.shelves.borrow().free.get(&capacity).map_or(0, Vec::len)
    }
}

impl<K, V> Clone for SlotPool<K, V> {
    fn clone(&self) -> Self {
        SlotPool { shelves: Rc::clone(&self.shelves) }
    }
}

impl<K, V> Default for SlotPool<K, V> {
    fn default() -> Self {
        SlotPool::new()
    }
}

impl<K, V> fmt::Debug for SlotPool<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shelves = self.shelves.borrow();
        let mut map = f.debug_map();
        for (capacity, blocks) in shelves.free.iter() {
            map.entry(capacity, &blocks.len());
        }
        map.finish()
    }
}
