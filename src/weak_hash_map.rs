//! The weak-key table: open addressing with linear probing, keyed by
//! referent address, with soft tombstones for entries whose referents
//! died in place.
//!
//! Nothing here ever dereferences a referent. Entries hash and compare
//! by the address their key reported at store time, so every algorithm
//! below keeps working after the referent is gone; death only changes
//! how a slot is treated, not what it stores.

use std::fmt;
use std::iter::Enumerate;
use std::mem;
use std::slice;

use crate::key::WeakKey;
use crate::pool::SlotPool;

/// Fibonacci multiplier (2^64 / the golden ratio), odd by construction.
const HASH_MULTIPLIER: u64 = 0x9E37_79B9_7F4A_7C15;

/// Dropping low product bits sidesteps the alignment stripes of
/// pointer-valued addresses.
const HASH_SHIFT: u32 = 16;

/// Capacity of the first block a lazily allocated table acquires.
const INITIAL_CAPACITY: usize = 8;

fn home_slot(capacity: usize, addr: usize) -> usize {
    debug_assert!(capacity.is_power_of_two());
    ((addr as u64).wrapping_mul(HASH_MULTIPLIER) >> HASH_SHIFT) as usize & (capacity - 1)
}

/// One stored pair. The address is cached at store time so probes,
/// repairs, and rehashes never have to ask a possibly dead key for it.
pub(crate) struct Entry<K, V> {
    key: K,
    addr: usize,
    value: V,
}

impl<K, V> Entry<K, V> {
    pub(crate) fn new(key: K, addr: usize, value: V) -> Self {
        Entry { key, addr, value }
    }
}

pub(crate) type Slot<K, V> = Option<Entry<K, V>>;

/// An associative table keyed by the addresses of objects it does not
/// own.
///
/// Keys are weak: when a referent dies, its entry becomes a *soft
/// tombstone* that still occupies a slot but no longer answers lookups.
/// Tombstones are reclaimed opportunistically, by the cluster repair
/// that follows a removal, by the full sweep the load-factor guard runs
/// before growing, and by growth itself, which migrates live entries
/// only.
///
/// Probing stops at the first empty *or dead* slot. That makes dead
/// slots immediately reusable without a reclamation pass, at a known
/// cost: a live entry stored further along the same cluster can be
/// shadowed by a newer tombstone in front of it, making `find` miss it
/// until the next mutation repairs the cluster. See [`WeakHashMap::find`].
///
/// The table is single-threaded and never blocks. Slot blocks come
/// from an injected [`SlotPool`] and go back to it on clear, growth,
/// and drop.
pub struct WeakHashMap<K, V> {
    slots: Vec<Slot<K, V>>,
    /// Occupied slots, dead included. Held at or below half of capacity.
    occupied: usize,
    pool: SlotPool<K, V>,
}

enum Probe {
    /// Slot of a live entry with the probed address.
    Found(usize),
    /// First slot the probed address may claim: empty, or a tombstone.
    Open(usize),
}

/// What [`WeakHashMap::corruption`] found, for diagnostics and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Corruption {
    /// A live entry's probe path from its home slot crosses an empty
    /// slot before reaching it, so no probe can ever see the entry.
    UnreachableEntry {
        address: usize,
        home: usize,
        slot: usize,
    },
    /// Occupied slots and the tracked count disagree.
    CountMismatch { counted: usize, tracked: usize },
}

impl<K, V> WeakHashMap<K, V> {
    /// An empty table drawing its slot blocks from `pool`. No block is
    /// acquired until the first store.
    pub fn new(pool: SlotPool<K, V>) -> Self {
        WeakHashMap {
            slots: Vec::new(),
            occupied: 0,
            pool,
        }
    }

    /// Like [`WeakHashMap::new`], but allocated up front with at least
    /// `capacity` slots (rounded up to a power of two). The table holds
    /// half its slot count before growing.
    pub fn with_capacity(capacity: usize, pool: SlotPool<K, V>) -> Self {
        let mut map = WeakHashMap::new(pool);
        if capacity > 0 {
            map.slots = map.pool.acquire(capacity.next_power_of_two());
        }
        map
    }

    /// Slot count. Zero for a table that has not allocated yet.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Occupied slots, live or dead. This is an upper bound on live
    /// entries: a dead entry leaves the count only when its slot is
    /// reclaimed or overwritten.
    pub fn len(&self) -> usize {
        self.occupied
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    /// Whether slot `n` holds an entry. Occupancy, not liveness: a
    /// tombstone still occupies its slot.
    pub fn is_occupied(&self, n: usize) -> bool {
        self.slots.get(n).map_or(false, Option::is_some)
    }

    /// The key stored in slot `n`, dead or alive.
    pub fn key_at(&self, n: usize) -> Option<&K> {
        self.slots.get(n)?.as_ref().map(|entry| &entry.key)
    }

    pub fn value_at(&self, n: usize) -> Option<&V> {
        self.slots.get(n)?.as_ref().map(|entry| &entry.value)
    }

    pub fn value_at_mut(&mut self, n: usize) -> Option<&mut V> {
        self.slots.get_mut(n)?.as_mut().map(|entry| &mut entry.value)
    }

    /// Replace the value in slot `n`, returning the old one, or give
    /// `value` back as the error if the slot is unoccupied.
    pub fn set_value_at(&mut self, n: usize, value: V) -> Result<V, V> {
        match self.slots.get_mut(n).and_then(Option::as_mut) {
            Some(entry) => Ok(mem::replace(&mut entry.value, value)),
            None => Err(value),
        }
    }

    /// Drop every entry and give the block back to the pool. The table
    /// returns to the unallocated state and reallocates on first use.
    pub fn clear(&mut self) {
        self.pool.recycle(mem::take(&mut self.slots));
        self.occupied = 0;
    }

    /// Exchange two tables in constant time, no entry moves. Pool
    /// handles travel with their blocks, so each block still returns
    /// to the pool it was acquired from.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }

    /// The pool this table allocates from.
    pub fn pool(&self) -> &SlotPool<K, V> {
        &self.pool
    }
}

impl<K, V> Default for WeakHashMap<K, V> {
    /// An empty table over a private, unshared pool.
    fn default() -> Self {
        WeakHashMap::new(SlotPool::new())
    }
}

/// Iterator over live entries as `(slot, key, value)`. Dead entries
/// are skipped, not reclaimed; iteration never restructures the table.
pub struct Iter<'a, K, V> {
    inner: Enumerate<slice::Iter<'a, Slot<K, V>>>,
}

impl<'a, K: WeakKey, V> Iterator for Iter<'a, K, V> {
    type Item = (usize, &'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        for (slot, candidate) in &mut self.inner {
            if let Some(entry) = candidate {
                if entry.key.is_alive() {
                    return Some((slot, &entry.key, &entry.value));
                }
            }
        }
        None
    }
}

/// Mutable twin of [`Iter`]: values are mutable, keys and slots not.
pub struct IterMut<'a, K, V> {
    inner: Enumerate<slice::IterMut<'a, Slot<K, V>>>,
}

impl<'a, K: WeakKey, V> Iterator for IterMut<'a, K, V> {
    type Item = (usize, &'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        for (slot, candidate) in &mut self.inner {
            if let Some(entry) = candidate {
                if entry.key.is_alive() {
                    return Some((slot, &entry.key, &mut entry.value));
                }
            }
        }
        None
    }
}

impl<K, V> WeakHashMap<K, V>
where
    K: WeakKey,
{
    fn home(&self, addr: usize) -> usize {
        home_slot(self.slots.len(), addr)
    }

    /// Walk the cluster starting at `addr`'s home slot. Empty and dead
    /// slots both end the walk as `Open`; only a live entry at the
    /// probed address is `Found`. The table can never be full while the
    /// load-factor guard holds, so a full traversal is a contract
    /// violation.
    fn probe(&self, addr: usize) -> Probe {
        let mask = self.slots.len() - 1;
        let mut slot = self.home(addr);
        for _ in 0..self.slots.len() {
            match &self.slots[slot] {
                None => return Probe::Open(slot),
                Some(entry) if !entry.key.is_alive() => return Probe::Open(slot),
                Some(entry) if entry.addr == addr => return Probe::Found(slot),
                Some(_) => slot = (slot + 1) & mask,
            }
        }
        panic!("no open slot in a table at or below half load");
    }

    /// The slot holding a live entry for `key`, if any.
    ///
    /// A dead slot ends the probe walk exactly like an empty one, so an
    /// entry whose cluster grew a tombstone in front of it reads as
    /// absent until a removal, sweep, or growth repairs the cluster, or
    /// a store reuses the tombstone's slot. Dead keys themselves always
    /// read as absent.
    pub fn find(&self, key: &K) -> Option<usize> {
        if self.slots.is_empty() {
            return None;
        }
        match self.probe(key.address()) {
            Probe::Found(slot) => Some(slot),
            Probe::Open(_) => None,
        }
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    /// Insert or update, returning the slot written.
    ///
    /// A live entry at the same address has its value replaced in
    /// place; the entry keeps the key it was first stored under. A new
    /// entry claims the first open slot on its probe path, overwriting
    /// a tombstone if that is what ended the walk. Overwriting keeps
    /// the occupancy count unchanged; only a fresh slot raises it.
    pub fn store(&mut self, key: K, value: V) -> usize {
        let addr = key.address();
        match self.probe_for_write(addr) {
            Probe::Found(slot) => {
                let entry = self.slots[slot].as_mut().expect("found slots hold an entry");
                entry.value = value;
                slot
            }
            Probe::Open(slot) => {
                self.place(slot, Entry::new(key, addr, value));
                slot
            }
        }
    }

    /// The value for `key`, inserting `init()` first if absent. The
    /// probe treats `key` like any other: a dead or shadowed entry at
    /// this address reads as absent and a fresh one is inserted.
    pub fn get_or_insert_with<F>(&mut self, key: K, init: F) -> &mut V
    where
        F: FnOnce() -> V,
    {
        let addr = key.address();
        let slot = match self.probe_for_write(addr) {
            Probe::Found(slot) => slot,
            Probe::Open(slot) => {
                self.place(slot, Entry::new(key, addr, init()));
                slot
            }
        };
        let entry = self.slots[slot].as_mut().expect("slot was just found or filled");
        &mut entry.value
    }

    pub fn get_or_default(&mut self, key: K) -> &mut V
    where
        V: Default,
    {
        self.get_or_insert_with(key, V::default)
    }

    /// Remove the live entry for `key`, repair its cluster, and return
    /// its value. Absent keys, and entries already dead (their slots
    /// are tombstones awaiting reclamation, unreachable by probe),
    /// return `None`.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        if self.slots.is_empty() {
            return None;
        }
        match self.probe(key.address()) {
            Probe::Found(slot) => Some(self.remove_at(slot).value),
            Probe::Open(_) => None,
        }
    }

    /// Sweep the whole table and reclaim every tombstone. Each
    /// reclamation repairs its cluster, so afterwards every live entry
    /// is reachable again and `len` counts exactly the live entries.
    pub fn reclaim_dead(&mut self) {
        for slot in 0..self.slots.len() {
            let dead = matches!(&self.slots[slot], Some(entry) if !entry.key.is_alive());
            if dead {
                self.remove_at(slot);
            }
        }
    }

    /// `true` when the structural invariants hold. [`WeakHashMap::corruption`]
    /// tells which one failed.
    pub fn validate(&self) -> bool {
        self.corruption().is_none()
    }

    /// Full-table structural check, for consistency asserts and tests.
    ///
    /// Verifies that every live entry is reachable by probing forward
    /// from its home slot without crossing an empty slot, and that the
    /// tracked occupancy matches a fresh count. A tombstone on the path
    /// is not a defect here: probes treat it as open, but repair walks
    /// close only true gaps, so an empty slot mid-cluster means the
    /// structure is broken while a dead one just awaits reclamation.
    pub fn corruption(&self) -> Option<Corruption> {
        if self.slots.is_empty() {
            return (self.occupied != 0).then(|| Corruption::CountMismatch {
                counted: 0,
                tracked: self.occupied,
            });
        }
        let mask = self.slots.len() - 1;
        let mut counted = 0;
        for (slot, candidate) in self.slots.iter().enumerate() {
            let entry = match candidate {
                None => continue,
                Some(entry) => entry,
            };
            counted += 1;
            if !entry.key.is_alive() {
                continue;
            }
            let home = self.home(entry.addr);
            let mut walk = home;
            while walk != slot {
                if self.slots[walk].is_none() {
                    return Some(Corruption::UnreachableEntry {
                        address: entry.addr,
                        home,
                        slot,
                    });
                }
                walk = (walk + 1) & mask;
            }
        }
        if counted != self.occupied {
            return Some(Corruption::CountMismatch {
                counted,
                tracked: self.occupied,
            });
        }
        None
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.slots.iter().enumerate(),
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            inner: self.slots.iter_mut().enumerate(),
        }
    }

    /// Probe for `addr` on behalf of a write. Whenever the walk ends at
    /// an open slot while the table sits at the load-factor limit, make
    /// room and probe again from scratch; reclamation and growth both
    /// move entries, so the previous result is stale. `Open` slots
    /// returned here have passed the guard and may be written.
    fn probe_for_write(&mut self, addr: usize) -> Probe {
        loop {
            if self.slots.is_empty() {
                self.slots = self.pool.acquire(INITIAL_CAPACITY);
            }
            match self.probe(addr) {
                found @ Probe::Found(_) => return found,
                Probe::Open(slot) => {
                    if self.occupied >= self.slots.len() / 2 {
                        self.make_room();
                        continue;
                    }
                    return Probe::Open(slot);
                }
            }
        }
    }

    /// Write an entry into a slot cleared by [`WeakHashMap::probe_for_write`].
    /// A tombstone being overwritten drops here and keeps the occupancy
    /// count unchanged.
    fn place(&mut self, slot: usize, entry: Entry<K, V>) {
        let fresh = self.slots[slot].is_none();
        self.slots[slot] = Some(entry);
        if fresh {
            self.occupied += 1;
        }
    }

    /// The guard's slow path: reclaim every tombstone, and only if that
    /// alone does not bring the table under half load, double it.
    fn make_room(&mut self) {
        self.reclaim_dead();
        if self.occupied >= self.slots.len() / 2 {
            self.grow();
        }
    }

    /// Vacate slot `n` and repair the cluster behind the gap.
    ///
    /// Linear probing cannot tolerate an empty slot between a live
    /// entry and its home, so the walk continues through the cluster:
    /// tombstones it meets are reclaimed outright, and each live entry
    /// moves back into the earliest empty slot on its own probe path,
    /// if the gap opened one. The walk ends at the cluster boundary,
    /// with no gap left inside.
    fn remove_at(&mut self, n: usize) -> Entry<K, V> {
        let mask = self.slots.len() - 1;
        let removed = self.slots[n].take().expect("removal of an unoccupied slot");
        self.occupied -= 1;

        let mut walk = (n + 1) & mask;
        loop {
            let (alive, home) = match &self.slots[walk] {
                None => break,
                Some(entry) => (entry.key.is_alive(), self.home(entry.addr)),
            };
            if !alive {
                self.slots[walk] = None;
                self.occupied -= 1;
            } else {
                let mut target = home;
                while target != walk && self.slots[target].is_some() {
                    target = (target + 1) & mask;
                }
                if target != walk {
                    self.slots[target] = self.slots[walk].take();
                }
            }
            walk = (walk + 1) & mask;
        }
        removed
    }

    /// Double the table. Only live entries migrate; tombstones are
    /// dropped here, which is where most of them actually disappear.
    /// Forward probing in the fresh block cannot fail: it is at most
    /// half full by the time migration ends.
    fn grow(&mut self) {
        let new_capacity = self.slots.len() * 2;
        let fresh = self.pool.acquire(new_capacity);
        let mut old = mem::replace(&mut self.slots, fresh);
        let mask = new_capacity - 1;

        let mut migrated = 0;
        for slot in old.iter_mut() {
            if let Some(entry) = slot.take() {
                if !entry.key.is_alive() {
                    continue;
                }
                let mut target = home_slot(new_capacity, entry.addr);
                while self.slots[target].is_some() {
                    target = (target + 1) & mask;
                }
                self.slots[target] = Some(entry);
                migrated += 1;
            }
        }
        self.occupied = migrated;
        self.pool.recycle(old);
    }
}

impl<K, V> Drop for WeakHashMap<K, V> {
    fn drop(&mut self) {
        self.pool.recycle(mem::take(&mut self.slots));
    }
}

impl<K, V> fmt::Debug for WeakHashMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakHashMap")
            .field("capacity", &self.capacity())
            .field("occupied", &self.occupied)
            .finish_non_exhaustive()
    }
}
