//! weak-hashmap: a single-threaded associative table keyed by the
//! addresses of objects it does not own, tolerating referents that die
//! behind its back.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: map external objects to values without keeping those objects
//!   alive, without ever dereferencing them, and without requiring
//!   notification when they are destroyed.
//! - Pieces:
//!   - `WeakKey`: the capability a key must provide: a stable address
//!     (valid even after the referent dies), a liveness query, and
//!     address equality. Implemented for `std::rc::Weak` and
//!     `std::sync::Weak`, and by `ArenaKey`.
//!   - `WeakHashMap<K, V>`: the table. Open addressing with linear
//!     probing over power-of-two capacities, multiplicative hashing of
//!     addresses, at most half full after any store.
//!   - `SlotPool<K, V>`: size-class recycling for slot blocks, shared
//!     between maps through cheap cloned handles and injected at map
//!     construction.
//!   - `KeyArena<T>` / `ArenaKey<T>`: an owning store of referents
//!     whose handles work as map keys; generational addresses keep a
//!     recycled index from impersonating its predecessor.
//!
//! Death and tombstones
//! - A key may go dead between any two operations. The entry stays in
//!   its slot as a soft tombstone: probes treat the slot as open, so
//!   the dead key reads as absent and the slot is immediately reusable.
//! - Tombstones are reclaimed at three points: the cluster-repair walk
//!   after a removal, the full sweep the load-factor guard tries before
//!   growing, and growth itself, which migrates live entries only.
//! - The probe rule is a deliberate trade: ending probes at tombstones
//!   keeps lookups cheap, but a tombstone can shadow a live entry
//!   placed further along the same cluster until the next mutation
//!   repairs it. `WeakHashMap::find` documents the consequences.
//!
//! Constraints
//! - Single-threaded: no locks, no atomics; callers serialize access.
//! - Identity is the address recorded at store time. Keys are never
//!   re-asked for their address, so hashing and repair keep working
//!   for entries whose referents are long gone.
//! - The occupancy counter is exact for occupied slots and therefore an
//!   upper bound on live entries; `validate()` cross-checks it.
//!
//! Notes and non-goals
//! - No recoverable-error channel: misuse of internal invariants is a
//!   panic, out-of-range slot queries just answer `None`/`false`.
//! - Values are replaced in place on re-store; the original key object
//!   is kept, not swapped for the caller's copy.
//! - Blocks travel map -> pool on clear, growth, and drop; `swap`
//!   moves the pool handle with the block it came from.

mod arena;
mod flag_key;
pub mod key;
mod pool;
pub mod weak_hash_map;
mod weak_hash_map_proptest;

// Public surface
pub use arena::{ArenaKey, KeyArena};
pub use key::WeakKey;
pub use pool::SlotPool;
pub use weak_hash_map::{Corruption, Iter, IterMut, WeakHashMap};
