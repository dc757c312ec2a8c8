//! Arena-owned referents and the keys that outlive them.
//!
//! `rc::Weak` keys cover referents with shared ownership. When the
//! referents instead live in one owning store, [`KeyArena`] plays that
//! role: it owns the values in a slot map, and hands out [`ArenaKey`]s
//! that watch them without owning them. An arena key's address is the
//! slot map's versioned key, not a heap pointer, which keeps identity
//! unique even after the underlying index is recycled for a newcomer.

use std::cell::{self, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use slotmap::{DefaultKey, Key as _, SlotMap};

use crate::key::WeakKey;

type Store<T> = RefCell<SlotMap<DefaultKey, T>>;

/// An owning store of referents. Removing a value (or dropping the
/// arena) kills every key minted for it; the keys themselves keep
/// nothing alive.
pub struct KeyArena<T> {
    inner: Rc<Store<T>>,
}

/// A non-owning handle to one arena value. Usable as a map key.
pub struct ArenaKey<T> {
    arena: Weak<Store<T>>,
    key: DefaultKey,
}

impl<T> KeyArena<T> {
    pub fn new() -> Self {
        KeyArena { inner: Rc::new(RefCell::new(SlotMap::new())) }
    }

    /// Store a value and mint a key for it.
    pub fn insert(&self, value: T) -> ArenaKey<T> {
        let key = self.inner.borrow_mut().insert(value);
        ArenaKey { arena: Rc::downgrade(&self.inner), key }
    }

    /// Destroy a referent. Every key minted for it goes dead, but each
    /// still reports the address it had while alive.
    pub fn remove(&self, key: &ArenaKey<T>) -> Option<T> {
        self.inner.borrow_mut().remove(key.key)
    }

    pub fn contains(&self, key: &ArenaKey<T>) -> bool {
        self.inner.borrow().contains_key(key.key)
    }

    pub fn get(&self, key: &ArenaKey<T>) -> Option<cell::Ref<'_, T>> {
        cell::Ref::filter_map(self.inner.borrow(), |store| store.get(key.key)).ok()
    }

    pub fn get_mut(&self, key: &ArenaKey<T>) -> Option<cell::RefMut<'_, T>> {
        cell::RefMut::filter_map(self.inner.borrow_mut(), |store| store.get_mut(key.key)).ok()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }
}

impl<T> Clone for KeyArena<T> {
    fn clone(&self) -> Self {
        KeyArena { inner: Rc::clone(&self.inner) }
    }
}

impl<T> Default for KeyArena<T> {
    fn default() -> Self {
        KeyArena::new()
    }
}

impl<T> WeakKey for ArenaKey<T> {
    /// The versioned slot-map key. A recycled index carries a bumped
    /// version, so a newcomer at the same index is a different address.
    fn address(&self) -> usize {
        self.key.data().as_ffi() as usize
    }

    fn is_alive(&self) -> bool {
        self.arena
            .upgrade()
            .map_or(false, |store| store.borrow().contains_key(self.key))
    }
}

impl<T> Clone for ArenaKey<T> {
    fn clone(&self) -> Self {
        ArenaKey { arena: Weak::clone(&self.arena), key: self.key }
    }
}

impl<T> fmt::Debug for ArenaKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaKey")
            .field("address", &self.address())
            .field("alive", &self.is_alive())
            .finish()
    }
}
