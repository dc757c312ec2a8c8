//! The key-side capability contract and its standard-library impls.
//!
//! The table never dereferences a key's referent. All it needs from a key
//! is an identity (the address the key originally pointed at), a liveness
//! query, and equality against a raw address. Anything that can answer
//! those three questions can be a key; the map stays out of the business
//! of detecting destruction.

use std::rc;
use std::sync;

/// A non-owning key identified by the address of an external object.
///
/// Implementations must uphold two contracts the map relies on:
///
/// - `address` is *stable*: it returns the same value for the whole life
///   of the key object, including after the referent has been destroyed.
///   The map hashes and compares entries by this value alone, and it
///   still needs it after death (removal repair and rehashing recompute
///   home slots for entries whose referents are long gone).
/// - `is_alive` may flip from `true` to `false` at any time between map
///   operations, but never back: a dead key stays dead. The map treats a
///   dead entry as absent and reclaims its slot opportunistically.
///
/// Two keys denote the same entry exactly when their addresses are equal,
/// so addresses must be unique per live referent within one map.
pub trait WeakKey {
    /// The referent's original address; stable across referent death.
    fn address(&self) -> usize;

    /// Whether the referent still exists.
    fn is_alive(&self) -> bool;

    /// Identity comparison against a raw address.
    fn matches(&self, address: usize) -> bool {
        self.address() == address
    }
}

/// `rc::Weak` keys: identity is the allocation address, liveness is the
/// strong count. Obtain keys via [`std::rc::Rc::downgrade`]; a
/// `Weak::new()` dangling handle is permanently dead and shares its
/// sentinel address with every other dangling handle.
impl<T> WeakKey for rc::Weak<T> {
    fn address(&self) -> usize {
        self.as_ptr() as usize
    }

    fn is_alive(&self) -> bool {
        self.strong_count() > 0
    }
}

/// `sync::Weak` keys, for referents shared through `Arc`. The map itself
/// remains single-threaded; only the referent's ownership is atomic.
impl<T> WeakKey for sync::Weak<T> {
    fn address(&self) -> usize {
        self.as_ptr() as usize
    }

    fn is_alive(&self) -> bool {
        self.strong_count() > 0
    }
}
