#![cfg(test)]

//! A test key with a scripted address and an externally driven kill
//! switch. Real keys get their addresses from an allocator, which makes
//! it awkward to stage entries at chosen home slots; `FlagKey` lets a
//! test pick addresses that collide (or don't) and kill referents at
//! exact points in a scenario.

use std::cell::Cell;
use std::rc::Rc;

use crate::key::WeakKey;

/// The liveness source for one fake referent. Cloned keys share it, so
/// killing the flag kills every key minted from it.
#[derive(Clone, Debug)]
pub struct LifeFlag {
    alive: Rc<Cell<bool>>,
}

impl LifeFlag {
    pub fn new() -> Self {
        LifeFlag { alive: Rc::new(Cell::new(true)) }
    }

    /// Mint a key claiming the given address.
    pub fn key(&self, addr: usize) -> FlagKey {
        FlagKey { addr, alive: Rc::clone(&self.alive) }
    }

    /// Simulate referent destruction. Irreversible, like the real thing.
    pub fn kill(&self) {
        self.alive.set(false);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.get()
    }
}

impl Default for LifeFlag {
    fn default() -> Self {
        LifeFlag::new()
    }
}

#[derive(Clone, Debug)]
pub struct FlagKey {
    addr: usize,
    alive: Rc<Cell<bool>>,
}

impl WeakKey for FlagKey {
    fn address(&self) -> usize {
        self.addr
    }

    fn is_alive(&self) -> bool {
        self.alive.get()
    }
}

mod tests {
    use super::*;

    /// Invariant: a kill reaches every key minted from the same flag.
    #[test]
    fn kill_is_shared_across_clones() {
        let flag = LifeFlag::new();
        let a = flag.key(0x10);
        let b = a.clone();
        assert!(a.is_alive() && b.is_alive());

        flag.kill();
        assert!(!a.is_alive());
        assert!(!b.is_alive());
        assert_eq!(a.address(), 0x10, "address survives the kill");
        assert_eq!(b.address(), 0x10);
    }
}
