#![cfg(test)]

//! Randomized model checks for `WeakHashMap` against a list-based
//! oracle.
//!
//! The probe rule makes full oracle parity conditional: a tombstone can
//! shadow a live entry further along its cluster, and a store issued
//! while any tombstone exists can leave a duplicate behind. Structural
//! invariants are therefore asserted after every operation, while exact
//! live-set parity is asserted only in states where neither effect can
//! be present: no tombstone in the table now, and no store ever issued
//! while one existed.

use proptest::prelude::*;

use crate::flag_key::{FlagKey, LifeFlag};
use crate::key::WeakKey;
use crate::pool::SlotPool;
use crate::weak_hash_map::WeakHashMap;

/// Referent universe. Small enough that probe clusters form readily.
const IDS: usize = 16;

fn addr_of(id: usize) -> usize {
    0x1000 + id * 0x40
}

fn has_tombstone(map: &WeakHashMap<FlagKey, u32>) -> bool {
    (0..map.capacity()).any(|slot| map.key_at(slot).map_or(false, |key| !key.is_alive()))
}

fn occupied_count(map: &WeakHashMap<FlagKey, u32>) -> usize {
    (0..map.capacity()).filter(|&slot| map.is_occupied(slot)).count()
}

#[derive(Clone, Debug)]
enum Op {
    Store(usize, u32),
    Remove(usize),
    Find(usize),
    Kill(usize),
    Sweep,
    Clear,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        5 => (0..IDS, any::<u32>()).prop_map(|(id, value)| Op::Store(id, value)),
        2 => (0..IDS).prop_map(Op::Remove),
        3 => (0..IDS).prop_map(Op::Find),
        2 => (0..IDS).prop_map(Op::Kill),
        1 => Just(Op::Sweep),
        1 => Just(Op::Clear),
    ]
}

proptest! {
    /// Drives random store/remove/find/kill/sweep/clear sequences and
    /// checks, after every operation: structural validity, the tracked
    /// count against a slot scan, the half-load bound, and power-of-two
    /// capacity. Where the table is provably shadow-free it also checks
    /// the full live-key set against the oracle.
    #[test]
    fn random_ops_match_list_oracle(ops in prop::collection::vec(op_strategy(), 0..120)) {
        let mut map: WeakHashMap<FlagKey, u32> = WeakHashMap::new(SlotPool::new());
        let mut flags: Vec<LifeFlag> = (0..IDS).map(|_| LifeFlag::new()).collect();
        let mut model: Vec<Option<u32>> = vec![None; IDS];
        // Set once a store runs while a tombstone exists; such a store
        // may have landed in front of a shadowed copy of its own key.
        let mut dup_possible = false;

        for op in ops {
            match op {
                Op::Store(id, value) => {
                    if has_tombstone(&map) {
                        dup_possible = true;
                    }
                    if !flags[id].is_alive() {
                        // The referent died earlier; a new one appears
                        // at the recycled address.
                        flags[id] = LifeFlag::new();
                    }
                    let key = flags[id].key(addr_of(id));
                    let slot = map.store(key.clone(), value);
                    // A store is always immediately visible at the slot
                    // it reported, shadows notwithstanding.
                    prop_assert_eq!(map.find(&key), Some(slot));
                    prop_assert_eq!(map.value_at(slot), Some(&value));
                    model[id] = Some(value);
                }
                Op::Remove(id) => {
                    let clean = !dup_possible && !has_tombstone(&map);
                    let key = flags[id].key(addr_of(id));
                    let removed = map.remove(&key);
                    if removed.is_some() {
                        model[id] = None;
                    } else if clean {
                        // Nothing can be shadowed, so a miss means the
                        // oracle agrees the key is absent.
                        prop_assert_eq!(model[id], None);
                    }
                }
                Op::Find(id) => {
                    let key = flags[id].key(addr_of(id));
                    let hit = map.find(&key);
                    if !flags[id].is_alive() {
                        prop_assert_eq!(hit, None, "dead keys read as absent");
                    }
                    if let Some(slot) = hit {
                        let stored = map.key_at(slot);
                        prop_assert!(
                            stored.map_or(false, |k| k.is_alive() && k.matches(addr_of(id)))
                        );
                        if !dup_possible {
                            prop_assert_eq!(map.value_at(slot), model[id].as_ref());
                        }
                    }
                }
                Op::Kill(id) => {
                    flags[id].kill();
                    model[id] = None;
                }
                Op::Sweep => {
                    map.reclaim_dead();
                    prop_assert!(!has_tombstone(&map), "a sweep leaves no tombstone behind");
                }
                Op::Clear => {
                    map.clear();
                    prop_assert_eq!(map.capacity(), 0);
                    model.fill(None);
                    dup_possible = false;
                }
            }

            prop_assert!(map.validate());
            prop_assert_eq!(map.len(), occupied_count(&map));
            prop_assert!(map.capacity() == 0 || map.capacity().is_power_of_two());
            prop_assert!(map.len() * 2 <= map.capacity() || map.capacity() == 0);

            if !dup_possible && !has_tombstone(&map) {
                let live_in_model = model.iter().filter(|entry| entry.is_some()).count();
                prop_assert_eq!(map.len(), live_in_model);
                for id in 0..IDS {
                    let key = flags[id].key(addr_of(id));
                    match model[id] {
                        Some(value) => {
                            let slot = map.find(&key);
                            prop_assert!(slot.is_some());
                            prop_assert_eq!(map.value_at(slot.unwrap()), Some(&value));
                        }
                        None => prop_assert_eq!(map.find(&key), None),
                    }
                }
            }
        }
    }

    /// Store-only sequences never involve tombstones, so growth across
    /// several doublings must preserve exact oracle parity.
    #[test]
    fn growth_never_loses_live_entries(
        pairs in prop::collection::vec((0..64usize, any::<u32>()), 1..200),
    ) {
        let mut map: WeakHashMap<FlagKey, u32> = WeakHashMap::default();
        let flags: Vec<LifeFlag> = (0..64).map(|_| LifeFlag::new()).collect();
        let mut model: Vec<Option<u32>> = vec![None; 64];

        for (id, value) in pairs {
            map.store(flags[id].key(addr_of(id)), value);
            model[id] = Some(value);
        }

        let live_in_model = model.iter().filter(|entry| entry.is_some()).count();
        prop_assert_eq!(map.len(), live_in_model);
        prop_assert!(map.len() * 2 <= map.capacity());
        prop_assert!(map.validate());
        for id in 0..64 {
            let key = flags[id].key(addr_of(id));
            match model[id] {
                Some(value) => {
                    let slot = map.find(&key);
                    prop_assert!(slot.is_some());
                    prop_assert_eq!(map.value_at(slot.unwrap()), Some(&value));
                }
                None => prop_assert_eq!(map.find(&key), None),
            }
        }
    }
}
