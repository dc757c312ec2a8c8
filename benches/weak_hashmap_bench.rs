use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use std::rc::{Rc, Weak};
use std::time::Duration;
use weak_hashmap::{SlotPool, WeakHashMap};

fn lcg(mut s: u64) -> impl Iterator<Item = u64> {
    std::iter::from_fn(move || {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        Some(s)
    })
}

// Referents live on the heap, so key addresses come from the allocator.
fn referents(n: usize, seed: u64) -> (Vec<Rc<u64>>, Vec<Weak<u64>>) {
    let owners: Vec<Rc<u64>> = lcg(seed).take(n).map(Rc::new).collect();
    let keys = owners.iter().map(Rc::downgrade).collect();
    (owners, keys)
}

fn bench_store_fresh_10k(c: &mut Criterion) {
    c.bench_function("weak::store_fresh_10k", |b| {
        b.iter_batched(
            || referents(10_000, 1),
            |(owners, keys)| {
                let mut m: WeakHashMap<Weak<u64>, u64> = WeakHashMap::new(SlotPool::new());
                for (i, k) in keys.into_iter().enumerate() {
                    m.store(k, i as u64);
                }
                black_box((m, owners))
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_store_warm_10k(c: &mut Criterion) {
    c.bench_function("weak::store_warm_10k", |b| {
        b.iter_batched(
            || {
                let pool: SlotPool<Weak<u64>, u64> = SlotPool::new();
                let (owners, keys) = referents(10_000, 2);
                // Prime the pool with the whole capacity ladder.
                let mut warm = WeakHashMap::new(pool.clone());
                for (i, k) in keys.iter().cloned().enumerate() {
                    warm.store(k, i as u64);
                }
                drop(warm);
                (pool, owners, keys)
            },
            |(pool, owners, keys)| {
                let mut m = WeakHashMap::new(pool);
                for (i, k) in keys.into_iter().enumerate() {
                    m.store(k, i as u64);
                }
                black_box((m, owners))
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_find_hit_10k(c: &mut Criterion) {
    c.bench_function("weak::find_hit_10k_on_10k", |b| {
        // The owners stay bound so the queried addresses stay live.
        let (_owners, keys) = referents(10_000, 7);
        let mut m: WeakHashMap<Weak<u64>, u64> = WeakHashMap::new(SlotPool::new());
        for (i, k) in keys.iter().cloned().enumerate() {
            m.store(k, i as u64);
        }
        // Precompute 10k random query keys using LCG indices.
        let n = keys.len();
        let mut s = 0x9e3779b97f4a7c15u64;
        let queries: Vec<Weak<u64>> = (0..10_000)
            .map(|_| {
                s = s.wrapping_mul(2862933555777941757).wrapping_add(3037000493);
                keys[(s as usize) % n].clone()
            })
            .collect();
        b.iter(|| {
            for k in &queries {
                black_box(m.find(k));
            }
        });
    });
}

fn bench_find_miss_10k(c: &mut Criterion) {
    c.bench_function("weak::find_miss_10k_on_10k", |b| {
        let (_owners, keys) = referents(10_000, 11);
        let mut m: WeakHashMap<Weak<u64>, u64> = WeakHashMap::new(SlotPool::new());
        for (i, k) in keys.into_iter().enumerate() {
            m.store(k, i as u64);
        }
        // Strangers: live referents that were never stored.
        let (_stranger_owners, strangers) = referents(10_000, 0xdead_beef);
        b.iter(|| {
            for k in &strangers {
                black_box(m.find(k));
            }
        });
    });
}

fn bench_remove_random_1k(c: &mut Criterion) {
    c.bench_function("weak::remove_random_1k_of_10k", |b| {
        b.iter_batched(
            || {
                let (owners, keys) = referents(10_000, 5);
                let mut m: WeakHashMap<Weak<u64>, u64> = WeakHashMap::new(SlotPool::new());
                for (i, k) in keys.iter().cloned().enumerate() {
                    m.store(k, i as u64);
                }
                // Precompute 1k unique victim indices via LCG.
                let n = keys.len();
                let mut sel = std::collections::HashSet::with_capacity(1_000);
                let mut s = 0x9e3779b97f4a7c15u64;
                while sel.len() < 1_000 {
                    s = s.wrapping_mul(2862933555777941757).wrapping_add(3037000493);
                    sel.insert((s as usize) % n);
                }
                let victims: Vec<Weak<u64>> = sel.into_iter().map(|i| keys[i].clone()).collect();
                (m, owners, victims)
            },
            |(mut m, owners, victims)| {
                for k in victims {
                    black_box(m.remove(&k));
                }
                black_box((m, owners))
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_sweep_half_dead_10k(c: &mut Criterion) {
    c.bench_function("weak::sweep_half_dead_10k", |b| {
        b.iter_batched(
            || {
                let (owners, keys) = referents(10_000, 13);
                let mut m: WeakHashMap<Weak<u64>, u64> = WeakHashMap::new(SlotPool::new());
                for (i, k) in keys.into_iter().enumerate() {
                    m.store(k, i as u64);
                }
                // Every other referent dies before the sweep.
                let survivors: Vec<Rc<u64>> = owners
                    .into_iter()
                    .enumerate()
                    .filter_map(|(i, r)| (i % 2 == 0).then_some(r))
                    .collect();
                (m, survivors)
            },
            |(mut m, survivors)| {
                m.reclaim_dead();
                black_box((m, survivors))
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_iter_all_10k(c: &mut Criterion) {
    c.bench_function("weak::iter_all_10k", |b| {
        let (_owners, keys) = referents(10_000, 999);
        let mut m: WeakHashMap<Weak<u64>, u64> = WeakHashMap::new(SlotPool::new());
        for (i, k) in keys.into_iter().enumerate() {
            m.store(k, i as u64);
        }
        b.iter(|| {
            let mut sum = 0u64;
            for (_slot, _k, v) in m.iter() {
                sum = sum.wrapping_add(*v);
            }
            black_box(sum)
        });
    });
}

fn bench_config() -> Criterion {
    Criterion::default()
        .sample_size(50)
        .measurement_time(Duration::from_secs(8))
        .warm_up_time(Duration::from_secs(2))
}

criterion_group! {
    name = benches_store;
    config = bench_config();
    targets = bench_store_fresh_10k, bench_store_warm_10k
}
criterion_group! {
    name = benches_ops;
    config = bench_config();
    targets = bench_find_hit_10k,
              bench_find_miss_10k,
              bench_remove_random_1k,
              bench_sweep_half_dead_10k,
              bench_iter_all_10k
}
criterion_main!(benches_store, benches_ops);
