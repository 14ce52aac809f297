use std::sync::Arc;
use std::thread;

use thunk_cache::{
    HeapThunkFactory, SharedThunkStore, ThunkCache, ThunkCacheConfig, ThunkFactory, ThunkMode,
};

const THREADS: usize = 8;

fn descriptor(i: usize) -> String {
    let params: String = (0..i % 6)
        .map(|k| ["I", "J", "F", "D", "Ljava/lang/Object;"][(i + k) % 5])
        .collect();
    format!("({}){}", params, ["V", "I", "J", "D"][i % 4])
}

#[test]
fn test_racing_adds_leave_one_of_the_added_thunks() {
    let cache = ThunkCache::with_config("race", ThunkCacheConfig::for_testing());
    let factory = HeapThunkFactory::new();
    let shape = cache.reduce("(IJ)V").unwrap();
    let handles: Vec<_> = (0..THREADS).map(|_| factory.allocate(16, &shape)).collect();

    thread::scope(|s| {
        for handle in &handles {
            let cache = &cache;
            s.spawn(move || {
                for _ in 0..100 {
                    cache.add(handle.clone(), "(IJ)V", ThunkMode::CurrentRun).unwrap();
                }
            });
        }
    });

    let winner = cache.find("(IJ)V", ThunkMode::CurrentRun).unwrap().unwrap();
    assert!(handles.contains(&winner));
    assert_eq!(cache.thunk_count(), 1);
    assert_eq!(cache.stats().insertions, (THREADS * 100) as u64);
}

#[test]
fn test_concurrent_get_or_generate_agrees() {
    let cache = ThunkCache::with_config("workers", ThunkCacheConfig::for_testing());
    let factory = HeapThunkFactory::new();

    let results: Vec<Vec<_>> = thread::scope(|s| {
        let workers: Vec<_> = (0..THREADS)
            .map(|t| {
                let cache = &cache;
                let factory = &factory;
                s.spawn(move || {
                    (0..200)
                        .map(|i| {
                            let desc = descriptor((i + t * 7) % 200);
                            let handle = cache
                                .get_or_generate(&desc, ThunkMode::CurrentRun, factory, 32)
                                .unwrap();
                            (desc, handle)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    // Every handle a worker received is for the shape it asked about, and
    // once the workers are done every shape resolves to exactly one thunk.
    for (desc, handle) in results.iter().flatten() {
        assert_eq!(handle.shape(), &cache.reduce(desc).unwrap());
        let stored = cache.find(desc, ThunkMode::CurrentRun).unwrap().unwrap();
        assert_eq!(stored.shape(), handle.shape());
    }
    let shapes: std::collections::BTreeSet<_> = (0..200)
        .map(|i| cache.reduce(&descriptor(i)).unwrap())
        .collect();
    assert_eq!(cache.thunk_count(), shapes.len());
}

#[test]
fn test_readers_and_writers_interleave() {
    let cache = Arc::new(ThunkCache::with_config("mixed", ThunkCacheConfig::for_testing()));
    let factory = Arc::new(HeapThunkFactory::new());

    let writers: Vec<_> = (0..THREADS / 2)
        .map(|t| {
            let cache = Arc::clone(&cache);
            let factory = Arc::clone(&factory);
            thread::spawn(move || {
                for i in (t..300).step_by(THREADS / 2) {
                    let desc = descriptor(i);
                    let shape = cache.reduce(&desc).unwrap();
                    let handle = factory.allocate(8, &shape);
                    cache.add(handle.clone(), &desc, ThunkMode::CurrentRun).unwrap();
                    let seen = cache.find(&desc, ThunkMode::CurrentRun).unwrap().unwrap();
                    assert_eq!(seen.shape(), &shape);
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..THREADS / 2)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..300 {
                    let desc = descriptor(i);
                    if let Some(found) = cache.find(&desc, ThunkMode::CurrentRun).unwrap() {
                        assert_eq!(found.shape(), &cache.reduce(&desc).unwrap());
                    }
                    if i % 50 == 0 {
                        let mut lines: Vec<String> = Vec::new();
                        cache.dump(&mut lines);
                        assert!(!lines.is_empty());
                    }
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }
    for i in 0..300 {
        assert!(
            cache
                .find(&descriptor(i), ThunkMode::CurrentRun)
                .unwrap()
                .is_some()
        );
    }
}

#[test]
fn test_concurrent_persisted_generation_skips_trie() {
    let store = Arc::new(SharedThunkStore::new());
    let cache = ThunkCache::with_config("aot", ThunkCacheConfig::for_testing())
        .with_store(store.clone());
    let factory = HeapThunkFactory::new();

    thread::scope(|s| {
        for t in 0..THREADS {
            let cache = &cache;
            let factory = &factory;
            s.spawn(move || {
                for i in 0..50 {
                    let desc = descriptor(i + t);
                    cache
                        .get_or_generate(&desc, ThunkMode::Persisted, factory, 16)
                        .unwrap();
                }
            });
        }
    });

    assert_eq!(cache.node_count(), 1);
    assert_eq!(cache.thunk_count(), 0);
    assert!(!store.is_empty());
}
