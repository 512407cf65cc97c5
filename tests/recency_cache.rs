use proptest::prelude::*;
use redirector::infrastructure::cache::RecencyCache;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Op {
    Get(u8),
    Put(u8, u32),
    Invalidate(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..12).prop_map(Op::Get),
        (0u8..12, any::<u32>()).prop_map(|(k, v)| Op::Put(k, v)),
        (0u8..12).prop_map(Op::Invalidate),
    ]
}

/// Naive LRU over a deque, most recent first.
struct Model {
    capacity: usize,
    entries: VecDeque<(String, u32)>,
}

impl Model {
    fn touch(&mut self, key: &str) -> Option<u32> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        let entry = self.entries.remove(pos)?;
        let value = entry.1;
        self.entries.push_front(entry);
        Some(value)
    }

    fn put(&mut self, key: String, value: u32) {
        if let Some(pos) = self.entries.iter().position(|(k, _)| *k == key) {
            self.entries.remove(pos);
        } else if self.entries.len() == self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front((key, value));
    }

    fn remove(&mut self, key: &str) {
        self.entries.retain(|(k, _)| k != key);
    }

    fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }
}

proptest! {
    #[test]
    fn prop_matches_reference_lru(capacity in 1usize..6, ops in proptest::collection::vec(op(), 0..200)) {
        let cache = RecencyCache::new(capacity);
        let mut model = Model { capacity, entries: VecDeque::new() };

        for op in ops {
            match op {
                Op::Get(k) => {
                    let key = k.to_string();
                    prop_assert_eq!(cache.get(&key), model.touch(&key));
                }
                Op::Put(k, v) => {
                    cache.put(k.to_string(), v);
                    model.put(k.to_string(), v);
                }
                Op::Invalidate(k) => {
                    let key = k.to_string();
                    cache.invalidate(&key);
                    model.remove(&key);
                }
            }

            prop_assert!(cache.len() <= capacity);
            prop_assert_eq!(cache.keys_by_recency(), model.keys());
        }
    }

    #[test]
    fn prop_replace_is_idempotent(value in any::<u32>(), times in 1usize..10) {
        let cache = RecencyCache::new(4);
        cache.put("a", 1u32);
        for _ in 0..times {
            cache.put("a", value);
        }

        prop_assert_eq!(cache.len(), 1);
        prop_assert_eq!(cache.get("a"), Some(value));
    }
}

#[test]
fn test_evicts_least_recently_used() {
    let cache = RecencyCache::new(3);
    cache.put("a", 1);
    cache.put("b", 2);
    cache.put("c", 3);

    // "a" becomes most recent, so "b" goes first.
    assert_eq!(cache.get("a"), Some(1));
    cache.put("d", 4);

    assert_eq!(cache.get("b"), None);
    assert_eq!(cache.keys_by_recency(), vec!["d", "a", "c"]);
}

#[test]
fn test_flush_clears_everything() {
    let cache = RecencyCache::new(8);
    for i in 0..8 {
        cache.put(i.to_string(), i);
    }
    cache.flush();

    assert!(cache.is_empty());
    assert!(cache.keys_by_recency().is_empty());
    cache.put("x", 1);
    assert_eq!(cache.get("x"), Some(1));
}

#[test]
fn test_concurrent_access_stays_consistent() {
    const CAPACITY: usize = 16;
    let cache = Arc::new(RecencyCache::new(CAPACITY));

    let workers: Vec<_> = (0..8)
        .map(|t| {
            let cache = cache.clone();
            thread::spawn(move || {
                for i in 0..5_000u32 {
                    let key = ((i * 7 + t) % 40).to_string();
                    match i % 5 {
                        0 => cache.flush(),
                        1 => {
                            cache.invalidate(&key);
                        }
                        2 => {
                            cache.get(&key);
                        }
                        _ => cache.put(key, i),
                    }
                    if i % 100 == 0 {
                        let keys = cache.keys_by_recency();
                        let unique: HashSet<_> = keys.iter().collect();
                        assert_eq!(unique.len(), keys.len());
                        assert!(keys.len() <= CAPACITY);
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    let keys = cache.keys_by_recency();
    assert!(keys.len() <= CAPACITY);
    assert_eq!(keys.len(), cache.len());
}

#[tokio::test(start_paused = true)]
async fn test_periodic_flush_bounds_staleness() {
    let mut cache = RecencyCache::with_periodic_flush(4, Duration::from_secs(300));
    cache.put("go", "https://go.dev/".to_string());

    tokio::time::sleep(Duration::from_secs(299)).await;
    assert_eq!(cache.get("go").as_deref(), Some("https://go.dev/"));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(cache.get("go"), None);

    cache.close().await;
    assert!(!cache.is_flushing_periodically());

    cache.put("go", "https://go.dev/".to_string());
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(cache.get("go").as_deref(), Some("https://go.dev/"));
}
