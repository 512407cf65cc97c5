//! Bounded least-recently-used cache.
//!
//! ```text
//!   index: HashMap<String, slot>
//!                 │
//!                 ▼
//!   head ──► [slot] ◄──► [slot] ◄──► [slot] ◄── tail
//!            MRU                      LRU
//! ```
//!
//! Entries live in a slot arena; the recency list is threaded through the arena
//! with `prev`/`next` slot indices, so promotion and eviction are O(1).
//!
//! `get` moves the entry to the front and therefore mutates the list. Every
//! operation, reads included, goes through the same [`Mutex`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info};

use super::flusher::FlushTask;

const NIL: usize = usize::MAX;

struct Entry<V> {
    key: String,
    value: V,
}

struct LruState<V> {
    capacity: usize,
    index: HashMap<String, usize>,
    entries: Vec<Option<Entry<V>>>,
    prev: Vec<usize>,
    next: Vec<usize>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
}

impl<V> LruState<V> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            index: HashMap::with_capacity(capacity),
            entries: Vec::with_capacity(capacity),
            prev: Vec::with_capacity(capacity),
            next: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
        }
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn unlink(&mut self, slot: usize) {
        let (p, n) = (self.prev[slot], self.next[slot]);
        if p == NIL {
            self.head = n;
        } else {
            self.next[p] = n;
        }
        if n == NIL {
            self.tail = p;
        } else {
            self.prev[n] = p;
        }
        self.prev[slot] = NIL;
        self.next[slot] = NIL;
    }

    fn push_front(&mut self, slot: usize) {
        self.prev[slot] = NIL;
        self.next[slot] = self.head;
        if self.head == NIL {
            self.tail = slot;
        } else {
            self.prev[self.head] = slot;
        }
        self.head = slot;
    }

    fn promote(&mut self, slot: usize) {
        if self.head != slot {
            self.unlink(slot);
            self.push_front(slot);
        }
    }

    fn alloc(&mut self, entry: Entry<V>) -> usize {
        if let Some(slot) = self.free.pop() {
            self.entries[slot] = Some(entry);
            slot
        } else {
            self.entries.push(Some(entry));
            self.prev.push(NIL);
            self.next.push(NIL);
            self.entries.len() - 1
        }
    }

    fn release(&mut self, slot: usize) -> Option<Entry<V>> {
        self.unlink(slot);
        let entry = self.entries[slot].take()?;
        self.index.remove(&entry.key);
        self.free.push(slot);
        Some(entry)
    }

    fn get(&mut self, key: &str) -> Option<&V> {
        let slot = *self.index.get(key)?;
        self.promote(slot);
        self.entries[slot].as_ref().map(|e| &e.value)
    }

    /// Inserts or replaces; returns the evicted key, if any.
    fn put(&mut self, key: String, value: V) -> Option<String> {
        if let Some(&slot) = self.index.get(&key) {
            self.entries[slot] = Some(Entry { key, value });
            self.promote(slot);
            return None;
        }

        let mut evicted = None;
        if self.len() >= self.capacity && self.tail != NIL {
            let lru = self.tail;
            evicted = self.release(lru).map(|e| e.key);
        }

        let slot = self.alloc(Entry {
            key: key.clone(),
            value,
        });
        self.push_front(slot);
        self.index.insert(key, slot);
        evicted
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.index.get(key) {
            Some(&slot) => self.release(slot).is_some(),
            None => false,
        }
    }

    fn clear(&mut self) {
        self.index.clear();
        self.entries.clear();
        self.prev.clear();
        self.next.clear();
        self.free.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    fn keys_by_recency(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while cursor != NIL {
            if let Some(entry) = &self.entries[cursor] {
                keys.push(entry.key.clone());
            }
            cursor = self.next[cursor];
        }
        keys
    }
}

/// Thread-safe bounded LRU cache with optional periodic flushing.
///
/// Holds non-authoritative copies: the periodic flush bounds how long an entry
/// can outlive an out-of-band change in the store.
pub struct RecencyCache<V> {
    state: Arc<Mutex<LruState<V>>>,
    capacity: usize,
    flusher: Option<FlushTask>,
}

impl<V: Clone + Send + 'static> RecencyCache<V> {
    pub const DEFAULT_CAPACITY: usize = 32;
    pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5 * 60);

    /// Creates a cache without a background flush.
    ///
    /// A capacity of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Arc::new(Mutex::new(LruState::new(capacity))),
            capacity,
            flusher: None,
        }
    }

    /// Creates a cache that flushes itself every `interval`.
    ///
    /// Must be called from within a Tokio runtime. The flush task stops when the
    /// cache is closed or dropped. A zero `interval` disables periodic flushing.
    pub fn with_periodic_flush(capacity: usize, interval: Duration) -> Self {
        let mut cache = Self::new(capacity);
        if interval.is_zero() {
            return cache;
        }
        let weak = Arc::downgrade(&cache.state);

        cache.flusher = Some(FlushTask::spawn(interval, move || {
            let Some(state) = weak.upgrade() else {
                return false;
            };
            let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
            let dropped = guard.len();
            guard.clear();
            drop(guard);

            metrics::counter!("redirect_cache_flushes_total").increment(1);
            debug!("Cache periodic FLUSH: {} entries dropped", dropped);
            true
        }));
        info!(
            "Recency cache started (capacity: {}, flush every {:?})",
            cache.capacity, interval
        );
        cache
    }

    /// Returns the cached value and marks it most recently used.
    pub fn get(&self, key: &str) -> Option<V> {
        let value = self.lock().get(key).cloned();
        match value {
            Some(_) => metrics::counter!("redirect_cache_hits_total").increment(1),
            None => metrics::counter!("redirect_cache_misses_total").increment(1),
        }
        value
    }

    /// Inserts or replaces `key`, evicting the least recently used entry when full.
    pub fn put(&self, key: impl Into<String>, value: V) {
        let evicted = self.lock().put(key.into(), value);
        if let Some(evicted) = evicted {
            metrics::counter!("redirect_cache_evictions_total").increment(1);
            debug!("Cache EVICT: {}", evicted);
        }
    }

    /// Drops a single entry. Returns true if it was resident.
    pub fn invalidate(&self, key: &str) -> bool {
        self.lock().remove(key)
    }

    /// Drops every entry.
    pub fn flush(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Resident keys from most to least recently used.
    pub fn keys_by_recency(&self) -> Vec<String> {
        self.lock().keys_by_recency()
    }

    /// Returns true while a background flush task is attached.
    pub fn is_flushing_periodically(&self) -> bool {
        self.flusher.is_some()
    }

    /// Stops the background flush task and waits for it to exit.
    pub async fn close(&mut self) {
        if let Some(flusher) = self.flusher.take() {
            flusher.stop().await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruState<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_cache_misses() {
        let cache: RecencyCache<u32> = RecencyCache::new(2);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_then_get() {
        let cache = RecencyCache::new(2);
        cache.put("a", 1);

        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evicts_first_inserted() {
        let cache = RecencyCache::new(3);
        for (i, k) in ["a", "b", "c", "d"].iter().enumerate() {
            cache.put(*k, i);
        }

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(1));
        assert_eq!(cache.get("c"), Some(2));
        assert_eq!(cache.get("d"), Some(3));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_get_promotes() {
        let cache = RecencyCache::new(2);
        cache.put("a", 1);
        cache.put("b", 2);
        assert_eq!(cache.get("a"), Some(1));
        cache.put("c", 3);

        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn test_replace_keeps_len_and_promotes() {
        let cache = RecencyCache::new(2);
        cache.put("a", 1);
        cache.put("b", 2);
        cache.put("a", 10);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.keys_by_recency(), vec!["a", "b"]);

        cache.put("c", 3);
        assert_eq!(cache.get("a"), Some(10));
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn test_invalidate_frees_slot() {
        let cache = RecencyCache::new(2);
        cache.put("a", 1);
        cache.put("b", 2);

        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert_eq!(cache.len(), 1);

        cache.put("c", 3);
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.keys_by_recency(), vec!["c", "b"]);
    }

    #[test]
    fn test_invalidate_head_and_tail() {
        let cache = RecencyCache::new(3);
        cache.put("a", 1);
        cache.put("b", 2);
        cache.put("c", 3);

        assert!(cache.invalidate("c"));
        assert!(cache.invalidate("a"));
        assert_eq!(cache.keys_by_recency(), vec!["b"]);

        cache.put("d", 4);
        cache.put("e", 5);
        cache.put("f", 6);
        assert_eq!(cache.keys_by_recency(), vec!["f", "e", "d"]);
    }

    #[test]
    fn test_flush_clears_everything() {
        let cache = RecencyCache::new(4);
        cache.put("a", 1);
        cache.put("b", 2);
        cache.flush();

        assert_eq!(cache.len(), 0);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), None);

        cache.put("c", 3);
        assert_eq!(cache.keys_by_recency(), vec!["c"]);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let cache = RecencyCache::new(0);
        cache.put("a", 1);

        assert_eq!(cache.capacity(), 1);
        assert_eq!(cache.get("a"), Some(1));
        cache.put("b", 2);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_one_replace() {
        let cache = RecencyCache::new(1);
        cache.put("a", 1);
        cache.put("a", 2);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_flush_empties_cache() {
        let interval = Duration::from_secs(300);
        let mut cache = RecencyCache::with_periodic_flush(4, interval);
        cache.put("a", 1);

        tokio::time::sleep(interval / 2).await;
        assert_eq!(cache.len(), 1);

        tokio::time::sleep(interval).await;
        assert_eq!(cache.len(), 0);

        cache.close().await;
        assert!(!cache.is_flushing_periodically());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_never_flushes() {
        let cache = RecencyCache::with_periodic_flush(4, Duration::ZERO);
        assert!(!cache.is_flushing_periodically());

        cache.put("a", 1);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(cache.get("a"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_cache_stops_flushing() {
        let interval = Duration::from_secs(60);
        let mut cache = RecencyCache::with_periodic_flush(4, interval);
        cache.close().await;

        cache.put("a", 1);
        tokio::time::sleep(interval * 3).await;
        assert_eq!(cache.get("a"), Some(1));
    }
}
