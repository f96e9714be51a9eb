use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

/// Charge-bounded least-recently-used cache.
///
/// Values are handed out as `Arc<V>`. While a caller holds one, the entry is
/// pinned: eviction walks past it, so total charge may exceed capacity until
/// the caller lets go.
///
/// Recency is an intrusive doubly linked list threaded through a slab of
/// entries by index, so promotion and eviction are O(1).
pub struct LruCache<K, V> {
    capacity: usize,
    inner: Mutex<LruInner<K, V>>,
}

struct Entry<K, V> {
    key: K,
    value: Arc<V>,
    charge: usize,
    /// Towards the most recent end.
    prev: Option<usize>,
    /// Towards the least recent end.
    next: Option<usize>,
}

struct LruInner<K, V> {
    map: HashMap<K, usize>,
    slab: Vec<Option<Entry<K, V>>>,
    free: Vec<usize>,
    /// Most recently used.
    head: Option<usize>,
    /// Least recently used.
    tail: Option<usize>,
    usage: usize,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        LruCache {
            capacity,
            inner: Mutex::new(LruInner {
                map: HashMap::new(),
                slab: Vec::new(),
                free: Vec::new(),
                head: None,
                tail: None,
                usage: 0,
            }),
        }
    }

    /// Look up `key`, marking it most recently used.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let mut inner = self.inner.lock();
        let idx = *inner.map.get(key)?;
        inner.unlink(idx);
        inner.push_front(idx);
        inner.slab[idx].as_ref().map(|e| Arc::clone(&e.value))
    }

    /// Insert (or replace) `key`, then evict unpinned entries from the cold
    /// end until the cache fits. A zero-capacity cache stores nothing.
    pub fn insert(&self, key: K, value: V, charge: usize) -> Arc<V> {
        let value = Arc::new(value);
        if self.capacity == 0 {
            return value;
        }

        let mut inner = self.inner.lock();
        if let Some(old) = inner.map.get(&key).copied() {
            inner.remove(old);
        }
        let entry = Entry {
            key: key.clone(),
            value: Arc::clone(&value),
            charge,
            prev: None,
            next: None,
        };
        let idx = match inner.free.pop() {
            Some(i) => {
                inner.slab[i] = Some(entry);
                i
            }
            None => {
                inner.slab.push(Some(entry));
                inner.slab.len() - 1
            }
        };
        inner.map.insert(key, idx);
        inner.push_front(idx);
        inner.usage += charge;
        inner.evict(self.capacity);
        value
    }

    pub fn erase(&self, key: &K) {
        let mut inner = self.inner.lock();
        if let Some(idx) = inner.map.get(key).copied() {
            inner.remove(idx);
        }
    }

    pub fn total_charge(&self) -> usize {
        self.inner.lock().usage
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<K: Hash + Eq + Clone, V> LruInner<K, V> {
    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match &self.slab[idx] {
            Some(e) => (e.prev, e.next),
            None => return,
        };
        match prev {
            Some(p) => {
                if let Some(e) = self.slab[p].as_mut() {
                    e.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(e) = self.slab[n].as_mut() {
                    e.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(e) = self.slab[idx].as_mut() {
            e.prev = None;
            e.next = old_head;
        }
        if let Some(h) = old_head {
            if let Some(e) = self.slab[h].as_mut() {
                e.prev = Some(idx);
            }
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn remove(&mut self, idx: usize) {
        self.unlink(idx);
        if let Some(entry) = self.slab[idx].take() {
            self.map.remove(&entry.key);
            self.usage -= entry.charge;
            self.free.push(idx);
        }
    }

    fn evict(&mut self, capacity: usize) {
        let mut cursor = self.tail;
        while self.usage > capacity {
            let Some(idx) = cursor else { break };
            let (prev, pinned) = match &self.slab[idx] {
                Some(e) => (e.prev, Arc::strong_count(&e.value) > 1),
                None => break,
            };
            if !pinned {
                self.remove(idx);
            }
            cursor = prev;
        }
    }
}
