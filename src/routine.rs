//! The bounded LRU [`RoutineCache`] mapping a state key to an opaque
//! compiled [`Routine`].
//!
//! Grounded on the original's routine cache (bucket hash map + intrusive
//! doubly-linked list) but expressed with safe indices into a `Vec`
//! instead of raw intrusive pointers, per the "arena indices, no raw
//! pointers between subsystems" redesign note. A read-only snapshot is
//! published through `arc_swap::ArcSwap` so workers can look routines up
//! without taking the cache's lock, matching "snapshot publishing is
//! lock-free via an atomic pointer swap" from the concurrency model.

use arc_swap::ArcSwap;
use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::hash::Hash;
use std::sync::Arc;

/// An opaque compiled kernel: a reference-counted function pointer/closure
/// holder. `T` is whatever signature the vertex/setup/pixel stage needs.
pub type Routine<T> = Arc<T>;

struct Entry<K, T> {
    key: K,
    routine: Routine<T>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// A fixed-capacity LRU cache from state key to compiled routine.
///
/// On a miss the caller-supplied generator produces the routine; the
/// cache then owns it until it is evicted, at which point the routine's
/// `Arc` is dropped and the underlying resources are reclaimed once every
/// concurrent holder (e.g. an in-flight `DrawCall`) has released its own
/// reference.
pub struct RoutineCache<K, T> {
    capacity: usize,
    inner: Mutex<Inner<K, T>>,
    snapshot: ArcSwap<FxHashMap<K, Routine<T>>>,
}

struct Inner<K, T> {
    entries: Vec<Option<Entry<K, T>>>,
    index: FxHashMap<K, usize>,
    head: Option<usize>, // most recently used
    tail: Option<usize>, // least recently used
    free: Vec<usize>,
}

impl<K, T> RoutineCache<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                entries: Vec::with_capacity(capacity),
                index: FxHashMap::default(),
                head: None,
                tail: None,
                free: Vec::new(),
            }),
            snapshot: ArcSwap::from_pointee(FxHashMap::default()),
        }
    }

    /// Look the key up in the (lock-free) published snapshot only. Misses
    /// here do *not* imply a miss in the authoritative cache — the
    /// snapshot may simply be stale — so callers that need an
    /// authoritative answer should fall back to [`Self::get_or_insert`].
    pub fn lookup_snapshot(&self, key: &K) -> Option<Routine<T>> {
        self.snapshot.load().get(key).cloned()
    }

    /// Look up `key`, generating and caching a routine with `generate` on
    /// a miss. Always brings the entry to the front of the LRU list.
    pub fn get_or_insert(&self, key: &K, generate: impl FnOnce() -> T) -> Routine<T> {
        let mut inner = self.inner.lock();

        if let Some(&idx) = inner.index.get(key) {
            inner.touch(idx);
            return inner.entries[idx].as_ref().unwrap().routine.clone();
        }

        let routine: Routine<T> = Arc::new(generate());
        let idx = inner.insert(key.clone(), routine.clone(), self.capacity);
        let _ = idx;
        self.publish_snapshot(&inner);
        routine
    }

    fn publish_snapshot(&self, inner: &Inner<K, T>) {
        let mut map = FxHashMap::default();
        map.reserve(inner.index.len());
        for (k, &idx) in inner.index.iter() {
            if let Some(entry) = &inner.entries[idx] {
                map.insert(k.clone(), entry.routine.clone());
            }
        }
        self.snapshot.store(Arc::new(map));
    }

    pub fn len(&self) -> usize {
        self.inner.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Clone, T> Inner<K, T> {
    fn touch(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let e = self.entries[idx].as_ref().unwrap();
            (e.prev, e.next)
        };
        match prev {
            Some(p) => self.entries[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.entries[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let e = self.entries[idx].as_mut().unwrap();
            e.prev = None;
            e.next = old_head;
        }
        if let Some(h) = old_head {
            self.entries[h].as_mut().unwrap().prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn insert(&mut self, key: K, routine: Routine<T>, capacity: usize) -> usize {
        if self.index.len() >= capacity {
            if let Some(tail) = self.tail {
                self.evict(tail);
            }
        }

        let idx = if let Some(free_idx) = self.free.pop() {
            self.entries[free_idx] = Some(Entry { key: key.clone(), routine, prev: None, next: None });
            free_idx
        } else {
            self.entries.push(Some(Entry { key: key.clone(), routine, prev: None, next: None }));
            self.entries.len() - 1
        };

        self.index.insert(key, idx);
        self.push_front(idx);
        idx
    }

    fn evict(&mut self, idx: usize) {
        self.unlink(idx);
        if let Some(entry) = self.entries[idx].take() {
            self.index.remove(&entry.key);
            log::trace!("routine cache evicted an entry to stay within capacity");
        }
        self.free.push(idx);
    }
}
