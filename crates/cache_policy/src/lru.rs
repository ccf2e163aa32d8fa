// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Plain least-recently-used eviction policy.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::sync::Arc;

use foldhash::fast::RandomState;

use crate::EvictionListener;
use crate::list::{List, NodeIndex, Slab};

/// A bounded map that evicts its least recently used entry on overflow.
///
/// Every operation is O(1): entries sit on a recency list and a hash index maps each key
/// straight to its list node. A capacity of `0` means the cache never evicts on its own.
///
/// `LruCache` is not synchronized. Owners that share it across threads wrap it in their own
/// lock; reads take `&mut self` because a hit reorders the recency list.
///
/// # Examples
///
/// ```
/// use cache_policy::LruCache;
///
/// let mut cache = LruCache::new(2);
/// cache.add("a", 1);
/// cache.add("b", 2);
/// cache.get(&"a");
/// cache.add("c", 3);
///
/// // "b" was the least recently used entry.
/// assert!(!cache.contains(&"b"));
/// assert_eq!(cache.len(), 2);
/// ```
pub struct LruCache<K, V> {
    capacity: usize,
    index: HashMap<K, NodeIndex, RandomState>,
    slab: Slab<(K, V)>,
    order: List,
    listener: Option<Arc<dyn EvictionListener<K, V>>>,
}

impl<K, V> LruCache<K, V>
where
    K: Clone + Eq + Hash,
{
    /// Creates a cache holding at most `capacity` entries, or an unbounded one for `0`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            index: HashMap::with_capacity_and_hasher(capacity, RandomState::default()),
            slab: Slab::with_capacity(capacity),
            order: List::new(),
            listener: None,
        }
    }

    /// Creates a cache that only shrinks through explicit removal.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(0)
    }

    /// Registers the listener notified for every entry that leaves the cache.
    #[must_use]
    pub fn with_listener(mut self, listener: impl EvictionListener<K, V> + 'static) -> Self {
        self.listener = Some(Arc::new(listener));
        self
    }

    /// Inserts or updates `key`, marking it most recently used.
    ///
    /// Returns the previous value when the key was already present. When the insert pushes
    /// the cache past its capacity, the least recently used entry is evicted.
    pub fn add(&mut self, key: K, value: V) -> Option<V> {
        if let Some(&idx) = self.index.get(&key) {
            self.order.move_to_front(&mut self.slab, idx);
            let (_, slot) = self.slab.get_mut(idx)?;
            return Some(std::mem::replace(slot, value));
        }

        let idx = self.slab.insert((key.clone(), value));
        self.order.push_front(&mut self.slab, idx);
        self.index.insert(key, idx);

        if self.capacity != 0 && self.order.len() > self.capacity {
            self.remove_oldest();
        }
        None
    }

    /// Looks up `key`, marking it most recently used on a hit.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.index.get(key)?;
        self.order.move_to_front(&mut self.slab, idx);
        self.slab.get(idx).map(|(_, value)| value)
    }

    /// Looks up `key` without touching its recency.
    #[must_use]
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.index.get(key)?;
        self.slab.get(idx).map(|(_, value)| value)
    }

    /// Returns `true` if `key` is resident.
    #[must_use]
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.contains_key(key)
    }

    /// Removes `key`, notifying the listener.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = self.index.remove(key)?;
        self.order.unlink(&mut self.slab, idx);
        let (key, value) = self.slab.remove(idx)?;
        self.notify(&key, &value);
        Some(value)
    }

    /// Evicts the least recently used entry, notifying the listener.
    pub fn remove_oldest(&mut self) -> Option<(K, V)> {
        let idx = self.order.pop_back(&mut self.slab)?;
        let (key, value) = self.slab.remove(idx)?;
        self.index.remove(&key);
        self.notify(&key, &value);
        Some((key, value))
    }

    /// Returns the number of resident entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if no entries are resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns the configured capacity; `0` means unbounded.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Notifies the listener for every entry, then empties the cache.
    pub fn clear(&mut self) {
        if let Some(listener) = &self.listener {
            for idx in self.order.iter(&self.slab) {
                if let Some((key, value)) = self.slab.get(idx) {
                    listener.on_evict(key, value);
                }
            }
        }
        self.index.clear();
        self.slab.clear();
        self.order = List::new();
    }

    /// Iterates over keys from most to least recently used.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.order.iter(&self.slab).filter_map(|idx| self.slab.get(idx).map(|(key, _)| key))
    }

    fn notify(&self, key: &K, value: &V) {
        if let Some(listener) = &self.listener {
            listener.on_evict(key, value);
        }
    }
}

impl<K, V> Debug for LruCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache")
            .field("capacity", &self.capacity)
            .field("len", &self.order.len())
            .field("has_listener", &self.listener.is_some())
            .finish_non_exhaustive()
    }
}
