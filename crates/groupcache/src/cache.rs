// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cache_policy::{ArcCache, LruCache};
use parking_lot::Mutex;

use crate::ByteView;
use crate::stats::{CacheStats, Counter};

/// Eviction policy used for a group's caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    /// Least recently used.
    Lru,
    /// Adaptive replacement, balancing recency against frequency.
    #[default]
    Adaptive,
}

enum Policy {
    Lru(Mutex<LruCache<String, ByteView>>),
    Adaptive(ArcCache<String, ByteView>),
}

/// One of a group's key to value caches, with its counters.
pub(crate) struct ValueCache {
    policy: Policy,
    gets: Counter,
    hits: Counter,
    evictions: Arc<AtomicU64>,
}

impl ValueCache {
    /// Creates a cache of the given kind.
    ///
    /// A capacity of zero is unbounded for [`PolicyKind::Lru`] and holds a single entry for
    /// [`PolicyKind::Adaptive`].
    pub(crate) fn new(kind: PolicyKind, capacity: usize) -> Self {
        let evictions = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&evictions);
        let on_evict = move |_: &String, _: &ByteView| {
            counter.fetch_add(1, Ordering::Relaxed);
        };

        let policy = match kind {
            PolicyKind::Lru => Policy::Lru(Mutex::new(LruCache::new(capacity).with_listener(on_evict))),
            PolicyKind::Adaptive => {
                let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
                Policy::Adaptive(ArcCache::new(capacity).with_listener(on_evict))
            }
        };

        Self {
            policy,
            gets: Counter::default(),
            hits: Counter::default(),
            evictions,
        }
    }

    pub(crate) fn get(&self, key: &str) -> Option<ByteView> {
        self.gets.increment();
        let value = match &self.policy {
            Policy::Lru(cache) => cache.lock().get(key).cloned(),
            Policy::Adaptive(cache) => cache.get(key),
        };
        if value.is_some() {
            self.hits.increment();
        }
        value
    }

    pub(crate) fn add(&self, key: &str, value: ByteView) {
        match &self.policy {
            Policy::Lru(cache) => {
                cache.lock().add(key.to_owned(), value);
            }
            Policy::Adaptive(cache) => {
                cache.add(key.to_owned(), value);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        match &self.policy {
            Policy::Lru(cache) => cache.lock().len(),
            Policy::Adaptive(cache) => cache.len(),
        }
    }

    pub(crate) fn stats(&self) -> CacheStats {
        CacheStats {
            items: self.len() as u64,
            gets: self.gets.get(),
            hits: self.hits.get(),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_hits_and_evictions() {
        for kind in [PolicyKind::Lru, PolicyKind::Adaptive] {
            let cache = ValueCache::new(kind, 2);
            cache.add("a", ByteView::from("1"));
            cache.add("b", ByteView::from("2"));
            cache.add("c", ByteView::from("3"));

            assert_eq!(cache.get("c"), Some(ByteView::from("3")));
            assert_eq!(cache.get("missing"), None);

            assert_eq!(
                cache.stats(),
                CacheStats {
                    items: 2,
                    gets: 2,
                    hits: 1,
                    evictions: 1,
                },
                "{kind:?}"
            );
        }
    }

    #[test]
    fn zero_capacity_lru_is_unbounded() {
        let cache = ValueCache::new(PolicyKind::Lru, 0);
        for i in 0..100 {
            cache.add(&i.to_string(), ByteView::default());
        }
        assert_eq!(cache.len(), 100);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn zero_capacity_adaptive_holds_one_entry() {
        let cache = ValueCache::new(PolicyKind::Adaptive, 0);
        cache.add("a", ByteView::from("1"));
        cache.add("b", ByteView::from("2"));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("b"), Some(ByteView::from("2")));
        assert_eq!(cache.stats().evictions, 1);
    }
}
