// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Observer notified when entries leave a cache.
///
/// Listeners run synchronously on the thread performing the mutation. [`ArcCache`](crate::ArcCache)
/// invokes them after releasing its internal lock, so a listener may call back into the cache.
///
/// Any `Fn(&K, &V)` closure is a listener:
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use cache_policy::LruCache;
///
/// let evicted = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&evicted);
///
/// let mut cache = LruCache::new(1).with_listener(move |_: &&str, _: &i32| {
///     counter.fetch_add(1, Ordering::Relaxed);
/// });
/// cache.add("a", 1);
/// cache.add("b", 2);
/// assert_eq!(evicted.load(Ordering::Relaxed), 1);
/// ```
pub trait EvictionListener<K, V>: Send + Sync {
    /// Called when a resident entry is evicted, removed or cleared.
    fn on_evict(&self, key: &K, value: &V);

    /// Called when a key the cache only remembered (a ghost entry without a value) is dropped.
    fn on_forget(&self, key: &K) {
        let _ = key;
    }
}

impl<K, V, F> EvictionListener<K, V> for F
where
    F: Fn(&K, &V) + Send + Sync,
{
    fn on_evict(&self, key: &K, value: &V) {
        self(key, value);
    }
}
