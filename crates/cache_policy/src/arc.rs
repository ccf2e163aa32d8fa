// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Adaptive replacement cache.
//!
//! Four partitions share one slab:
//!
//! ```text
//!   T1  resident, seen once recently        B1  ghosts evicted from T1 (keys only)
//!   T2  resident, seen at least twice       B2  ghosts evicted from T2 (keys only)
//! ```
//!
//! `|T1| + |T2| <= c` and `|T1| + |T2| + |B1| + |B2| <= 2c` hold after every operation. The
//! target size of T1, `p`, moves up on B1 ghost hits and down on B2 ghost hits, so the cache
//! drifts toward whichever side would have produced more hits had it been larger.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;

use foldhash::fast::RandomState;
use parking_lot::Mutex;

use crate::EvictionListener;
use crate::list::{List, NodeIndex, Slab};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    T1,
    T2,
    B1,
    B2,
}

impl Segment {
    const fn is_resident(self) -> bool {
        matches!(self, Self::T1 | Self::T2)
    }
}

#[derive(Debug)]
struct Entry<K, V> {
    key: K,
    value: Option<V>,
    segment: Segment,
}

/// Entries that left the cache during one locked operation, reported once the lock is released.
enum Departed<K, V> {
    Evicted(K, V),
    Forgotten(K),
}

/// Sizes of the four partitions and the adaptation target, read under a single lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitions {
    /// Resident entries seen once recently.
    pub t1: usize,
    /// Resident entries seen repeatedly.
    pub t2: usize,
    /// Ghost keys evicted from T1.
    pub b1: usize,
    /// Ghost keys evicted from T2.
    pub b2: usize,
    /// Target size of T1.
    pub p: usize,
}

impl Partitions {
    /// Number of resident entries.
    #[must_use]
    pub const fn resident(&self) -> usize {
        self.t1 + self.t2
    }

    /// Number of tracked identities, resident and ghost.
    #[must_use]
    pub const fn tracked(&self) -> usize {
        self.t1 + self.t2 + self.b1 + self.b2
    }
}

struct State<K, V> {
    capacity: usize,
    p: usize,
    index: HashMap<K, NodeIndex, RandomState>,
    slab: Slab<Entry<K, V>>,
    t1: List,
    t2: List,
    b1: List,
    b2: List,
}

impl<K, V> State<K, V>
where
    K: Clone + Eq + Hash,
{
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            p: 0,
            index: HashMap::with_capacity_and_hasher(capacity * 2, RandomState::default()),
            slab: Slab::with_capacity(capacity * 2),
            t1: List::new(),
            t2: List::new(),
            b1: List::new(),
            b2: List::new(),
        }
    }

    fn segment_of(&self, idx: NodeIndex) -> Option<Segment> {
        self.slab.get(idx).map(|entry| entry.segment)
    }

    fn resident_len(&self) -> usize {
        self.t1.len() + self.t2.len()
    }

    fn tracked_len(&self) -> usize {
        self.resident_len() + self.b1.len() + self.b2.len()
    }

    fn detach(&mut self, idx: NodeIndex) {
        let Some(segment) = self.segment_of(idx) else {
            return;
        };
        let list = match segment {
            Segment::T1 => &mut self.t1,
            Segment::T2 => &mut self.t2,
            Segment::B1 => &mut self.b1,
            Segment::B2 => &mut self.b2,
        };
        list.unlink(&mut self.slab, idx);
    }

    fn attach(&mut self, idx: NodeIndex, segment: Segment) {
        if let Some(entry) = self.slab.get_mut(idx) {
            entry.segment = segment;
        }
        let list = match segment {
            Segment::T1 => &mut self.t1,
            Segment::T2 => &mut self.t2,
            Segment::B1 => &mut self.b1,
            Segment::B2 => &mut self.b2,
        };
        list.push_front(&mut self.slab, idx);
    }

    fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.index.get(key)?;
        if !self.segment_of(idx)?.is_resident() {
            return None;
        }
        self.detach(idx);
        self.attach(idx, Segment::T2);
        self.slab.get(idx).and_then(|entry| entry.value.as_ref())
    }

    fn add(&mut self, key: K, value: V, departed: &mut Vec<Departed<K, V>>) -> Option<V> {
        if let Some(&idx) = self.index.get(&key) {
            // The partition is read before anything moves, so `replace` sees where the key was.
            return match self.segment_of(idx)? {
                Segment::T1 | Segment::T2 => {
                    let previous = self.slab.get_mut(idx)?.value.replace(value);
                    self.detach(idx);
                    self.attach(idx, Segment::T2);
                    previous
                }
                Segment::B1 => {
                    let delta = (self.b2.len() / self.b1.len().max(1)).max(1);
                    self.p = (self.p + delta).min(self.capacity);
                    self.revive(idx, value, Segment::T1, false, departed);
                    None
                }
                Segment::B2 => {
                    let delta = (self.b1.len() / self.b2.len().max(1)).max(1);
                    self.p = self.p.saturating_sub(delta);
                    self.revive(idx, value, Segment::T2, true, departed);
                    None
                }
            };
        }

        if self.t1.len() + self.b1.len() >= self.capacity {
            if self.t1.len() < self.capacity {
                self.forget_lru(Segment::B1, departed);
                self.replace_if_full(false, departed);
            } else {
                self.evict_lru_t1(departed);
            }
        } else if self.tracked_len() >= self.capacity {
            if self.tracked_len() >= 2 * self.capacity {
                self.forget_lru(Segment::B2, departed);
            }
            self.replace_if_full(false, departed);
        }

        let idx = self.slab.insert(Entry {
            key: key.clone(),
            value: Some(value),
            segment: Segment::T1,
        });
        self.index.insert(key, idx);
        self.attach(idx, Segment::T1);
        None
    }

    /// Brings a ghost entry back into residency after the adaptation step.
    fn revive(&mut self, idx: NodeIndex, value: V, target: Segment, frequency_side: bool, departed: &mut Vec<Departed<K, V>>) {
        self.replace_if_full(frequency_side, departed);
        self.detach(idx);
        if let Some(entry) = self.slab.get_mut(idx) {
            entry.value = Some(value);
        }
        self.attach(idx, target);
    }

    fn replace_if_full(&mut self, frequency_side: bool, departed: &mut Vec<Departed<K, V>>) {
        if self.resident_len() >= self.capacity {
            self.replace(frequency_side, departed);
        }
    }

    /// Demotes one resident entry to its ghost list.
    ///
    /// T1 gives up its tail when it is above target, or exactly at target while the triggering
    /// key comes from the frequency side. Otherwise T2 does.
    fn replace(&mut self, frequency_side: bool, departed: &mut Vec<Departed<K, V>>) {
        let t1 = self.t1.len();
        let from_t1 = (t1 > 0 && (t1 > self.p || (t1 == self.p && frequency_side))) || self.t2.is_empty();

        let (source, ghost) = if from_t1 {
            (&mut self.t1, Segment::B1)
        } else {
            (&mut self.t2, Segment::B2)
        };
        let Some(idx) = source.pop_back(&mut self.slab) else {
            return;
        };

        let Some(entry) = self.slab.get_mut(idx) else {
            return;
        };
        if let Some(value) = entry.value.take() {
            departed.push(Departed::Evicted(entry.key.clone(), value));
        }
        self.attach(idx, ghost);
    }

    /// Drops the oldest ghost of `segment` from tracking.
    fn forget_lru(&mut self, segment: Segment, departed: &mut Vec<Departed<K, V>>) {
        let list = if segment == Segment::B1 { &mut self.b1 } else { &mut self.b2 };
        let Some(idx) = list.pop_back(&mut self.slab) else {
            return;
        };
        if let Some(entry) = self.slab.remove(idx) {
            self.index.remove(&entry.key);
            departed.push(Departed::Forgotten(entry.key));
        }
    }

    /// Evicts the oldest T1 entry without remembering it.
    fn evict_lru_t1(&mut self, departed: &mut Vec<Departed<K, V>>) {
        let Some(idx) = self.t1.pop_back(&mut self.slab) else {
            return;
        };
        if let Some(entry) = self.slab.remove(idx) {
            self.index.remove(&entry.key);
            if let Some(value) = entry.value {
                departed.push(Departed::Evicted(entry.key, value));
            }
        }
    }

    fn remove<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.index.get(key)?;
        self.detach(idx);
        self.index.remove(key);
        let entry = self.slab.remove(idx)?;
        entry.value.map(|value| (entry.key, value))
    }

    fn clear(&mut self, departed: &mut Vec<Departed<K, V>>) {
        let resident: Vec<NodeIndex> = self.t1.iter(&self.slab).chain(self.t2.iter(&self.slab)).collect();
        for idx in resident {
            if let Some(Entry { key, value: Some(value), .. }) = self.slab.remove(idx) {
                departed.push(Departed::Evicted(key, value));
            }
        }
        self.slab.clear();
        self.index.clear();
        self.t1 = List::new();
        self.t2 = List::new();
        self.b1 = List::new();
        self.b2 = List::new();
        self.p = 0;
    }

    fn partitions(&self) -> Partitions {
        Partitions {
            t1: self.t1.len(),
            t2: self.t2.len(),
            b1: self.b1.len(),
            b2: self.b2.len(),
            p: self.p,
        }
    }
}

/// A thread-safe adaptive replacement cache.
///
/// Entries enter the recency partition (T1) and move to the frequency partition (T2) on their
/// next hit. Evicted entries leave their key behind in a ghost list; re-inserting a ghost key
/// adapts the T1 target `p` and brings the key straight back:
///
/// - a B1 ghost raises `p` by `max(1, len(B2) / len(B1))`, capped at the capacity, and returns to T1;
/// - a B2 ghost lowers `p` by `max(1, len(B1) / len(B2))`, floored at zero, and returns to T2.
///
/// All structural mutation happens under one lock. Eviction listeners run after it is released.
///
/// # Examples
///
/// ```
/// use std::num::NonZeroUsize;
/// use cache_policy::ArcCache;
///
/// let cache = ArcCache::new(NonZeroUsize::new(2).unwrap());
/// cache.add("a", 1);
/// cache.add("b", 2);
///
/// // A hit promotes "a" into the frequency partition.
/// assert_eq!(cache.get(&"a"), Some(1));
/// assert_eq!(cache.t2_len(), 1);
///
/// // "b" is demoted to the B1 ghost list to make room for "c".
/// cache.add("c", 3);
/// assert!(!cache.contains(&"b"));
/// assert_eq!(cache.b1_len(), 1);
/// ```
pub struct ArcCache<K, V> {
    state: Mutex<State<K, V>>,
    listener: Option<Arc<dyn EvictionListener<K, V>>>,
}

impl<K, V> ArcCache<K, V>
where
    K: Clone + Eq + Hash,
{
    /// Creates a cache holding at most `capacity` resident entries.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            state: Mutex::new(State::new(capacity.get())),
            listener: None,
        }
    }

    /// Registers the listener notified when values or ghost keys leave the cache.
    #[must_use]
    pub fn with_listener(mut self, listener: impl EvictionListener<K, V> + 'static) -> Self {
        self.listener = Some(Arc::new(listener));
        self
    }

    /// Looks up `key`, promoting a hit into the frequency partition.
    ///
    /// Ghost keys and absent keys are misses and leave the cache untouched.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.state.lock().get(key).cloned()
    }

    /// Inserts or updates `key`.
    ///
    /// Returns the previous value if the key was resident.
    pub fn add(&self, key: K, value: V) -> Option<V> {
        let mut departed = Vec::new();
        let previous = self.state.lock().add(key, value, &mut departed);
        self.notify(departed);
        previous
    }

    /// Removes `key` from the cache, resident or ghost.
    ///
    /// The listener is notified only if a value was resident.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let (key, value) = self.state.lock().remove(key)?;
        if let Some(listener) = &self.listener {
            listener.on_evict(&key, &value);
        }
        Some(value)
    }

    /// Notifies the listener for every resident entry, then forgets everything including `p`.
    pub fn clear(&self) {
        let mut departed = Vec::new();
        self.state.lock().clear(&mut departed);
        self.notify(departed);
    }

    /// Returns `true` if `key` is resident. Ghost keys do not count.
    #[must_use]
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let state = self.state.lock();
        state
            .index
            .get(key)
            .and_then(|&idx| state.segment_of(idx))
            .is_some_and(Segment::is_resident)
    }

    /// Returns the number of resident entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().resident_len()
    }

    /// Returns `true` if no entries are resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the maximum number of resident entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    /// Returns the current target size of T1.
    #[must_use]
    pub fn p(&self) -> usize {
        self.state.lock().p
    }

    /// Returns the number of entries in T1.
    #[must_use]
    pub fn t1_len(&self) -> usize {
        self.state.lock().t1.len()
    }

    /// Returns the number of entries in T2.
    #[must_use]
    pub fn t2_len(&self) -> usize {
        self.state.lock().t2.len()
    }

    /// Returns the number of ghost keys in B1.
    #[must_use]
    pub fn b1_len(&self) -> usize {
        self.state.lock().b1.len()
    }

    /// Returns the number of ghost keys in B2.
    #[must_use]
    pub fn b2_len(&self) -> usize {
        self.state.lock().b2.len()
    }

    /// Returns all partition sizes and `p` from one consistent view.
    #[must_use]
    pub fn partitions(&self) -> Partitions {
        self.state.lock().partitions()
    }

    fn notify(&self, departed: Vec<Departed<K, V>>) {
        let Some(listener) = &self.listener else {
            return;
        };
        for entry in departed {
            match entry {
                Departed::Evicted(key, value) => listener.on_evict(&key, &value),
                Departed::Forgotten(key) => listener.on_forget(&key),
            }
        }
    }
}

impl<K, V> Debug for ArcCache<K, V>
where
    K: Clone + Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArcCache")
            .field("partitions", &self.partitions())
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}
