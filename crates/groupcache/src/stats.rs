// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing the traffic of one group.
///
/// Every counter only grows. Counters are incremented independently, so a snapshot taken
/// while requests are running may be mid-update across fields.
#[derive(Debug, Default)]
pub(crate) struct Stats {
    pub(crate) gets: Counter,
    pub(crate) cache_hits: Counter,
    pub(crate) peer_loads: Counter,
    pub(crate) peer_errors: Counter,
    pub(crate) loads: Counter,
    pub(crate) loads_deduped: Counter,
    pub(crate) local_loads: Counter,
    pub(crate) local_load_errs: Counter,
    pub(crate) server_requests: Counter,
}

impl Stats {
    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            gets: self.gets.get(),
            cache_hits: self.cache_hits.get(),
            peer_loads: self.peer_loads.get(),
            peer_errors: self.peer_errors.get(),
            loads: self.loads.get(),
            loads_deduped: self.loads_deduped.get(),
            local_loads: self.local_loads.get(),
            local_load_errs: self.local_load_errs.get(),
            server_requests: self.server_requests.get(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counter(AtomicU64);

impl Counter {
    pub(crate) fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Point-in-time copy of a group's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Calls to `get`, including those served from cache.
    pub gets: u64,
    /// Lookups answered by the main or hot cache.
    pub cache_hits: u64,
    /// Values fetched from a remote peer.
    pub peer_loads: u64,
    /// Remote fetches that failed and fell back to a local load.
    pub peer_errors: u64,
    /// Lookups that missed both caches.
    pub loads: u64,
    /// Loads that actually ran after concurrent duplicates were collapsed.
    pub loads_deduped: u64,
    /// Calls into the group's value producer.
    pub local_loads: u64,
    /// Value producer calls that failed.
    pub local_load_errs: u64,
    /// Requests received from other peers.
    pub server_requests: u64,
}

/// Which of a group's two caches to inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheType {
    /// Values this process owns and loaded itself.
    Main,
    /// Values owned by other peers, mirrored locally because they are requested often.
    Hot,
}

/// Counters for one of a group's caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently resident.
    pub items: u64,
    /// Lookups performed.
    pub gets: u64,
    /// Lookups that found a value.
    pub hits: u64,
    /// Entries pushed out to respect the capacity.
    pub evictions: u64,
}
