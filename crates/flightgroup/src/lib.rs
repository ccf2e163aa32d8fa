// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Collapses concurrent identical async calls into one execution.
//!
//! [`FlightGroup`] keys each call. The first caller for a key runs its function; callers that
//! arrive while that function is running wait for it and receive a clone of its output. Errors
//! are shared the same way when the output is a `Result`.
//!
//! A key is released before its waiters are woken, so a call that starts after the previous
//! one has completed always runs its own function. The group never caches.
//!
//! # Example
//!
//! ```
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use flightgroup::FlightGroup;
//!
//! # async fn example() {
//! let group: FlightGroup<&str, u32> = FlightGroup::new();
//! let runs = AtomicUsize::new(0);
//!
//! let load = || async {
//!     runs.fetch_add(1, Ordering::Relaxed);
//!     42
//! };
//!
//! let (a, b) = tokio::join!(group.work("answer", load), group.work("answer", load));
//! assert_eq!((a, b), (42, 42));
//! assert_eq!(runs.load(Ordering::Relaxed), 1);
//! # }
//! ```
//!
//! # Cancellation and panics
//!
//! If the running call is dropped before it finishes, or its function panics, the call's
//! waiters are not left hanging: one of them runs its own function and the rest receive that
//! result.

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::sync::{Arc, Weak};

use async_once_cell::OnceCell;
use foldhash::fast::RandomState;
use parking_lot::Mutex;

type Calls<K, T> = Arc<Mutex<HashMap<K, Weak<OnceCell<T>>, RandomState>>>;

/// Deduplicates concurrent calls sharing a key.
///
/// The pending-call table only holds weak references. A call whose callers have all been
/// dropped is removed from the table, and the next caller for that key starts afresh.
pub struct FlightGroup<K, T> {
    calls: Calls<K, T>,
}

impl<K, T> Default for FlightGroup<K, T> {
    fn default() -> Self {
        Self { calls: Arc::default() }
    }
}

impl<K, T> FlightGroup<K, T>
where
    K: Hash + Eq + Clone,
{
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `func` unless a call for `key` is already in flight, in which case the returned
    /// future resolves to that call's output.
    ///
    /// The caller joins the in-flight call when `work` is invoked, not when the future is
    /// first polled.
    pub fn work<F, Fut>(&self, key: K, func: F) -> impl Future<Output = T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
        T: Clone,
    {
        let joined = join(&self.calls, key);

        async move {
            let Joined { call, registration } = &joined;
            let value = call
                .get_or_init(async {
                    let value = func().await;
                    registration.release();
                    value
                })
                .await;
            value.clone()
        }
    }

    /// Returns the number of keys with a call currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.calls.lock().values().filter(|call| call.strong_count() > 0).count()
    }
}

/// One caller's hold on an in-flight call.
///
/// Fields drop in declaration order, so the caller's strong reference is gone before its
/// registration looks at who else still holds the call.
struct Joined<K, T>
where
    K: Hash + Eq,
{
    call: Arc<OnceCell<T>>,
    registration: Registration<K, T>,
}

/// Keeps `key` in the table while some caller still holds `call`.
struct Registration<K, T>
where
    K: Hash + Eq,
{
    calls: Calls<K, T>,
    key: K,
    call: Weak<OnceCell<T>>,
}

impl<K, T> Registration<K, T>
where
    K: Hash + Eq,
{
    /// Forgets the key, provided it still refers to this call.
    fn release(&self) {
        let mut calls = self.calls.lock();
        if calls.get(&self.key).is_some_and(|current| current.ptr_eq(&self.call)) {
            calls.remove(&self.key);
        }
    }
}

impl<K, T> Drop for Registration<K, T>
where
    K: Hash + Eq,
{
    fn drop(&mut self) {
        // The last caller out removes an abandoned call.
        if self.call.strong_count() == 0 {
            self.release();
        }
    }
}

fn join<K, T>(calls: &Calls<K, T>, key: K) -> Joined<K, T>
where
    K: Hash + Eq + Clone,
{
    let call = {
        let mut table = calls.lock();
        if let Some(call) = table.get(&key).and_then(Weak::upgrade) {
            call
        } else {
            let call = Arc::new(OnceCell::new());
            table.insert(key.clone(), Arc::downgrade(&call));
            call
        }
    };

    let registration = Registration {
        calls: Arc::clone(calls),
        key,
        call: Arc::downgrade(&call),
    };
    Joined { call, registration }
}

impl<K, T> Debug for FlightGroup<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlightGroup").field("keys", &self.calls.lock().len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn key_is_released_before_waiters_resume() {
        let group: FlightGroup<u8, u8> = FlightGroup::new();

        let first = group.work(1, || async { 1 });
        assert_eq!(group.calls.lock().len(), 1);

        assert_eq!(first.await, 1);
        assert!(group.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn dropped_call_forgets_its_key() {
        let group: FlightGroup<u8, u8> = FlightGroup::new();

        drop(group.work(1, || async { 1 }));
        assert!(group.calls.lock().is_empty());

        assert_eq!(group.work(1, || async { 2 }).await, 2);
        assert!(group.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn waiter_keeps_the_call_after_the_first_caller_is_dropped() {
        let group: FlightGroup<u8, u8> = FlightGroup::new();

        let first = group.work(1, || async { 1 });
        let second = group.work(1, || async { 2 });
        drop(first);
        assert_eq!(group.calls.lock().len(), 1);
        assert_eq!(group.in_flight(), 1);

        assert_eq!(second.await, 2);
        assert!(group.calls.lock().is_empty());
    }

    #[test]
    fn abandoned_keys_do_not_accumulate() {
        let group: FlightGroup<u32, u32> = FlightGroup::new();

        for key in 0..100 {
            let first = group.work(key, || async { 1 });
            let second = group.work(key, || async { 2 });
            drop(second);
            drop(first);
        }

        assert!(group.calls.lock().is_empty());
        assert_eq!(format!("{group:?}"), "FlightGroup { keys: 0 }");
    }

    #[test]
    fn debug_reports_pending_keys() {
        let group: FlightGroup<u8, u8> = FlightGroup::new();
        assert_eq!(format!("{group:?}"), "FlightGroup { keys: 0 }");
    }
}
