// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Bounded in-memory eviction policies.
//!
//! Two policies are provided:
//!
//! - [`LruCache`] evicts the least recently used entry. It is not synchronized; owners wrap it
//!   in their own lock.
//! - [`ArcCache`] implements adaptive replacement. It balances a recency partition against a
//!   frequency partition using ghost lists of recently evicted keys and is internally locked.
//!
//! Both report departing entries through an [`EvictionListener`].
//!
//! # Example
//!
//! ```
//! use std::num::NonZeroUsize;
//! use cache_policy::{ArcCache, LruCache};
//!
//! let mut lru = LruCache::new(2);
//! lru.add("a", 1);
//! assert_eq!(lru.get(&"a"), Some(&1));
//!
//! let arc = ArcCache::new(NonZeroUsize::new(2).unwrap());
//! arc.add("a", 1);
//! assert_eq!(arc.get(&"a"), Some(1));
//! ```

mod arc;
mod list;
mod listener;
mod lru;

pub use arc::{ArcCache, Partitions};
pub use listener::EvictionListener;
pub use lru::LruCache;
