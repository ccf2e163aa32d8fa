// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! A distributed read-through cache where each key is owned by exactly one peer.
//!
//! Processes in a cluster agree on key ownership through a consistent hash ring. A lookup is
//! served from the local caches when possible; otherwise the owning peer is asked, or, when the
//! key is owned locally, the group's [`Getter`] produces it. Concurrent misses for one key are
//! collapsed into a single load, and values never change once cached, so there is no
//! invalidation protocol.
//!
//! The crate provides:
//! - [`GroupRegistry`] and [`Group`], the named cache namespaces
//! - [`ByteView`], the immutable value type, and the [`Sink`] family that receives values
//! - [`PeerPicker`], [`ProtoGetter`] and [`HashRingPicker`], the seams to a transport
//!
//! # Examples
//!
//! ```
//! use groupcache::{BoxError, GetterFn, GroupRegistry};
//! # futures::executor::block_on(async {
//!
//! let registry = GroupRegistry::new();
//! let thumbnails = registry
//!     .group_builder("thumbnails", GetterFn::new(|key: String| async move {
//!         Ok::<_, BoxError>(format!("thumbnail of {key}").into_bytes())
//!     }))
//!     .main_capacity(1 << 10)
//!     .build()?;
//!
//! let view = thumbnails.get_view("cat.png").await?;
//! assert_eq!(view, "thumbnail of cat.png");
//! # Ok::<(), groupcache::Error>(())
//! # });
//! ```
//!
//! Without a registered [`PeerPicker`] every key is owned locally. See
//! [`GroupRegistry::register_peer_picker`] and [`HashRingPicker`] to join a cluster.

mod byteview;
mod cache;
mod error;
mod group;
mod peers;
mod registry;
mod sink;
mod stats;

pub use byteview::{ByteView, ByteViewError};
pub use cache::PolicyKind;
pub use error::{BoxError, Error, Result, SharedError};
pub use group::{Getter, GetterFn, Group};
pub use peers::{DEFAULT_REPLICAS, GetRequest, GetResponse, HashRingPicker, NoPeers, PeerPicker, ProtoGetter};
pub use registry::{
    DEFAULT_HOT_CAPACITY, DEFAULT_HOT_PROMOTION_RATIO, DEFAULT_MAIN_CAPACITY, GroupBuilder, GroupRegistry,
};
pub use sink::{AllocatingByteSink, ByteViewSink, Sink, StringSink, TruncatingByteSink};
pub use stats::{CacheStats, CacheType, StatsSnapshot};
