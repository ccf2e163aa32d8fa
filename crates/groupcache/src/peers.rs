// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Peer selection and the remote fetch surface.

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use bytes::Bytes;
use foldhash::fast::RandomState;
use futures_util::future::BoxFuture;
use hashring::HashRing;
use parking_lot::RwLock;

use crate::BoxError;

/// Number of ring positions per peer used by [`HashRingPicker`] unless overridden.
pub const DEFAULT_REPLICAS: usize = 50;

/// Request for one key of one group, sent to the peer that owns the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GetRequest {
    /// Name of the group the key belongs to.
    pub group: String,
    /// Key to load.
    pub key: String,
}

/// A peer's answer to a [`GetRequest`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetResponse {
    /// The value bytes.
    pub value: Bytes,
    /// Request rate for the key observed by the owner, when it reports one.
    pub minute_qps: Option<f64>,
}

/// Fetches values from one remote peer.
///
/// Implementations wrap whatever transport connects the processes of a cluster.
pub trait ProtoGetter: Send + Sync {
    /// Asks the peer for `request.key` in `request.group`.
    fn get<'a>(&'a self, request: &'a GetRequest) -> BoxFuture<'a, Result<GetResponse, BoxError>>;
}

/// Locates the peer that owns a key.
pub trait PeerPicker: Send + Sync {
    /// Returns the owner of `key`, or `None` when the local process owns it or there are no
    /// peers at all.
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn ProtoGetter>>;
}

/// A picker for a process that is not part of a cluster. Every key is local.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPeers;

impl PeerPicker for NoPeers {
    fn pick_peer(&self, _key: &str) -> Option<Arc<dyn ProtoGetter>> {
        None
    }
}

type Connect = Box<dyn Fn(&str) -> Arc<dyn ProtoGetter> + Send + Sync>;

struct Membership {
    self_id: String,
    ring: HashRing,
    getters: HashMap<String, Arc<dyn ProtoGetter>, RandomState>,
}

/// A [`PeerPicker`] that spreads keys over the cluster with a consistent hash ring.
///
/// `connect` builds the transport for each peer address. Membership is replaced as a whole
/// through [`set`](Self::set); lookups never observe a half-built ring.
///
/// ```
/// use std::sync::Arc;
/// use futures_util::future::BoxFuture;
/// use groupcache::{BoxError, GetRequest, GetResponse, HashRingPicker, PeerPicker, ProtoGetter};
///
/// struct Remote(String);
///
/// impl ProtoGetter for Remote {
///     fn get<'a>(&'a self, _request: &'a GetRequest) -> BoxFuture<'a, Result<GetResponse, BoxError>> {
///         Box::pin(async { Err("not connected".into()) })
///     }
/// }
///
/// let picker = HashRingPicker::new(|addr| Arc::new(Remote(addr.to_string())));
/// picker.set("10.0.0.1", ["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
///
/// // Keys owned by this process are never fetched remotely.
/// let remote = (0..100).filter(|i| picker.pick_peer(&i.to_string()).is_some()).count();
/// assert!(remote > 0 && remote < 100);
/// ```
pub struct HashRingPicker {
    replicas: usize,
    connect: Connect,
    membership: RwLock<Membership>,
}

impl HashRingPicker {
    /// Creates a picker with no peers.
    #[must_use]
    pub fn new(connect: impl Fn(&str) -> Arc<dyn ProtoGetter> + Send + Sync + 'static) -> Self {
        Self::with_replicas(DEFAULT_REPLICAS, connect)
    }

    /// Creates a picker placing each peer at `replicas` ring positions.
    #[must_use]
    pub fn with_replicas(replicas: usize, connect: impl Fn(&str) -> Arc<dyn ProtoGetter> + Send + Sync + 'static) -> Self {
        Self {
            replicas,
            connect: Box::new(connect),
            membership: RwLock::new(Membership {
                self_id: String::new(),
                ring: HashRing::new(replicas),
                getters: HashMap::default(),
            }),
        }
    }

    /// Replaces the cluster membership.
    ///
    /// `self_id` names this process; it should appear in `peers` so that it owns its share of
    /// the keys.
    pub fn set<I>(&self, self_id: &str, peers: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let peers: Vec<String> = peers.into_iter().map(|peer| peer.as_ref().to_owned()).collect();

        let mut ring = HashRing::new(self.replicas);
        ring.add(&peers);
        let getters = peers
            .iter()
            .filter(|peer| peer.as_str() != self_id)
            .map(|peer| (peer.clone(), (self.connect)(peer)))
            .collect();

        *self.membership.write() = Membership {
            self_id: self_id.to_owned(),
            ring,
            getters,
        };
    }
}

impl PeerPicker for HashRingPicker {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn ProtoGetter>> {
        let membership = self.membership.read();
        let owner = membership.ring.get(key)?;
        if owner == membership.self_id {
            return None;
        }
        membership.getters.get(owner).cloned()
    }
}

impl Debug for HashRingPicker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let membership = self.membership.read();
        f.debug_struct("HashRingPicker")
            .field("self_id", &membership.self_id)
            .field("ring", &membership.ring)
            .finish_non_exhaustive()
    }
}
