// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A named, read-through cache shared by the processes of a cluster.

use std::fmt::{self, Debug};
use std::sync::{Arc, OnceLock};

use flightgroup::FlightGroup;
use futures_util::future::BoxFuture;

use crate::cache::ValueCache;
use crate::peers::{GetRequest, GetResponse, NoPeers, PeerPicker, ProtoGetter};
use crate::registry::PickerFactory;
use crate::stats::{CacheStats, CacheType, Stats, StatsSnapshot};
use crate::{BoxError, ByteView, ByteViewSink, Error, Result, Sink};

/// Produces the value of a key that is owned by the local process.
///
/// The group calls it on a cache miss. It writes the value into `sink`; the group reads it
/// back from there. A producer may be called again for the same key when a peer fetch fails
/// and the group falls back to loading locally.
pub trait Getter: Send + Sync {
    /// Loads `key` into `sink`.
    fn get<'a>(&'a self, key: &'a str, sink: &'a mut dyn Sink) -> BoxFuture<'a, Result<(), BoxError>>;
}

/// Adapts an async function returning the value into a [`Getter`].
///
/// ```
/// use groupcache::{BoxError, GetterFn};
///
/// let getter = GetterFn::new(|key: String| async move { Ok::<_, BoxError>(format!("value-for-{key}")) });
/// # let _ = getter;
/// ```
#[derive(Clone)]
pub struct GetterFn<F>(F);

impl<F> GetterFn<F> {
    /// Wraps `func`.
    pub fn new(func: F) -> Self {
        Self(func)
    }
}

impl<F> Debug for GetterFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetterFn").finish_non_exhaustive()
    }
}

impl<F, Fut, V> Getter for GetterFn<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<V, BoxError>> + Send + 'static,
    V: Into<ByteView> + 'static,
{
    fn get<'a>(&'a self, key: &'a str, sink: &'a mut dyn Sink) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(async move {
            let value = (self.0)(key.to_owned()).await?;
            sink.set_view(value.into())?;
            Ok::<_, BoxError>(())
        })
    }
}

/// Where a group finds its peer picker on first use.
pub(crate) enum PeerSource {
    Explicit(Arc<dyn PeerPicker>),
    Registry(Arc<OnceLock<PickerFactory>>),
}

pub(crate) struct GroupConfig {
    pub(crate) name: String,
    pub(crate) getter: Arc<dyn Getter>,
    pub(crate) main_cache: ValueCache,
    pub(crate) hot_cache: ValueCache,
    pub(crate) hot_promotion_ratio: u32,
    pub(crate) peer_source: PeerSource,
}

/// A named cache namespace with a value producer and a view of the cluster.
///
/// Lookups check the main cache (keys this process owns), then the hot cache (popular keys
/// owned by other peers). On a miss the key is loaded once, however many callers are asking
/// for it concurrently: from the owning peer when it is remote, otherwise from the group's
/// [`Getter`]. A failed peer fetch falls back to the local producer.
///
/// Groups are created through a [`GroupRegistry`](crate::GroupRegistry).
///
/// # Examples
///
/// ```
/// use groupcache::{BoxError, GetterFn, GroupRegistry, StringSink};
/// # futures::executor::block_on(async {
///
/// let registry = GroupRegistry::new();
/// let group = registry.new_group(
///     "greetings",
///     64,
///     GetterFn::new(|key: String| async move { Ok::<_, BoxError>(format!("hello, {key}")) }),
/// )?;
///
/// let mut sink = StringSink::new();
/// group.get("world", &mut sink).await?;
/// assert_eq!(sink.value().as_deref(), Some("hello, world"));
///
/// // The second lookup is served from the cache.
/// group.get("world", &mut sink).await?;
/// assert_eq!(group.stats().local_loads, 1);
/// assert_eq!(group.stats().cache_hits, 1);
/// # Ok::<(), groupcache::Error>(())
/// # });
/// ```
pub struct Group {
    name: String,
    getter: Arc<dyn Getter>,
    peer_source: PeerSource,
    peers: OnceLock<Arc<dyn PeerPicker>>,
    main_cache: ValueCache,
    hot_cache: ValueCache,
    hot_promotion_ratio: u32,
    flight: FlightGroup<String, Result<ByteView>>,
    stats: Stats,
}

impl Group {
    pub(crate) fn new(config: GroupConfig) -> Self {
        Self {
            name: config.name,
            getter: config.getter,
            peer_source: config.peer_source,
            peers: OnceLock::new(),
            main_cache: config.main_cache,
            hot_cache: config.hot_cache,
            hot_promotion_ratio: config.hot_promotion_ratio,
            flight: FlightGroup::new(),
            stats: Stats::default(),
        }
    }

    /// Returns the group's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up `key` and writes its value into `sink`.
    ///
    /// # Errors
    ///
    /// Returns the producer's failure as [`Error::Load`] when the value had to be loaded
    /// locally and the load failed. Every caller waiting on the same load receives the same
    /// error. Peer failures are not reported; the group falls back to a local load.
    pub async fn get(&self, key: &str, sink: &mut dyn Sink) -> Result<()> {
        let peers = self.peers();
        self.stats.gets.increment();

        if let Some(view) = self.lookup_cache(key) {
            self.stats.cache_hits.increment();
            return sink.set_view(view);
        }

        let (view, populated) = self.load(key, peers, sink).await?;
        if populated {
            return Ok(());
        }
        sink.set_view(view)
    }

    /// Looks up `key` and returns its value as a [`ByteView`].
    ///
    /// # Errors
    ///
    /// Fails under the same conditions as [`get`](Self::get).
    pub async fn get_view(&self, key: &str) -> Result<ByteView> {
        let mut sink = ByteViewSink::new();
        self.get(key, &mut sink).await?;
        sink.view()
    }

    /// Answers a request from another peer.
    ///
    /// # Errors
    ///
    /// Fails under the same conditions as [`get`](Self::get).
    pub async fn serve(&self, request: &GetRequest) -> Result<GetResponse> {
        self.stats.server_requests.increment();
        let view = self.get_view(&request.key).await?;
        Ok(GetResponse {
            value: view.into(),
            minute_qps: None,
        })
    }

    /// Returns a snapshot of the group's counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns the counters of the main or hot cache.
    #[must_use]
    pub fn cache_stats(&self, which: CacheType) -> CacheStats {
        match which {
            CacheType::Main => self.main_cache.stats(),
            CacheType::Hot => self.hot_cache.stats(),
        }
    }

    fn peers(&self) -> &dyn PeerPicker {
        self.peers
            .get_or_init(|| match &self.peer_source {
                PeerSource::Explicit(picker) => Arc::clone(picker),
                PeerSource::Registry(factory) => match factory.get() {
                    Some(factory) => factory(self.name.as_str()),
                    None => Arc::new(NoPeers),
                },
            })
            .as_ref()
    }

    fn lookup_cache(&self, key: &str) -> Option<ByteView> {
        self.main_cache.get(key).or_else(|| self.hot_cache.get(key))
    }

    /// Loads a missing key once for all concurrent callers.
    ///
    /// Returns the value and whether `sink` already holds it, which is the case when this
    /// caller ran the local producer itself.
    async fn load(&self, key: &str, peers: &dyn PeerPicker, sink: &mut dyn Sink) -> Result<(ByteView, bool)> {
        self.stats.loads.increment();

        let mut populated = false;
        let populated_ref = &mut populated;
        let view = self
            .flight
            .work(key.to_owned(), move || self.load_once(key, peers, sink, populated_ref))
            .await?;

        Ok((view, populated))
    }

    async fn load_once(&self, key: &str, peers: &dyn PeerPicker, sink: &mut dyn Sink, populated: &mut bool) -> Result<ByteView> {
        // Another load may have finished between our cache miss and joining the flight.
        if let Some(view) = self.lookup_cache(key) {
            self.stats.cache_hits.increment();
            return Ok(view);
        }
        self.stats.loads_deduped.increment();

        if let Some(peer) = peers.pick_peer(key) {
            match self.get_from_peer(peer.as_ref(), key).await {
                Ok(view) => {
                    self.stats.peer_loads.increment();
                    return Ok(view);
                }
                Err(error) => {
                    self.stats.peer_errors.increment();
                    tracing::event!(
                        name: "groupcache.peer.failed",
                        tracing::Level::WARN,
                        group.name = %self.name,
                        cache.key = key,
                        error = %error,
                    );
                }
            }
        }

        let view = self.get_locally(key, sink).await?;
        *populated = true;
        self.main_cache.add(key, view.clone());
        Ok(view)
    }

    async fn get_from_peer(&self, peer: &dyn ProtoGetter, key: &str) -> Result<ByteView> {
        let request = GetRequest {
            group: self.name.clone(),
            key: key.to_owned(),
        };
        let response = peer.get(&request).await.map_err(|source| Error::peer(key, source))?;
        let view = ByteView::from(response.value);

        if self.hot_promotion_ratio > 0 && fastrand::u32(..self.hot_promotion_ratio) == 0 {
            self.hot_cache.add(key, view.clone());
        }
        Ok(view)
    }

    async fn get_locally(&self, key: &str, sink: &mut dyn Sink) -> Result<ByteView> {
        self.stats.local_loads.increment();
        tracing::event!(
            name: "groupcache.load",
            tracing::Level::DEBUG,
            group.name = %self.name,
            cache.key = key,
        );

        let loaded = match self.getter.get(key, sink).await {
            Ok(()) => sink.view(),
            Err(source) => Err(Error::load(key, source)),
        };

        match &loaded {
            Ok(view) => tracing::event!(
                name: "groupcache.load.completed",
                tracing::Level::DEBUG,
                group.name = %self.name,
                cache.key = key,
                value.len = view.len(),
            ),
            Err(error) => {
                self.stats.local_load_errs.increment();
                tracing::event!(
                    name: "groupcache.load.failed",
                    tracing::Level::WARN,
                    group.name = %self.name,
                    cache.key = key,
                    error = %error,
                );
            }
        }
        loaded
    }
}

impl Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("hot_promotion_ratio", &self.hot_promotion_ratio)
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}
