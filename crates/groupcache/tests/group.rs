// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! End-to-end lookups through a group: local loads, peer fetches and deduplication.

#![allow(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use groupcache::{
    BoxError, CacheType, Error, GetRequest, GetResponse, GetterFn, GroupRegistry, PeerPicker, PolicyKind, ProtoGetter,
    Sink, StringSink, TruncatingByteSink,
};
use tracing_test::traced_test;

/// A peer that answers every request with `"<group>:<key>"`.
#[derive(Default)]
struct EchoPeer {
    calls: AtomicUsize,
}

impl ProtoGetter for EchoPeer {
    fn get<'a>(&'a self, request: &'a GetRequest) -> BoxFuture<'a, Result<GetResponse, BoxError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            Ok(GetResponse {
                value: Bytes::from(format!("{}:{}", request.group, request.key)),
                minute_qps: None,
            })
        })
    }
}

/// A peer whose transport is always down.
struct DownPeer;

impl ProtoGetter for DownPeer {
    fn get<'a>(&'a self, _request: &'a GetRequest) -> BoxFuture<'a, Result<GetResponse, BoxError>> {
        Box::pin(async { Err("connection refused".into()) })
    }
}

/// Assigns every key to the same remote peer.
struct AllRemote(Arc<dyn ProtoGetter>);

impl PeerPicker for AllRemote {
    fn pick_peer(&self, _key: &str) -> Option<Arc<dyn ProtoGetter>> {
        Some(Arc::clone(&self.0))
    }
}

fn counting_getter(calls: Arc<AtomicUsize>) -> GetterFn<impl Fn(String) -> BoxFuture<'static, Result<String, BoxError>> + Send + Sync> {
    GetterFn::new(move |key: String| -> BoxFuture<'static, Result<String, BoxError>> {
        calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { Ok(format!("value-for-{key}")) })
    })
}

#[tokio::test]
async fn local_key_is_loaded_once_then_cached() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = GroupRegistry::new();
    let group = registry.new_group("test", 16, counting_getter(Arc::clone(&calls))).unwrap();

    let mut sink = StringSink::new();
    group.get("x", &mut sink).await.unwrap();
    assert_eq!(sink.value().as_deref(), Some("value-for-x"));

    let mut again = StringSink::new();
    group.get("x", &mut again).await.unwrap();
    assert_eq!(again.value().as_deref(), Some("value-for-x"));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let stats = group.stats();
    assert_eq!(stats.gets, 2);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.loads, 1);
    assert_eq!(stats.local_loads, 1);
    assert_eq!(group.cache_stats(CacheType::Main).items, 1);
}

#[tokio::test]
async fn zero_main_capacity_depends_on_the_policy() {
    let registry = GroupRegistry::new();
    let adaptive = registry.new_group("adaptive", 0, counting_getter(Arc::new(AtomicUsize::new(0)))).unwrap();
    let lru = registry
        .group_builder("lru", counting_getter(Arc::new(AtomicUsize::new(0))))
        .main_capacity(0)
        .policy(PolicyKind::Lru)
        .build()
        .unwrap();

    for key in ["a", "b", "c"] {
        adaptive.get_view(key).await.unwrap();
        lru.get_view(key).await.unwrap();
    }

    assert_eq!(adaptive.cache_stats(CacheType::Main).items, 1);
    assert_eq!(lru.cache_stats(CacheType::Main).items, 3);
}

#[tokio::test]
async fn remote_key_is_fetched_from_its_owner() {
    let peer = Arc::new(EchoPeer::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = GroupRegistry::new();
    let group = registry
        .group_builder("photos", counting_getter(Arc::clone(&calls)))
        .hot_promotion_ratio(0)
        .peer_picker(Arc::new(AllRemote(Arc::clone(&peer) as Arc<dyn ProtoGetter>)))
        .build()
        .unwrap();

    assert_eq!(group.get_view("cat").await.unwrap(), "photos:cat");
    assert_eq!(group.get_view("cat").await.unwrap(), "photos:cat");

    // Values owned elsewhere stay out of the main cache.
    assert_eq!(peer.calls.load(Ordering::SeqCst), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(group.stats().peer_loads, 2);
    assert_eq!(group.cache_stats(CacheType::Main).items, 0);
    assert_eq!(group.cache_stats(CacheType::Hot).items, 0);
}

#[tokio::test]
async fn popular_remote_key_is_mirrored_in_hot_cache() {
    let peer = Arc::new(EchoPeer::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = GroupRegistry::new();
    let group = registry
        .group_builder("photos", counting_getter(Arc::clone(&calls)))
        .hot_promotion_ratio(1)
        .peer_picker(Arc::new(AllRemote(Arc::clone(&peer) as Arc<dyn ProtoGetter>)))
        .build()
        .unwrap();

    group.get_view("dog").await.unwrap();
    assert_eq!(group.get_view("dog").await.unwrap(), "photos:dog");

    assert_eq!(peer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(group.stats().cache_hits, 1);
    let hot = group.cache_stats(CacheType::Hot);
    assert_eq!(hot.items, 1);
    assert_eq!(hot.hits, 1);
}

#[tokio::test]
async fn failed_peer_fetch_falls_back_to_local_load() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = GroupRegistry::new();
    let group = registry
        .group_builder("test", counting_getter(Arc::clone(&calls)))
        .peer_picker(Arc::new(AllRemote(Arc::new(DownPeer))))
        .build()
        .unwrap();

    assert_eq!(group.get_view("x").await.unwrap(), "value-for-x");
    assert_eq!(group.get_view("x").await.unwrap(), "value-for-x");

    let stats = group.stats();
    assert_eq!(stats.peer_errors, 1);
    assert_eq!(stats.peer_loads, 0);
    assert_eq!(stats.local_loads, 1);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_share_one_load() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let registry = GroupRegistry::new();
    let group = registry
        .new_group(
            "slow",
            16,
            GetterFn::new(move |key: String| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok::<_, BoxError>(key.to_uppercase())
                }
            }),
        )
        .unwrap();

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let group = Arc::clone(&group);
            tokio::spawn(async move { group.get_view("key").await })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), "KEY");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let stats = group.stats();
    assert_eq!(stats.gets, 10);
    assert_eq!(stats.local_loads, 1);
    assert_eq!(stats.loads_deduped, 1);
}

#[tokio::test]
async fn load_failure_is_reported_and_not_cached() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let registry = GroupRegistry::new();
    let group = registry
        .new_group(
            "flaky",
            16,
            GetterFn::new(move |_key: String| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<String, BoxError>("backend down".into()) }
            }),
        )
        .unwrap();

    let mut sink = StringSink::new();
    let err = group.get("k", &mut sink).await.unwrap_err();
    assert!(matches!(&err, Error::Load { key, .. } if key == "k"));
    assert_eq!(sink.value(), None);

    group.get_view("k").await.unwrap_err();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(group.stats().local_load_errs, 2);
    assert_eq!(group.cache_stats(CacheType::Main).items, 0);
}

#[tokio::test]
#[traced_test]
async fn load_failure_is_logged() {
    let registry = GroupRegistry::new();
    let group = registry
        .new_group(
            "logged",
            16,
            GetterFn::new(|_key: String| async { Err::<String, BoxError>("disk on fire".into()) }),
        )
        .unwrap();

    group.get_view("k").await.unwrap_err();

    assert!(logs_contain("WARN"));
    assert!(logs_contain("group.name=logged"));
    assert!(logs_contain("loading key \"k\" failed"));
}

#[tokio::test]
async fn getter_writes_straight_into_the_callers_sink() {
    struct Direct;

    impl groupcache::Getter for Direct {
        fn get<'a>(&'a self, key: &'a str, sink: &'a mut dyn Sink) -> BoxFuture<'a, Result<(), BoxError>> {
            Box::pin(async move {
                sink.set_bytes(format!("{key}-0123456789").as_bytes())?;
                Ok(())
            })
        }
    }

    let registry = GroupRegistry::new();
    let group = registry.new_group("direct", 16, Direct).unwrap();

    let mut buf = [0_u8; 4];
    let mut sink = TruncatingByteSink::new(&mut buf);
    group.get("abc", &mut sink).await.unwrap();
    assert_eq!(sink.written(), 4);
    assert_eq!(sink.view().unwrap(), "abc-0123456789");
    assert_eq!(&buf, b"abc-");

    // The cached copy is the full value.
    assert_eq!(group.get_view("abc").await.unwrap(), "abc-0123456789");
}

#[tokio::test]
async fn serve_answers_peer_requests() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = GroupRegistry::new();
    let group = registry.new_group("served", 16, counting_getter(Arc::clone(&calls))).unwrap();

    let request = GetRequest {
        group: "served".to_owned(),
        key: "y".to_owned(),
    };
    let response = group.serve(&request).await.unwrap();

    assert_eq!(response.value, Bytes::from_static(b"value-for-y"));
    assert_eq!(group.stats().server_requests, 1);
    assert_eq!(group.stats().gets, 1);
}
