// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Two cache processes sharing one keyspace, wired together in memory.
//!
//! Each "process" is a registry with a `colors` group. Keys are split between the two by a
//! consistent hash ring; a lookup on the wrong process is forwarded to the owner.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use futures_util::future::BoxFuture;
use groupcache::{
    BoxError, GetRequest, GetResponse, GetterFn, GroupRegistry, HashRingPicker, ProtoGetter, StatsSnapshot,
};

const PEERS: [&str; 2] = ["alpha", "beta"];

/// Stands in for a network client: forwards requests to another registry in this process.
struct InProcess {
    addr: String,
    cluster: Arc<OnceLock<HashMap<String, Arc<GroupRegistry>>>>,
}

impl ProtoGetter for InProcess {
    fn get<'a>(&'a self, request: &'a GetRequest) -> BoxFuture<'a, Result<GetResponse, BoxError>> {
        Box::pin(async move {
            let registry = self
                .cluster
                .get()
                .and_then(|cluster| cluster.get(&self.addr))
                .ok_or("peer is not reachable")?;
            Ok::<_, BoxError>(registry.serve(request).await?)
        })
    }
}

fn start_process(self_id: &str, cluster: &Arc<OnceLock<HashMap<String, Arc<GroupRegistry>>>>) -> Result<Arc<GroupRegistry>, BoxError> {
    let registry = Arc::new(GroupRegistry::new());

    let transport = Arc::clone(cluster);
    let picker = Arc::new(HashRingPicker::new(move |addr| {
        Arc::new(InProcess {
            addr: addr.to_owned(),
            cluster: Arc::clone(&transport),
        })
    }));
    picker.set(self_id, PEERS);
    registry.register_peer_picker(move |_group| Arc::clone(&picker) as _)?;

    let owner = self_id.to_owned();
    registry.new_group(
        "colors",
        64,
        GetterFn::new(move |key: String| {
            let owner = owner.clone();
            async move {
                tracing::info!(%owner, %key, "computing value");
                Ok::<_, BoxError>(format!("{key} (computed by {owner})"))
            }
        }),
    )?;

    Ok(registry)
}

fn report(name: &str, stats: StatsSnapshot) {
    println!(
        "{name}: gets={} hits={} local_loads={} peer_loads={} served={}",
        stats.gets, stats.cache_hits, stats.local_loads, stats.peer_loads, stats.server_requests
    );
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let cluster = Arc::new(OnceLock::new());
    let processes: HashMap<String, Arc<GroupRegistry>> = PEERS
        .iter()
        .map(|&id| -> Result<_, BoxError> { Ok((id.to_owned(), start_process(id, &cluster)?)) })
        .collect::<Result<_, _>>()?;
    if cluster.set(processes.clone()).is_err() {
        return Err("cluster was already wired".into());
    }

    let alpha = processes["alpha"].group("colors").ok_or("alpha has no colors group")?;
    for key in ["red", "green", "blue", "cyan", "red", "green"] {
        let view = alpha.get_view(key).await?;
        println!("alpha[{key}] = {view}");
    }

    for id in PEERS {
        if let Some(group) = processes[id].group("colors") {
            report(id, group.stats());
        }
    }
    Ok(())
}
