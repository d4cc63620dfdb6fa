use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;

use parking_lot::RwLock;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::vbucket::common_suffix;
use super::vbucket::vbucket_id;
use super::vbucket::HashAlgorithm;
use super::Cluster;
use super::Pool;
use super::PoolInner;
use crate::metrics::NODE_POOLS_CLOSED_TOTAL;
use crate::metrics::NODE_POOLS_OPENED_TOTAL;
use crate::metrics::OUTCOME_ERROR;
use crate::metrics::OUTCOME_OK;
use crate::metrics::TOPOLOGY_REFRESH_TOTAL;
use crate::AuthHandler;
use crate::BasicAuth;
use crate::BucketInfo;
use crate::Error;
use crate::MutationStream;
use crate::NodeConnectionPool;
use crate::ResourceKind;
use crate::Result;
use crate::StreamArgs;

/// Routing state of one bucket
///
/// Maps keys to vbuckets and vbuckets to node connection pools. The pool list
/// always parallels the descriptor's server list: refresh swaps both under
/// one write lock. Dropping the last handle closes every node pool.
pub struct Bucket {
    name: String,
    cluster: Cluster,
    pool: Weak<PoolInner>,
    auth: Arc<dyn AuthHandler>,
    state: RwLock<BucketState>,
    refresh_lock: tokio::sync::Mutex<()>,
    closed: AtomicBool,
}

#[derive(Default)]
struct BucketState {
    info: BucketInfo,
    hash: HashAlgorithm,
    connections: Vec<Arc<NodeConnectionPool>>,
}

impl Bucket {
    pub(crate) fn new(
        cluster: Cluster,
        pool: Weak<PoolInner>,
        descriptor: BucketInfo,
    ) -> Arc<Self> {
        let name = descriptor.name.clone();
        // Without cluster credentials a bucket authenticates as itself
        let auth: Arc<dyn AuthHandler> = match cluster.control().auth() {
            Some(auth) => Arc::clone(auth),
            None => Arc::new(BasicAuth::new(name.as_str(), "")),
        };
        cluster.bucket_opened();

        let bucket = Arc::new(Self {
            name,
            cluster,
            pool,
            auth,
            state: RwLock::new(BucketState::default()),
            refresh_lock: tokio::sync::Mutex::new(()),
            closed: AtomicBool::new(false),
        });
        // A fresh handle cannot be closed yet
        let _ = bucket.apply(descriptor);
        bucket
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    /// Owning pool, if it is still alive
    pub fn pool(&self) -> Option<Pool> {
        self.pool.upgrade().map(Pool::from_inner)
    }

    /// Copy of the current descriptor
    pub fn descriptor(&self) -> BucketInfo {
        self.state.read().info.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Re-fetches the descriptor and reconciles node pools to the new server list.
    ///
    /// Refreshes of one bucket are serialized. On failure the previous
    /// topology stays in effect.
    ///
    /// # Errors
    /// - [`Error::Closed`] if the bucket was closed
    /// - [`Error::Refresh`] wrapping the fetch failure
    pub async fn refresh(&self) -> Result<()> {
        let _serial = self.refresh_lock.lock().await;
        if self.is_closed() {
            return Err(self.closed_error());
        }

        let uri = self.state.read().info.uri.clone();
        match self.cluster.control().fetch::<BucketInfo>(&uri).await {
            Ok(descriptor) => {
                self.apply(descriptor)?;
                TOPOLOGY_REFRESH_TOTAL.with_label_values(&[self.name.as_str(), OUTCOME_OK]).inc();
                Ok(())
            }
            Err(e) => {
                warn!(bucket = %self.name, "topology refresh failed: {e}");
                TOPOLOGY_REFRESH_TOTAL.with_label_values(&[self.name.as_str(), OUTCOME_ERROR]).inc();
                Err(Error::refresh(&self.name, e))
            }
        }
    }

    /// Installs `descriptor` and reconciles node pools.
    ///
    /// Pools of hosts still listed are kept, departed ones closed exactly
    /// once, new hosts get a fresh pool. Hosts listed twice share a pool.
    pub(crate) fn apply(
        &self,
        descriptor: BucketInfo,
    ) -> Result<()> {
        let mut state = self.state.write();
        // close() raises the flag before draining under this lock
        if self.is_closed() {
            return Err(self.closed_error());
        }

        let server_list = &descriptor.vbucket_server_map.server_list;
        let desired: HashSet<&str> = server_list.iter().map(String::as_str).collect();

        let mut kept: HashMap<String, Arc<NodeConnectionPool>> = HashMap::new();
        let mut departed: HashMap<String, Arc<NodeConnectionPool>> = HashMap::new();
        for pool in state.connections.drain(..) {
            let target = if desired.contains(pool.host()) { &mut kept } else { &mut departed };
            target.entry(pool.host().to_string()).or_insert(pool);
        }

        for pool in departed.values() {
            pool.close();
        }

        let mut opened = 0;
        let mut connections = Vec::with_capacity(server_list.len());
        for host in server_list {
            let pool = kept.entry(host.clone()).or_insert_with(|| {
                opened += 1;
                NodeConnectionPool::new(
                    host.as_str(),
                    Arc::clone(&self.auth),
                    Arc::clone(self.cluster.connector()),
                    self.cluster.settings().pool.clone(),
                )
            });
            connections.push(Arc::clone(pool));
        }

        NODE_POOLS_OPENED_TOTAL.with_label_values(&[self.name.as_str()]).inc_by(opened);
        NODE_POOLS_CLOSED_TOTAL
            .with_label_values(&[self.name.as_str()])
            .inc_by(departed.len() as u64);
        info!(
            bucket = %self.name,
            nodes = server_list.len(),
            vbuckets = descriptor.vbucket_server_map.vbucket_map.len(),
            opened,
            closed = departed.len(),
            "bucket topology applied"
        );

        state.hash = HashAlgorithm::parse(&descriptor.vbucket_server_map.hash_algorithm);
        state.info = descriptor;
        state.connections = connections;
        Ok(())
    }

    /// Pool of the node mastering `key`'s vbucket, and that vbucket id.
    ///
    /// The pool is `None` when the map is empty or has no assigned master
    /// for the vbucket, including a master index past the server list.
    pub fn resolve_key(
        &self,
        key: &[u8],
    ) -> (Option<Arc<NodeConnectionPool>>, u16) {
        let state = self.state.read();
        let map = &state.info.vbucket_server_map.vbucket_map;
        let vbucket = vbucket_id(state.hash, key, map.len());
        let pool = map
            .get(vbucket as usize)
            .and_then(|entry| entry.first())
            .and_then(|&index| state.pool_at(index));
        (pool, vbucket)
    }

    /// Pools of every assigned replica of `key`'s vbucket, in map order
    pub fn resolve_replicas(
        &self,
        key: &[u8],
    ) -> Vec<Arc<NodeConnectionPool>> {
        let state = self.state.read();
        let map = &state.info.vbucket_server_map.vbucket_map;
        let vbucket = vbucket_id(state.hash, key, map.len());
        map.get(vbucket as usize)
            .map(|entry| entry.iter().skip(1).filter_map(|&index| state.pool_at(index)).collect())
            .unwrap_or_default()
    }

    pub fn vbucket_for(
        &self,
        key: &[u8],
    ) -> u16 {
        let state = self.state.read();
        vbucket_id(state.hash, key, state.info.vbucket_server_map.vbucket_map.len())
    }

    /// `host:port` of every data node, sorted, duplicates kept
    pub fn node_addresses(&self) -> Vec<String> {
        let mut addresses = self.state.read().info.vbucket_server_map.server_list.clone();
        addresses.sort();
        addresses
    }

    /// Longest suffix shared by every node hostname
    pub fn common_address_suffix(&self) -> String {
        let state = self.state.read();
        let hostnames: Vec<&str> = state.info.nodes.iter().map(|n| n.hostname.as_str()).collect();
        common_suffix(&hostnames)
    }

    /// Node pools parallel to the server list
    pub fn connection_pools(&self) -> Vec<Arc<NodeConnectionPool>> {
        self.state.read().connections.clone()
    }

    /// Opens an aggregated mutation stream over every node of the bucket
    pub fn start_stream(
        self: &Arc<Self>,
        args: StreamArgs,
    ) -> MutationStream {
        MutationStream::start(Arc::clone(self), args, self.cluster.settings().stream)
    }

    /// Closes every node pool; idempotent
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let connections = std::mem::take(&mut self.state.write().connections);

        let mut seen = HashSet::new();
        for pool in connections {
            if seen.insert(pool.host().to_string()) {
                pool.close();
            }
        }
        NODE_POOLS_CLOSED_TOTAL
            .with_label_values(&[self.name.as_str()])
            .inc_by(seen.len() as u64);

        self.cluster.bucket_closed();
        debug!(bucket = %self.name, pools = seen.len(), "bucket closed");
    }

    fn closed_error(&self) -> Error {
        Error::Closed {
            kind: ResourceKind::Bucket,
            name: self.name.clone(),
        }
    }
}

impl BucketState {
    fn pool_at(
        &self,
        index: i32,
    ) -> Option<Arc<NodeConnectionPool>> {
        usize::try_from(index).ok().and_then(|i| self.connections.get(i)).cloned()
    }
}

impl Drop for Bucket {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Bucket {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Bucket")
            .field("name", &self.name)
            .field("nodes", &self.state.read().connections.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
