use std::fmt;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::debug;
use url::Url;

use super::ClusterBuilder;
use super::Pool;
use crate::constants::POOLS_PATH;
use crate::ClientSettings;
use crate::ControlPlane;
use crate::Error;
use crate::NodeConnector;
use crate::PoolInfo;
use crate::PoolsInfo;
use crate::ResourceKind;
use crate::Result;

/// Root handle on a cluster's control endpoint. Cheap to clone.
#[derive(Clone)]
pub struct Cluster {
    inner: Arc<ClusterInner>,
}

struct ClusterInner {
    control: ControlPlane,
    connector: Arc<dyn NodeConnector>,
    settings: ClientSettings,
    info: ArcSwap<PoolsInfo>,
    open_buckets: AtomicUsize,
}

impl Cluster {
    pub fn builder(
        endpoint: impl Into<String>,
        connector: Arc<dyn NodeConnector>,
    ) -> ClusterBuilder {
        ClusterBuilder::new(endpoint, connector)
    }

    /// Connects with default settings; credentials come from the URL user-info
    pub async fn connect(
        endpoint: &str,
        connector: Arc<dyn NodeConnector>,
    ) -> Result<Self> {
        ClusterBuilder::new(endpoint, connector).connect().await
    }

    pub(crate) fn from_parts(
        control: ControlPlane,
        connector: Arc<dyn NodeConnector>,
        settings: ClientSettings,
        info: PoolsInfo,
    ) -> Self {
        Self {
            inner: Arc::new(ClusterInner {
                control,
                connector,
                settings,
                info: ArcSwap::from_pointee(info),
                open_buckets: AtomicUsize::new(0),
            }),
        }
    }

    /// Last fetched `/pools` document
    pub fn info(&self) -> Arc<PoolsInfo> {
        self.inner.info.load_full()
    }

    /// Re-fetches `/pools`; the cached document is kept on failure
    pub async fn refresh_info(&self) -> Result<()> {
        let info: PoolsInfo = self.inner.control.fetch(POOLS_PATH).await?;
        debug!(pools = info.pools.len(), "cluster info refreshed");
        self.inner.info.store(Arc::new(info));
        Ok(())
    }

    /// Opens the named pool and loads its bucket list.
    ///
    /// When a name is advertised more than once the last entry wins.
    ///
    /// # Errors
    /// [`Error::NotFound`] if no pool with a URI is advertised under `name`,
    /// otherwise any control plane failure.
    pub async fn pool(
        &self,
        name: &str,
    ) -> Result<Pool> {
        let uri = self
            .info()
            .pools
            .iter()
            .rev()
            .find(|p| p.name == name && !p.uri.is_empty())
            .map(|p| p.uri.clone())
            .ok_or_else(|| Error::not_found(ResourceKind::Pool, name))?;

        let descriptor: PoolInfo = self.inner.control.fetch(&uri).await?;
        Pool::open(self.clone(), name, descriptor).await
    }

    /// Buckets opened through this cluster and not yet closed
    pub fn open_buckets(&self) -> usize {
        self.inner.open_buckets.load(Ordering::SeqCst)
    }

    /// Control endpoint, without user-info
    pub fn base_url(&self) -> &Url {
        self.inner.control.base_url()
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.inner.settings
    }

    pub(crate) fn control(&self) -> &ControlPlane {
        &self.inner.control
    }

    pub(crate) fn connector(&self) -> &Arc<dyn NodeConnector> {
        &self.inner.connector
    }

    pub(crate) fn bucket_opened(&self) {
        self.inner.open_buckets.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn bucket_closed(&self) {
        self.inner.open_buckets.fetch_sub(1, Ordering::SeqCst);
    }
}

impl fmt::Debug for Cluster {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("base_url", &self.base_url().as_str())
            .field("open_buckets", &self.open_buckets())
            .finish()
    }
}
