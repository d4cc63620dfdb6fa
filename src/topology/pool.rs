use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;
use tracing::info;

use super::Bucket;
use super::Cluster;
use crate::constants::BUCKETS_URI_KEY;
use crate::BucketInfo;
use crate::Error;
use crate::NodeInfo;
use crate::PoolInfo;
use crate::ResourceKind;
use crate::Result;

/// A named pool and the buckets it advertises. Cheap to clone.
#[derive(Clone)]
pub struct Pool {
    pub(crate) inner: Arc<PoolInner>,
}

pub(crate) struct PoolInner {
    name: String,
    cluster: Cluster,
    descriptor: RwLock<PoolInfo>,
    buckets: RwLock<HashMap<String, Arc<Bucket>>>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl Pool {
    pub(crate) async fn open(
        cluster: Cluster,
        name: &str,
        descriptor: PoolInfo,
    ) -> Result<Self> {
        let pool = Self {
            inner: Arc::new(PoolInner {
                name: name.to_string(),
                cluster,
                descriptor: RwLock::new(descriptor),
                buckets: RwLock::new(HashMap::new()),
                refresh_lock: tokio::sync::Mutex::new(()),
            }),
        };
        pool.refresh().await?;
        Ok(pool)
    }

    pub(crate) fn from_inner(inner: Arc<PoolInner>) -> Self {
        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Cluster this pool was opened from
    pub fn cluster(&self) -> &Cluster {
        &self.inner.cluster
    }

    pub fn descriptor(&self) -> PoolInfo {
        self.inner.descriptor.read().clone()
    }

    pub fn nodes(&self) -> Vec<NodeInfo> {
        self.inner.descriptor.read().nodes.clone()
    }

    /// Advertised bucket names, sorted
    pub fn bucket_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.inner.buckets.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Re-reads the bucket list.
    ///
    /// Handles of buckets still listed are kept and reconciled to the new
    /// descriptor; buckets no longer listed are closed.
    pub async fn refresh(&self) -> Result<()> {
        let _serial = self.inner.refresh_lock.lock().await;

        let uri = self
            .inner
            .descriptor
            .read()
            .bucket_urls
            .get(BUCKETS_URI_KEY)
            .cloned()
            .ok_or_else(|| Error::not_found(ResourceKind::BucketList, &self.inner.name))?;
        let listed: Vec<BucketInfo> = self.inner.cluster.control().fetch(&uri).await?;

        let mut buckets = self.inner.buckets.write();
        let mut previous = std::mem::take(&mut *buckets);
        for descriptor in listed {
            let name = descriptor.name.clone();
            let bucket = match previous.remove(&name) {
                Some(existing) if !existing.is_closed() => match existing.apply(descriptor.clone()) {
                    Ok(()) => existing,
                    Err(_) => self.new_bucket(descriptor),
                },
                _ => self.new_bucket(descriptor),
            };
            buckets.insert(name, bucket);
        }

        for (name, departed) in previous {
            info!(pool = %self.inner.name, bucket = %name, "bucket no longer advertised, closing");
            departed.close();
        }

        debug!(pool = %self.inner.name, buckets = buckets.len(), "bucket list refreshed");
        Ok(())
    }

    /// Looks up a bucket and refreshes it before handing it out.
    ///
    /// A handle that was closed is replaced by a fresh one.
    ///
    /// # Errors
    /// [`Error::NotFound`] if the pool does not list `name`, otherwise the
    /// refresh failure.
    pub async fn bucket(
        &self,
        name: &str,
    ) -> Result<Arc<Bucket>> {
        let bucket = {
            let mut buckets = self.inner.buckets.write();
            let existing = buckets
                .get(name)
                .cloned()
                .ok_or_else(|| Error::not_found(ResourceKind::Bucket, name))?;
            if existing.is_closed() {
                let fresh = self.new_bucket(existing.descriptor());
                buckets.insert(name.to_string(), Arc::clone(&fresh));
                fresh
            } else {
                existing
            }
        };

        bucket.refresh().await?;
        Ok(bucket)
    }

    /// Closes every bucket handle of this pool
    pub fn close(&self) {
        let buckets: Vec<_> = self.inner.buckets.write().drain().map(|(_, b)| b).collect();
        for bucket in buckets {
            bucket.close();
        }
    }

    fn new_bucket(
        &self,
        descriptor: BucketInfo,
    ) -> Arc<Bucket> {
        Bucket::new(self.inner.cluster.clone(), Arc::downgrade(&self.inner), descriptor)
    }
}

impl fmt::Debug for Pool {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.inner.name)
            .field("buckets", &self.bucket_names())
            .finish()
    }
}
