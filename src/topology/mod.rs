//! Cluster topology: cluster → pool → bucket discovery and key routing.

mod bucket;
mod builder;
mod cluster;
mod pool;
mod vbucket;

pub use bucket::*;
pub use builder::*;
pub use cluster::*;
pub use pool::*;
pub use vbucket::HashAlgorithm;


use std::sync::Arc;

use crate::NodeConnector;
use crate::Result;

/// Connects to `endpoint` and opens `bucket` of `pool` in one call
pub async fn get_bucket(
    endpoint: &str,
    pool: &str,
    bucket: &str,
    connector: Arc<dyn NodeConnector>,
) -> Result<Arc<Bucket>> {
    let cluster = Cluster::connect(endpoint, connector).await?;
    let pool = cluster.pool(pool).await?;
    pool.bucket(bucket).await
}
