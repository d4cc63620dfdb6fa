// -
// Control plane paths

/// Cluster entry document listing the advertised pools
pub(crate) const POOLS_PATH: &str = "/pools";

/// Key of the bucket-list URI inside a pool descriptor's `buckets` map
pub(crate) const BUCKETS_URI_KEY: &str = "uri";

// -
// Node connections

/// Default node connection pool size
pub const DEFAULT_POOL_CAPACITY: usize = 4;
