//! Cluster-aware client plumbing for a vbucket-partitioned key-value store.
//!
//! - [`Cluster`] / [`Pool`] / [`Bucket`]: topology discovery over the HTTP
//!   control plane and key → vbucket → node routing
//! - [`NodeConnectionPool`]: bounded, lazily dialed connections to one node
//! - [`MutationStream`]: every node's change feed merged into one channel,
//!   with refresh-and-reconnect on failure
//!
//! The node wire protocol is supplied by the caller through [`NodeConnector`].
//!
//! ```ignore
//! let bucket = vbucket_client::get_bucket("http://localhost:8091/", "default", "beer-sample", connector).await?;
//! let (pool, vbucket) = bucket.resolve_key(b"user::1001");
//! let mut stream = bucket.start_stream(StreamArgs::default());
//! while let Some(event) = stream.recv().await { /* ... */ }
//! ```

mod auth;
mod config;
mod constants;
mod control;
mod errors;
pub mod metrics;
mod node;
mod stream;
mod topology;

pub use auth::*;
pub use constants::DEFAULT_POOL_CAPACITY;
pub use control::*;
pub use errors::*;
pub use node::*;
pub use stream::*;
pub use topology::*;

pub use self::config::*;

//-----------------------------------------------------------
// Test utils
