//! Cluster Client Error Hierarchy
//!
//! Errors are grouped by the layer that produces them: control-plane
//! transport, descriptor decoding, name resolution, node connection pools and
//! per-node mutation streams.

use std::fmt;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Control endpoint or node unreachable, or answered with a failure status
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Malformed descriptor document
    #[error("Failed to decode document from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// Unknown pool or bucket name, or a pool without a bucket list link
    #[error("No {kind} named {name:?}")]
    NotFound { kind: ResourceKind, name: String },

    /// No idle connection available within the configured borrow policy
    #[error("Connection pool for {host} exhausted")]
    PoolExhausted { host: String },

    /// A node's event stream ended abnormally
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Topology re-fetch failed; the previous topology is still in effect
    #[error("Refresh of bucket {bucket:?} failed: {source}")]
    Refresh {
        bucket: String,
        #[source]
        source: Box<Error>,
    },

    /// Operation attempted on a handle that was already closed
    #[error("{kind} {name:?} is closed")]
    Closed { kind: ResourceKind, name: String },

    /// Settings loading failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Settings validation failures
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Malformed endpoint or descriptor URI
    #[error("Invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Transport-level failure talking to the control endpoint
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Non-2xx answer from the control endpoint
    #[error("HTTP error {status} getting {url:?}: {body}")]
    HttpStatus { url: String, status: u16, body: String },

    /// Dialing or talking to a data node failed
    #[error("Node {host} error: {source}")]
    Node {
        host: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The node connection pool has been shut down
    #[error("Connection pool for {host} is closed")]
    PoolClosed { host: String },
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Node stream terminated with an error
    #[error("Mutation stream from {host} failed: {message}")]
    Node { host: String, message: String },

    /// Node stream ended cleanly while a live session was expected
    #[error("Mutation stream from {host} ended unexpectedly")]
    Ended { host: String },

    /// Node pool was closed underneath a live stream
    #[error("Mutation stream from {host} interrupted: pool closed")]
    PoolClosed { host: String },

    /// Current topology has no nodes to stream from
    #[error("Bucket {bucket:?} has no nodes to stream from")]
    NoNodes { bucket: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Pool,
    Bucket,
    BucketList,
}

impl fmt::Display for ResourceKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ResourceKind::Pool => f.write_str("pool"),
            ResourceKind::Bucket => f.write_str("bucket"),
            ResourceKind::BucketList => f.write_str("bucket list of pool"),
        }
    }
}

impl Error {
    pub(crate) fn refresh(
        bucket: &str,
        source: Error,
    ) -> Self {
        Error::Refresh {
            bucket: bucket.to_string(),
            source: Box::new(source),
        }
    }

    pub(crate) fn not_found(
        kind: ResourceKind,
        name: &str,
    ) -> Self {
        Error::NotFound {
            kind,
            name: name.to_string(),
        }
    }

    /// Wraps any node-protocol failure for `host`
    ///
    /// Intended for [`NodeConnector`](crate::NodeConnector) and
    /// [`NodeConnection`](crate::NodeConnection) implementations.
    pub fn node<E>(
        host: &str,
        source: E,
    ) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        ConnectionError::Node {
            host: host.to_string(),
            source: source.into(),
        }
        .into()
    }

    /// Returns true when retrying after a topology refresh may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::PoolExhausted { .. } | Error::Stream(_) | Error::Refresh { .. }
        )
    }
}
