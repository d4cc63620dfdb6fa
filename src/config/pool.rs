use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;
use crate::DEFAULT_POOL_CAPACITY;

/// What `borrow()` does when every connection of a node pool is checked out
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustedPolicy {
    /// Wait for a connection to be released (bounded by `borrow_timeout_ms` if non-zero)
    #[default]
    Block,
    /// Return `Error::PoolExhausted` immediately
    FailFast,
}

/// Node connection pool parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PoolConfig {
    /// Reusable connections per node
    /// Default: 4
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Backpressure policy for exhausted pools
    /// Default: block
    #[serde(default)]
    pub exhausted_policy: ExhaustedPolicy,

    /// Upper bound on a blocking borrow in milliseconds, 0 waits forever
    /// Default: 0
    #[serde(default)]
    pub borrow_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            exhausted_policy: ExhaustedPolicy::default(),
            borrow_timeout_ms: 0,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::InvalidConfig("pool.capacity must be at least 1".into()));
        }
        Ok(())
    }

    pub(crate) fn borrow_timeout(&self) -> Option<Duration> {
        (self.borrow_timeout_ms > 0).then(|| Duration::from_millis(self.borrow_timeout_ms))
    }
}

fn default_capacity() -> usize {
    DEFAULT_POOL_CAPACITY
}
