use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Mutation stream buffering and reconnect backoff
///
/// The reconnect interval starts at `retry_floor_ms`, doubles after every
/// unsuccessful cycle and saturates at `retry_ceiling_ms`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct StreamConfig {
    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_retry_floor_ms")]
    pub retry_floor_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_retry_ceiling_ms")]
    pub retry_ceiling_ms: u64,

    /// Capacity of the aggregate output channel
    #[serde(default = "default_output_buffer")]
    pub output_buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            retry_floor_ms: default_retry_floor_ms(),
            retry_ceiling_ms: default_retry_ceiling_ms(),
            output_buffer: default_output_buffer(),
        }
    }
}

impl StreamConfig {
    pub fn validate(&self) -> Result<()> {
        if self.retry_floor_ms == 0 {
            return Err(Error::InvalidConfig("stream.retry_floor_ms must be > 0".into()));
        }
        if self.retry_floor_ms > self.retry_ceiling_ms {
            return Err(Error::InvalidConfig(format!(
                "stream.retry_floor_ms ({}) exceeds stream.retry_ceiling_ms ({})",
                self.retry_floor_ms, self.retry_ceiling_ms
            )));
        }
        if self.output_buffer == 0 {
            return Err(Error::InvalidConfig("stream.output_buffer must be at least 1".into()));
        }
        Ok(())
    }

    pub fn retry_floor(&self) -> Duration {
        Duration::from_millis(self.retry_floor_ms)
    }

    pub fn retry_ceiling(&self) -> Duration {
        Duration::from_millis(self.retry_ceiling_ms)
    }
}

fn default_retry_floor_ms() -> u64 {
    1000
}
fn default_retry_ceiling_ms() -> u64 {
    30_000
}
fn default_output_buffer() -> usize {
    10
}
