use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// HTTP control plane transport parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ControlPlaneConfig {
    /// TCP connect timeout in milliseconds
    /// Default: 1000
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Whole-request timeout in milliseconds
    /// Default: 3000
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Maximum number of response body bytes quoted in an HTTP status error
    /// Default: 512
    #[serde(default = "default_error_body_limit")]
    pub error_body_limit: usize,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            request_timeout_ms: default_request_timeout(),
            error_body_limit: default_error_body_limit(),
        }
    }
}

impl ControlPlaneConfig {
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_ms == 0 {
            return Err(Error::InvalidConfig("control.connect_timeout_ms must be > 0".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::InvalidConfig("control.request_timeout_ms must be > 0".into()));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_connect_timeout() -> u64 {
    1000
}
fn default_request_timeout() -> u64 {
    3000
}
fn default_error_body_limit() -> usize {
    512
}
