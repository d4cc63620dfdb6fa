use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use tracing::debug;

use super::ControlReply;
use super::ControlRequest;
use super::ControlTransport;
use crate::ConnectionError;
use crate::ControlPlaneConfig;
use crate::Result;

/// [`ControlTransport`] backed by a shared `reqwest` client
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &ControlPlaneConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ConnectionError::Transport {
                url: String::new(),
                source: Box::new(e),
            })?;
        Ok(Self { client })
    }

    /// Wraps an already configured client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ControlTransport for HttpTransport {
    async fn get(
        &self,
        request: ControlRequest,
    ) -> Result<ControlReply> {
        let url = request.url.to_string();
        let mut builder = self.client.get(request.url);
        if let Some(value) = request.authorization {
            builder = builder.header(AUTHORIZATION, value);
        }

        let transport_error = |e: reqwest::Error| ConnectionError::Transport {
            url: url.clone(),
            source: Box::new(e),
        };

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(transport_error)?;
        debug!(%url, status, "control plane answered");

        Ok(ControlReply { status, body })
    }
}
