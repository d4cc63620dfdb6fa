//! Control plane access.
//!
//! The cluster publishes its topology as JSON documents over HTTP:
//! `/pools` → pool descriptor → bucket list → bucket descriptor. This module
//! turns "fetch path P as type T" into a typed call, while the raw HTTP
//! exchange sits behind the [`ControlTransport`] trait.

mod descriptors;
mod http;
pub use descriptors::*;
pub use http::*;


use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)]
use mockall::automock;
use serde::de::DeserializeOwned;
use tracing::debug;
use tracing::trace;
use url::Url;

use crate::AuthHandler;
use crate::ConnectionError;
use crate::Error;
use crate::Result;

/// One GET against the control endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRequest {
    pub url: Url,
    /// Full `Authorization` header value, when credentials are configured
    pub authorization: Option<String>,
}

/// Raw answer from the control endpoint
#[derive(Debug, Clone)]
pub struct ControlReply {
    pub status: u16,
    pub body: Bytes,
}

impl ControlReply {
    pub fn new(
        status: u16,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ControlTransport: Send + Sync + 'static {
    /// Performs the GET and returns status and body.
    ///
    /// Non-2xx statuses are not errors at this level; only failures to
    /// obtain any answer are.
    async fn get(
        &self,
        request: ControlRequest,
    ) -> Result<ControlReply>;
}

/// Typed access to the cluster's control endpoint
#[derive(Clone)]
pub struct ControlPlane {
    base: Url,
    auth: Option<Arc<dyn AuthHandler>>,
    transport: Arc<dyn ControlTransport>,
    error_body_limit: usize,
}

impl ControlPlane {
    /// `base` may carry user-info; it is stripped before any request is built.
    pub fn new(
        mut base: Url,
        auth: Option<Arc<dyn AuthHandler>>,
        transport: Arc<dyn ControlTransport>,
        error_body_limit: usize,
    ) -> Self {
        let _ = base.set_username("");
        let _ = base.set_password(None);
        Self {
            base,
            auth,
            transport,
            error_body_limit,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub(crate) fn auth(&self) -> Option<&Arc<dyn AuthHandler>> {
        self.auth.as_ref()
    }

    /// Resolves a descriptor path (optionally with `?query`) against the base URL
    pub(crate) fn url_for(
        &self,
        path: &str,
    ) -> Url {
        let mut url = self.base.clone();
        match path.split_once('?') {
            Some((p, q)) if !p.is_empty() => {
                url.set_path(p);
                url.set_query(Some(q));
            }
            _ => {
                url.set_path(path);
                url.set_query(None);
            }
        }
        url
    }

    /// Fetches `path` and decodes the body as `T`.
    ///
    /// # Errors
    /// - [`ConnectionError::Transport`] if no answer could be obtained
    /// - [`ConnectionError::HttpStatus`] on a non-2xx status
    /// - [`Error::Decode`] if the body is not a valid `T` document
    pub async fn fetch<T>(
        &self,
        path: &str,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = self.url_for(path);
        let authorization = self.auth.as_ref().map(|ah| ah.credentials().basic_header());
        debug!(%url, "fetching control plane document");

        let reply = self
            .transport
            .get(ControlRequest {
                url: url.clone(),
                authorization,
            })
            .await?;

        if !reply.is_success() {
            let limit = reply.body.len().min(self.error_body_limit);
            return Err(ConnectionError::HttpStatus {
                url: url.to_string(),
                status: reply.status,
                body: String::from_utf8_lossy(&reply.body[..limit]).into_owned(),
            }
            .into());
        }

        trace!(%url, bytes = reply.body.len(), "decoding control plane document");
        serde_json::from_slice(&reply.body).map_err(|source| Error::Decode {
            url: url.to_string(),
            source,
        })
    }
}
