use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use url::Url;

/// Username/password pair handed to the control plane and to node connections
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// `Authorization` header value for HTTP basic auth
    pub fn basic_header(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {token}")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Supplies credentials on demand.
///
/// Consulted every time a control-plane request is issued or a node
/// connection is dialed, so implementations may rotate secrets.
pub trait AuthHandler: Send + Sync + 'static {
    fn credentials(&self) -> Credentials;
}

/// Static credentials
#[derive(Debug, Clone)]
pub struct BasicAuth {
    credentials: Credentials,
}

impl BasicAuth {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            credentials: Credentials::new(username, password),
        }
    }

    /// Derives credentials from the user-info part of `url`.
    ///
    /// Returns `None` when the URL carries no username. A missing password
    /// becomes the empty string.
    pub fn from_url(url: &Url) -> Option<Self> {
        if url.username().is_empty() {
            return None;
        }
        Some(Self::new(url.username(), url.password().unwrap_or_default()))
    }
}

impl AuthHandler for BasicAuth {
    fn credentials(&self) -> Credentials {
        self.credentials.clone()
    }
}
