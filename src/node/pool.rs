use std::fmt;
use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;

use parking_lot::Mutex;
use tokio::sync::OwnedSemaphorePermit;
use tokio::sync::Semaphore;
use tokio::sync::TryAcquireError;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::NodeConnection;
use super::NodeConnector;
use super::NodeRequest;
use super::NodeResponse;
use super::NodeStream;
use super::StreamArgs;
use crate::AuthHandler;
use crate::ConnectionError;
use crate::Error;
use crate::ExhaustedPolicy;
use crate::PoolConfig;
use crate::Result;

/// A streaming connection, shared between its [`NodeStream`] and the pool so
/// either side can close it. `None` once closed.
pub(crate) type SharedConnection = Arc<Mutex<Option<Box<dyn NodeConnection>>>>;

/// Bounded pool of reusable connections to one node
///
/// Connections are dialed lazily, up to `capacity`. Streaming sessions get a
/// dedicated connection that does not count against the capacity.
pub struct NodeConnectionPool {
    host: String,
    auth: Arc<dyn AuthHandler>,
    connector: Arc<dyn NodeConnector>,
    config: PoolConfig,
    idle: Mutex<Vec<Box<dyn NodeConnection>>>,
    permits: Arc<Semaphore>,
    streams: Mutex<Vec<Weak<Mutex<Option<Box<dyn NodeConnection>>>>>>,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

impl NodeConnectionPool {
    pub fn new(
        host: impl Into<String>,
        auth: Arc<dyn AuthHandler>,
        connector: Arc<dyn NodeConnector>,
        config: PoolConfig,
    ) -> Arc<Self> {
        let host = host.into();
        debug!(%host, capacity = config.capacity, "node connection pool created");
        Arc::new(Self {
            permits: Arc::new(Semaphore::new(config.capacity)),
            host,
            auth,
            connector,
            config,
            idle: Mutex::new(Vec::new()),
            streams: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Connections dialed and waiting for a borrower
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Borrows that would currently succeed without waiting
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Checks out a connection, dialing a new one if none is idle.
    ///
    /// # Errors
    /// - [`Error::PoolExhausted`] under the fail-fast policy, or when a
    ///   bounded blocking borrow times out
    /// - [`ConnectionError::PoolClosed`] once the pool is closed
    /// - whatever the connector returns when dialing fails
    pub async fn borrow(self: &Arc<Self>) -> Result<PooledConnection> {
        let permit = self.acquire_permit().await?;

        let idle = self.idle.lock().pop();
        let conn = match idle {
            Some(conn) => conn,
            None => self.dial().await?,
        };

        if self.is_closed() {
            let mut conn = conn;
            conn.close();
            return Err(self.closed_error());
        }

        trace!(host = %self.host, "connection borrowed");
        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(self),
            broken: false,
            _permit: permit,
        })
    }

    /// Opens a streaming session on a dedicated connection
    pub async fn start_stream(
        &self,
        args: &StreamArgs,
    ) -> Result<NodeStream> {
        if self.is_closed() {
            return Err(self.closed_error());
        }

        let mut conn = self.dial().await?;
        let events = match conn.start_stream(args).await {
            Ok(events) => events,
            Err(e) => {
                conn.close();
                return Err(e);
            }
        };

        let shared: SharedConnection = Arc::new(Mutex::new(Some(conn)));
        {
            let mut streams = self.streams.lock();
            if self.is_closed() {
                drop(streams);
                close_shared(&shared);
                return Err(self.closed_error());
            }
            streams.retain(|s| s.strong_count() > 0);
            streams.push(Arc::downgrade(&shared));
        }

        debug!(host = %self.host, "mutation stream opened");
        Ok(NodeStream::new(
            Arc::from(self.host.as_str()),
            events,
            shared,
            self.shutdown.child_token(),
        ))
    }

    /// Closes every idle and streaming connection and rejects further borrows.
    ///
    /// Connections currently borrowed are closed when they come back.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.cancel();
        self.permits.close();

        let idle: Vec<_> = self.idle.lock().drain(..).collect();
        let idle_count = idle.len();
        for mut conn in idle {
            conn.close();
        }

        let streams: Vec<_> = self.streams.lock().drain(..).collect();
        let mut stream_count = 0;
        for shared in streams.iter().filter_map(Weak::upgrade) {
            if close_shared(&shared) {
                stream_count += 1;
            }
        }

        info!(
            host = %self.host,
            idle = idle_count,
            streams = stream_count,
            "node connection pool closed"
        );
    }

    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        let permits = Arc::clone(&self.permits);
        match self.config.exhausted_policy {
            ExhaustedPolicy::FailFast => permits.try_acquire_owned().map_err(|e| match e {
                TryAcquireError::Closed => self.closed_error(),
                TryAcquireError::NoPermits => self.exhausted_error(),
            }),
            ExhaustedPolicy::Block => {
                let acquire = permits.acquire_owned();
                let permit = match self.config.borrow_timeout() {
                    Some(limit) => timeout(limit, acquire).await.map_err(|_| {
                        warn!(host = %self.host, ?limit, "timed out waiting for an idle connection");
                        self.exhausted_error()
                    })?,
                    None => acquire.await,
                };
                permit.map_err(|_| self.closed_error())
            }
        }
    }

    async fn dial(&self) -> Result<Box<dyn NodeConnection>> {
        debug!(host = %self.host, "dialing node connection");
        self.connector.connect(&self.host, &self.auth.credentials()).await
    }

    fn put_back(
        &self,
        mut conn: Box<dyn NodeConnection>,
        broken: bool,
    ) {
        if broken {
            debug!(host = %self.host, "discarding broken connection");
            conn.close();
            return;
        }
        let mut idle = self.idle.lock();
        // close() drains the idle set under this lock after raising the flag
        if self.is_closed() {
            drop(idle);
            conn.close();
            return;
        }
        idle.push(conn);
    }

    fn closed_error(&self) -> Error {
        ConnectionError::PoolClosed {
            host: self.host.clone(),
        }
        .into()
    }

    fn exhausted_error(&self) -> Error {
        Error::PoolExhausted {
            host: self.host.clone(),
        }
    }
}

impl Drop for NodeConnectionPool {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for NodeConnectionPool {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("NodeConnectionPool")
            .field("host", &self.host)
            .field("capacity", &self.config.capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Closes a shared streaming connection; returns false if it was already closed
pub(crate) fn close_shared(shared: &SharedConnection) -> bool {
    match shared.lock().take() {
        Some(mut conn) => {
            conn.close();
            true
        }
        None => false,
    }
}

/// A borrowed connection; goes back to its pool on drop
///
/// A connection that failed during use must not be handed out again: call
/// [`mark_broken`](Self::mark_broken), or use [`request`](Self::request)
/// which does so automatically on error.
pub struct PooledConnection {
    conn: Option<Box<dyn NodeConnection>>,
    pool: Arc<NodeConnectionPool>,
    broken: bool,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    pub fn host(&self) -> &str {
        self.pool.host()
    }

    /// Issues a request; a failure marks the connection broken
    pub async fn request(
        &mut self,
        request: NodeRequest,
    ) -> Result<NodeResponse> {
        let result = self.deref_mut().request(request).await;
        if let Err(e) = &result {
            warn!(host = %self.pool.host, "request failed, connection will be replaced: {e}");
            self.broken = true;
        }
        result
    }

    /// Discard instead of reuse when released
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Returns the connection to its pool; equivalent to dropping the guard
    pub fn release(self) {}
}

impl fmt::Debug for PooledConnection {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("host", &self.pool.host)
            .field("broken", &self.broken)
            .finish()
    }
}

impl Deref for PooledConnection {
    type Target = dyn NodeConnection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_deref().expect("connection present until drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_deref_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put_back(conn, self.broken);
        }
    }
}
