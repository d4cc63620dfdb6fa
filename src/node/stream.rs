use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::pool::close_shared;
use super::pool::SharedConnection;
use super::EventStream;
use super::MutationEvent;
use crate::Result;
use crate::StreamError;

/// A live mutation stream from one node
///
/// Holds the dedicated connection for as long as the stream lives. Closing
/// the owning pool interrupts the stream: the next read yields
/// [`StreamError::PoolClosed`] and the stream ends.
pub struct NodeStream {
    host: Arc<str>,
    events: EventStream,
    conn: SharedConnection,
    shutdown: CancellationToken,
    finished: bool,
}

impl NodeStream {
    pub(crate) fn new(
        host: Arc<str>,
        events: EventStream,
        conn: SharedConnection,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            host,
            events,
            conn,
            shutdown,
            finished: false,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub(crate) fn host_arc(&self) -> Arc<str> {
        Arc::clone(&self.host)
    }

    /// Next event, `None` after a clean end, or the error that ended the stream
    pub async fn next(&mut self) -> Option<Result<MutationEvent>> {
        if self.finished {
            return None;
        }

        let item = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Some(Err(StreamError::PoolClosed {
                host: self.host.to_string(),
            }
            .into())),
            item = self.events.next() => item,
        };

        if !matches!(item, Some(Ok(_))) {
            self.finished = true;
        }
        item
    }

    /// Closes the underlying connection; idempotent
    pub fn close(&self) {
        close_shared(&self.conn);
    }
}

impl Drop for NodeStream {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for NodeStream {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("NodeStream")
            .field("host", &self.host)
            .field("finished", &self.finished)
            .finish()
    }
}
