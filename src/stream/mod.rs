//! Aggregated mutation stream over every node of a bucket.
//!
//! A control task opens one node stream per node pool and forwards their
//! events into a single channel. When any node stream fails, every node
//! stream of that attempt is torn down, the bucket topology is refreshed and
//! the streams are reopened after an exponential backoff.
//!
//! A node stream that ends cleanly counts as a topology change, unless the
//! session was opened with [`StreamArgs::dump`]: then the remaining nodes are
//! drained and the stream closes once all of them have finished.
//!
//! ```text
//! Connecting ──ok──▶ Streaming ──node error / early end──▶ Recovering ──refresh + backoff──▶ Connecting
//!     │                  │  └──dump complete: drain──▶ Closed
//!     └──error──▶ Recovering      └──close()──▶ Closed
//! ```

mod backoff;
mod forwarder;


use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use futures::Stream;
use nanoid::nanoid;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use self::backoff::Backoff;
use self::forwarder::NodeOutcome;
use self::forwarder::Session;
use crate::metrics::STREAM_RECONNECTS_TOTAL;
use crate::Bucket;
use crate::Error;
use crate::MutationEvent;
use crate::Result;
use crate::StreamArgs;
use crate::StreamConfig;
use crate::StreamError;

/// Lifecycle of a [`MutationStream`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Opening node streams
    Connecting,
    /// Every node stream open and forwarding
    Streaming,
    /// Refreshing topology and backing off after a failure
    Recovering,
    /// Terminal
    Closed,
}

/// An event tagged with the node that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEvent {
    pub node: Arc<str>,
    pub event: MutationEvent,
}

/// Consumer side of an aggregated mutation stream
///
/// Events of one node arrive in node order; events of different nodes
/// interleave arbitrarily. Node failures are absorbed and only show up as
/// gaps while the stream recovers. Dropping the stream closes it.
pub struct MutationStream {
    id: String,
    bucket: String,
    events: mpsc::Receiver<NodeEvent>,
    cancel: CancellationToken,
    state: watch::Receiver<StreamState>,
}

impl MutationStream {
    /// Spawns the control task; must be called from within a tokio runtime
    pub(crate) fn start(
        bucket: Arc<Bucket>,
        args: StreamArgs,
        config: StreamConfig,
    ) -> Self {
        let id = nanoid!();
        let (output, events) = mpsc::channel(config.output_buffer);
        let (state_tx, state) = watch::channel(StreamState::Connecting);
        let cancel = CancellationToken::new();

        let stream = Self {
            id: id.clone(),
            bucket: bucket.name().to_string(),
            events,
            cancel: cancel.clone(),
            state,
        };

        info!(stream = %id, bucket = %bucket.name(), "starting mutation stream");
        let driver = StreamDriver {
            id,
            bucket,
            args,
            backoff: Backoff::new(config.retry_floor(), config.retry_ceiling()),
            output,
            cancel,
            state: state_tx,
        };
        tokio::spawn(driver.run());

        stream
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Next event, or `None` once the stream is closed and drained
    pub async fn recv(&mut self) -> Option<NodeEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = self.events.recv() => event,
        }
    }

    /// Stops delivery immediately and tears down every node stream.
    ///
    /// Idempotent; teardown completes in the background, see [`closed`](Self::closed).
    pub fn close(&self) -> Result<()> {
        if !self.cancel.is_cancelled() {
            info!(stream = %self.id, bucket = %self.bucket, "closing mutation stream");
            self.cancel.cancel();
        }
        Ok(())
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Watches state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<StreamState> {
        self.state.clone()
    }

    /// Resolves once the control task has finished and every node stream is closed
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == StreamState::Closed).await;
    }
}

impl Stream for MutationStream {
    type Item = NodeEvent;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        if self.cancel.is_cancelled() {
            return Poll::Ready(None);
        }
        self.events.poll_recv(cx)
    }
}

impl Drop for MutationStream {
    fn drop(&mut self) {
        if !self.cancel.is_cancelled() {
            debug!(stream = %self.id, bucket = %self.bucket, "mutation stream dropped, closing");
            self.cancel.cancel();
        }
    }
}

/// How a streaming attempt ended
enum Ending {
    Failed(Error),
    Drained,
    Cancelled,
}

/// Control loop behind a [`MutationStream`]
struct StreamDriver {
    id: String,
    bucket: Arc<Bucket>,
    args: StreamArgs,
    backoff: Backoff,
    output: mpsc::Sender<NodeEvent>,
    cancel: CancellationToken,
    state: watch::Sender<StreamState>,
}

impl StreamDriver {
    async fn run(mut self) {
        self.drive().await;
        self.transition(StreamState::Closed);
        info!(stream = %self.id, bucket = %self.bucket.name(), "mutation stream closed");
        // Dropping self releases the last output sender: consumers see the end
    }

    async fn drive(&mut self) {
        let mut topology_ok = true;
        loop {
            if topology_ok {
                self.transition(StreamState::Connecting);
                let opened = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return,
                    opened = Session::open(&self.bucket, &self.args, &self.output, &self.cancel) => opened,
                };

                match opened {
                    Ok(mut session) => {
                        self.transition(StreamState::Streaming);
                        self.backoff.reset();
                        debug!(stream = %self.id, nodes = session.nodes(), "all node streams open");

                        match self.watch(&mut session).await {
                            Ending::Cancelled => {
                                session.shutdown().await;
                                return;
                            }
                            Ending::Drained => match self.drain(&mut session).await {
                                Ending::Failed(e) => {
                                    warn!(stream = %self.id, bucket = %self.bucket.name(), "node stream failed while draining: {e}");
                                    session.shutdown().await;
                                }
                                Ending::Drained | Ending::Cancelled => {
                                    session.shutdown().await;
                                    return;
                                }
                            },
                            Ending::Failed(e) => {
                                warn!(stream = %self.id, bucket = %self.bucket.name(), "mutation stream lost: {e}");
                                session.shutdown().await;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(stream = %self.id, bucket = %self.bucket.name(), "cannot connect node streams: {e}");
                    }
                }
            }

            self.transition(StreamState::Recovering);
            STREAM_RECONNECTS_TOTAL.with_label_values(&[self.bucket.name()]).inc();

            let refreshed = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                refreshed = self.bucket.refresh() => refreshed,
            };
            topology_ok = match refreshed {
                Ok(()) => true,
                Err(e @ Error::Closed { .. }) => {
                    info!(stream = %self.id, "bucket closed, stopping stream: {e}");
                    return;
                }
                Err(e) => {
                    warn!(stream = %self.id, bucket = %self.bucket.name(), "refresh failed: {e}");
                    false
                }
            };

            let delay = self.backoff.next_delay();
            info!(
                stream = %self.id,
                bucket = %self.bucket.name(),
                ?delay,
                topology_ok,
                "reconnecting mutation stream after backoff"
            );
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = sleep(delay) => {}
            }
        }
    }

    /// Waits for the first terminal outcome of the attempt
    async fn watch(
        &self,
        session: &mut Session,
    ) -> Ending {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Ending::Cancelled,
            outcome = session.next_outcome() => match outcome {
                Some(NodeOutcome { result: Err(e), .. }) => Ending::Failed(e),
                Some(NodeOutcome { host, result: Ok(()) }) if self.args.dump => {
                    info!(stream = %self.id, %host, "node dump complete, draining");
                    Ending::Drained
                }
                Some(NodeOutcome { host, result: Ok(()) }) => Ending::Failed(
                    StreamError::Ended {
                        host: host.to_string(),
                    }
                    .into(),
                ),
                None => Ending::Drained,
            },
        }
    }

    /// Waits for the remaining forwarders of a dump to finish.
    ///
    /// Returns `Drained` once all of them ended cleanly, or the first failure.
    async fn drain(
        &self,
        session: &mut Session,
    ) -> Ending {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ending::Cancelled,
                outcome = session.next_outcome() => match outcome {
                    Some(NodeOutcome { result: Err(e), .. }) => return Ending::Failed(e),
                    Some(NodeOutcome { host, result: Ok(()) }) => {
                        debug!(stream = %self.id, %host, "node stream drained");
                    }
                    None => return Ending::Drained,
                },
            }
        }
    }

    fn transition(
        &self,
        next: StreamState,
    ) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(stream = %self.id, from = ?previous, to = ?next, "stream state");
        }
    }
}
