use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::warn;

use super::NodeEvent;
use crate::metrics::STREAM_EVENTS_TOTAL;
use crate::Bucket;
use crate::NodeConnectionPool;
use crate::NodeStream;
use crate::Result;
use crate::StreamArgs;
use crate::StreamError;

/// Terminal result of one node's forwarder: `Ok` for a clean end
#[derive(Debug)]
pub(crate) struct NodeOutcome {
    pub(crate) host: Arc<str>,
    pub(crate) result: Result<()>,
}

/// One connect attempt: a forwarder per node plus the kill switch they report to
pub(crate) struct Session {
    token: CancellationToken,
    forwarders: JoinSet<()>,
    kill_switch: mpsc::Receiver<NodeOutcome>,
    nodes: usize,
}

impl Session {
    /// Opens a stream on every node pool of `bucket`.
    ///
    /// All-or-nothing: if any node fails, streams opened so far are closed.
    pub(crate) async fn open(
        bucket: &Bucket,
        args: &StreamArgs,
        output: &mpsc::Sender<NodeEvent>,
        parent: &CancellationToken,
    ) -> Result<Self> {
        let pools = distinct(bucket.connection_pools());
        if pools.is_empty() {
            return Err(StreamError::NoNodes {
                bucket: bucket.name().to_string(),
            }
            .into());
        }

        let mut streams = Vec::with_capacity(pools.len());
        for pool in &pools {
            match pool.start_stream(args).await {
                Ok(stream) => streams.push(stream),
                Err(e) => {
                    warn!(bucket = %bucket.name(), host = %pool.host(), "cannot open node stream: {e}");
                    for stream in &streams {
                        stream.close();
                    }
                    return Err(e);
                }
            }
        }

        let nodes = streams.len();
        let token = parent.child_token();
        let (kill_tx, kill_switch) = mpsc::channel(nodes);
        let mut forwarders = JoinSet::new();
        for stream in streams {
            forwarders.spawn(forward(stream, output.clone(), kill_tx.clone(), token.clone()));
        }

        Ok(Self {
            token,
            forwarders,
            kill_switch,
            nodes,
        })
    }

    pub(crate) fn nodes(&self) -> usize {
        self.nodes
    }

    /// Next terminal outcome; `None` once every forwarder has exited
    pub(crate) async fn next_outcome(&mut self) -> Option<NodeOutcome> {
        self.kill_switch.recv().await
    }

    /// Stops every forwarder, closing its node stream, and waits for all of them
    pub(crate) async fn shutdown(mut self) {
        self.token.cancel();
        self.join().await;
    }

    async fn join(&mut self) {
        while let Some(joined) = self.forwarders.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    error!("mutation forwarder panicked: {e}");
                }
            }
        }
    }
}

/// Copies one node's events into the shared output until the node stream
/// ends, the consumer goes away or the attempt is cancelled.
async fn forward(
    mut stream: NodeStream,
    output: mpsc::Sender<NodeEvent>,
    kill_switch: mpsc::Sender<NodeOutcome>,
    token: CancellationToken,
) {
    let host = stream.host_arc();
    let events = STREAM_EVENTS_TOTAL.with_label_values(&[host.as_ref()]);

    let result = loop {
        let item = tokio::select! {
            biased;
            _ = token.cancelled() => break None,
            item = stream.next() => item,
        };
        let event = match item {
            Some(Ok(event)) => event,
            Some(Err(e)) => break Some(Err(e)),
            None => break Some(Ok(())),
        };

        events.inc();
        let node_event = NodeEvent {
            node: Arc::clone(&host),
            event,
        };
        tokio::select! {
            biased;
            _ = token.cancelled() => break None,
            sent = output.send(node_event) => {
                if sent.is_err() {
                    break None;
                }
            }
        }
    };
    stream.close();

    match result {
        Some(result) => {
            if let Err(e) = &result {
                warn!(%host, "node stream failed: {e}");
            } else {
                debug!(%host, "node stream ended");
            }
            let _ = kill_switch.send(NodeOutcome { host, result }).await;
        }
        None => debug!(%host, "forwarder stopped"),
    }
}

/// Pools in server-list order, one per host
fn distinct(pools: Vec<Arc<NodeConnectionPool>>) -> Vec<Arc<NodeConnectionPool>> {
    let mut seen = HashSet::new();
    pools.into_iter().filter(|p| seen.insert(p.host().to_string())).collect()
}
