use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use parking_lot::Mutex;

use crate::Credentials;
use crate::Error;
use crate::EventStream;
use crate::MutationEvent;
use crate::NodeConnection;
use crate::NodeConnector;
use crate::NodeRequest;
use crate::NodeResponse;
use crate::Result;
use crate::StreamArgs;
use crate::StreamError;

/// Key that makes a fake request fail
pub const FAILING_KEY: &[u8] = b"boom";

/// How a scripted feed finishes after its events
#[derive(Debug, Clone)]
pub enum FeedEnd {
    Clean,
    Fail(String),
    Hang,
}

/// Behavior of the next `start_stream` on a node
#[derive(Debug, Clone)]
pub enum FeedScript {
    Events(Vec<MutationEvent>, FeedEnd),
    FailToOpen(String),
}

#[derive(Default)]
struct NodeState {
    scripts: VecDeque<FeedScript>,
    refuse: bool,
    dials: usize,
    closes: usize,
    stream_opens: usize,
    credentials: Option<Credentials>,
}

/// Scripted data nodes. Unscripted streams stay open without events.
#[derive(Default, Clone)]
pub struct FakeConnector {
    nodes: Arc<Mutex<HashMap<String, NodeState>>>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(
        &self,
        host: &str,
        script: FeedScript,
    ) {
        self.nodes.lock().entry(host.to_string()).or_default().scripts.push_back(script);
    }

    pub fn refuse(
        &self,
        host: &str,
        refuse: bool,
    ) {
        self.nodes.lock().entry(host.to_string()).or_default().refuse = refuse;
    }

    pub fn dials(
        &self,
        host: &str,
    ) -> usize {
        self.nodes.lock().get(host).map(|n| n.dials).unwrap_or(0)
    }

    pub fn closes(
        &self,
        host: &str,
    ) -> usize {
        self.nodes.lock().get(host).map(|n| n.closes).unwrap_or(0)
    }

    pub fn stream_opens(
        &self,
        host: &str,
    ) -> usize {
        self.nodes.lock().get(host).map(|n| n.stream_opens).unwrap_or(0)
    }

    pub fn credentials(
        &self,
        host: &str,
    ) -> Option<Credentials> {
        self.nodes.lock().get(host).and_then(|n| n.credentials.clone())
    }
}

#[async_trait]
impl NodeConnector for FakeConnector {
    async fn connect(
        &self,
        host: &str,
        credentials: &Credentials,
    ) -> Result<Box<dyn NodeConnection>> {
        let mut nodes = self.nodes.lock();
        let node = nodes.entry(host.to_string()).or_default();
        if node.refuse {
            return Err(Error::node(host, "connection refused"));
        }
        node.dials += 1;
        node.credentials = Some(credentials.clone());
        Ok(Box::new(FakeConnection {
            host: host.to_string(),
            nodes: Arc::clone(&self.nodes),
            closed: false,
        }))
    }
}

struct FakeConnection {
    host: String,
    nodes: Arc<Mutex<HashMap<String, NodeState>>>,
    closed: bool,
}

#[async_trait]
impl NodeConnection for FakeConnection {
    async fn request(
        &mut self,
        request: NodeRequest,
    ) -> Result<NodeResponse> {
        if self.closed {
            return Err(Error::node(&self.host, "connection closed"));
        }
        if request.key.as_ref() == FAILING_KEY {
            return Err(Error::node(&self.host, "request failed"));
        }
        Ok(NodeResponse {
            status: 0,
            body: request.key,
        })
    }

    async fn start_stream(
        &mut self,
        _args: &StreamArgs,
    ) -> Result<EventStream> {
        let script = {
            let mut nodes = self.nodes.lock();
            let node = nodes.entry(self.host.clone()).or_default();
            node.stream_opens += 1;
            node.scripts.pop_front()
        };

        match script {
            Some(FeedScript::FailToOpen(message)) => Err(Error::node(&self.host, message)),
            Some(FeedScript::Events(events, end)) => {
                let host = self.host.clone();
                let tail: EventStream = match end {
                    FeedEnd::Clean => stream::empty().boxed(),
                    FeedEnd::Fail(message) => {
                        stream::once(async move { Err::<MutationEvent, Error>(StreamError::Node { host, message }.into()) }).boxed()
                    }
                    FeedEnd::Hang => stream::pending().boxed(),
                };
                Ok(stream::iter(events.into_iter().map(Ok)).chain(tail).boxed())
            }
            None => Ok(stream::pending().boxed()),
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            if let Some(node) = self.nodes.lock().get_mut(&self.host) {
                node.closes += 1;
            }
        }
    }
}
