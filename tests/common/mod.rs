use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::Uri;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Router;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::json;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use vbucket_client::Credentials;
use vbucket_client::Error;
use vbucket_client::EventStream;
use vbucket_client::MutationEvent;
use vbucket_client::NodeConnection;
use vbucket_client::NodeConnector;
use vbucket_client::NodeRequest;
use vbucket_client::NodeResponse;
use vbucket_client::StreamArgs;
use vbucket_client::StreamError;

pub const POOL_URI: &str = "/pools/default";
pub const BUCKETS_URI: &str = "/pools/default/buckets?v=1";

pub fn bucket_uri(name: &str) -> String {
    format!("/pools/default/buckets/{name}")
}

//-----------------------------------------------------------
// Control plane

#[derive(Default)]
struct ControlState {
    documents: Mutex<HashMap<String, (u16, String)>>,
    authorization: Mutex<Vec<Option<String>>>,
}

/// Control endpoint served by axum on an ephemeral local port
pub struct ControlServer {
    addr: SocketAddr,
    state: Arc<ControlState>,
}

impl ControlServer {
    pub async fn start() -> Self {
        let state = Arc::new(ControlState::default());
        let app = Router::new().fallback(serve_document).with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("control server failed");
        });
        Self { addr, state }
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn endpoint_with_user(
        &self,
        user: &str,
        password: &str,
    ) -> String {
        format!("http://{user}:{password}@{}/", self.addr)
    }

    pub fn set_json(
        &self,
        path: &str,
        document: Value,
    ) {
        self.set_reply(path, 200, &document.to_string());
    }

    pub fn set_reply(
        &self,
        path: &str,
        status: u16,
        body: &str,
    ) {
        self.state
            .documents
            .lock()
            .insert(path.to_string(), (status, body.to_string()));
    }

    /// `Authorization` header of every request received so far
    pub fn authorization_seen(&self) -> Vec<Option<String>> {
        self.state.authorization.lock().clone()
    }

    /// Publishes the `default` pool with a single bucket
    pub fn install_bucket(
        &self,
        name: &str,
        servers: &[&str],
        vbucket_map: Vec<Vec<i32>>,
    ) {
        let bucket = bucket_json(name, servers, vbucket_map);
        self.set_json(
            "/pools",
            json!({
                "implementationVersion": "2.0.0",
                "pools": [{ "name": "default", "uri": POOL_URI, "streamingUri": "/poolsStreaming/default" }]
            }),
        );
        self.set_json(
            POOL_URI,
            json!({
                "nodes": servers.iter().map(|h| json!({ "hostname": h, "uptime": "10" })).collect::<Vec<_>>(),
                "buckets": { "uri": BUCKETS_URI }
            }),
        );
        self.set_json(BUCKETS_URI, json!([bucket.clone()]));
        self.set_json(&bucket_uri(name), bucket);
    }
}

async fn serve_document(
    State(state): State<Arc<ControlState>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.authorization.lock().push(authorization);

    let key = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/").to_string();
    let found = state.documents.lock().get(&key).cloned();
    match found {
        Some((status, body)) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, [(CONTENT_TYPE, "application/json")], body).into_response()
        }
        None => (StatusCode::NOT_FOUND, format!("Requested resource not found: {key}")).into_response(),
    }
}

pub fn bucket_json(
    name: &str,
    servers: &[&str],
    vbucket_map: Vec<Vec<i32>>,
) -> Value {
    json!({
        "name": name,
        "uri": bucket_uri(name),
        "bucketType": "membase",
        "nodeLocator": "vbucket",
        "nodes": servers.iter().map(|h| json!({ "hostname": h })).collect::<Vec<_>>(),
        "vBucketServerMap": {
            "hashAlgorithm": "CRC",
            "numReplicas": 0,
            "serverList": servers,
            "vBucketMap": vbucket_map
        }
    })
}

//-----------------------------------------------------------
// Data nodes

type FeedSender = mpsc::Sender<vbucket_client::Result<MutationEvent>>;

/// Node connector whose streams are fed by the test at runtime
#[derive(Default, Clone)]
pub struct ChannelConnector {
    feeds: Arc<Mutex<HashMap<String, Vec<FeedSender>>>>,
    credentials: Arc<Mutex<Vec<Credentials>>>,
}

impl ChannelConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Streams opened on `host` so far
    pub fn streams(
        &self,
        host: &str,
    ) -> usize {
        self.feeds.lock().get(host).map_or(0, Vec::len)
    }

    /// Sends `event` on the newest stream of `host`
    pub async fn push(
        &self,
        host: &str,
        event: MutationEvent,
    ) {
        let feed = self.latest(host);
        feed.send(Ok(event)).await.unwrap();
    }

    /// Fails the newest stream of `host`
    pub async fn fail(
        &self,
        host: &str,
        message: &str,
    ) {
        let feed = self.latest(host);
        let _ = feed
            .send(Err(StreamError::Node {
                host: host.to_string(),
                message: message.to_string(),
            }
            .into()))
            .await;
    }

    pub fn credentials(&self) -> Vec<Credentials> {
        self.credentials.lock().clone()
    }

    fn latest(
        &self,
        host: &str,
    ) -> FeedSender {
        self.feeds
            .lock()
            .get(host)
            .and_then(|feeds| feeds.last().cloned())
            .unwrap_or_else(|| panic!("no stream open on {host}"))
    }
}

#[async_trait]
impl NodeConnector for ChannelConnector {
    async fn connect(
        &self,
        host: &str,
        credentials: &Credentials,
    ) -> vbucket_client::Result<Box<dyn NodeConnection>> {
        self.credentials.lock().push(credentials.clone());
        Ok(Box::new(ChannelConnection {
            host: host.to_string(),
            feeds: Arc::clone(&self.feeds),
        }))
    }
}

struct ChannelConnection {
    host: String,
    feeds: Arc<Mutex<HashMap<String, Vec<FeedSender>>>>,
}

#[async_trait]
impl NodeConnection for ChannelConnection {
    async fn request(
        &mut self,
        request: NodeRequest,
    ) -> vbucket_client::Result<NodeResponse> {
        if request.key.is_empty() {
            return Err(Error::node(&self.host, "empty key"));
        }
        Ok(NodeResponse {
            status: 0,
            body: request.key,
        })
    }

    async fn start_stream(
        &mut self,
        _args: &StreamArgs,
    ) -> vbucket_client::Result<EventStream> {
        let (tx, rx) = mpsc::channel(16);
        self.feeds.lock().entry(self.host.clone()).or_default().push(tx);
        Ok(ReceiverStream::new(rx).boxed())
    }

    fn close(&mut self) {}
}
