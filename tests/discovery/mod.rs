use bytes::Bytes;
use tokio::net::TcpListener;
use vbucket_client::get_bucket;
use vbucket_client::Cluster;
use vbucket_client::ConnectionError;
use vbucket_client::Credentials;
use vbucket_client::Error;
use vbucket_client::NodeRequest;
use vbucket_client::ResourceKind;

use crate::common::bucket_json;
use crate::common::bucket_uri;
use crate::common::ChannelConnector;
use crate::common::ControlServer;
use crate::enable_logger;

const N1: &str = "n1.cluster.test:11210";
const N2: &str = "n2.cluster.test:11210";
const N3: &str = "n3.cluster.test:11210";

#[tokio::test]
async fn test_get_bucket_routes_vbucket_zero_to_first_node() {
    enable_logger();
    let server = ControlServer::start().await;
    server.install_bucket("beer-sample", &[N1, N2], vec![vec![0], vec![1]]);
    let connector = ChannelConnector::new();

    let bucket = get_bucket(&server.endpoint(), "default", "beer-sample", connector.clone())
        .await
        .unwrap();

    let key = (0..)
        .map(|i| format!("doc-{i}"))
        .find(|k| bucket.vbucket_for(k.as_bytes()) == 0)
        .unwrap();
    let (pool, vbucket) = bucket.resolve_key(key.as_bytes());
    let pool = pool.unwrap();
    assert_eq!(vbucket, 0);
    assert_eq!(pool.host(), N1);

    let mut conn = pool.borrow().await.unwrap();
    let reply = conn
        .request(NodeRequest {
            key: Bytes::from(key.clone()),
            vbucket,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(reply.body, Bytes::from(key));
    conn.release();

    assert_eq!(bucket.node_addresses(), vec![N1, N2]);
    assert_eq!(bucket.common_address_suffix(), ".cluster.test:11210");
}

#[tokio::test]
async fn test_userinfo_credentials_reach_control_plane_and_nodes() {
    let server = ControlServer::start().await;
    server.install_bucket("beer-sample", &[N1], vec![vec![0]]);
    let connector = ChannelConnector::new();

    let bucket = get_bucket(
        &server.endpoint_with_user("admin", "secret"),
        "default",
        "beer-sample",
        connector.clone(),
    )
    .await
    .unwrap();
    let _conn = bucket.resolve_key(b"k").0.unwrap().borrow().await.unwrap();

    let expected = Credentials::new("admin", "secret").basic_header();
    let seen = server.authorization_seen();
    assert_eq!(seen.len(), 4);
    assert!(seen.iter().all(|h| h.as_deref() == Some(expected.as_str())));
    assert_eq!(connector.credentials(), vec![Credentials::new("admin", "secret")]);
}

#[tokio::test]
async fn test_anonymous_cluster_sends_no_authorization() {
    let server = ControlServer::start().await;
    server.install_bucket("beer-sample", &[N1], vec![vec![0]]);
    let connector = ChannelConnector::new();

    let bucket = get_bucket(&server.endpoint(), "default", "beer-sample", connector.clone())
        .await
        .unwrap();
    let _conn = bucket.resolve_key(b"k").0.unwrap().borrow().await.unwrap();

    assert!(server.authorization_seen().iter().all(Option::is_none));
    assert_eq!(connector.credentials(), vec![Credentials::new("beer-sample", "")]);
}

#[tokio::test]
async fn test_bucket_refresh_follows_topology_change() {
    let server = ControlServer::start().await;
    server.install_bucket("beer-sample", &[N1, N2], vec![vec![0], vec![1]]);
    let bucket = get_bucket(&server.endpoint(), "default", "beer-sample", ChannelConnector::new())
        .await
        .unwrap();
    let before = bucket.connection_pools();

    server.set_json(
        &bucket_uri("beer-sample"),
        bucket_json("beer-sample", &[N3, N1], vec![vec![1], vec![0]]),
    );
    bucket.refresh().await.unwrap();

    let after = bucket.connection_pools();
    let hosts: Vec<_> = after.iter().map(|p| p.host().to_string()).collect();
    assert_eq!(hosts, vec![N3, N1]);
    assert!(std::sync::Arc::ptr_eq(&before[0], &after[1]));
    assert!(before[1].is_closed());
}

#[tokio::test]
async fn test_failure_status_surfaces_with_body() {
    let server = ControlServer::start().await;
    server.install_bucket("beer-sample", &[N1], vec![vec![0]]);
    server.set_reply(&bucket_uri("beer-sample"), 401, "Unauthorized");
    let cluster = Cluster::connect(&server.endpoint(), ChannelConnector::new()).await.unwrap();
    let pool = cluster.pool("default").await.unwrap();

    let e = pool.bucket("beer-sample").await.unwrap_err();

    match e {
        Error::Refresh { bucket, source } => {
            assert_eq!(bucket, "beer-sample");
            assert!(matches!(
                *source,
                Error::Connection(ConnectionError::HttpStatus { status: 401, ref body, .. }) if body == "Unauthorized"
            ));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let e = pool.bucket("nope").await.unwrap_err();
    assert!(matches!(e, Error::NotFound { kind: ResourceKind::Bucket, .. }));
}

#[tokio::test]
async fn test_unreachable_endpoint() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let e = Cluster::connect(&format!("http://{addr}/"), ChannelConnector::new())
        .await
        .unwrap_err();

    assert!(matches!(e, Error::Connection(ConnectionError::Transport { .. })));
    assert!(e.is_retryable());
}
