use std::time::Duration;

use tokio::time::sleep;
use tokio::time::timeout;
use vbucket_client::metrics::gather_text;
use vbucket_client::ClientSettings;
use vbucket_client::Cluster;
use vbucket_client::MutationEvent;
use vbucket_client::MutationStream;
use vbucket_client::NodeEvent;
use vbucket_client::StreamArgs;
use vbucket_client::StreamConfig;
use vbucket_client::StreamState;

use crate::common::bucket_json;
use crate::common::bucket_uri;
use crate::common::ChannelConnector;
use crate::common::ControlServer;
use crate::enable_logger;

const N1: &str = "n1:11210";
const N2: &str = "n2:11210";
const N3: &str = "n3:11210";

fn fast_retry() -> ClientSettings {
    ClientSettings {
        stream: StreamConfig {
            retry_floor_ms: 20,
            retry_ceiling_ms: 200,
            output_buffer: 10,
        },
        ..Default::default()
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn next_event(stream: &mut MutationStream) -> NodeEvent {
    timeout(Duration::from_secs(5), stream.recv())
        .await
        .expect("no event in time")
        .expect("stream ended")
}

#[tokio::test]
async fn test_stream_recovers_onto_new_topology() {
    enable_logger();
    let server = ControlServer::start().await;
    server.install_bucket("events", &[N1, N2], vec![vec![0], vec![1]]);
    let connector = ChannelConnector::new();
    let cluster = Cluster::builder(server.endpoint(), connector.clone())
        .set_settings(fast_retry())
        .connect()
        .await
        .unwrap();
    let pool = cluster.pool("default").await.unwrap();
    let bucket = pool.bucket("events").await.unwrap();

    let mut stream = bucket.start_stream(StreamArgs::default());
    wait_until(|| connector.streams(N1) == 1 && connector.streams(N2) == 1).await;

    connector.push(N1, MutationEvent::mutation(0, "a", "1")).await;
    let event = next_event(&mut stream).await;
    assert_eq!(&*event.node, N1);
    assert_eq!(event.event.key.as_ref(), b"a");

    // n2 leaves the cluster and its feed breaks
    server.set_json(&bucket_uri("events"), bucket_json("events", &[N1, N3], vec![vec![0], vec![1]]));
    connector.fail(N2, "connection reset").await;

    wait_until(|| connector.streams(N3) == 1 && connector.streams(N1) == 2).await;
    wait_until(|| stream.state() == StreamState::Streaming).await;
    assert_eq!(connector.streams(N2), 1);

    connector.push(N3, MutationEvent::deletion(1, "b")).await;
    let event = next_event(&mut stream).await;
    assert_eq!(&*event.node, N3);
    assert_eq!(event.event.key.as_ref(), b"b");

    let hosts: Vec<_> = bucket.connection_pools().iter().map(|p| p.host().to_string()).collect();
    assert_eq!(hosts, vec![N1, N3]);
    assert!(gather_text().contains("vbucket_stream_reconnects_total"));

    stream.close().unwrap();
    assert!(stream.recv().await.is_none());
    timeout(Duration::from_secs(5), stream.closed()).await.unwrap();
}

#[tokio::test]
async fn test_bucket_close_ends_stream() {
    let server = ControlServer::start().await;
    server.install_bucket("events", &[N1], vec![vec![0]]);
    let connector = ChannelConnector::new();
    let cluster = Cluster::builder(server.endpoint(), connector.clone())
        .set_settings(fast_retry())
        .connect()
        .await
        .unwrap();
    let bucket = cluster.pool("default").await.unwrap().bucket("events").await.unwrap();

    let mut stream = bucket.start_stream(StreamArgs::default());
    wait_until(|| connector.streams(N1) == 1).await;
    bucket.close();

    let end = timeout(Duration::from_secs(5), stream.recv()).await.unwrap();
    assert!(end.is_none());
    assert_eq!(stream.state(), StreamState::Closed);
    assert_eq!(cluster.open_buckets(), 0);
}
