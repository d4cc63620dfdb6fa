use serde_json::json;
use serde_json::Value;

use super::FakeControlPlane;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = env_logger::builder().is_test(true).try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

pub const TEST_ENDPOINT: &str = "http://cluster.test:8091/";
pub const POOL_URI: &str = "/pools/default";
pub const BUCKETS_URI: &str = "/pools/default/buckets?v=42";

pub fn bucket_uri(name: &str) -> String {
    format!("/pools/default/buckets/{name}")
}

/// `/pools` document advertising a single `default` pool
pub fn pools_json() -> Value {
    json!({
        "implementationVersion": "2.0.0",
        "isAdminCreds": true,
        "uuid": "c0ffee",
        "componentsVersion": { "ns_server": "2.0.0" },
        "pools": [
            { "name": "default", "uri": POOL_URI, "streamingUri": "/poolsStreaming/default" }
        ]
    })
}

pub fn pool_json(hostnames: &[&str]) -> Value {
    json!({
        "nodes": hostnames.iter().map(|h| node_json(h)).collect::<Vec<_>>(),
        "buckets": { "uri": BUCKETS_URI }
    })
}

pub fn node_json(hostname: &str) -> Value {
    json!({
        "hostname": hostname,
        "status": "healthy",
        "clusterMembership": "active",
        "uptime": "1234",
        "version": "2.0.0",
        "os": "x86_64-unknown-linux-gnu",
        "memoryTotal": 8.0e9,
        "memoryFree": 4.0e9,
        "ports": { "direct": 11210, "proxy": 11211 }
    })
}

/// Bucket descriptor; `servers` doubles as the node hostname list
pub fn bucket_json(
    name: &str,
    servers: &[&str],
    vbucket_map: Vec<Vec<i32>>,
) -> Value {
    json!({
        "name": name,
        "uri": bucket_uri(name),
        "streamingUri": format!("/pools/default/bucketsStreaming/{name}"),
        "bucketType": "membase",
        "authType": "sasl",
        "nodeLocator": "vbucket",
        "replicaNumber": 1,
        "nodes": servers.iter().map(|h| node_json(h)).collect::<Vec<_>>(),
        "vBucketServerMap": {
            "hashAlgorithm": "CRC",
            "numReplicas": 1,
            "serverList": servers,
            "vBucketMap": vbucket_map
        }
    })
}

/// Round-robin map of `vbuckets` entries over `servers` nodes, one replica
pub fn round_robin_map(
    vbuckets: usize,
    servers: usize,
) -> Vec<Vec<i32>> {
    (0..vbuckets)
        .map(|vb| {
            let master = (vb % servers) as i32;
            let replica = if servers > 1 { ((vb + 1) % servers) as i32 } else { -1 };
            vec![master, replica]
        })
        .collect()
}

/// Publishes `/pools`, the `default` pool and a single-bucket list, with the
/// bucket's own descriptor at its uri
pub fn install_bucket(
    control: &FakeControlPlane,
    name: &str,
    servers: &[&str],
    vbucket_map: Vec<Vec<i32>>,
) {
    let bucket = bucket_json(name, servers, vbucket_map);
    control.set_json("/pools", pools_json());
    control.set_json(POOL_URI, pool_json(servers));
    control.set_json(BUCKETS_URI, json!([bucket.clone()]));
    control.set_json(&bucket_uri(name), bucket);
}
