//! Control plane descriptor documents.
//!
//! Only `serverList`, `vBucketMap`, `numReplicas`, `hashAlgorithm`, the
//! bucket/pool URIs and node hostnames are interpreted; every other field is
//! decoded and kept for callers.

use std::collections::HashMap;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;

/// Entry in the cluster's advertised pool list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestPool {
    pub name: String,
    #[serde(rename = "streamingUri")]
    pub streaming_uri: String,
    pub uri: String,
}

/// `/pools` document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolsInfo {
    #[serde(rename = "componentsVersion", skip_serializing_if = "HashMap::is_empty")]
    pub components_version: HashMap<String, String>,
    #[serde(rename = "implementationVersion")]
    pub implementation_version: String,
    #[serde(rename = "isAdminCreds")]
    pub is_admin: bool,
    pub uuid: String,
    pub pools: Vec<RestPool>,
}

/// A machine in the cluster
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeInfo {
    #[serde(rename = "clusterCompatibility")]
    pub cluster_compatibility: i64,
    #[serde(rename = "clusterMembership")]
    pub cluster_membership: String,
    #[serde(rename = "couchApiBase")]
    pub couch_api_base: String,
    pub hostname: String,
    #[serde(rename = "interestingStats", skip_serializing_if = "HashMap::is_empty")]
    pub interesting_stats: HashMap<String, f64>,
    #[serde(rename = "mcdMemoryAllocated")]
    pub mcd_memory_allocated: f64,
    #[serde(rename = "mcdMemoryReserved")]
    pub mcd_memory_reserved: f64,
    #[serde(rename = "memoryFree")]
    pub memory_free: f64,
    #[serde(rename = "memoryTotal")]
    pub memory_total: f64,
    pub os: String,
    pub ports: HashMap<String, i64>,
    pub status: String,
    /// Seconds; published as a decimal string
    #[serde(deserialize_with = "int_from_string")]
    pub uptime: i64,
    pub version: String,
    #[serde(rename = "thisNode")]
    pub this_node: bool,
}

/// Pool descriptor: its nodes and the URI of its bucket list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolInfo {
    pub nodes: Vec<NodeInfo>,
    /// Bucket list links, keyed by link kind (`uri`, `terseBucketsBase`, ...)
    #[serde(rename = "buckets")]
    pub bucket_urls: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesignDocs {
    pub uri: String,
}

/// Routing table: who owns which vbucket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VBucketServerMap {
    #[serde(rename = "hashAlgorithm")]
    pub hash_algorithm: String,
    #[serde(rename = "numReplicas")]
    pub num_replicas: usize,
    /// `host:port` of each data node; indices in `vbucket_map` point here
    #[serde(rename = "serverList")]
    pub server_list: Vec<String>,
    /// vbucket id → [master, replica1, ...]; -1 marks an unassigned slot
    #[serde(rename = "vBucketMap")]
    pub vbucket_map: Vec<Vec<i32>>,
}

/// Bucket descriptor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketInfo {
    #[serde(rename = "authType")]
    pub auth_type: String,
    #[serde(rename = "bucketCapabilities")]
    pub capabilities: Vec<String>,
    #[serde(rename = "bucketCapabilitiesVer")]
    pub capabilities_version: String,
    #[serde(rename = "bucketType")]
    pub bucket_type: String,
    pub name: String,
    #[serde(rename = "nodeLocator")]
    pub node_locator: String,
    pub nodes: Vec<NodeInfo>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub quota: HashMap<String, f64>,
    #[serde(rename = "replicaNumber")]
    pub replicas: usize,
    #[serde(rename = "saslPassword")]
    pub password: String,
    pub uri: String,
    #[serde(rename = "streamingUri")]
    pub streaming_uri: String,
    #[serde(rename = "localRandomKeyUri", skip_serializing_if = "String::is_empty")]
    pub local_random_key_uri: String,
    pub uuid: String,
    pub ddocs: DesignDocs,
    #[serde(rename = "vBucketServerMap")]
    pub vbucket_server_map: VBucketServerMap,
    #[serde(rename = "basicStats", skip_serializing_if = "HashMap::is_empty")]
    pub basic_stats: HashMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub controllers: HashMap<String, serde_json::Value>,
}

fn int_from_string<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(v) => Ok(v),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
