//! Data node access.
//!
//! The wire protocol spoken to an individual node is an external collaborator:
//! this module only fixes the seam ([`NodeConnector`] / [`NodeConnection`]) and
//! builds the per-node connection pool and streaming session on top of it.

mod pool;
mod stream;
pub use pool::*;
pub use stream::*;


use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::Credentials;
use crate::Result;

/// Events produced by a node's mutation stream, in node order.
///
/// The stream ends with `None` on a clean end-of-data, or yields an `Err`
/// item when the session fails.
pub type EventStream = BoxStream<'static, Result<MutationEvent>>;

/// Kind of change carried by a [`MutationEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationOpcode {
    Mutation,
    Deletion,
    Flush,
    Opaque,
    VBucketSet,
    CheckpointStart,
    CheckpointEnd,
}

/// One data-change event from a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationEvent {
    pub opcode: MutationOpcode,
    pub vbucket: u16,
    pub key: Bytes,
    pub value: Bytes,
    pub flags: u32,
    pub expiry: u32,
    pub cas: u64,
}

impl MutationEvent {
    pub fn mutation(
        vbucket: u16,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Self {
        Self {
            opcode: MutationOpcode::Mutation,
            vbucket,
            key: key.into(),
            value: value.into(),
            flags: 0,
            expiry: 0,
            cas: 0,
        }
    }

    pub fn deletion(
        vbucket: u16,
        key: impl Into<Bytes>,
    ) -> Self {
        Self {
            opcode: MutationOpcode::Deletion,
            vbucket,
            key: key.into(),
            value: Bytes::new(),
            flags: 0,
            expiry: 0,
            cas: 0,
        }
    }
}

/// Parameters of a streaming session
///
/// The default asks for live changes only, on every vbucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamArgs {
    /// Replay history starting at this timestamp before going live
    pub backfill: Option<u64>,
    /// Stop once the existing data has been sent
    pub dump: bool,
    /// Restrict to these vbuckets; empty means all
    pub vbuckets: Vec<u16>,
    /// Take over ownership of the listed vbuckets
    pub takeover: bool,
    /// Client acknowledges received events
    pub support_ack: bool,
    /// Send keys without values
    pub keys_only: bool,
    /// Emit checkpoint markers
    pub checkpoint: bool,
    /// Named session, resumable by the server
    pub client_name: String,
}

/// Opaque request forwarded verbatim to a node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeRequest {
    pub opcode: u8,
    pub vbucket: u16,
    pub key: Bytes,
    pub extras: Bytes,
    pub body: Bytes,
}

/// Opaque node answer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeResponse {
    pub status: u16,
    pub body: Bytes,
}

/// An authenticated protocol connection to one node
#[async_trait]
pub trait NodeConnection: Send + 'static {
    async fn request(
        &mut self,
        request: NodeRequest,
    ) -> Result<NodeResponse>;

    /// Turns this connection into a streaming session.
    ///
    /// The connection is dedicated to the stream afterwards and is only
    /// closed, never reused.
    async fn start_stream(
        &mut self,
        args: &StreamArgs,
    ) -> Result<EventStream>;

    fn close(&mut self);
}

/// Dials and authenticates node connections
#[async_trait]
pub trait NodeConnector: Send + Sync + 'static {
    async fn connect(
        &self,
        host: &str,
        credentials: &Credentials,
    ) -> Result<Box<dyn NodeConnection>>;
}
