//! Bulk-transfer transport types.

use crate::*;
use std::sync::Arc;

/// What a completed pull moved.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct PullSummary {
    /// Keys applied to the local store.
    pub keys: u64,
    /// Bytes applied to the local store.
    pub bytes: u64,
}

impl std::ops::AddAssign for PullSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.keys += rhs.keys;
        self.bytes += rhs.bytes;
    }
}

/// Streams whole buckets from a remote peer into the local store.
///
/// The framing used on the wire is the transport's own business.
pub trait BulkTransport: 'static + Send + Sync + std::fmt::Debug {
    /// Connect to `source`, request `buckets`, and apply every key/value
    /// pair received to the local store, counting them into `progress` as
    /// they arrive.
    ///
    /// Must only resolve `Ok` once every requested bucket is confirmed
    /// complete. A refused connection, a rejected request or a stream that
    /// ends early is an error. Data applied before a failure stays applied.
    fn pull(
        &self,
        source: PeerAddr,
        buckets: Vec<BucketId>,
        progress: Arc<ConnectionRecord>,
    ) -> BoxFut<'_, ResyncResult<PullSummary>>;
}

/// Trait-object [BulkTransport].
pub type DynBulkTransport = Arc<dyn BulkTransport>;
