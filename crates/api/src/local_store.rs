//! Local bucket store types.

use crate::*;
use std::collections::BTreeSet;
use std::sync::Arc;

/// The local key/value store that resynced data lands in, together with
/// the record of which buckets this node holds a complete copy of.
///
/// Transfer units write into the store concurrently, so implementations
/// must tolerate concurrent [LocalStore::apply] calls. Applying the same
/// pair twice must be harmless, since a bucket whose transfer failed half
/// way is simply pulled again from another peer.
pub trait LocalStore: 'static + Send + Sync + std::fmt::Debug {
    /// Write one key/value pair streamed from a remote peer for `bucket`.
    fn apply(
        &self,
        bucket: BucketId,
        key: bytes::Bytes,
        value: bytes::Bytes,
    ) -> ResyncResult<()>;

    /// Does this node hold a complete copy of `bucket`?
    fn holds_bucket(&self, bucket: BucketId) -> bool;

    /// Every bucket this node holds a complete copy of.
    fn held_buckets(&self) -> BTreeSet<BucketId>;

    /// Record that `bucket` has been fully resynced.
    fn mark_bucket_synced(&self, bucket: BucketId);

    /// Forget that `bucket` is held, e.g. because this node no longer owns
    /// it. Its data may be kept; the next time the bucket is owned it is
    /// pulled again.
    fn release_bucket(&self, bucket: BucketId);
}

/// Trait-object [LocalStore].
pub type DynLocalStore = Arc<dyn LocalStore>;
