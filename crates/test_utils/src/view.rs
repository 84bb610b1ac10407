//! Test utilities associated with views.

use crate::peer::peers;
use resync_api::{BucketId, BucketOwners, View};

/// Incrementally describe a test view.
///
/// ```ignore
/// let view = TestView::new(16)
///     .bucket(7, &["a", "b"])
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct TestView {
    generation: u64,
    buckets: Vec<BucketOwners>,
}

impl TestView {
    /// A view of `bucket_count` unowned buckets, generation 1.
    pub fn new(bucket_count: u16) -> Self {
        Self {
            generation: 1,
            buckets: vec![BucketOwners::default(); bucket_count as usize],
        }
    }

    /// Set the generation.
    pub fn generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    /// Set the owners of `bucket` by test peer name.
    pub fn bucket(mut self, bucket: BucketId, owners: &[&str]) -> Self {
        self.buckets[bucket as usize] = BucketOwners::new(peers(owners));
        self
    }

    /// Set the owners and former owners of `bucket` by test peer name.
    pub fn resizing_bucket(
        mut self,
        bucket: BucketId,
        owners: &[&str],
        former: &[&str],
    ) -> Self {
        self.buckets[bucket as usize] =
            BucketOwners::new(peers(owners)).with_former(peers(former));
        self
    }

    /// Give every bucket in `range` the same owners.
    pub fn all_buckets(
        mut self,
        range: std::ops::Range<BucketId>,
        owners: &[&str],
    ) -> Self {
        for bucket in range {
            self = self.bucket(bucket, owners);
        }
        self
    }

    /// Build the view.
    pub fn build(self) -> View {
        View::new(self.generation, self.buckets)
            .expect("test views must have a power of two bucket count")
    }
}
