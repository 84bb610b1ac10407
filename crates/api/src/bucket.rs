//! Mapping keys onto buckets.
//!
//! The bucket a key lands in is part of the cluster's data contract: every
//! node must agree on it, across restarts and versions. Do not change the
//! hash below without migrating the cluster.

use md5::{Digest, Md5};

/// Index of one hash partition of the key space.
pub type BucketId = u16;

/// The bucket count used when none is configured.
pub const DEFAULT_BUCKET_COUNT: u16 = 1024;

/// The bucket `key` belongs to, given the default bucket count.
pub fn bucket_for(key: &str) -> BucketId {
    bucket_for_in(key, DEFAULT_BUCKET_COUNT)
}

/// The bucket `key` belongs to, given `bucket_count` buckets.
///
/// The first four bytes of the MD5 digest of the key, read as a
/// little-endian u32, are masked down to the bucket count. Bucket counts
/// are expected to be powers of two; any other nonzero count is reduced by
/// modulo instead, and a zero count maps everything to bucket 0.
pub fn bucket_for_in(key: impl AsRef<[u8]>, bucket_count: u16) -> BucketId {
    let digest = Md5::digest(key.as_ref());
    let hash =
        u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
    let count = u32::from(bucket_count);

    let bucket = if count == 0 {
        0
    } else if count.is_power_of_two() {
        hash & (count - 1)
    } else {
        hash % count
    };

    bucket as BucketId
}
