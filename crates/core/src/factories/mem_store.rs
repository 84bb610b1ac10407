//! An in-memory local store.

use bytes::Bytes;
use resync_api::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct State {
    data: HashMap<BucketId, BTreeMap<Bytes, Bytes>>,
    synced: BTreeSet<BucketId>,
}

/// A [LocalStore] keeping key/value pairs in memory, partitioned by
/// bucket.
///
/// A bucket is held once it has been marked synced. Data applied to a
/// bucket that is not held is kept, but the bucket stays outstanding.
/// Releasing a bucket only forgets that it is held.
#[derive(Debug)]
pub struct MemLocalStore {
    bucket_count: u16,
    state: Mutex<State>,
}

impl MemLocalStore {
    /// An empty store hashing keys into `bucket_count` buckets.
    pub fn create(bucket_count: u16) -> Arc<Self> {
        Arc::new(Self {
            bucket_count,
            state: Mutex::new(State::default()),
        })
    }

    /// The number of buckets keys are hashed into.
    pub fn bucket_count(&self) -> u16 {
        self.bucket_count
    }

    /// Write `key` to the bucket it hashes to and return that bucket.
    pub fn put(
        &self,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> BucketId {
        let key = key.into();
        let bucket = bucket_for_in(&key, self.bucket_count);
        self.state
            .lock()
            .unwrap()
            .data
            .entry(bucket)
            .or_default()
            .insert(key, value.into());
        bucket
    }

    /// Read `key`.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        let bucket = bucket_for_in(key, self.bucket_count);
        self.state
            .lock()
            .unwrap()
            .data
            .get(&bucket)
            .and_then(|entries| entries.get(key).cloned())
    }

    /// Every pair in `bucket`, in key order.
    pub fn entries_in_bucket(&self, bucket: BucketId) -> Vec<(Bytes, Bytes)> {
        self.state
            .lock()
            .unwrap()
            .data
            .get(&bucket)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The number of keys in the store.
    pub fn key_count(&self) -> usize {
        self.state.lock().unwrap().data.values().map(BTreeMap::len).sum()
    }
}

impl LocalStore for MemLocalStore {
    fn apply(
        &self,
        bucket: BucketId,
        key: Bytes,
        value: Bytes,
    ) -> ResyncResult<()> {
        if (bucket as u32) >= self.bucket_count as u32 {
            return Err(ResyncError::other(format!(
                "bucket {bucket} out of range for {} buckets",
                self.bucket_count
            )));
        }
        self.state
            .lock()
            .unwrap()
            .data
            .entry(bucket)
            .or_default()
            .insert(key, value);
        Ok(())
    }

    fn holds_bucket(&self, bucket: BucketId) -> bool {
        self.state.lock().unwrap().synced.contains(&bucket)
    }

    fn held_buckets(&self) -> BTreeSet<BucketId> {
        self.state.lock().unwrap().synced.clone()
    }

    fn mark_bucket_synced(&self, bucket: BucketId) {
        self.state.lock().unwrap().synced.insert(bucket);
    }

    fn release_bucket(&self, bucket: BucketId) {
        self.state.lock().unwrap().synced.remove(&bucket);
    }
}
