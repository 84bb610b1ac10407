//! Resync statistics types.
//!
//! Each transfer unit owns one [ConnectionRecord] for the duration of its
//! pull and is the only writer of its counters. A statistics module keeps a
//! handle to every record of the current pass and merges them when it is
//! read, under its own lock; records never reach back into the module.

use crate::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Key and byte counters for one bucket of one connection.
#[derive(Debug, Default)]
pub struct BucketRecord {
    keys: AtomicU64,
    bytes: AtomicU64,
}

impl BucketRecord {
    /// Keys received so far.
    pub fn keys(&self) -> u64 {
        self.keys.load(Ordering::Relaxed)
    }

    /// Bytes received so far.
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

/// The state of one transfer connection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionStatus {
    /// The transfer is still streaming.
    InProgress,
    /// Every requested bucket was received.
    Succeeded,
    /// The transfer failed; its peer is blacklisted for the pass.
    Failed,
}

impl ConnectionStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Succeeded,
            2 => Self::Failed,
            _ => Self::InProgress,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::InProgress => 0,
            Self::Succeeded => 1,
            Self::Failed => 2,
        }
    }
}

/// Live progress of one transfer unit pulling a set of buckets from one
/// peer.
#[derive(Debug)]
pub struct ConnectionRecord {
    peer: PeerAddr,
    buckets: BTreeMap<BucketId, BucketRecord>,
    status: AtomicU8,
}

impl ConnectionRecord {
    /// A fresh record for a pull of `buckets` from `peer`.
    pub fn new(peer: PeerAddr, buckets: &[BucketId]) -> Self {
        Self {
            peer,
            buckets: buckets
                .iter()
                .map(|b| (*b, BucketRecord::default()))
                .collect(),
            status: AtomicU8::new(ConnectionStatus::InProgress.as_u8()),
        }
    }

    /// The source peer of this connection.
    pub fn peer(&self) -> &PeerAddr {
        &self.peer
    }

    /// Count `keys` keys totalling `bytes` bytes received for `bucket`.
    ///
    /// Returns false, recording nothing, if `bucket` was not requested on
    /// this connection.
    pub fn record(&self, bucket: BucketId, keys: u64, bytes: u64) -> bool {
        match self.buckets.get(&bucket) {
            Some(rec) => {
                rec.keys.fetch_add(keys, Ordering::Relaxed);
                rec.bytes.fetch_add(bytes, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// The counters of `bucket`, if it was requested on this connection.
    pub fn bucket(&self, bucket: BucketId) -> Option<&BucketRecord> {
        self.buckets.get(&bucket)
    }

    /// The buckets requested on this connection, ascending.
    pub fn buckets(&self) -> impl Iterator<Item = BucketId> + '_ {
        self.buckets.keys().copied()
    }

    /// Keys received over all buckets.
    pub fn keys(&self) -> u64 {
        self.buckets.values().map(BucketRecord::keys).sum()
    }

    /// Bytes received over all buckets.
    pub fn bytes(&self) -> u64 {
        self.buckets.values().map(BucketRecord::bytes).sum()
    }

    /// The current status.
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Set the status once the outcome of the transfer is known.
    pub fn set_status(&self, status: ConnectionStatus) {
        self.status.store(status.as_u8(), Ordering::Release);
    }

    /// A point-in-time copy of this record.
    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            peer: self.peer.clone(),
            status: self.status(),
            keys: self.keys(),
            bytes: self.bytes(),
            buckets: self
                .buckets
                .iter()
                .map(|(bucket, rec)| BucketSnapshot {
                    bucket: *bucket,
                    keys: rec.keys(),
                    bytes: rec.bytes(),
                })
                .collect(),
        }
    }
}

/// A copy of one [BucketRecord].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketSnapshot {
    /// The bucket.
    pub bucket: BucketId,
    /// Keys received.
    pub keys: u64,
    /// Bytes received.
    pub bytes: u64,
}

/// A copy of one [ConnectionRecord].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    /// The source peer.
    pub peer: PeerAddr,
    /// The connection status.
    pub status: ConnectionStatus,
    /// Keys received over all buckets.
    pub keys: u64,
    /// Bytes received over all buckets.
    pub bytes: u64,
    /// Per-bucket counters.
    pub buckets: Vec<BucketSnapshot>,
}

/// The aggregate statistics of the current pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Buckets this node owns in the pass's view.
    pub total_buckets: u32,
    /// Buckets resynced this pass.
    pub resynced_bucket_count: u32,
    /// Keys received this pass, over all connections.
    pub resynced_keys_count: u64,
    /// Bytes received this pass, over all connections.
    pub resynced_bytes_count: u64,
    /// Bytes per second over the last reporting period.
    pub bandwidth: u64,
    /// Every connection of this pass, in the order they were opened.
    pub connections: Vec<ConnectionSnapshot>,
}

/// Receives the counters of resync passes.
///
/// All counters are reset at the start of each pass's accounting window.
pub trait ResyncStats: 'static + Send + Sync + std::fmt::Debug {
    /// Start a new accounting window for a pass in which this node owns
    /// `total_buckets` buckets.
    fn reset(&self, total_buckets: u32);

    /// Register a new transfer connection and hand back the record the
    /// transfer unit reports its progress into.
    fn add_connection(
        &self,
        peer: PeerAddr,
        buckets: &[BucketId],
    ) -> Arc<ConnectionRecord>;

    /// Count `count` buckets as fully resynced.
    fn buckets_resynced(&self, count: u32);

    /// Merge the current counters.
    fn snapshot(&self) -> StatsSnapshot;

    /// Notify that a pass has completed.
    fn pass_finished(&self, _report: &PassReport) {
        // provided impl is a no-op
    }
}

/// Trait-object [ResyncStats].
pub type DynResyncStats = Arc<dyn ResyncStats>;

/// A factory for creating [ResyncStats] instances.
pub trait StatsFactory: 'static + Send + Sync + std::fmt::Debug {
    /// Help the builder construct a default config from the chosen
    /// module factories.
    fn default_config(&self, config: &mut config::Config) -> ResyncResult<()>;

    /// Validate configuration.
    fn validate_config(&self, config: &config::Config) -> ResyncResult<()>;

    /// Construct a statistics instance.
    fn create(
        &self,
        builder: Arc<builder::Builder>,
    ) -> BoxFut<'static, ResyncResult<DynResyncStats>>;
}

/// Trait-object [StatsFactory].
pub type DynStatsFactory = Arc<dyn StatsFactory>;
