//! An in-process bulk transport for testing.
//!
//! This is NOT a production module. A [MemNetwork] is a registry of peer
//! stores inside one process; a [MemTransport] pulls buckets out of them.
//! Faults can be injected per peer to exercise failure handling.

use bytes::Bytes;
use resync_api::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::MemLocalStore;

/// A fault injected into every pull from one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerFault {
    /// The peer refuses the connection.
    Refuse,
    /// The peer drops the connection after sending `after_keys` keys.
    Disconnect {
        /// Keys sent before the connection drops.
        after_keys: u64,
    },
    /// The peer accepts the connection and never sends anything.
    Hang,
}

#[derive(Debug, Default)]
struct State {
    peers: HashMap<PeerAddr, Arc<MemLocalStore>>,
    faults: HashMap<PeerAddr, PeerFault>,
}

/// The peers reachable from [MemTransport]s created by this network.
#[derive(Debug, Default)]
pub struct MemNetwork(Mutex<State>);

impl MemNetwork {
    /// An empty network.
    pub fn create() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `store` reachable as `peer`.
    pub fn register(&self, peer: PeerAddr, store: Arc<MemLocalStore>) {
        self.0.lock().unwrap().peers.insert(peer, store);
    }

    /// Make `peer` unreachable.
    pub fn unregister(&self, peer: &PeerAddr) {
        self.0.lock().unwrap().peers.remove(peer);
    }

    /// Inject `fault` into pulls from `peer`, or clear it with `None`.
    pub fn set_fault(&self, peer: &PeerAddr, fault: Option<PeerFault>) {
        let mut lock = self.0.lock().unwrap();
        match fault {
            Some(fault) => {
                lock.faults.insert(peer.clone(), fault);
            }
            None => {
                lock.faults.remove(peer);
            }
        }
    }

    /// A transport applying pulled data to `local`.
    pub fn transport(
        self: &Arc<Self>,
        local: DynLocalStore,
    ) -> DynBulkTransport {
        let out: DynBulkTransport = Arc::new(MemTransport {
            network: self.clone(),
            local,
        });
        out
    }

    fn connect(
        &self,
        peer: &PeerAddr,
    ) -> ResyncResult<(Arc<MemLocalStore>, Option<PeerFault>)> {
        let lock = self.0.lock().unwrap();
        let store = lock.peers.get(peer).cloned().ok_or_else(|| {
            ResyncError::other(format!("no route to {peer}"))
        })?;
        Ok((store, lock.faults.get(peer).copied()))
    }
}

/// A [BulkTransport] over a [MemNetwork].
///
/// A peer only serves buckets it holds. Each key moved counts the length
/// of its key plus its value as bytes.
#[derive(Debug)]
pub struct MemTransport {
    network: Arc<MemNetwork>,
    local: DynLocalStore,
}

impl MemTransport {
    async fn stream(
        &self,
        source: &PeerAddr,
        store: &MemLocalStore,
        fault: Option<PeerFault>,
        buckets: Vec<BucketId>,
        progress: &ConnectionRecord,
    ) -> ResyncResult<PullSummary> {
        if let Some(bucket) = buckets.iter().find(|b| !store.holds_bucket(**b))
        {
            return Err(ResyncError::BucketNotHeld {
                peer: source.clone(),
                bucket: *bucket,
            });
        }

        let mut summary = PullSummary::default();
        for bucket in buckets {
            for (key, value) in store.entries_in_bucket(bucket) {
                if let Some(PeerFault::Disconnect { after_keys }) = fault {
                    if summary.keys >= after_keys {
                        return Err(ResyncError::other(format!(
                            "{source} disconnected after {} keys",
                            summary.keys
                        )));
                    }
                }
                let bytes = wire_len(&key, &value);
                self.local.apply(bucket, key, value)?;
                progress.record(bucket, 1, bytes);
                summary += PullSummary { keys: 1, bytes };

                tokio::task::yield_now().await;
            }
            tracing::trace!(%source, bucket, "bucket received");
        }
        Ok(summary)
    }
}

fn wire_len(key: &Bytes, value: &Bytes) -> u64 {
    (key.len() + value.len()) as u64
}

impl BulkTransport for MemTransport {
    fn pull(
        &self,
        source: PeerAddr,
        buckets: Vec<BucketId>,
        progress: Arc<ConnectionRecord>,
    ) -> BoxFut<'_, ResyncResult<PullSummary>> {
        Box::pin(async move {
            let (store, fault) = self.network.connect(&source)?;
            match fault {
                Some(PeerFault::Refuse) => {
                    return Err(ResyncError::other(format!(
                        "connection refused by {source}"
                    )));
                }
                Some(PeerFault::Hang) => return std::future::pending().await,
                _ => (),
            }
            self.stream(&source, &store, fault, buckets, &progress).await
        })
    }
}
