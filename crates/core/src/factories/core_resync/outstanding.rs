//! Outstanding work: the owned buckets this node still has to pull.

use super::blacklist::Blacklist;
use resync_api::{BucketId, PeerAddr, View};
use std::collections::{BTreeMap, BTreeSet};

/// The buckets this node owns but does not hold, each with the peers that
/// could supply it, most preferred first.
///
/// A bucket with no candidates left stays in the map: it is unsatisfiable,
/// and dropping it would hide a data-availability gap.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OutstandingWork(BTreeMap<BucketId, Vec<PeerAddr>>);

impl OutstandingWork {
    /// Nothing to resync?
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of outstanding buckets.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Candidate sources of `bucket`, if it is outstanding.
    pub fn candidates(&self, bucket: BucketId) -> Option<&[PeerAddr]> {
        self.0.get(&bucket).map(Vec::as_slice)
    }

    /// Iterate outstanding buckets in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (BucketId, &[PeerAddr])> {
        self.0.iter().map(|(b, c)| (*b, c.as_slice()))
    }

    /// The outstanding buckets.
    pub fn buckets(&self) -> BTreeSet<BucketId> {
        self.0.keys().copied().collect()
    }

    /// The outstanding buckets that no peer can supply.
    pub fn unsatisfiable(&self) -> BTreeSet<BucketId> {
        self.0
            .iter()
            .filter(|(_, c)| c.is_empty())
            .map(|(b, _)| *b)
            .collect()
    }
}

impl FromIterator<(BucketId, Vec<PeerAddr>)> for OutstandingWork {
    fn from_iter<T: IntoIterator<Item = (BucketId, Vec<PeerAddr>)>>(
        iter: T,
    ) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Diff `view` against the buckets this node holds.
///
/// Every bucket whose owners include `self_addr` and which is not in
/// `held` is outstanding. Its candidates are the bucket's owners followed
/// by its former owners, in view order, without duplicates, without
/// `self_addr` and without blacklisted peers.
///
/// Only reads its inputs, so the same inputs always give the same result.
pub fn compute(
    view: &View,
    self_addr: &PeerAddr,
    held: &BTreeSet<BucketId>,
    blacklist: &Blacklist,
) -> OutstandingWork {
    view.iter()
        .filter(|(bucket, owners)| {
            owners.owners.contains(self_addr) && !held.contains(bucket)
        })
        .map(|(bucket, owners)| {
            let mut candidates: Vec<PeerAddr> = Vec::new();
            for peer in owners.owners.iter().chain(&owners.former) {
                if peer != self_addr
                    && !blacklist.contains(peer)
                    && !candidates.contains(peer)
                {
                    candidates.push(peer.clone());
                }
            }
            (bucket, candidates)
        })
        .collect()
}
