//! The tap planner.

use super::outstanding::OutstandingWork;
use resync_api::{BucketId, PeerAddr, ResyncError, ResyncResult};
use std::collections::{BTreeMap, BTreeSet};

/// The transfers of one plan step: for each source peer, the buckets to
/// pull from it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TapPlan(BTreeMap<PeerAddr, Vec<BucketId>>);

impl TapPlan {
    /// No transfers?
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of transfers, one per distinct source peer.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The buckets to pull from `peer`.
    pub fn buckets_for(&self, peer: &PeerAddr) -> Option<&[BucketId]> {
        self.0.get(peer).map(Vec::as_slice)
    }

    /// Iterate transfers in peer order.
    pub fn iter(&self) -> impl Iterator<Item = (&PeerAddr, &[BucketId])> {
        self.0.iter().map(|(p, b)| (p, b.as_slice()))
    }

    /// Every bucket in the plan.
    pub fn planned_buckets(&self) -> BTreeSet<BucketId> {
        self.0.values().flatten().copied().collect()
    }

    /// Check this plan against the outstanding work it was made from.
    ///
    /// - every bucket appears in at most one transfer, once
    /// - every planned bucket is outstanding
    /// - every source peer is a candidate of each bucket it is given
    /// - every outstanding bucket with a candidate is planned
    pub fn validate(&self, owl: &OutstandingWork) -> ResyncResult<()> {
        let mut seen = BTreeSet::new();
        for (peer, buckets) in self.iter() {
            if buckets.is_empty() {
                return Err(ResyncError::invariant(format!(
                    "plan has an empty transfer from {peer}"
                )));
            }
            for bucket in buckets {
                if !seen.insert(*bucket) {
                    return Err(ResyncError::invariant(format!(
                        "bucket {bucket} is planned more than once"
                    )));
                }
                let candidates = owl.candidates(*bucket).ok_or_else(|| {
                    ResyncError::invariant(format!(
                        "bucket {bucket} is planned but not outstanding"
                    ))
                })?;
                if !candidates.contains(peer) {
                    return Err(ResyncError::invariant(format!(
                        "bucket {bucket} is planned from {peer}, which is not one of its candidates"
                    )));
                }
            }
        }

        if let Some((bucket, _)) = owl
            .iter()
            .find(|(b, c)| !c.is_empty() && !seen.contains(b))
        {
            return Err(ResyncError::invariant(format!(
                "bucket {bucket} has candidates but is not planned"
            )));
        }

        Ok(())
    }
}

impl IntoIterator for TapPlan {
    type Item = (PeerAddr, Vec<BucketId>);
    type IntoIter =
        std::collections::btree_map::IntoIter<PeerAddr, Vec<BucketId>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Assign every outstanding bucket to its most preferred candidate and
/// group the assignments by peer, so each source peer is tapped once.
///
/// Buckets are visited in ascending order, so each peer's bucket list is
/// sorted and the plan is the same for the same outstanding work. Buckets
/// with no candidate are left out; they are the coordinator's to report.
pub fn plan(owl: &OutstandingWork) -> TapPlan {
    let mut out: BTreeMap<PeerAddr, Vec<BucketId>> = BTreeMap::new();
    for (bucket, candidates) in owl.iter() {
        if let Some(peer) = candidates.first() {
            out.entry(peer.clone()).or_default().push(bucket);
        }
    }
    TapPlan(out)
}
