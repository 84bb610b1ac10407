//! The pass-scoped set of peers that failed a transfer.

use resync_api::PeerAddr;
use std::collections::BTreeSet;

/// Peers excluded as transfer sources for the rest of one pass.
///
/// Owned by the pass; transfer units only report outcomes and the
/// coordinator folds failures in here. Dropped when the pass ends, so a
/// peer that failed once is tried again on the next pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Blacklist(BTreeSet<PeerAddr>);

impl Blacklist {
    /// Exclude `peer`. Returns false if it was already excluded.
    pub fn insert(&mut self, peer: PeerAddr) -> bool {
        self.0.insert(peer)
    }

    /// Is `peer` excluded?
    pub fn contains(&self, peer: &PeerAddr) -> bool {
        self.0.contains(peer)
    }

    /// Number of excluded peers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Is nobody excluded?
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume into the set of excluded peers.
    pub fn into_inner(self) -> BTreeSet<PeerAddr> {
        self.0
    }
}
