//! Test utilities associated with peers.

use resync_api::PeerAddr;

/// A peer address from a short test name, e.g. `peer("a")` is `a:11211`.
pub fn peer(name: &str) -> PeerAddr {
    PeerAddr::from_str(format!("{name}:11211"))
        .expect("test peer names must not contain whitespace")
}

/// Peer addresses from short test names, in order.
pub fn peers(names: &[&str]) -> Vec<PeerAddr> {
    names.iter().map(|n| peer(n)).collect()
}
