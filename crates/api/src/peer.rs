//! Peer address type.

use crate::*;
use std::sync::Arc;

/// The address of a cluster peer, typically `host:port`.
///
/// Addresses are compared as plain strings; the view provider is expected
/// to spell the same peer the same way everywhere, including this node's
/// own address.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerAddr(Arc<str>);

impl PeerAddr {
    /// Construct a validated peer address.
    pub fn new(src: &str) -> ResyncResult<Self> {
        if src.is_empty() {
            return Err(ResyncError::other("Peer address is empty"));
        }

        if src.chars().any(char::is_whitespace) {
            return Err(ResyncError::other(format!(
                "Peer address contains whitespace: {src:?}"
            )));
        }

        Ok(Self(src.into()))
    }

    /// Construct a validated peer address. Unlike the trait version this
    /// is callable without importing [std::str::FromStr].
    #[allow(clippy::should_implement_trait)]
    pub fn from_str<S: AsRef<str>>(src: S) -> ResyncResult<Self> {
        Self::new(src.as_ref())
    }

    /// Get this address as a &str.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for PeerAddr {
    type Err = ResyncError;

    fn from_str(src: &str) -> Result<Self, Self::Err> {
        Self::new(src)
    }
}

impl AsRef<str> for PeerAddr {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Debug for PeerAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl serde::Serialize for PeerAddr {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for PeerAddr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s: String = serde::Deserialize::deserialize(deserializer)?;
        PeerAddr::new(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn happy_parse() {
        let addr = PeerAddr::from_str("10.0.0.1:11211").unwrap();
        assert_eq!("10.0.0.1:11211", addr.as_str());
        assert_eq!("10.0.0.1:11211", format!("{addr:?}"));
    }

    #[test]
    fn rejects_bad_addresses() {
        PeerAddr::from_str("").unwrap_err();
        PeerAddr::from_str("10.0.0.1 :11211").unwrap_err();
        PeerAddr::from_str("host\t").unwrap_err();
    }

    #[test]
    fn serde_as_string() {
        let addr = PeerAddr::from_str("a:1").unwrap();
        let enc = serde_json::to_string(&addr).unwrap();
        assert_eq!("\"a:1\"", enc);
        assert_eq!(addr, serde_json::from_str::<PeerAddr>(&enc).unwrap());
        serde_json::from_str::<PeerAddr>("\"\"").unwrap_err();
    }
}
