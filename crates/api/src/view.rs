//! Cluster view types.

use crate::*;
use std::collections::BTreeSet;
use std::sync::Arc;

/// The peers responsible for one bucket.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct BucketOwners {
    /// The peers that should own this bucket, most preferred first.
    pub owners: Vec<PeerAddr>,

    /// The peers that owned this bucket in the previous view and may still
    /// hold its data while a resize is in progress. Empty once the cluster
    /// has settled.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub former: Vec<PeerAddr>,
}

impl BucketOwners {
    /// Owners with no former owners.
    pub fn new(owners: Vec<PeerAddr>) -> Self {
        Self {
            owners,
            former: Vec::new(),
        }
    }

    /// Set the former owners.
    pub fn with_former(mut self, former: Vec<PeerAddr>) -> Self {
        self.former = former;
        self
    }
}

/// An immutable snapshot of the desired bucket ownership of the cluster.
///
/// There is exactly one [BucketOwners] entry per bucket, so the bucket
/// count of the cluster is the length of the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    generation: u64,
    buckets: Arc<[BucketOwners]>,
}

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ViewRepr<B> {
    generation: u64,
    buckets: B,
}

impl serde::Serialize for View {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        ViewRepr {
            generation: self.generation,
            buckets: &self.buckets[..],
        }
        .serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for View {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let repr: ViewRepr<Vec<BucketOwners>> =
            serde::Deserialize::deserialize(deserializer)?;
        View::new(repr.generation, repr.buckets)
            .map_err(serde::de::Error::custom)
    }
}

impl View {
    /// Construct a view. The bucket count (the length of `buckets`) must
    /// be a nonzero power of two no larger than 2^16.
    pub fn new(
        generation: u64,
        buckets: Vec<BucketOwners>,
    ) -> ResyncResult<Self> {
        let count = buckets.len();
        if count == 0 || !count.is_power_of_two() || count > 1 << 16 {
            return Err(ResyncError::other(format!(
                "View bucket count must be a power of two in 1..=65536, got {count}"
            )));
        }

        Ok(Self {
            generation,
            buckets: buckets.into(),
        })
    }

    /// A view of `bucket_count` buckets none of which has an owner.
    pub fn unowned(generation: u64, bucket_count: u16) -> ResyncResult<Self> {
        Self::new(
            generation,
            vec![BucketOwners::default(); bucket_count as usize],
        )
    }

    /// The generation of this view, as assigned by the view provider.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The number of buckets in this view.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// The owners of `bucket`, if it is within this view.
    pub fn owners(&self, bucket: BucketId) -> Option<&BucketOwners> {
        self.buckets.get(bucket as usize)
    }

    /// Iterate over every bucket in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (BucketId, &BucketOwners)> {
        self.buckets
            .iter()
            .enumerate()
            .map(|(idx, owners)| (idx as BucketId, owners))
    }

    /// The buckets `peer` should own in this view.
    pub fn buckets_owned_by(&self, peer: &PeerAddr) -> BTreeSet<BucketId> {
        self.iter()
            .filter(|(_, owners)| owners.owners.contains(peer))
            .map(|(bucket, _)| bucket)
            .collect()
    }

    /// Every distinct peer named anywhere in this view.
    pub fn peers(&self) -> BTreeSet<PeerAddr> {
        self.buckets
            .iter()
            .flat_map(|owners| owners.owners.iter().chain(&owners.former))
            .cloned()
            .collect()
    }

    /// Return a copy of this view with `bucket` owned by `owners`.
    ///
    /// Out of range buckets are an error.
    pub fn with_bucket(
        &self,
        bucket: BucketId,
        owners: BucketOwners,
    ) -> ResyncResult<Self> {
        let mut buckets = self.buckets.to_vec();
        let slot = buckets.get_mut(bucket as usize).ok_or_else(|| {
            ResyncError::other(format!(
                "Bucket {bucket} is outside a view of {} buckets",
                self.buckets.len()
            ))
        })?;
        *slot = owners;
        Ok(Self {
            generation: self.generation,
            buckets: buckets.into(),
        })
    }
}

/// Supplies the current cluster view and this node's identity.
pub trait ViewProvider: 'static + Send + Sync + std::fmt::Debug {
    /// Fetch the current target view. Called at the start of every resync
    /// pass. An error aborts that pass.
    fn current_view(&self) -> BoxFut<'_, ResyncResult<View>>;

    /// The address identifying this node in views.
    fn self_address(&self) -> PeerAddr;
}

/// Trait-object [ViewProvider].
pub type DynViewProvider = Arc<dyn ViewProvider>;

#[cfg(test)]
mod test {
    use super::*;

    fn p(s: &str) -> PeerAddr {
        PeerAddr::from_str(s).unwrap()
    }

    #[test]
    fn bucket_count_must_be_power_of_two() {
        View::new(1, vec![]).unwrap_err();
        View::new(1, vec![BucketOwners::default(); 3]).unwrap_err();
        View::new(1, vec![BucketOwners::default(); 4]).unwrap();
        View::unowned(1, 1024).unwrap();
    }

    #[test]
    fn owned_buckets_and_peers() {
        let view = View::unowned(7, 8)
            .unwrap()
            .with_bucket(1, BucketOwners::new(vec![p("a:1"), p("b:1")]))
            .unwrap()
            .with_bucket(
                5,
                BucketOwners::new(vec![p("b:1")]).with_former(vec![p("c:1")]),
            )
            .unwrap();

        assert_eq!(7, view.generation());
        assert_eq!(8, view.bucket_count());
        assert_eq!(
            BTreeSet::from([1, 5]),
            view.buckets_owned_by(&p("b:1"))
        );
        assert_eq!(BTreeSet::from([1]), view.buckets_owned_by(&p("a:1")));
        assert!(view.buckets_owned_by(&p("c:1")).is_empty());
        assert_eq!(
            BTreeSet::from([p("a:1"), p("b:1"), p("c:1")]),
            view.peers()
        );
        view.with_bucket(8, BucketOwners::default()).unwrap_err();
    }

    #[test]
    fn view_json() {
        let view = View::unowned(2, 2)
            .unwrap()
            .with_bucket(0, BucketOwners::new(vec![p("a:1")]))
            .unwrap();

        let enc = serde_json::to_string(&view).unwrap();
        assert_eq!(
            r#"{"generation":2,"buckets":[{"owners":["a:1"]},{"owners":[]}]}"#,
            enc
        );
        assert_eq!(view, serde_json::from_str::<View>(&enc).unwrap());

        serde_json::from_str::<View>(
            r#"{"generation":2,"buckets":[{"owners":[]},{"owners":[]},{"owners":[]}]}"#,
        )
        .unwrap_err();
    }
}
