//! Resync error types.

use crate::*;
use std::sync::Arc;

/// A clonable trait-object inner error.
#[derive(Clone, Default)]
pub struct DynInnerError(
    pub Option<Arc<dyn std::error::Error + 'static + Send + Sync>>,
);

impl std::fmt::Debug for DynInnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for DynInnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.as_ref() {
            None => f.write_str("None"),
            Some(s) => s.fmt(f),
        }
    }
}

impl std::error::Error for DynInnerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.as_ref().map(|s| {
            let out: &(dyn std::error::Error + 'static) = &**s;
            out
        })
    }
}

impl DynInnerError {
    /// Construct a new DynInnerError from a source error.
    pub fn new<E: std::error::Error + 'static + Send + Sync>(e: E) -> Self {
        Self(Some(Arc::new(e)))
    }
}

/// The resync error type, used by every module trait in this crate.
///
/// This type is required to implement `Clone` so that a failed transfer's
/// error can be kept by both the transfer outcome and the final pass report.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResyncError {
    /// Generic resync error.
    #[error("{ctx} (src: {src})")]
    Other {
        /// Any context associated with this error.
        ctx: Arc<str>,

        /// The inner error (if any).
        #[source]
        src: DynInnerError,
    },

    /// The cluster view could not be fetched, so nothing can be planned.
    #[error("view unavailable (src: {0})")]
    ViewUnavailable(#[source] Box<ResyncError>),

    /// A pass reached a state its own bookkeeping rules out.
    #[error("resync invariant violated: {0}")]
    InvariantViolation(Arc<str>),

    /// A peer was asked to stream a bucket it does not hold.
    #[error("{peer} rejected the request: bucket {bucket} not held")]
    BucketNotHeld {
        /// The peer that was asked.
        peer: PeerAddr,

        /// The first requested bucket the peer does not hold.
        bucket: BucketId,
    },
}

impl ResyncError {
    /// Construct an "other" error with an inner source error.
    pub fn other_src<
        C: std::fmt::Display,
        S: std::error::Error + 'static + Send + Sync,
    >(
        ctx: C,
        src: S,
    ) -> Self {
        Self::Other {
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::new(src),
        }
    }

    /// Construct an "other" error.
    pub fn other<C: std::fmt::Display>(ctx: C) -> Self {
        Self::Other {
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::default(),
        }
    }

    /// Wrap a view provider error.
    pub fn view_unavailable(src: ResyncError) -> Self {
        Self::ViewUnavailable(Box::new(src))
    }

    /// Construct an invariant violation.
    pub fn invariant<C: std::fmt::Display>(ctx: C) -> Self {
        Self::InvariantViolation(ctx.to_string().into_boxed_str().into())
    }
}

/// The resync result type.
pub type ResyncResult<T> = Result<T, ResyncError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(
            "peer refused (src: None)",
            ResyncError::other("peer refused").to_string().as_str(),
        );
        assert_eq!(
            "read view (src: gone)",
            ResyncError::other_src("read view", std::io::Error::other("gone"))
                .to_string()
                .as_str(),
        );
    }

    #[test]
    fn error_source_is_preserved() {
        use std::error::Error;

        let err =
            ResyncError::other_src("tap", std::io::Error::other("reset"));
        assert_eq!("reset", err.source().unwrap().to_string());
        assert!(ResyncError::other("tap").source().unwrap().source().is_none());
    }

    #[test]
    fn resync_variants() {
        use std::error::Error;

        let err =
            ResyncError::view_unavailable(ResyncError::other("file missing"));
        assert_eq!(
            "view unavailable (src: file missing (src: None))",
            err.to_string()
        );
        assert_eq!(
            "file missing (src: None)",
            err.source().unwrap().to_string()
        );

        assert_eq!(
            "resync invariant violated: bucket 3 planned twice",
            ResyncError::invariant("bucket 3 planned twice").to_string()
        );

        let err = ResyncError::BucketNotHeld {
            peer: PeerAddr::from_str("a:1").unwrap(),
            bucket: 9,
        };
        assert_eq!(
            "a:1 rejected the request: bucket 9 not held",
            err.to_string()
        );
    }

    #[test]
    fn ensure_error_type_is_send_and_sync() {
        fn ensure<T: std::fmt::Display + Send + Sync>(_t: T) {}
        ensure(ResyncError::other("bla"));
    }
}
