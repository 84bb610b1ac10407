//! Resync module types.

use crate::*;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Where the resync coordinator is in its pass state machine.
///
/// `Idle -> Planning -> Executing -> Reconciling -> (Planning | Satisfied |
/// Blocked)`. `Satisfied` and `Blocked` are terminal for a pass, after
/// which the coordinator returns to `Idle`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum ResyncState {
    /// Waiting for a trigger.
    Idle,
    /// Fetching the view and computing the next plan.
    Planning,
    /// Waiting for the transfers of the current plan.
    Executing,
    /// Folding transfer outcomes back into the outstanding work.
    Reconciling,
    /// Every owned bucket is held.
    Satisfied,
    /// Some owned bucket has no peer left to pull it from.
    Blocked,
}

/// How a pass ended.
#[derive(Debug, Clone)]
pub enum PassOutcome {
    /// Every bucket this node owns is held locally.
    Satisfied,
    /// Some buckets could not be pulled from any peer. They are listed in
    /// [PassReport::unresolved].
    Blocked,
    /// The pass could not run to completion: the view was unavailable or an
    /// internal invariant did not hold.
    Aborted(ResyncError),
    /// Another pass was already in flight. It will run again once it
    /// finishes, so this request is folded into it.
    Coalesced,
}

/// The result of one resync pass.
#[derive(Debug, Clone)]
pub struct PassReport {
    /// How the pass ended.
    pub outcome: PassOutcome,
    /// The generation of the view the pass worked from, if one was fetched.
    pub generation: Option<u64>,
    /// Plan, execute and reconcile cycles run.
    pub iterations: u32,
    /// Buckets pulled during this pass.
    pub resolved: BTreeSet<BucketId>,
    /// Buckets this node owns but could not pull.
    pub unresolved: BTreeSet<BucketId>,
    /// Peers excluded as sources after a failed transfer.
    pub blacklist: BTreeSet<PeerAddr>,
    /// Keys moved by successful transfers.
    pub keys: u64,
    /// Bytes moved by successful transfers.
    pub bytes: u64,
}

impl PassReport {
    /// An empty report for `outcome`.
    pub fn new(outcome: PassOutcome) -> Self {
        Self {
            outcome,
            generation: None,
            iterations: 0,
            resolved: BTreeSet::new(),
            unresolved: BTreeSet::new(),
            blacklist: BTreeSet::new(),
            keys: 0,
            bytes: 0,
        }
    }

    /// Did the pass end [PassOutcome::Satisfied]?
    pub fn is_satisfied(&self) -> bool {
        matches!(self.outcome, PassOutcome::Satisfied)
    }

    /// Did the pass end [PassOutcome::Blocked]?
    pub fn is_blocked(&self) -> bool {
        matches!(self.outcome, PassOutcome::Blocked)
    }

    /// Did the pass end [PassOutcome::Aborted]?
    pub fn is_aborted(&self) -> bool {
        matches!(self.outcome, PassOutcome::Aborted(_))
    }
}

/// The resync control loop of one node.
pub trait Resync: 'static + Send + Sync + std::fmt::Debug {
    /// Ask for a resync pass soon. Never blocks; requests made while a pass
    /// is pending or running are coalesced.
    fn notify_resync(&self);

    /// Run a resync pass now and report how it ended. If a pass is already
    /// running this returns [PassOutcome::Coalesced] at once.
    fn trigger_resync(&self) -> BoxFut<'_, PassReport>;

    /// The current state of the pass state machine.
    fn state(&self) -> ResyncState;

    /// The report of the most recently completed pass.
    fn last_report(&self) -> Option<PassReport>;
}

/// Trait-object [Resync].
pub type DynResync = Arc<dyn Resync>;

/// A factory for creating [Resync] instances.
pub trait ResyncFactory: 'static + Send + Sync + std::fmt::Debug {
    /// Help the builder construct a default config from the chosen
    /// module factories.
    fn default_config(&self, config: &mut config::Config) -> ResyncResult<()>;

    /// Validate configuration.
    fn validate_config(&self, config: &config::Config) -> ResyncResult<()>;

    /// Construct a resync instance.
    fn create(
        &self,
        builder: Arc<builder::Builder>,
        view_provider: DynViewProvider,
        local_store: DynLocalStore,
        transport: DynBulkTransport,
        alarm: DynAlarm,
        stats: DynResyncStats,
    ) -> BoxFut<'static, ResyncResult<DynResync>>;
}

/// Trait-object [ResyncFactory].
pub type DynResyncFactory = Arc<dyn ResyncFactory>;
