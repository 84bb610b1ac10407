//! Resync is the module that brings the buckets a node holds in line with
//! the buckets the cluster view says it owns.
//!
//! It consists of multiple parts:
//! - The outstanding work calculator that diffs the view against the local
//!   store
//! - The tap planner that picks one source peer per outstanding bucket
//! - The transfer executor that pulls every planned bucket concurrently
//! - The coordinator that drives a pass through its state machine
//! - A trigger task that starts passes
//!
//! ### Passes
//!
//! A pass moves through `Idle -> Planning -> Executing -> Reconciling` and
//! then back to `Planning` while work remains that some peer can supply, or
//! ends `Satisfied` or `Blocked`.
//!
//! - Planning fetches the view, releases held buckets the node no longer
//!   owns and is not listed as a former owner of, computes the outstanding
//!   work and plans it. No outstanding work
//!   ends the pass `Satisfied` without touching the transport. Outstanding
//!   work that no peer can supply ends it `Blocked`.
//! - Executing runs every transfer of the plan and waits for all of them.
//! - Reconciling marks the buckets of successful transfers synced and
//!   blacklists the source of every failed transfer for the rest of the
//!   pass, then recomputes the outstanding work.
//!
//! `Satisfied` clears the alarm; `Blocked` raises it and reports the
//! buckets left unresolved. A pass whose view cannot be fetched, or whose
//! plan does not hold up against its outstanding work, is aborted and also
//! raises the alarm.
//!
//! ### Triggers
//!
//! Only one pass runs at a time. A trigger that arrives while a pass is in
//! flight is coalesced into it: the pass runs once more before the node
//! goes back to `Idle`.

use resync_api::{config::ModConfig, *};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::error::TrySendError;

pub mod blacklist;
pub mod executor;
pub mod outstanding;
pub mod plan;
mod trigger;

use blacklist::Blacklist;
use executor::ExecuteLimits;

/// The name of this module in the resync [Config](resync_api::config::Config).
pub const MOD_NAME: &str = "coreResync";

/// CoreResync configuration types.
pub mod config {
    use std::time::Duration;

    /// Configuration parameters for [CoreResyncFactory](super::CoreResyncFactory).
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct CoreResyncConfig {
        /// How many transfers of one plan may run at once. Default: 16.
        pub max_parallel_transfers: u32,
        /// Time after which a transfer counts as failed. Default: 5 min.
        pub transfer_timeout_ms: u32,
        /// Fallback interval between passes when nothing triggers one.
        /// Default: 60 s.
        pub resync_interval_s: u32,
        /// First retry delay after an aborted pass. Retries back off
        /// exponentially up to the fallback interval. Default: 1 s.
        pub first_retry_interval_ms: u32,
    }

    impl Default for CoreResyncConfig {
        fn default() -> Self {
            Self {
                max_parallel_transfers: 16,
                transfer_timeout_ms: 1000 * 60 * 5,
                resync_interval_s: 60,
                first_retry_interval_ms: 1000,
            }
        }
    }

    impl CoreResyncConfig {
        /// [Self::transfer_timeout_ms] as a [Duration].
        pub fn transfer_timeout(&self) -> Duration {
            Duration::from_millis(self.transfer_timeout_ms as u64)
        }

        /// [Self::resync_interval_s] as a [Duration].
        pub fn resync_interval(&self) -> Duration {
            Duration::from_secs(self.resync_interval_s as u64)
        }

        /// [Self::first_retry_interval_ms] as a [Duration].
        pub fn first_retry_interval(&self) -> Duration {
            Duration::from_millis(self.first_retry_interval_ms as u64)
        }
    }
}

use config::*;

impl ModConfig for CoreResyncConfig {}

/// The production resync module.
#[derive(Debug)]
pub struct CoreResyncFactory {}

impl CoreResyncFactory {
    /// Construct a new CoreResyncFactory.
    pub fn create() -> DynResyncFactory {
        Arc::new(Self {})
    }
}

impl ResyncFactory for CoreResyncFactory {
    fn default_config(
        &self,
        config: &mut resync_api::config::Config,
    ) -> ResyncResult<()> {
        config.add_default_module_config::<CoreResyncConfig>(MOD_NAME)
    }

    fn validate_config(
        &self,
        config: &resync_api::config::Config,
    ) -> ResyncResult<()> {
        let config: CoreResyncConfig = config.get_module_config(MOD_NAME)?;

        if config.max_parallel_transfers == 0 {
            return Err(ResyncError::other(
                "maxParallelTransfers must be at least 1",
            ));
        }
        if config.transfer_timeout_ms == 0 {
            return Err(ResyncError::other(
                "transferTimeoutMs must be greater than 0",
            ));
        }
        if config.resync_interval_s == 0 {
            return Err(ResyncError::other(
                "resyncIntervalS must be greater than 0",
            ));
        }
        if config.first_retry_interval() > config.resync_interval() {
            return Err(ResyncError::other(
                "firstRetryIntervalMs must not exceed resyncIntervalS",
            ));
        }

        Ok(())
    }

    fn create(
        &self,
        builder: Arc<builder::Builder>,
        view_provider: DynViewProvider,
        local_store: DynLocalStore,
        transport: DynBulkTransport,
        alarm: DynAlarm,
        stats: DynResyncStats,
    ) -> BoxFut<'static, ResyncResult<DynResync>> {
        Box::pin(async move {
            let config: CoreResyncConfig =
                builder.config.get_module_config(MOD_NAME)?;
            let out: DynResync = Arc::new(CoreResync::new(
                config,
                view_provider,
                local_store,
                transport,
                alarm,
                stats,
            ));
            Ok(out)
        })
    }
}

#[derive(Debug)]
struct CoreResync {
    inner: Arc<Inner>,
    notify_tx: tokio::sync::mpsc::Sender<()>,
    _trigger_task: crate::common::DropAbortHandle,
}

impl CoreResync {
    fn new(
        config: CoreResyncConfig,
        view_provider: DynViewProvider,
        local_store: DynLocalStore,
        transport: DynBulkTransport,
        alarm: DynAlarm,
        stats: DynResyncStats,
    ) -> Self {
        let inner = Arc::new(Inner::new(
            config.clone(),
            view_provider,
            local_store,
            transport,
            alarm,
            stats,
        ));

        let (notify_tx, notify_rx) = tokio::sync::mpsc::channel(1);
        let trigger_task = trigger::spawn_trigger_task(
            &config,
            Arc::downgrade(&inner),
            notify_rx,
        );

        Self {
            inner,
            notify_tx,
            _trigger_task: trigger_task,
        }
    }
}

impl Resync for CoreResync {
    fn notify_resync(&self) {
        match self.notify_tx.try_send(()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::debug!("Resync already pending");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::error!("Resync trigger task is not running");
            }
        }
    }

    fn trigger_resync(&self) -> BoxFut<'_, PassReport> {
        Box::pin(self.inner.run_coalesced())
    }

    fn state(&self) -> ResyncState {
        self.inner.state()
    }

    fn last_report(&self) -> Option<PassReport> {
        self.inner.last_report.lock().unwrap().clone()
    }
}

#[derive(Debug)]
pub(crate) struct Inner {
    config: CoreResyncConfig,
    view_provider: DynViewProvider,
    local_store: DynLocalStore,
    transport: DynBulkTransport,
    alarm: DynAlarm,
    stats: DynResyncStats,
    state: Mutex<ResyncState>,
    last_report: Mutex<Option<PassReport>>,
    pass_lock: tokio::sync::Mutex<()>,
    rerun: AtomicBool,
}

impl Inner {
    fn new(
        config: CoreResyncConfig,
        view_provider: DynViewProvider,
        local_store: DynLocalStore,
        transport: DynBulkTransport,
        alarm: DynAlarm,
        stats: DynResyncStats,
    ) -> Self {
        Self {
            config,
            view_provider,
            local_store,
            transport,
            alarm,
            stats,
            state: Mutex::new(ResyncState::Idle),
            last_report: Mutex::new(None),
            pass_lock: tokio::sync::Mutex::new(()),
            rerun: AtomicBool::new(false),
        }
    }

    fn state(&self) -> ResyncState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: ResyncState) {
        let mut lock = self.state.lock().unwrap();
        if *lock != state {
            tracing::debug!(from = ?*lock, to = ?state, "resync state");
            *lock = state;
        }
    }

    /// Run a pass unless one is in flight, in which case the in-flight pass
    /// is asked to run again and this returns [PassOutcome::Coalesced].
    ///
    /// Returns the report of the last pass run here.
    pub(crate) async fn run_coalesced(&self) -> PassReport {
        self.rerun.store(true, Ordering::SeqCst);

        let mut last = None;
        loop {
            let Ok(guard) = self.pass_lock.try_lock() else {
                break;
            };
            if !self.rerun.swap(false, Ordering::SeqCst) {
                drop(guard);
                // A request that set `rerun` after the swap may have lost
                // the race for the lock. It is only safe to leave once the
                // lock is released and the flag is still clear.
                if self.rerun.load(Ordering::SeqCst) {
                    continue;
                }
                break;
            }
            if last.is_some() {
                tracing::debug!("Resync requested during pass, running again");
            }

            let report = self.run_pass().await;
            *self.last_report.lock().unwrap() = Some(report.clone());
            self.set_state(ResyncState::Idle);
            last = Some(report);
        }

        last.unwrap_or_else(|| {
            tracing::debug!("Resync pass in flight, request coalesced");
            PassReport::new(PassOutcome::Coalesced)
        })
    }

    async fn run_pass(&self) -> PassReport {
        let mut report = PassReport::new(PassOutcome::Satisfied);
        let mut blacklist = Blacklist::default();

        let result = self.drive_pass(&mut report, &mut blacklist).await;
        report.outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => PassOutcome::Aborted(err),
        };
        report.blacklist = blacklist.into_inner();

        match &report.outcome {
            PassOutcome::Satisfied => {
                self.set_state(ResyncState::Satisfied);
                self.alarm.clear();
                if report.iterations > 0 {
                    tracing::info!(
                        generation = ?report.generation,
                        buckets = report.resolved.len(),
                        keys = report.keys,
                        bytes = report.bytes,
                        "completed resync"
                    );
                }
            }
            PassOutcome::Blocked => {
                self.set_state(ResyncState::Blocked);
                self.alarm.raise();
                tracing::error!(
                    generation = ?report.generation,
                    unresolved = ?report.unresolved,
                    blacklist = ?report.blacklist,
                    "resync failed: no peer left to pull buckets from"
                );
            }
            PassOutcome::Aborted(err) => {
                self.alarm.raise();
                tracing::error!(?err, "resync failed");
            }
            PassOutcome::Coalesced => (),
        }

        self.stats.pass_finished(&report);
        report
    }

    async fn drive_pass(
        &self,
        report: &mut PassReport,
        blacklist: &mut Blacklist,
    ) -> ResyncResult<PassOutcome> {
        self.set_state(ResyncState::Planning);

        let view = self
            .view_provider
            .current_view()
            .await
            .map_err(ResyncError::view_unavailable)?;
        let self_addr = self.view_provider.self_address();
        report.generation = Some(view.generation());

        let owned = view.buckets_owned_by(&self_addr);
        for bucket in self.local_store.held_buckets() {
            if owned.contains(&bucket) {
                continue;
            }
            // New owners pull from the former owners until the resize
            // settles.
            let handing_off = view
                .owners(bucket)
                .is_some_and(|owners| owners.former.contains(&self_addr));
            if !handing_off {
                tracing::debug!(bucket, "releasing bucket no longer owned");
                self.local_store.release_bucket(bucket);
            }
        }
        self.stats.reset(owned.len() as u32);

        let mut held = self.local_store.held_buckets();
        let mut owl = outstanding::compute(&view, &self_addr, &held, blacklist);
        if owl.is_empty() {
            tracing::trace!(
                generation = view.generation(),
                "nothing to resync"
            );
            return Ok(PassOutcome::Satisfied);
        }

        tracing::info!(
            generation = view.generation(),
            owned = owned.len(),
            outstanding = owl.len(),
            "starting resync"
        );

        // Every cycle but the last blacklists at least one peer.
        let max_iterations = view.peers().len() as u32 + 1;

        loop {
            let plan = plan::plan(&owl);
            plan.validate(&owl)?;
            if plan.is_empty() {
                report.unresolved = owl.buckets();
                return Ok(PassOutcome::Blocked);
            }

            report.iterations += 1;
            if report.iterations > max_iterations {
                return Err(ResyncError::invariant(format!(
                    "pass did not converge within {max_iterations} cycles"
                )));
            }

            self.set_state(ResyncState::Executing);
            let outcomes = executor::execute(
                plan,
                self.transport.clone(),
                self.stats.clone(),
                self.limits(),
            )
            .await;

            self.set_state(ResyncState::Reconciling);
            for outcome in outcomes {
                match outcome.result {
                    Ok(summary) => {
                        for bucket in &outcome.buckets {
                            self.local_store.mark_bucket_synced(*bucket);
                            held.insert(*bucket);
                            report.resolved.insert(*bucket);
                        }
                        self.stats
                            .buckets_resynced(outcome.buckets.len() as u32);
                        outcome
                            .progress
                            .set_status(ConnectionStatus::Succeeded);
                        report.keys += summary.keys;
                        report.bytes += summary.bytes;

                        tracing::debug!(
                            source = %outcome.source,
                            buckets = ?outcome.buckets,
                            keys = summary.keys,
                            bytes = summary.bytes,
                            "transfer complete"
                        );
                    }
                    Err(err) => {
                        outcome.progress.set_status(ConnectionStatus::Failed);
                        tracing::warn!(
                            source = %outcome.source,
                            buckets = ?outcome.buckets,
                            ?err,
                            "transfer failed, blacklisting peer for this pass"
                        );
                        blacklist.insert(outcome.source);
                    }
                }
            }

            owl = outstanding::compute(&view, &self_addr, &held, blacklist);
            if owl.is_empty() {
                return Ok(PassOutcome::Satisfied);
            }
            self.set_state(ResyncState::Planning);
        }
    }

    fn limits(&self) -> ExecuteLimits {
        ExecuteLimits {
            max_parallel: self.config.max_parallel_transfers as usize,
            timeout: self.config.transfer_timeout(),
        }
    }
}

#[cfg(test)]
mod test;
