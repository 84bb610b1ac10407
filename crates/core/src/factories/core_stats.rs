//! The production resync statistics module.
//!
//! Keeps the pass-level counters and a handle to every connection record
//! of the current pass. Key and byte totals are merged from the connection
//! records when read. A reporter task samples the byte total once per
//! reporting period to derive the bandwidth and logs a summary while a
//! resync is moving data.

use crate::common::DropAbortHandle;
use resync_api::{config::ModConfig, *};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// The name of this module in the resync [Config](resync_api::config::Config).
pub const MOD_NAME: &str = "coreStats";

/// CoreStats configuration types.
mod config {
    /// Configuration parameters for [CoreStatsFactory](super::CoreStatsFactory).
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct CoreStatsConfig {
        /// The period over which bandwidth is measured and a summary
        /// logged.
        ///
        /// Default: 10s.
        pub report_interval_ms: u32,
    }

    impl Default for CoreStatsConfig {
        fn default() -> Self {
            Self {
                report_interval_ms: 10_000,
            }
        }
    }

    impl CoreStatsConfig {
        /// Get the report interval as a [std::time::Duration].
        pub fn report_interval(&self) -> std::time::Duration {
            std::time::Duration::from_millis(self.report_interval_ms as u64)
        }
    }
}

pub use config::*;

impl ModConfig for CoreStatsConfig {}

/// A factory for the production statistics module.
#[derive(Debug)]
pub struct CoreStatsFactory {}

impl CoreStatsFactory {
    /// Construct a new CoreStatsFactory.
    pub fn create() -> DynStatsFactory {
        let out: DynStatsFactory = Arc::new(Self {});
        out
    }
}

impl StatsFactory for CoreStatsFactory {
    fn default_config(
        &self,
        config: &mut resync_api::config::Config,
    ) -> ResyncResult<()> {
        config.add_default_module_config::<CoreStatsConfig>(MOD_NAME)
    }

    fn validate_config(
        &self,
        config: &resync_api::config::Config,
    ) -> ResyncResult<()> {
        let config: CoreStatsConfig = config.get_module_config(MOD_NAME)?;
        if config.report_interval_ms == 0 {
            return Err(ResyncError::other(
                "reportIntervalMs must be greater than 0",
            ));
        }
        Ok(())
    }

    fn create(
        &self,
        builder: Arc<builder::Builder>,
    ) -> BoxFut<'static, ResyncResult<DynResyncStats>> {
        Box::pin(async move {
            let config: CoreStatsConfig =
                builder.config.get_module_config(MOD_NAME)?;
            let out: DynResyncStats =
                Arc::new(CoreStats::with_reporter(config));
            Ok(out)
        })
    }
}

#[derive(Debug, Default)]
struct State {
    total_buckets: AtomicU32,
    resynced_buckets: AtomicU32,
    bandwidth: AtomicU64,
    sampled_bytes: AtomicU64,
    connections: Mutex<Vec<Arc<ConnectionRecord>>>,
}

impl State {
    fn keys_and_bytes(&self) -> (u64, u64) {
        self.connections
            .lock()
            .unwrap()
            .iter()
            .fold((0, 0), |(k, b), c| (k + c.keys(), b + c.bytes()))
    }

    /// Derive the bandwidth from the bytes received since the last sample.
    fn sample(&self, period: Duration) -> u64 {
        let (_, bytes) = self.keys_and_bytes();
        let previous = self.sampled_bytes.swap(bytes, Ordering::Relaxed);
        let moved = bytes.saturating_sub(previous);

        let bandwidth = match period.as_millis() as u64 {
            0 => 0,
            ms => moved.saturating_mul(1000) / ms,
        };
        self.bandwidth.store(bandwidth, Ordering::Relaxed);
        bandwidth
    }
}

/// The production [ResyncStats] implementation.
#[derive(Debug)]
pub struct CoreStats {
    state: Arc<State>,
    _report_task: Option<DropAbortHandle>,
}

impl Default for CoreStats {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreStats {
    /// Statistics without a reporter task. The bandwidth stays 0.
    pub fn new() -> Self {
        Self {
            state: Arc::new(State::default()),
            _report_task: None,
        }
    }

    /// Statistics with a reporter task sampling every
    /// [CoreStatsConfig::report_interval].
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_reporter(config: CoreStatsConfig) -> Self {
        let state = Arc::new(State::default());
        let task = spawn_report_task(
            config.report_interval(),
            Arc::downgrade(&state),
        );
        Self {
            state,
            _report_task: Some(task),
        }
    }
}

impl ResyncStats for CoreStats {
    fn reset(&self, total_buckets: u32) {
        let mut connections = self.state.connections.lock().unwrap();
        connections.clear();
        self.state
            .total_buckets
            .store(total_buckets, Ordering::Relaxed);
        self.state.resynced_buckets.store(0, Ordering::Relaxed);
        self.state.bandwidth.store(0, Ordering::Relaxed);
        self.state.sampled_bytes.store(0, Ordering::Relaxed);
    }

    fn add_connection(
        &self,
        peer: PeerAddr,
        buckets: &[BucketId],
    ) -> Arc<ConnectionRecord> {
        let record = Arc::new(ConnectionRecord::new(peer, buckets));
        self.state
            .connections
            .lock()
            .unwrap()
            .push(record.clone());
        record
    }

    fn buckets_resynced(&self, count: u32) {
        self.state
            .resynced_buckets
            .fetch_add(count, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StatsSnapshot {
        let connections: Vec<ConnectionSnapshot> = self
            .state
            .connections
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.snapshot())
            .collect();

        StatsSnapshot {
            total_buckets: self.state.total_buckets.load(Ordering::Relaxed),
            resynced_bucket_count: self
                .state
                .resynced_buckets
                .load(Ordering::Relaxed),
            resynced_keys_count: connections.iter().map(|c| c.keys).sum(),
            resynced_bytes_count: connections.iter().map(|c| c.bytes).sum(),
            bandwidth: self.state.bandwidth.load(Ordering::Relaxed),
            connections,
        }
    }

    fn pass_finished(&self, report: &PassReport) {
        if report.iterations == 0 {
            return;
        }
        let snapshot = self.snapshot();
        tracing::info!(
            total_buckets = snapshot.total_buckets,
            resynced_buckets = snapshot.resynced_bucket_count,
            keys = snapshot.resynced_keys_count,
            bytes = snapshot.resynced_bytes_count,
            connections = snapshot.connections.len(),
            "resync statistics"
        );
    }
}

fn spawn_report_task(
    period: Duration,
    state: Weak<State>,
) -> DropAbortHandle {
    let handle = tokio::task::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(
            tokio::time::MissedTickBehavior::Delay,
        );
        // The first tick completes at once.
        interval.tick().await;

        loop {
            interval.tick().await;

            let Some(state) = state.upgrade() else {
                break;
            };
            let before = state.sampled_bytes.load(Ordering::Relaxed);
            let bandwidth = state.sample(period);
            let (keys, bytes) = state.keys_and_bytes();

            if bytes > before {
                tracing::info!(
                    total_buckets =
                        state.total_buckets.load(Ordering::Relaxed),
                    resynced_buckets =
                        state.resynced_buckets.load(Ordering::Relaxed),
                    keys,
                    bytes,
                    bandwidth,
                    "resync progress"
                );
            }
        }
    })
    .abort_handle();

    DropAbortHandle {
        name: "resync stats reporter",
        handle,
    }
}
