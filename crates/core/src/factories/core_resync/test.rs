use super::*;
use crate::factories::{CoreAlarm, CoreStats, MemLocalStore, MemViewProvider};
use resync_test_utils::peer::peer;
use resync_test_utils::view::TestView;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::AtomicUsize;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy)]
enum Script {
    /// Succeed, reporting this many keys and bytes on the first bucket.
    Ok(u64, u64),
    Fail,
    /// Wait for the gate before succeeding.
    Gated,
}

#[derive(Debug, Default)]
struct ScriptedTransport {
    scripts: Mutex<HashMap<PeerAddr, Script>>,
    pulls: Mutex<Vec<(PeerAddr, Vec<BucketId>)>>,
    gate: Notify,
}

impl ScriptedTransport {
    fn create(scripts: &[(&str, Script)]) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(
                scripts.iter().map(|(p, s)| (peer(p), *s)).collect(),
            ),
            ..Default::default()
        })
    }

    fn pulls(&self) -> Vec<(PeerAddr, Vec<BucketId>)> {
        self.pulls.lock().unwrap().clone()
    }
}

impl BulkTransport for ScriptedTransport {
    fn pull(
        &self,
        source: PeerAddr,
        buckets: Vec<BucketId>,
        progress: Arc<ConnectionRecord>,
    ) -> BoxFut<'_, ResyncResult<PullSummary>> {
        self.pulls
            .lock()
            .unwrap()
            .push((source.clone(), buckets.clone()));
        let script = self.scripts.lock().unwrap().get(&source).copied();
        Box::pin(async move {
            match script {
                Some(Script::Ok(keys, bytes)) => {
                    progress.record(buckets[0], keys, bytes);
                    Ok(PullSummary { keys, bytes })
                }
                Some(Script::Gated) => {
                    self.gate.notified().await;
                    Ok(PullSummary::default())
                }
                Some(Script::Fail) | None => {
                    Err(ResyncError::other(format!("{source} refused")))
                }
            }
        })
    }
}

#[derive(Debug)]
struct CountingViews {
    views: Arc<MemViewProvider>,
    fetches: AtomicUsize,
}

impl ViewProvider for CountingViews {
    fn current_view(&self) -> BoxFut<'_, ResyncResult<View>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.views.current_view()
    }

    fn self_address(&self) -> PeerAddr {
        self.views.self_address()
    }
}

struct Harness {
    inner: Arc<Inner>,
    views: Arc<CountingViews>,
    store: Arc<MemLocalStore>,
    transport: Arc<ScriptedTransport>,
    alarm: Arc<CoreAlarm>,
    stats: Arc<CoreStats>,
}

impl Harness {
    fn new(
        self_name: &str,
        view: View,
        scripts: &[(&str, Script)],
    ) -> Self {
        let views = Arc::new(CountingViews {
            views: MemViewProvider::create(peer(self_name), view),
            fetches: AtomicUsize::new(0),
        });
        let store = MemLocalStore::create(16);
        let transport = ScriptedTransport::create(scripts);
        let alarm = CoreAlarm::create("resync");
        let stats = Arc::new(CoreStats::new());

        let inner = Arc::new(Inner::new(
            CoreResyncConfig::default(),
            views.clone(),
            store.clone(),
            transport.clone(),
            alarm.clone(),
            stats.clone(),
        ));

        Self {
            inner,
            views,
            store,
            transport,
            alarm,
            stats,
        }
    }

    async fn pass(&self) -> PassReport {
        self.inner.run_coalesced().await
    }
}

#[tokio::test]
async fn steady_state_never_touches_the_transport() {
    let view = TestView::new(16).all_buckets(0..16, &["a", "b"]).build();
    let h = Harness::new("b", view, &[]);
    for bucket in 0..16 {
        h.store.mark_bucket_synced(bucket);
    }

    let report = h.pass().await;
    assert!(report.is_satisfied());
    assert_eq!(0, report.iterations);
    assert!(h.transport.pulls().is_empty());
    assert!(!h.alarm.is_raised());
    assert_eq!(ResyncState::Idle, h.inner.state());
    assert_eq!(16, h.stats.snapshot().total_buckets);
}

#[tokio::test]
async fn single_bucket_from_single_peer() {
    let view = TestView::new(16).bucket(7, &["a", "b"]).build();
    let h = Harness::new("b", view, &[("a", Script::Ok(120, 4096))]);

    let report = h.pass().await;

    assert!(report.is_satisfied());
    assert_eq!(1, report.iterations);
    assert_eq!(vec![(peer("a"), vec![7])], h.transport.pulls());
    assert_eq!(BTreeSet::from([7]), report.resolved);
    assert!(report.unresolved.is_empty());
    assert!(report.blacklist.is_empty());
    assert_eq!((120, 4096), (report.keys, report.bytes));
    assert!(h.store.holds_bucket(7));

    let stats = h.stats.snapshot();
    assert_eq!(1, stats.total_buckets);
    assert_eq!(1, stats.resynced_bucket_count);
    assert_eq!(120, stats.resynced_keys_count);
    assert_eq!(4096, stats.resynced_bytes_count);
    assert_eq!(ConnectionStatus::Succeeded, stats.connections[0].status);

    // Immediately running again finds nothing to do.
    let again = h.pass().await;
    assert!(again.is_satisfied());
    assert_eq!(0, again.iterations);
    assert_eq!(1, h.transport.pulls().len());
}

#[tokio::test]
async fn failed_peer_is_blacklisted_and_bucket_retried_from_next() {
    let view = TestView::new(16).bucket(9, &["a", "c", "self"]).build();
    let h = Harness::new(
        "self",
        view,
        &[("a", Script::Fail), ("c", Script::Ok(5, 50))],
    );

    let report = h.pass().await;

    assert!(report.is_satisfied());
    assert_eq!(2, report.iterations);
    assert_eq!(
        vec![(peer("a"), vec![9]), (peer("c"), vec![9])],
        h.transport.pulls()
    );
    assert_eq!(BTreeSet::from([9]), report.resolved);
    assert_eq!(BTreeSet::from([peer("a")]), report.blacklist);
    assert!(!h.alarm.is_raised());

    let stats = h.stats.snapshot();
    assert_eq!(1, stats.resynced_bucket_count);
    assert_eq!(ConnectionStatus::Failed, stats.connections[0].status);
    assert_eq!(ConnectionStatus::Succeeded, stats.connections[1].status);
}

#[tokio::test]
async fn only_candidate_failing_blocks_the_pass() {
    let view = TestView::new(16).bucket(3, &["d", "self"]).build();
    let h = Harness::new("self", view, &[("d", Script::Fail)]);

    let report = h.pass().await;

    assert!(report.is_blocked());
    assert_eq!(1, report.iterations);
    assert_eq!(BTreeSet::from([3]), report.unresolved);
    assert_eq!(BTreeSet::from([peer("d")]), report.blacklist);
    assert!(h.alarm.is_raised());
    assert!(!h.store.holds_bucket(3));
    assert_eq!(ResyncState::Idle, h.inner.state());
    let last = h.inner.last_report.lock().unwrap().clone().unwrap();
    assert!(last.is_blocked());
}

#[tokio::test]
async fn sole_owner_is_blocked_without_any_transfer() {
    let view = TestView::new(16).bucket(5, &["self"]).build();
    let h = Harness::new("self", view, &[]);

    let report = h.pass().await;

    assert!(report.is_blocked());
    assert_eq!(0, report.iterations);
    assert_eq!(BTreeSet::from([5]), report.unresolved);
    assert!(h.transport.pulls().is_empty());
    assert!(h.alarm.is_raised());
}

#[tokio::test]
async fn failed_peer_is_excluded_from_every_later_plan() {
    // Bucket 1 prefers a then c, bucket 2 prefers a then d: once a fails,
    // both buckets move on together and a is never asked again.
    let view = TestView::new(16)
        .bucket(1, &["a", "c", "self"])
        .bucket(2, &["a", "d", "self"])
        .bucket(4, &["c", "self"])
        .build();
    let h = Harness::new(
        "self",
        view,
        &[
            ("a", Script::Fail),
            ("c", Script::Ok(1, 1)),
            ("d", Script::Ok(1, 1)),
        ],
    );

    let report = h.pass().await;

    assert!(report.is_satisfied());
    let pulls = h.transport.pulls();
    assert_eq!(1, pulls.iter().filter(|(p, _)| *p == peer("a")).count());
    assert!(pulls.contains(&(peer("a"), vec![1, 2])));
    assert!(pulls.contains(&(peer("c"), vec![1])));
    assert!(pulls.contains(&(peer("d"), vec![2])));
    assert_eq!(BTreeSet::from([1, 2, 4]), report.resolved);
}

#[tokio::test]
async fn success_clears_a_previously_raised_alarm() {
    let view = TestView::new(16).bucket(3, &["d", "self"]).build();
    let h = Harness::new("self", view, &[("d", Script::Fail)]);

    assert!(h.pass().await.is_blocked());
    assert!(h.alarm.is_raised());

    // The blacklist only lasts one pass, so d is tried again.
    h.transport
        .scripts
        .lock()
        .unwrap()
        .insert(peer("d"), Script::Ok(1, 1));
    assert!(h.pass().await.is_satisfied());
    assert!(!h.alarm.is_raised());
}

#[tokio::test]
async fn unavailable_view_aborts_the_pass() {
    let view = TestView::new(16).bucket(7, &["a", "b"]).build();
    let h = Harness::new("b", view, &[("a", Script::Ok(1, 1))]);
    h.views.views.set_unavailable();

    let report = h.pass().await;

    assert!(report.is_aborted());
    assert_eq!(None, report.generation);
    assert!(h.alarm.is_raised());
    assert!(h.transport.pulls().is_empty());
    assert_eq!(ResyncState::Idle, h.inner.state());
}

#[tokio::test]
async fn buckets_no_longer_owned_are_released() {
    let view = TestView::new(16).bucket(1, &["self"]).build();
    let h = Harness::new("self", view, &[]);
    h.store.mark_bucket_synced(1);
    h.store.mark_bucket_synced(6);

    let report = h.pass().await;

    assert!(report.is_satisfied());
    assert_eq!(BTreeSet::from([1]), h.store.held_buckets());
}

#[tokio::test]
async fn former_owner_keeps_bucket_until_resize_settles() {
    let view = TestView::new(16)
        .resizing_bucket(5, &["b"], &["self"])
        .build();
    let h = Harness::new("self", view, &[]);
    h.store.apply(5, "k".into(), "v".into()).unwrap();
    h.store.mark_bucket_synced(5);
    h.store.mark_bucket_synced(6);

    let report = h.pass().await;

    assert!(report.is_satisfied());
    assert_eq!(0, report.iterations);
    assert_eq!(BTreeSet::from([5]), h.store.held_buckets());
    assert!(h.transport.pulls().is_empty());

    h.views
        .views
        .set_view(TestView::new(16).bucket(5, &["b"]).build());
    assert!(h.pass().await.is_satisfied());
    assert!(h.store.held_buckets().is_empty());
    assert_eq!(1, h.store.key_count());
}

#[tokio::test]
async fn trigger_during_pass_is_coalesced_and_rerun() {
    let view = TestView::new(16).bucket(7, &["a", "b"]).build();
    let h = Arc::new(Harness::new("b", view, &[("a", Script::Gated)]));

    let first = tokio::task::spawn({
        let h = h.clone();
        async move { h.pass().await }
    });

    resync_test_utils::iter_check!(1000, {
        if h.inner.state() == ResyncState::Executing {
            break;
        }
    });

    let second = h.pass().await;
    assert!(matches!(second.outcome, PassOutcome::Coalesced));
    assert_eq!(ResyncState::Executing, h.inner.state());

    h.transport.gate.notify_one();
    let first = first.await.unwrap();

    // The coalesced request ran the pass once more, which found the bucket
    // already synced.
    assert!(first.is_satisfied());
    assert_eq!(0, first.iterations);
    assert_eq!(2, h.views.fetches.load(Ordering::SeqCst));
    assert_eq!(1, h.transport.pulls().len());
    assert_eq!(ResyncState::Idle, h.inner.state());
}

#[tokio::test(start_paused = true)]
async fn notify_during_idle_runs_a_pass() {
    let view = TestView::new(16).bucket(7, &["a", "b"]).build();
    let views = MemViewProvider::create(peer("b"), view);
    let store = MemLocalStore::create(16);
    let transport = ScriptedTransport::create(&[("a", Script::Fail)]);

    let resync = CoreResync::new(
        CoreResyncConfig::default(),
        views,
        store.clone(),
        transport.clone(),
        CoreAlarm::create("resync"),
        Arc::new(CoreStats::new()),
    );

    // The start-up pass is blocked.
    resync_test_utils::iter_check!(1000, {
        if resync.last_report().is_some() {
            break;
        }
    });
    assert!(resync.last_report().unwrap().is_blocked());

    transport
        .scripts
        .lock()
        .unwrap()
        .insert(peer("a"), Script::Ok(1, 1));
    resync.notify_resync();
    resync.notify_resync();

    resync_test_utils::iter_check!(1000, {
        if store.holds_bucket(7) {
            break;
        }
    });
    assert!(resync.last_report().unwrap().is_satisfied());
}

#[tokio::test(start_paused = true)]
async fn aborted_pass_is_retried_before_the_interval() {
    let view = TestView::new(16).bucket(7, &["a", "b"]).build();
    let views = MemViewProvider::create(peer("b"), view.clone());
    views.set_unavailable();
    let store = MemLocalStore::create(16);

    let resync = CoreResync::new(
        CoreResyncConfig {
            resync_interval_s: 3600,
            first_retry_interval_ms: 100,
            ..Default::default()
        },
        views.clone(),
        store.clone(),
        ScriptedTransport::create(&[("a", Script::Ok(1, 1))]),
        CoreAlarm::create("resync"),
        Arc::new(CoreStats::new()),
    );

    resync_test_utils::iter_check!(1000, {
        if resync.last_report().is_some() {
            break;
        }
    });
    assert!(resync.last_report().unwrap().is_aborted());

    views.set_view(view);
    resync_test_utils::iter_check!(5000, 10, {
        if store.holds_bucket(7) {
            break;
        }
    });
}

#[test]
fn config_defaults_and_validation() {
    let factory = CoreResyncFactory::create();
    let mut config = resync_api::config::Config::default();
    factory.default_config(&mut config).unwrap();
    factory.validate_config(&config).unwrap();

    assert_eq!(
        serde_json::json!({
            "coreResync": {
                "maxParallelTransfers": 16,
                "transferTimeoutMs": 300000,
                "resyncIntervalS": 60,
                "firstRetryIntervalMs": 1000
            }
        }),
        serde_json::to_value(&config).unwrap()
    );

    config
        .set_module_config(
            MOD_NAME,
            &CoreResyncConfig {
                max_parallel_transfers: 0,
                ..Default::default()
            },
        )
        .unwrap();
    factory.validate_config(&config).unwrap_err();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_triggers_leave_no_request_behind() {
    let view = TestView::new(16).bucket(1, &["self"]).build();
    let h = Arc::new(Harness::new("self", view, &[]));
    h.store.mark_bucket_synced(1);

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let h = h.clone();
            tokio::task::spawn(async move {
                let mut ran = 0;
                for _ in 0..50 {
                    let report = h.pass().await;
                    if !matches!(report.outcome, PassOutcome::Coalesced) {
                        ran += 1;
                    }
                }
                ran
            })
        })
        .collect();

    let mut ran = 0;
    for task in tasks {
        ran += task.await.unwrap();
    }

    assert!(ran > 0);
    // Every coalesced request was picked up by whoever held the pass lock.
    assert!(!h.inner.rerun.load(Ordering::SeqCst));
    assert_eq!(ResyncState::Idle, h.inner.state());
}
