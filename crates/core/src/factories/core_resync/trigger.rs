use super::{config::CoreResyncConfig, Inner};
use crate::common::DropAbortHandle;
use backon::BackoffBuilder;
use resync_api::PassReport;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;

/// Spawn the task that runs resync passes.
///
/// A pass runs at once, then again whenever `notify_rx` fires or the
/// fallback interval elapses. After an aborted pass the next attempt is
/// made sooner, backing off exponentially up to the fallback interval.
pub(crate) fn spawn_trigger_task(
    config: &CoreResyncConfig,
    inner: Weak<Inner>,
    mut notify_rx: Receiver<()>,
) -> DropAbortHandle {
    tracing::info!("Starting resync trigger task");

    let interval = config.resync_interval();
    let retry = backon::ExponentialBuilder::default()
        .with_factor(2.0)
        .with_min_delay(config.first_retry_interval())
        .with_max_delay(interval)
        .with_max_times(usize::MAX);

    let handle = tokio::task::spawn(async move {
        let mut back_off: Option<backon::ExponentialBackoff> = None;

        loop {
            let report = {
                let Some(inner) = inner.upgrade() else {
                    tracing::info!(
                        "Resync instance dropped, stopping trigger task"
                    );
                    break;
                };
                inner.run_coalesced().await
            };

            let delay = next_delay(&report, &mut back_off, || retry.build())
                .unwrap_or(interval);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    tracing::trace!(?delay, "resync interval elapsed");
                }
                Some(()) = notify_rx.recv() => {
                    tracing::debug!("resync requested");
                }
            }
        }
    })
    .abort_handle();

    DropAbortHandle {
        name: "resync trigger",
        handle,
    }
}

/// The retry delay after `report`, or `None` to wait the full interval.
fn next_delay<F>(
    report: &PassReport,
    back_off: &mut Option<backon::ExponentialBackoff>,
    build: F,
) -> Option<Duration>
where
    F: FnOnce() -> backon::ExponentialBackoff,
{
    if report.is_aborted() {
        back_off.get_or_insert_with(build).next()
    } else {
        *back_off = None;
        None
    }
}
