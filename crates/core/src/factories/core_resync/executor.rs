//! The transfer executor.

use super::plan::TapPlan;
use resync_api::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// How one transfer of a plan ended.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    /// The peer the buckets were pulled from.
    pub source: PeerAddr,
    /// The buckets requested.
    pub buckets: Vec<BucketId>,
    /// The live progress record of the transfer.
    pub progress: Arc<ConnectionRecord>,
    /// What the transfer moved, or why it failed.
    pub result: ResyncResult<PullSummary>,
}

impl TransferOutcome {
    /// Did every requested bucket arrive?
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Limits applied to the transfers of one plan.
#[derive(Debug, Clone, Copy)]
pub struct ExecuteLimits {
    /// Transfers allowed to run at the same time.
    pub max_parallel: usize,
    /// Time after which a transfer counts as failed.
    pub timeout: Duration,
}

/// Run every transfer of `plan` concurrently and wait for all of them.
///
/// Returns one outcome per plan entry, in plan order. A transfer that
/// errors, times out, panics or is cancelled yields a failed outcome and
/// does not disturb the others. Nothing is retried here.
pub async fn execute(
    plan: TapPlan,
    transport: DynBulkTransport,
    stats: DynResyncStats,
    limits: ExecuteLimits,
) -> Vec<TransferOutcome> {
    let permits = Arc::new(Semaphore::new(limits.max_parallel.max(1)));

    let mut pending = Vec::with_capacity(plan.len());
    for (source, buckets) in plan {
        let progress = stats.add_connection(source.clone(), &buckets);

        let handle = tokio::task::spawn({
            let permits = permits.clone();
            let transport = transport.clone();
            let source = source.clone();
            let buckets = buckets.clone();
            let progress = progress.clone();
            async move {
                let _permit = permits.acquire_owned().await.map_err(|err| {
                    ResyncError::other_src("transfer permits closed", err)
                })?;

                tracing::debug!(%source, ?buckets, "starting transfer");
                match tokio::time::timeout(
                    limits.timeout,
                    transport.pull(source.clone(), buckets, progress),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ResyncError::other(format!(
                        "transfer from {source} timed out after {:?}",
                        limits.timeout
                    ))),
                }
            }
        });

        pending.push((source, buckets, progress, handle));
    }

    let (meta, handles): (Vec<_>, Vec<_>) = pending
        .into_iter()
        .map(|(source, buckets, progress, handle)| {
            ((source, buckets, progress), handle)
        })
        .unzip();

    futures::future::join_all(handles)
        .await
        .into_iter()
        .zip(meta)
        .map(|(joined, (source, buckets, progress))| {
            let result = joined.unwrap_or_else(|err| {
                Err(ResyncError::other_src(
                    format!("transfer task from {source} did not complete"),
                    err,
                ))
            });
            TransferOutcome {
                source,
                buckets,
                progress,
                result,
            }
        })
        .collect()
}
