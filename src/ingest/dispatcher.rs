//! Start-height resolution and the height dispatch loop.

use crate::checkpoint::CheckpointStore;
use crate::ingest::head_tracker::HeadHeight;
use crate::rpc::ChainClient;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_HEAD_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Picks the first height to ingest.
///
/// Precedence: an explicit non-zero height wins; otherwise a recorded
/// checkpoint resumes at the next unprocessed height; otherwise ingestion
/// starts at the live head. Failures here are startup failures.
pub async fn resolve_start_height(
    explicit: u64,
    checkpoint: &Arc<dyn CheckpointStore>,
    client: &Arc<dyn ChainClient>,
) -> Result<u64> {
    if explicit != 0 {
        tracing::info!(start = explicit, "starting from configured height");
        return Ok(explicit);
    }

    let finished = checkpoint
        .last_finished_height()
        .await
        .context("failed to read checkpoint")?;
    if finished != 0 {
        let start = finished + 1;
        tracing::info!(checkpoint = finished, start, "resuming from checkpoint");
        return Ok(start);
    }

    let head = client
        .head_height()
        .await
        .context("failed to query head height for start resolution")?;
    tracing::info!(start = head, "no checkpoint; starting from live head");
    Ok(head)
}

/// Why a dispatch range ended early (or didn't).
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RangeOutcome {
    Completed,
    /// Stop was requested; carries the first height NOT submitted.
    Stopped(u64),
    /// The task queue receiver went away.
    QueueClosed,
}

/// Submits `from..=to` into the task queue in ascending order, checking the
/// stop token before every send so shutdown never leaves a submitted gap.
pub(crate) async fn dispatch_range(
    from: u64,
    to: u64,
    task_tx: &mpsc::Sender<u64>,
    stop: &CancellationToken,
) -> RangeOutcome {
    for height in from..=to {
        if stop.is_cancelled() {
            return RangeOutcome::Stopped(height);
        }
        tokio::select! {
            _ = stop.cancelled() => return RangeOutcome::Stopped(height),
            sent = task_tx.send(height) => {
                if sent.is_err() {
                    return RangeOutcome::QueueClosed;
                }
            }
        }
    }
    RangeOutcome::Completed
}

/// Spawns the single-owner cursor loop: walk from `start_height` to the
/// tracked head, submitting one height per task; at the head, poll until it
/// advances. Only this task writes the cursor.
pub(crate) fn spawn_dispatch_loop(
    head: Arc<HeadHeight>,
    task_tx: mpsc::Sender<u64>,
    start_height: u64,
    stop: CancellationToken,
    poll_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut cursor = start_height;
        tracing::info!(start = cursor, "dispatch loop started");

        loop {
            let head_now = head.current();
            if head_now < cursor {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = sleep(poll_interval) => continue,
                }
            }

            match dispatch_range(cursor, head_now, &task_tx, &stop).await {
                RangeOutcome::Completed => cursor = head_now + 1,
                RangeOutcome::Stopped(next) => {
                    cursor = next;
                    break;
                }
                RangeOutcome::QueueClosed => {
                    tracing::warn!("task queue closed; dispatch loop exiting");
                    break;
                }
            }
        }

        tracing::info!(next_height = cursor, "dispatch loop stopped");
    })
}
