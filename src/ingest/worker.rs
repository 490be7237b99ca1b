//! Fetch worker pool: drains the task queue, fetches block + receipts with
//! a bounded retry budget, and commits results to the sequencer.

use crate::ingest::backoff::{retry_with_backoff, RetryPolicy};
use crate::rpc::ChainClient;
use crate::runtime::fatal::FatalErrorHandler;
use crate::runtime::telemetry::Telemetry;
use crate::sequencer::{Sequencer, SequencerError};
use crate::types::{BlockHeightTime, FetchedBlock};
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

#[derive(Clone)]
pub(crate) struct WorkerParams {
    pub client: Arc<dyn ChainClient>,
    pub sequencer: Arc<Sequencer<FetchedBlock>>,
    pub telemetry: Arc<Telemetry>,
    pub fatal: Arc<FatalErrorHandler>,
    pub retry: RetryPolicy,
}

/// Spawns `count` workers sharing one task queue receiver. Workers exit
/// when the queue is closed and drained, or on a sequencer protocol fault.
pub(crate) fn spawn_workers(
    count: usize,
    task_rx: mpsc::Receiver<u64>,
    params: WorkerParams,
) -> Vec<JoinHandle<()>> {
    let task_rx = Arc::new(Mutex::new(task_rx));
    (0..count)
        .map(|worker_id| {
            let task_rx = task_rx.clone();
            let params = params.clone();
            tokio::spawn(worker_loop(worker_id, task_rx, params))
        })
        .collect()
}

async fn worker_loop(
    worker_id: usize,
    task_rx: Arc<Mutex<mpsc::Receiver<u64>>>,
    params: WorkerParams,
) {
    tracing::debug!(worker_id, "fetch worker started");

    loop {
        // Hold the queue lock only for the dequeue, never across a fetch.
        let height = match task_rx.lock().await.recv().await {
            Some(height) => height,
            None => break,
        };

        match fetch_with_retry(&params, height).await {
            Ok(fetched) => match params.sequencer.commit(fetched).await {
                Ok(()) => {
                    params.telemetry.record_fetched_block();
                }
                Err(SequencerError::StaleCommit { sequence, next_expected }) => {
                    tracing::warn!(
                        worker_id,
                        sequence,
                        next_expected,
                        "discarding stale commit"
                    );
                    params.telemetry.record_rejected_commit();
                }
                Err(err) => {
                    params
                        .fatal
                        .trigger("sequencer protocol violation", err.into());
                    break;
                }
            },
            Err(err) => {
                // The height stays unprocessed; surface it loudly instead
                // of letting the gap pass silently.
                tracing::error!(
                    worker_id,
                    height,
                    error = format!("{err:#}"),
                    "fetch failed after exhausting retries"
                );
                params.telemetry.record_fetch_failure();
            }
        }
    }

    tracing::debug!(worker_id, "fetch worker finished");
}

async fn fetch_with_retry(params: &WorkerParams, height: u64) -> Result<FetchedBlock> {
    let telemetry = params.telemetry.clone();
    retry_with_backoff(
        params.retry,
        |_| fetch_block(&params.client, &params.telemetry, height),
        move |attempt, delay, err, will_retry| {
            if will_retry {
                telemetry.record_fetch_retry();
                tracing::warn!(
                    height,
                    attempt,
                    retry_in = ?delay,
                    error = format!("{err:#}"),
                    "block fetch failed; retrying"
                );
            }
        },
    )
    .await
    .with_context(|| format!("fetching block {height}"))
}

/// Fetches the block body and its receipt list concurrently, then checks
/// that the two halves describe the same block.
async fn fetch_block(
    client: &Arc<dyn ChainClient>,
    telemetry: &Arc<Telemetry>,
    height: u64,
) -> Result<FetchedBlock> {
    let block_fut = async {
        let started = Instant::now();
        let block = client.block_by_number(height).await?;
        telemetry.record_block_fetch(started.elapsed());
        Ok::<_, anyhow::Error>(block)
    };
    let receipts_fut = async {
        let started = Instant::now();
        let receipts = client.block_receipts(height).await?;
        telemetry.record_receipts_fetch(started.elapsed());
        Ok::<_, anyhow::Error>(receipts)
    };

    let (block, receipts) = tokio::try_join!(block_fut, receipts_fut)?;

    if block.header.number != height {
        bail!(
            "node returned block {} for requested height {height}",
            block.header.number
        );
    }
    if receipts.len() != block.transactions.len() {
        bail!(
            "receipt count {} does not match transaction count {} at height {height}",
            receipts.len(),
            block.transactions.len()
        );
    }

    let height_time = BlockHeightTime::from_header(&block.header);
    if let Ok(now) = SystemTime::now().duration_since(UNIX_EPOCH) {
        let delay_secs = now.as_secs().saturating_sub(height_time.timestamp);
        telemetry.record_block_delay(std::time::Duration::from_secs(delay_secs));
    }

    Ok(FetchedBlock {
        block,
        receipts,
        height_time,
    })
}
