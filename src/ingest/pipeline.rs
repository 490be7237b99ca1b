//! Composition root: wires checkpoint, head tracker, dispatcher, workers,
//! sequencer, and the bounded output channel into one pipeline with a
//! `start` / `next` / `stop` surface.

use crate::checkpoint::CheckpointStore;
use crate::ingest::dispatcher::{resolve_start_height, spawn_dispatch_loop};
use crate::ingest::head_tracker::HeadTracker;
use crate::ingest::worker::{spawn_workers, WorkerParams};
use crate::rpc::{AlloyChainClient, ChainClient, ClientPool};
use crate::runtime::config::PipelineConfig;
use crate::runtime::fatal::FatalErrorHandler;
use crate::runtime::telemetry::{spawn_metrics_reporter, Telemetry};
use crate::sequencer::{BoundedSink, Sequencer};
use crate::types::FetchedBlock;
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cloneable handle that requests a graceful stop without borrowing the
/// pipeline, so signal handlers can hold one across the drain loop.
#[derive(Clone)]
pub struct StopHandle {
    dispatch: CancellationToken,
}

impl StopHandle {
    /// Stops dispatching new heights. Heights already submitted are still
    /// fetched and released; the output stream ends once they drain.
    pub fn stop(&self) {
        self.dispatch.cancel();
    }
}

pub struct IngestionPipeline {
    config: PipelineConfig,
    client: Arc<dyn ChainClient>,
    checkpoint: Arc<dyn CheckpointStore>,
    telemetry: Arc<Telemetry>,
    shutdown_root: CancellationToken,
    dispatch_token: CancellationToken,
    fatal: Arc<FatalErrorHandler>,
    output_rx: Option<mpsc::Receiver<FetchedBlock>>,
    head_tracker: Option<HeadTracker>,
    dispatch_handle: Option<JoinHandle<()>>,
    coordinator_handle: Option<JoinHandle<()>>,
    reporter_handle: Option<JoinHandle<()>>,
    started: bool,
}

impl IngestionPipeline {
    /// Builds a pipeline over an already constructed client, typically a
    /// [`ClientPool`] or a test double.
    pub fn new(
        config: PipelineConfig,
        client: Arc<dyn ChainClient>,
        checkpoint: Arc<dyn CheckpointStore>,
    ) -> Self {
        let shutdown_root = CancellationToken::new();
        let dispatch_token = shutdown_root.child_token();
        let fatal = Arc::new(FatalErrorHandler::new(
            shutdown_root.clone(),
            dispatch_token.clone(),
        ));

        Self {
            config,
            client,
            checkpoint,
            telemetry: Arc::new(Telemetry::default()),
            shutdown_root,
            dispatch_token,
            fatal,
            output_rx: None,
            head_tracker: None,
            dispatch_handle: None,
            coordinator_handle: None,
            reporter_handle: None,
            started: false,
        }
    }

    /// Dials every configured endpoint and builds a pipeline over a
    /// round-robin pool of alloy clients.
    pub async fn connect(
        config: PipelineConfig,
        checkpoint: Arc<dyn CheckpointStore>,
    ) -> Result<Self> {
        let mut clients: Vec<Arc<dyn ChainClient>> =
            Vec::with_capacity(config.http_urls().len());
        for url in config.http_urls() {
            clients.push(Arc::new(AlloyChainClient::connect(url, config.ws_url()).await?));
        }
        let client: Arc<dyn ChainClient> = Arc::new(ClientPool::new(clients)?);
        Ok(Self::new(config, client, checkpoint))
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            dispatch: self.dispatch_token.clone(),
        }
    }

    /// Resolves the starting height and launches every pipeline task.
    pub async fn start(&mut self) -> Result<()> {
        let start = resolve_start_height(
            self.config.start_height(),
            &self.checkpoint,
            &self.client,
        )
        .await
        .context("failed to resolve start height")?;
        if start == 0 {
            bail!("resolved start height is 0; nothing to ingest yet");
        }
        self.start_from(start).await
    }

    /// Launches the pipeline from an explicit height, bypassing resolution.
    pub async fn start_from(&mut self, start_height: u64) -> Result<()> {
        if self.started {
            return Ok(());
        }

        let (output_tx, output_rx) = mpsc::channel(self.config.output_capacity());
        let sink = Arc::new(BoundedSink::new(output_tx));
        let sequencer = Arc::new(Sequencer::new(sink.clone()));
        sequencer.init(start_height).await?;

        let head_tracker = HeadTracker::start(
            self.client.clone(),
            self.config.head_tracker_params(),
            self.shutdown_root.child_token(),
            self.telemetry.clone(),
        )
        .await?;

        let (task_tx, task_rx) = mpsc::channel(self.config.task_queue_capacity());
        let dispatch_handle = spawn_dispatch_loop(
            head_tracker.height_handle(),
            task_tx,
            start_height,
            self.dispatch_token.clone(),
            self.config.head_poll_interval(),
        );

        let workers = spawn_workers(
            self.config.worker_count(),
            task_rx,
            WorkerParams {
                client: self.client.clone(),
                sequencer,
                telemetry: self.telemetry.clone(),
                fatal: self.fatal.clone(),
                retry: self.config.retry_policy(),
            },
        );

        // The sink closes only after every worker has returned, so the
        // consumer sees end-of-stream exactly once all in-flight heights
        // are released.
        let coordinator_sink = sink.clone();
        let coordinator_handle = tokio::spawn(async move {
            for worker in workers {
                if let Err(err) = worker.await {
                    tracing::warn!(error = %err, "fetch worker task failed");
                }
            }
            coordinator_sink.close().await;
            tracing::info!("all fetch tasks finished; output stream closed");
        });

        let reporter_handle = spawn_metrics_reporter(
            self.telemetry.clone(),
            sink,
            self.client.clone(),
            self.shutdown_root.child_token(),
            self.config.metrics_interval(),
        );

        self.output_rx = Some(output_rx);
        self.head_tracker = Some(head_tracker);
        self.dispatch_handle = Some(dispatch_handle);
        self.coordinator_handle = Some(coordinator_handle);
        self.reporter_handle = Some(reporter_handle);
        self.started = true;
        tracing::info!(start_height, "ingestion pipeline started");
        Ok(())
    }

    /// Next block in strict height order. `None` once the pipeline has
    /// stopped and every in-flight block has been drained.
    pub async fn next(&mut self) -> Option<FetchedBlock> {
        match self.output_rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Requests a graceful stop; see [`StopHandle::stop`].
    pub fn stop(&self) {
        self.dispatch_token.cancel();
    }

    /// Stops dispatch, waits for every task to finish, and surfaces the
    /// first fatal error if one occurred.
    pub async fn join(&mut self) -> Result<()> {
        self.dispatch_token.cancel();

        if let Some(handle) = self.dispatch_handle.take() {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "dispatch task failed");
            }
        }
        if let Some(handle) = self.coordinator_handle.take() {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "worker coordinator task failed");
            }
        }

        self.shutdown_root.cancel();
        if let Some(tracker) = self.head_tracker.take() {
            tracker.join().await;
        }
        if let Some(handle) = self.reporter_handle.take() {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "metrics reporter task failed");
            }
        }

        self.started = false;
        match self.fatal.error() {
            Some(err) => Err(err.context("pipeline terminated by fatal error")),
            None => Ok(()),
        }
    }
}
