use crate::ingest::pipeline::IngestionPipeline;
use crate::runtime::consumer::BlockConsumer;
use anyhow::Result;
use tokio::signal;

/// Drives a pipeline to completion: starts it, feeds every released block
/// to the consumer, and handles Ctrl-C for graceful shutdowns.
pub struct Runner<C: BlockConsumer> {
    pipeline: IngestionPipeline,
    consumer: C,
}

impl<C: BlockConsumer> Runner<C> {
    pub fn new(pipeline: IngestionPipeline, consumer: C) -> Self {
        Self { pipeline, consumer }
    }

    /// Runs until Ctrl-C (SIGINT), a consumer error, or a fatal pipeline
    /// error. Blocks already dispatched at stop time are still processed.
    pub async fn run_until_shutdown(mut self) -> Result<()> {
        self.pipeline.start().await?;

        let stop_handle = self.pipeline.stop_handle();
        let signal_task = tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl-C received; stopping pipeline");
                stop_handle.stop();
            }
        });

        let mut consumer_error = None;
        while let Some(block) = self.pipeline.next().await {
            let height = block.height();
            if let Err(err) = self.consumer.process(block).await {
                tracing::error!(
                    height,
                    error = format!("{err:#}"),
                    "consumer failed; stopping pipeline"
                );
                self.pipeline.stop();
                // Drain what the workers still release so join() does not
                // stall on a full output channel.
                while self.pipeline.next().await.is_some() {}
                consumer_error = Some(err);
                break;
            }
        }

        signal_task.abort();
        let join_result = self.pipeline.join().await;
        let shutdown_result = self.consumer.shutdown().await;

        if let Some(err) = consumer_error {
            return Err(err);
        }
        join_result?;
        shutdown_result
    }
}
