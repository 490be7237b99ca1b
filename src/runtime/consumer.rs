use crate::types::FetchedBlock;
use anyhow::Result;
use futures::future::BoxFuture;

/// Downstream side of the pipeline: whatever parses, indexes, or persists
/// the ordered block stream. `process` is called once per block, strictly
/// in height order; an error stops the pipeline.
pub trait BlockConsumer: Send {
    fn process(&mut self, block: FetchedBlock) -> BoxFuture<'_, Result<()>>;

    /// Called once after the last block, whether the run ended cleanly or
    /// by error. Flush buffers here.
    fn shutdown(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}
