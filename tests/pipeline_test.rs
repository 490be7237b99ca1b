mod support;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chainscan::{
    init_tracing, CheckpointStore, InMemoryCheckpoint, IngestionPipeline, NoCheckpoint,
    PipelineConfig,
};
use support::MockChainClient;
use tokio::time::timeout;

fn test_config() -> chainscan::PipelineConfigBuilder {
    PipelineConfig::builder()
        .http_url("http://localhost:8545")
        .ws_url("ws://localhost:8546")
        .worker_count(4)
        .retry_attempts(3)
        .retry_initial_delay(Duration::from_millis(10))
        .retry_max_delay(Duration::from_millis(40))
        .head_poll_interval(Duration::from_millis(10))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn delivers_blocks_in_height_order_despite_shuffled_completion() -> Result<()> {
    init_tracing();
    let client = Arc::new(MockChainClient::new(105));
    // Earlier heights finish last, so workers complete in reverse order.
    for (offset, height) in (100..=105).rev().enumerate() {
        client.delay_fetch(height, Duration::from_millis(10 * offset as u64));
    }

    let config = test_config().start_height(100).build()?;
    let checkpoint: Arc<dyn CheckpointStore> = Arc::new(NoCheckpoint);
    let mut pipeline = IngestionPipeline::new(config, client, checkpoint);
    pipeline.start().await?;

    for expected in 100..=105 {
        let block = timeout(Duration::from_secs(5), pipeline.next())
            .await?
            .expect("stream should not end mid-range");
        assert_eq!(block.height(), expected);
        assert_eq!(block.receipts.len(), block.transaction_count());
    }

    pipeline.stop();
    while pipeline.next().await.is_some() {}
    pipeline.join().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn resumes_from_the_checkpoint_height() -> Result<()> {
    init_tracing();
    let client = Arc::new(MockChainClient::new(505));
    let checkpoint: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpoint::new(500));

    let config = test_config().build()?;
    let mut pipeline = IngestionPipeline::new(config, client, checkpoint);
    pipeline.start().await?;

    let first = timeout(Duration::from_secs(5), pipeline.next())
        .await?
        .expect("pipeline should deliver a block");
    assert_eq!(first.height(), 501, "resume starts after the checkpoint");

    pipeline.stop();
    while pipeline.next().await.is_some() {}
    pipeline.join().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transient_fetch_failures_are_retried_without_breaking_order() -> Result<()> {
    init_tracing();
    let client = Arc::new(MockChainClient::new(103));
    client.fail_fetches(102, 2);

    let config = test_config().start_height(100).build()?;
    let mut pipeline =
        IngestionPipeline::new(config, client, Arc::new(NoCheckpoint) as Arc<dyn CheckpointStore>);
    let telemetry = pipeline.telemetry();
    pipeline.start().await?;

    for expected in 100..=103 {
        let block = timeout(Duration::from_secs(5), pipeline.next())
            .await?
            .expect("stream should not end mid-range");
        assert_eq!(block.height(), expected);
    }
    assert!(telemetry.snapshot().fetch_retries >= 2);

    pipeline.stop();
    while pipeline.next().await.is_some() {}
    pipeline.join().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exhausted_retry_budget_stalls_instead_of_skipping() -> Result<()> {
    init_tracing();
    let client = Arc::new(MockChainClient::new(103));
    client.fail_fetches(102, 100);

    let config = test_config().retry_attempts(2).start_height(100).build()?;
    let mut pipeline =
        IngestionPipeline::new(config, client, Arc::new(NoCheckpoint) as Arc<dyn CheckpointStore>);
    let telemetry = pipeline.telemetry();
    pipeline.start().await?;

    for expected in [100, 101] {
        let block = timeout(Duration::from_secs(5), pipeline.next())
            .await?
            .expect("heights before the gap are still delivered");
        assert_eq!(block.height(), expected);
    }

    // 103 was fetched but must never be released past the missing 102.
    assert!(
        timeout(Duration::from_millis(300), pipeline.next())
            .await
            .is_err(),
        "no block may be released across the gap"
    );
    assert!(telemetry.snapshot().fetch_failures >= 1);

    pipeline.stop();
    while pipeline.next().await.is_some() {}
    let result = pipeline.join().await;
    assert!(result.is_ok(), "a dropped height is not a fatal error");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn graceful_stop_leaves_a_contiguous_prefix() -> Result<()> {
    init_tracing();
    let client = Arc::new(MockChainClient::new(200));

    let config = test_config().start_height(100).build()?;
    let mut pipeline =
        IngestionPipeline::new(config, client, Arc::new(NoCheckpoint) as Arc<dyn CheckpointStore>);
    pipeline.start().await?;

    let mut received = Vec::new();
    for _ in 0..10 {
        match timeout(Duration::from_secs(5), pipeline.next()).await? {
            Some(block) => received.push(block.height()),
            None => break,
        }
    }

    pipeline.stop();
    while let Some(block) = timeout(Duration::from_secs(5), pipeline.next()).await? {
        received.push(block.height());
    }

    assert_eq!(received.first(), Some(&100));
    for pair in received.windows(2) {
        assert_eq!(pair[1], pair[0] + 1, "delivered heights must be gapless");
    }

    // The stream stays ended after close.
    assert!(pipeline.next().await.is_none());
    pipeline.join().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn follows_the_head_as_it_advances() -> Result<()> {
    init_tracing();
    let client = Arc::new(MockChainClient::new(100));

    let config = test_config().start_height(100).build()?;
    let mut pipeline = IngestionPipeline::new(
        config,
        client.clone(),
        Arc::new(NoCheckpoint) as Arc<dyn CheckpointStore>,
    );
    pipeline.start().await?;

    let first = timeout(Duration::from_secs(5), pipeline.next())
        .await?
        .expect("the starting height is ingested");
    assert_eq!(first.height(), 100);

    client.push_head(102);
    for expected in [101, 102] {
        let block = timeout(Duration::from_secs(5), pipeline.next())
            .await?
            .expect("newly announced heights are ingested");
        assert_eq!(block.height(), expected);
    }

    pipeline.stop();
    while pipeline.next().await.is_some() {}
    pipeline.join().await
}
