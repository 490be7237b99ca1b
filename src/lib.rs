pub mod checkpoint;
pub mod ingest;
pub mod rpc;
pub mod runtime;
pub mod sequencer;
pub mod types;

pub use checkpoint::{CheckpointStore, InMemoryCheckpoint, NoCheckpoint};
pub use ingest::dispatcher::resolve_start_height;
pub use ingest::head_tracker::{HeadTracker, HeadTrackerParams};
pub use ingest::pipeline::{IngestionPipeline, StopHandle};
pub use rpc::{AlloyChainClient, ChainClient, ClientPool, HeaderStream, RpcError};
pub use runtime::config::{PipelineConfig, PipelineConfigBuilder};
pub use runtime::consumer::BlockConsumer;
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use sequencer::{BoundedSink, Committer, Sequencer, SequencerError};
pub use types::{BlockHeightTime, FetchedBlock, Sequenced};
