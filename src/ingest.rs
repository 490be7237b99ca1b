//! Ingestion orchestration: start-height resolution, head tracking, the
//! dispatch loop, fetch workers, and the pipeline composition root.

pub(crate) mod backoff;
pub mod dispatcher;
pub mod head_tracker;
pub mod pipeline;
pub(crate) mod worker;
