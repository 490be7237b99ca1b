//! Runtime glue that wires configs, the consumer seam, fatal-error
//! escalation, telemetry, and runner orchestration.

pub mod config;
pub mod consumer;
pub mod fatal;
pub mod runner;
pub mod telemetry;
