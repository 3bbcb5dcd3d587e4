//! Batches: configuration, stop rules, metrics and orchestration.

mod config;
mod model;
mod orchestrator;
mod stop;
mod task;

pub use config::{BatchConfig, BatchConfigBuilder, DEFAULT_POOL_NAME, DEFAULT_SOCKS_TARGETS};
pub use model::{BatchId, BatchMetrics, BatchState, StopReason};
pub use orchestrator::BatchOrchestrator;
pub use stop::StopCondition;
