//! Observability module
//!
//! - Job metrics collection, alerting and history
//! - Structured lifecycle logging

pub mod metrics_collector;
pub mod structured_logger;

pub use metrics_collector::JobMetricsCollector;
pub use structured_logger::StructuredLogger;
