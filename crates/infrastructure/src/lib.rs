pub mod keys;
pub mod observability;
pub mod queue;
pub mod store;

pub use observability::{JobMetricsCollector, StructuredLogger};
pub use queue::JobQueue;
pub use store::{InMemoryJobStore, RedisJobStore};
