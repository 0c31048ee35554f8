//! Job store implementations

pub mod memory_store;
pub mod redis_store;

pub use memory_store::InMemoryJobStore;
pub use redis_store::RedisJobStore;
