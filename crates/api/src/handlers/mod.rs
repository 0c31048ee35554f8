pub mod health;
pub mod jobs;
pub mod maintenance;
pub mod metrics;
pub mod scheduled;
