pub mod app;
pub mod shutdown;

pub use app::{Application, StoreBackend};
pub use shutdown::ShutdownManager;
