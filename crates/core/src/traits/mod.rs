pub mod handler;
pub mod store;

pub use handler::*;
pub use store::*;
