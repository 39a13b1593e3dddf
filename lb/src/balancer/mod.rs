pub mod backend;
pub mod health;
pub mod pool;
pub mod strategy;

pub use backend::{Backend, ConnectionGuard};
pub use health::HealthChecker;
pub use pool::ServerPool;
pub use strategy::Strategy;
