//! 分布式运行：manager、worker 与 worker 池

mod classes;
mod error;
mod manager;
mod pool;
mod scenario;
mod worker;

pub use classes::{ClassRegistry, Ctor};
pub use error::DistError;
pub use manager::Manager;
pub use pool::{WorkerEntry, WorkerPool};
pub use scenario::{Deployed, deploy};
pub use worker::Worker;
