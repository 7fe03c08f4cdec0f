mod pool;
mod worker;

pub use pool::{ThreadPool, default_thread_count};
pub use worker::{Job, WorkFuture, WorkFutureBatch, WorkResult};
