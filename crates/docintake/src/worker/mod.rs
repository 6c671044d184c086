pub mod job;
pub mod pool;
pub mod scanner;

pub use job::{Job, JobResult};
pub use pool::WorkerPool;
pub use scanner::DirectoryScanner;
