pub mod pool;
pub mod processor;
pub mod types;

pub use pool::WorkerPool;
pub use types::{Processor, ProcessorError, ProcessorResult};
