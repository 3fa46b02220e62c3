//! Task queue, fiber pool, and thread-local storage utilities.
pub mod fiber_pool;
pub mod task_queue;
pub mod thread_specific;

pub use fiber_pool::{FiberPool, FiberPoolConfig, PoolState, TaskError, TaskFuture};
pub use task_queue::TaskQueue;
pub use thread_specific::ThreadSpecific;
