//! Real-time primitives shared by the Tenuto plugin host.
//!
//! Nothing in this crate knows about a plugin ABI:
//!
//! - [`ReducingQueue`]: keyed queue that coalesces same-key updates
//! - [`ThreadPool`]: fixed worker set for indexed parallel dispatch
//! - [`Semaphore`]: counting wait/signal primitive used by the pool
//! - [`thread_check`]: main-thread and audio-thread identity guards

pub mod error;
pub use error::{Error, Result};

pub mod reducing_queue;
pub use reducing_queue::{Reduce, ReducingQueue, ReducingStage};

mod semaphore;
pub use semaphore::Semaphore;

pub mod thread_check;
pub use thread_check::MainThread;

mod thread_pool;
pub use thread_pool::ThreadPool;
