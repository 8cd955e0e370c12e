//! Error types for tenuto-core.

use thiserror::Error;

/// Error type for tenuto-core operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Thread pool has been shut down")]
    PoolShutDown,

    #[error("Thread pool size must be at least 1")]
    EmptyPool,
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
