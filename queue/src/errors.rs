use store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    /// Background initialization failed; delivered to every caller
    /// blocked on readiness.
    #[error("Queue storage failed to open: {0}")]
    InitFailed(String),

    #[error("Queue is closed")]
    Closed,

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

pub type QueueResult<T> = Result<T, QueueError>;
