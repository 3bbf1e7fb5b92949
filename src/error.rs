//! Storage layer error types.

use thiserror::Error;

use crate::page::PageId;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Buffer pool is full: all frames are pinned")]
    BufferPoolFull,

    #[error("Buffer size must be PAGE_SIZE ({expected}), got {actual}")]
    InvalidBufferSize { expected: usize, actual: usize },

    #[error("Page {0} does not exist on disk")]
    PageNotOnDisk(PageId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
