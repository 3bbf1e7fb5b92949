pub mod buffer;
pub mod disk;
pub mod error;
pub mod page;
pub mod wal;

pub use buffer::clock::ClockReplacer;
pub use buffer::lru::LruReplacer;
pub use buffer::replacer::{FrameId, Replacer};
pub use buffer::{BufferPoolManager, BufferPoolStats, PageHandle, PageReadGuard, PageWriteGuard};
pub use disk::{DiskManager, FileDiskManager};
pub use error::{StorageError, StorageResult};
pub use page::{Page, PageId, PAGE_SIZE};
pub use wal::{LogManager, Lsn};
