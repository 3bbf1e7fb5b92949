pub mod clock;
pub mod lru;
pub mod replacer;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, trace, warn};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::disk::DiskManager;
use crate::error::{StorageError, StorageResult};
use crate::page::{Page, PageId};
use crate::wal::LogManager;
use clock::ClockReplacer;
use replacer::{FrameId, Replacer};

/// Page table and free list, guarded together by the manager latch. Every
/// frame id is in exactly one of: the free list, the page table, or (when
/// resident and unpinned) the replacer.
struct PoolState {
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
}

#[derive(Default)]
struct PoolCounters {
    fetches: AtomicU64,
    hits: AtomicU64,
    evictions: AtomicU64,
    flushes: AtomicU64,
}

/// Snapshot of the pool's activity counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolStats {
    pub fetches: u64,
    pub hits: u64,
    pub evictions: u64,
    pub flushes: u64,
}

/// Fixed-capacity cache of pages backed by a disk manager.
///
/// The manager latch serialises every public operation, including the disk
/// I/O it triggers. Per-frame `RwLock` latches guard the page payloads;
/// callers take them through [`PageHandle`] after a successful fetch and
/// must release them before the matching [`unpin_page`].
///
/// Dropping the pool does not flush dirty frames; call [`flush_all_pages`]
/// first if durability is required.
///
/// [`unpin_page`]: BufferPoolManager::unpin_page
/// [`flush_all_pages`]: BufferPoolManager::flush_all_pages
pub struct BufferPoolManager {
    pages: Vec<Arc<RwLock<Page>>>,
    state: Mutex<PoolState>,
    replacer: Box<dyn Replacer>,
    disk: Mutex<Box<dyn DiskManager>>,
    log_manager: Option<Arc<LogManager>>,
    counters: PoolCounters,
}

impl BufferPoolManager {
    /// Create a pool of `pool_size` frames with clock-sweep eviction.
    pub fn new(pool_size: usize, disk: Box<dyn DiskManager>) -> Self {
        Self::with_replacer(pool_size, disk, Box::new(ClockReplacer::new(pool_size)))
    }

    pub fn with_replacer(
        pool_size: usize,
        disk: Box<dyn DiskManager>,
        replacer: Box<dyn Replacer>,
    ) -> Self {
        let pages = (0..pool_size)
            .map(|_| Arc::new(RwLock::new(Page::new())))
            .collect();

        Self {
            pages,
            state: Mutex::new(PoolState {
                page_table: HashMap::with_capacity(pool_size),
                free_list: (0..pool_size).collect(),
            }),
            replacer,
            disk: Mutex::new(disk),
            log_manager: None,
            counters: PoolCounters::default(),
        }
    }

    /// Attach the log manager this pool is constructed for. Reserved for
    /// recovery wiring; the pool itself never calls into it.
    pub fn with_log_manager(mut self, log_manager: Arc<LogManager>) -> Self {
        self.log_manager = Some(log_manager);
        self
    }

    pub fn log_manager(&self) -> Option<&Arc<LogManager>> {
        self.log_manager.as_ref()
    }

    /// Fetch `page_id` into the pool, pinning its frame.
    ///
    /// Returns [`StorageError::BufferPoolFull`] when every frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> StorageResult<PageHandle> {
        let mut state = self.state.lock();
        self.counters.fetches.fetch_add(1, Ordering::Relaxed);

        // Already resident: re-pin and stop tracking it for eviction.
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            self.pages[frame_id].write().pin_count += 1;
            self.replacer.pin(frame_id);
            return Ok(self.handle(frame_id, page_id));
        }

        let frame_id = self.acquire_frame(&mut state)?;
        self.evict_resident(&mut state, frame_id)?;

        {
            let mut page = self.pages[frame_id].write();
            page.reset(Some(page_id), 1);
            state.page_table.insert(page_id, frame_id);
            if let Err(e) = self.disk.lock().read_page(page_id, page.data_mut()) {
                warn!("read of {page_id} failed, returning frame {frame_id} to the free list");
                page.reset(None, 0);
                state.page_table.remove(&page_id);
                state.free_list.push_back(frame_id);
                return Err(e);
            }
        }

        self.replacer.pin(frame_id);
        Ok(self.handle(frame_id, page_id))
    }

    /// Allocate a fresh page on disk and pin it in a zeroed frame.
    ///
    /// The frame is reserved before the disk manager allocates the id, so an
    /// exhausted pool cannot leak page ids.
    pub fn new_page(&self) -> StorageResult<(PageId, PageHandle)> {
        let mut state = self.state.lock();

        let frame_id = self.acquire_frame(&mut state)?;
        self.evict_resident(&mut state, frame_id)?;

        let page_id = match self.disk.lock().allocate_page() {
            Ok(page_id) => page_id,
            Err(e) => {
                self.pages[frame_id].write().reset(None, 0);
                state.free_list.push_back(frame_id);
                return Err(e);
            }
        };

        self.pages[frame_id].write().reset(Some(page_id), 1);
        state.page_table.insert(page_id, frame_id);
        trace!("materialised new {page_id} in frame {frame_id}");

        Ok((page_id, self.handle(frame_id, page_id)))
    }

    /// Release one pin on `page_id`, folding `is_dirty` into the frame's
    /// dirty bit (dirty is sticky until the next flush or eviction).
    ///
    /// Returns `false` only on an unbalanced unpin; unpinning a page that is
    /// not resident is a benign no-op returning `true`.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return true;
        };

        let now_unpinned = {
            let mut page = self.pages[frame_id].write();
            if page.pin_count == 0 {
                return false;
            }
            page.pin_count -= 1;
            page.is_dirty |= is_dirty;
            page.pin_count == 0
        };

        if now_unpinned {
            self.replacer.unpin(frame_id);
        }
        true
    }

    /// Write `page_id` back to disk if it is resident and dirty.
    ///
    /// `Ok(false)` means the page is not resident. Residency and pin state
    /// are unchanged either way.
    pub fn flush_page(&self, page_id: PageId) -> StorageResult<bool> {
        let state = self.state.lock();
        self.flush_locked(&state, page_id)
    }

    /// Write back every resident dirty page.
    pub fn flush_all_pages(&self) -> StorageResult<()> {
        let state = self.state.lock();
        let resident: Vec<PageId> = state.page_table.keys().copied().collect();
        for page_id in resident {
            self.flush_locked(&state, page_id)?;
        }
        Ok(())
    }

    /// Deallocate `page_id` on disk and drop it from the pool.
    ///
    /// Returns `false` if the page is resident and pinned; the disk-side
    /// deallocation has happened regardless.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut state = self.state.lock();
        self.disk.lock().deallocate_page(page_id);

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return true;
        };
        if self.pages[frame_id].read().pin_count > 0 {
            return false;
        }

        self.pages[frame_id].write().reset(None, 0);
        state.page_table.remove(&page_id);
        state.free_list.push_back(frame_id);
        self.replacer.pin(frame_id);
        debug!("deleted {page_id}, frame {frame_id} freed");
        true
    }

    pub fn pool_size(&self) -> usize {
        self.pages.len()
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    pub fn resident_page_count(&self) -> usize {
        self.state.lock().page_table.len()
    }

    pub fn evictable_frame_count(&self) -> usize {
        self.replacer.size()
    }

    pub fn stats(&self) -> BufferPoolStats {
        BufferPoolStats {
            fetches: self.counters.fetches.load(Ordering::Relaxed),
            hits: self.counters.hits.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            flushes: self.counters.flushes.load(Ordering::Relaxed),
        }
    }

    fn handle(&self, frame_id: FrameId, page_id: PageId) -> PageHandle {
        PageHandle {
            frame: Arc::clone(&self.pages[frame_id]),
            page_id,
        }
    }

    /// Free list first (FIFO), then the replacer.
    fn acquire_frame(&self, state: &mut PoolState) -> StorageResult<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }
        self.replacer.victim().ok_or(StorageError::BufferPoolFull)
    }

    /// If `frame_id` still holds a resident page, write it back when dirty
    /// and remove it from the page table. Frames taken from the free list
    /// hold nothing and pass straight through.
    fn evict_resident(&self, state: &mut PoolState, frame_id: FrameId) -> StorageResult<()> {
        let Some(old_page_id) = self.pages[frame_id].read().page_id() else {
            return Ok(());
        };

        if let Err(e) = self.flush_locked(state, old_page_id) {
            // The frame keeps its page; make it a candidate again.
            self.replacer.unpin(frame_id);
            return Err(e);
        }

        state.page_table.remove(&old_page_id);
        self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        debug!("evicted {old_page_id} from frame {frame_id}");
        Ok(())
    }

    fn flush_locked(&self, state: &PoolState, page_id: PageId) -> StorageResult<bool> {
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(false);
        };

        let frame = &self.pages[frame_id];
        if !frame.read().is_dirty {
            return Ok(true);
        }

        let mut page = frame.write();
        self.disk.lock().write_page(page_id, page.data())?;
        page.is_dirty = false;
        self.counters.flushes.fetch_add(1, Ordering::Relaxed);
        trace!("flushed {page_id} from frame {frame_id}");
        Ok(true)
    }
}

impl std::fmt::Debug for BufferPoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BufferPoolManager")
            .field("pool_size", &self.pages.len())
            .field("resident", &state.page_table.len())
            .field("free", &state.free_list.len())
            .field("evictable", &self.replacer.size())
            .finish()
    }
}

/// A pinned reference to a frame. The frame's identity is stable until the
/// caller hands the pin back through [`BufferPoolManager::unpin_page`].
pub struct PageHandle {
    frame: Arc<RwLock<Page>>,
    page_id: PageId,
}

impl PageHandle {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Take the frame latch for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, Page> {
        self.frame.read()
    }

    /// Take the frame latch for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, Page> {
        self.frame.write()
    }
}

/// Pin released on drop via `unpin_page(page_id, false)`.
pub struct PageReadGuard<'a> {
    pool: &'a BufferPoolManager,
    handle: PageHandle,
}

impl PageReadGuard<'_> {
    pub fn page_id(&self) -> PageId {
        self.handle.page_id
    }

    pub fn page(&self) -> RwLockReadGuard<'_, Page> {
        self.handle.read()
    }
}

impl Drop for PageReadGuard<'_> {
    fn drop(&mut self) {
        self.pool.unpin_page(self.handle.page_id, false);
    }
}

/// Pin released on drop via `unpin_page(page_id, true)`: holders are assumed
/// to have modified the page.
pub struct PageWriteGuard<'a> {
    pool: &'a BufferPoolManager,
    handle: PageHandle,
}

impl PageWriteGuard<'_> {
    pub fn page_id(&self) -> PageId {
        self.handle.page_id
    }

    pub fn page(&self) -> RwLockReadGuard<'_, Page> {
        self.handle.read()
    }

    pub fn page_mut(&self) -> RwLockWriteGuard<'_, Page> {
        self.handle.write()
    }
}

impl Drop for PageWriteGuard<'_> {
    fn drop(&mut self) {
        self.pool.unpin_page(self.handle.page_id, true);
    }
}

impl BufferPoolManager {
    pub fn fetch_page_read(&self, page_id: PageId) -> StorageResult<PageReadGuard<'_>> {
        Ok(PageReadGuard {
            handle: self.fetch_page(page_id)?,
            pool: self,
        })
    }

    pub fn fetch_page_write(&self, page_id: PageId) -> StorageResult<PageWriteGuard<'_>> {
        Ok(PageWriteGuard {
            handle: self.fetch_page(page_id)?,
            pool: self,
        })
    }

    pub fn new_page_write(&self) -> StorageResult<PageWriteGuard<'_>> {
        let (_, handle) = self.new_page()?;
        Ok(PageWriteGuard { handle, pool: self })
    }
}
