use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{StorageError, StorageResult};
use crate::page::{PageId, PAGE_SIZE};

/// Raw page I/O and page-id allocation, as consumed by the buffer pool.
///
/// The pool serialises all access through its own lock, so implementations
/// only need `&mut self`.
pub trait DiskManager: Send {
    fn read_page(&mut self, page_id: PageId, buf: &mut [u8]) -> StorageResult<()>;
    fn write_page(&mut self, page_id: PageId, data: &[u8]) -> StorageResult<()>;
    fn allocate_page(&mut self) -> StorageResult<PageId>;
    fn deallocate_page(&mut self, page_id: PageId);
}

/// Disk manager backed by a single page-array file. Pages live at
/// `page_id * PAGE_SIZE`; allocation grows the file by one page, reusing
/// deallocated ids first.
pub struct FileDiskManager {
    file: File,
    free_pages: Vec<PageId>,
}

impl FileDiskManager {
    pub fn create(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            file,
            free_pages: Vec::new(),
        })
    }

    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        Ok(Self {
            file,
            free_pages: Vec::new(),
        })
    }

    pub fn num_pages(&self) -> StorageResult<u32> {
        let file_size = self.file.metadata()?.len();
        Ok((file_size / PAGE_SIZE as u64) as u32)
    }

    fn page_offset(page_id: PageId) -> u64 {
        page_id.0 as u64 * PAGE_SIZE as u64
    }
}

impl DiskManager for FileDiskManager {
    fn read_page(&mut self, page_id: PageId, buf: &mut [u8]) -> StorageResult<()> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let offset = Self::page_offset(page_id);
        if offset >= self.file.metadata()?.len() {
            return Err(StorageError::PageNotOnDisk(page_id));
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;

        Ok(())
    }

    fn write_page(&mut self, page_id: PageId, data: &[u8]) -> StorageResult<()> {
        if data.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: data.len(),
            });
        }

        let offset = Self::page_offset(page_id);
        let file_size = self.file.metadata()?.len();

        // Extend file if necessary
        if offset >= file_size {
            self.file.set_len(offset + PAGE_SIZE as u64)?;
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.file.sync_all()?;

        Ok(())
    }

    fn allocate_page(&mut self) -> StorageResult<PageId> {
        if let Some(page_id) = self.free_pages.pop() {
            return Ok(page_id);
        }

        let current_pages = self.num_pages()?;
        let new_page_id = PageId(current_pages);

        // Extend file to include new page
        self.file
            .set_len((current_pages as u64 + 1) * PAGE_SIZE as u64)?;

        Ok(new_page_id)
    }

    fn deallocate_page(&mut self, page_id: PageId) {
        if !self.free_pages.contains(&page_id) {
            self.free_pages.push(page_id);
        }
    }
}
