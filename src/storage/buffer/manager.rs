use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use parking_lot::{Mutex, RwLock};

use crate::common::types::{FrameId, Page, PageId, PagePtr, INVALID_PAGE_ID};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::replacer::ClockReplacer;
use crate::storage::disk::DiskManager;

/// A frame of the pool: the page slot plus its bookkeeping. The page's own
/// RwLock is the frame latch; pin count and dirty bit live here, under the
/// pool mutex.
struct Frame {
    page: PagePtr,
    pin_count: u32,
    is_dirty: bool,
}

/// Everything the pool mutex protects: the frame metadata, the page table,
/// the free list and the replacer.
struct PoolInner {
    frames: Vec<Frame>,
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
    replacer: ClockReplacer,
}

/// Caches disk pages in a bounded set of in-memory frames.
///
/// All public operations serialize on a single pool-wide mutex. A thread
/// holding a pinned page does not hold the mutex, so other threads can
/// fetch and unpin concurrently. Disk I/O happens while the mutex is held.
pub struct BufferPoolManager {
    pool_size: usize,
    disk_manager: Arc<DiskManager>,
    inner: Mutex<PoolInner>,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, db_path: impl AsRef<Path>) -> Result<Self, BufferPoolError> {
        let disk_manager = Arc::new(DiskManager::new(db_path)?);
        Ok(Self::with_disk_manager(pool_size, disk_manager))
    }

    pub fn with_disk_manager(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        // Initially every frame is in the free list.
        for frame_id in 0..pool_size {
            frames.push(Frame {
                page: Arc::new(RwLock::new(Page::new(INVALID_PAGE_ID))),
                pin_count: 0,
                is_dirty: false,
            });
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            disk_manager,
            inner: Mutex::new(PoolInner {
                frames,
                page_table: HashMap::new(),
                free_list,
                replacer: ClockReplacer::new(pool_size),
            }),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Fetch a page, reading it from disk if it is not resident. The caller
    /// owns one pin and must give it back with `unpin_page`.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        if page_id == INVALID_PAGE_ID {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }

        let mut inner = self.inner.lock();

        // Already resident: pin and return.
        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let frame = &mut inner.frames[frame_id];
            frame.pin_count += 1;
            let page = frame.page.clone();
            inner.replacer.pin(frame_id);
            return Ok(page);
        }

        // Not resident: claim a frame and read the page into it.
        let frame_id = self.allocate_frame(&mut inner)?;
        {
            let frame = &inner.frames[frame_id];
            let mut page = frame.page.write();
            self.disk_manager.read_page(page_id, &mut page)?;
        }

        let frame = &mut inner.frames[frame_id];
        frame.pin_count = 1;
        frame.is_dirty = false;
        inner.page_table.insert(page_id, frame_id);

        Ok(inner.frames[frame_id].page.clone())
    }

    /// Allocate a fresh disk page and pin it in a zeroed frame.
    pub fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let mut inner = self.inner.lock();

        let frame_id = self.allocate_frame(&mut inner)?;
        let page_id = match self.disk_manager.allocate_page() {
            Ok(id) => id,
            Err(e) => {
                // Hand the claimed frame back before surfacing the error.
                inner.free_list.push_back(frame_id);
                return Err(e.into());
            }
        };

        {
            let frame = &inner.frames[frame_id];
            let mut page = frame.page.write();
            *page = Page::new(page_id);
        }

        let frame = &mut inner.frames[frame_id];
        frame.pin_count = 1;
        // A brand-new page has no bytes on disk yet.
        frame.is_dirty = true;
        inner.page_table.insert(page_id, frame_id);

        Ok((inner.frames[frame_id].page.clone(), page_id))
    }

    /// Drop one pin. The dirty flag is sticky: `is_dirty = false` never
    /// clears a previously set bit. When the pin count reaches zero the
    /// frame becomes a replacement candidate.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        let mut inner = self.inner.lock();

        let frame_id = match inner.page_table.get(&page_id) {
            Some(&id) => id,
            None => return Err(BufferPoolError::PageNotResident(page_id)),
        };

        let frame = &mut inner.frames[frame_id];
        if frame.pin_count == 0 {
            return Err(BufferPoolError::PinCountZero(page_id));
        }

        frame.pin_count -= 1;
        frame.is_dirty |= is_dirty;

        if frame.pin_count == 0 {
            inner.replacer.unpin(frame_id);
        }

        Ok(())
    }

    /// Write a resident page's bytes to disk, whether or not it is dirty.
    /// The pin count is untouched.
    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        if page_id == INVALID_PAGE_ID {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }

        let mut inner = self.inner.lock();
        let frame_id = match inner.page_table.get(&page_id) {
            Some(&id) => id,
            None => return Err(BufferPoolError::PageNotResident(page_id)),
        };

        self.flush_frame(&mut inner, frame_id)
    }

    /// Flush every resident page, pinned or not.
    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let mut inner = self.inner.lock();
        let frame_ids: Vec<FrameId> = inner.page_table.values().copied().collect();

        for frame_id in frame_ids {
            self.flush_frame(&mut inner, frame_id)?;
        }

        Ok(())
    }

    /// Remove a page from the pool and free its disk page. Succeeds when
    /// the page is not resident; fails when it is pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let mut inner = self.inner.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            if inner.frames[frame_id].pin_count > 0 {
                return Err(BufferPoolError::PagePinned(page_id));
            }

            inner.page_table.remove(&page_id);
            inner.replacer.pin(frame_id);

            let frame = &mut inner.frames[frame_id];
            frame.pin_count = 0;
            frame.is_dirty = false;
            *frame.page.write() = Page::new(INVALID_PAGE_ID);

            inner.free_list.push_back(frame_id);
        }

        self.disk_manager.deallocate_page(page_id);
        Ok(())
    }

    /// Claim a frame: free list first, then the replacer. A victim with
    /// leftover dirty bytes is flushed before reuse. Called with the pool
    /// mutex held, so the flush goes through the private helper rather than
    /// the public (re-locking) entry point.
    fn allocate_frame(&self, inner: &mut PoolInner) -> Result<FrameId, BufferPoolError> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(frame_id);
        }

        let victim_id = match inner.replacer.victim() {
            Some(id) => id,
            None => return Err(BufferPoolError::PoolExhausted),
        };

        let old_page_id = inner.frames[victim_id].page.read().page_id;
        if inner.frames[victim_id].is_dirty {
            log::debug!("evicting dirty page {} from frame {}", old_page_id, victim_id);
            self.flush_frame(inner, victim_id)?;
        }
        if old_page_id != INVALID_PAGE_ID {
            inner.page_table.remove(&old_page_id);
        }

        Ok(victim_id)
    }

    fn flush_frame(&self, inner: &mut PoolInner, frame_id: FrameId) -> Result<(), BufferPoolError> {
        let page_copy = inner.frames[frame_id].page.read().clone();
        self.disk_manager.write_page(&page_copy)?;
        inner.frames[frame_id].is_dirty = false;
        Ok(())
    }
}
