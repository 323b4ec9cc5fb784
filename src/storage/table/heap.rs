use std::sync::Arc;
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{PageId, Rid, INVALID_PAGE_ID};
use crate::storage::buffer::{BufferPoolError, BufferPoolManager};
use crate::storage::page::{PageError, PageManager};

#[derive(Error, Debug)]
pub enum TableHeapError {
    #[error("Tuple {0} not found")]
    TupleNotFound(Rid),

    #[error("Tuple of {0} bytes can never fit on a page")]
    TupleTooLarge(usize),

    #[error("Buffer pool error: {0}")]
    BufferPoolError(#[from] BufferPoolError),

    #[error("Page error: {0}")]
    PageError(#[from] PageError),
}

/// A table heap: an unordered collection of tuples spread over a doubly
/// linked chain of slotted pages. Tuples are opaque byte strings; the
/// executors decide how to decode them.
pub struct TableHeap {
    buffer_pool: Arc<BufferPoolManager>,
    page_manager: PageManager,
    first_page_id: PageId,
    // Appends go to the tail of the chain.
    last_page_id: Mutex<PageId>,
}

impl TableHeap {
    /// Create a heap with one empty page.
    pub fn new(buffer_pool: Arc<BufferPoolManager>) -> Result<Self, TableHeapError> {
        let page_manager = PageManager::new();
        let (page, page_id) = buffer_pool.new_page()?;
        {
            let mut guard = page.write();
            page_manager.init_page(&mut guard);
        }
        buffer_pool.unpin_page(page_id, true)?;

        Ok(Self {
            buffer_pool,
            page_manager,
            first_page_id: page_id,
            last_page_id: Mutex::new(page_id),
        })
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    /// Append a tuple, growing the page chain when the tail is full.
    pub fn insert_tuple(&self, data: &[u8]) -> Result<Rid, TableHeapError> {
        let mut last_page_id = self.last_page_id.lock();

        let page = self.buffer_pool.fetch_page(*last_page_id)?;
        let insert_result = {
            let mut guard = page.write();
            self.page_manager.insert_record(&mut guard, data)
        };

        match insert_result {
            Ok(slot) => {
                let rid = Rid::new(*last_page_id, slot);
                self.buffer_pool.unpin_page(*last_page_id, true)?;
                Ok(rid)
            }
            Err(PageError::InsufficientSpace) => {
                let (new_page, new_page_id) = self.buffer_pool.new_page()?;

                let insert_into_fresh = {
                    let mut guard = new_page.write();
                    self.page_manager.init_page(&mut guard);
                    self.page_manager.set_prev_page_id(&mut guard, *last_page_id);
                    self.page_manager.insert_record(&mut guard, data)
                };
                let slot = match insert_into_fresh {
                    Ok(slot) => slot,
                    Err(_) => {
                        // Does not fit even on an empty page.
                        self.buffer_pool.unpin_page(*last_page_id, false)?;
                        self.buffer_pool.unpin_page(new_page_id, true)?;
                        return Err(TableHeapError::TupleTooLarge(data.len()));
                    }
                };

                {
                    let mut guard = page.write();
                    self.page_manager.set_next_page_id(&mut guard, new_page_id);
                }
                self.buffer_pool.unpin_page(*last_page_id, true)?;
                self.buffer_pool.unpin_page(new_page_id, true)?;

                *last_page_id = new_page_id;
                Ok(Rid::new(new_page_id, slot))
            }
            Err(e) => {
                self.buffer_pool.unpin_page(*last_page_id, false)?;
                Err(e.into())
            }
        }
    }

    /// Read a tuple by record id.
    pub fn get_tuple(&self, rid: Rid) -> Result<Vec<u8>, TableHeapError> {
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let result = {
            let guard = page.read();
            self.page_manager.get_record(&guard, rid.slot)
        };
        self.buffer_pool.unpin_page(rid.page_id, false)?;

        result.map_err(|e| match e {
            PageError::SlotOutOfRange(_) | PageError::SlotDeleted(_) => {
                TableHeapError::TupleNotFound(rid)
            }
            other => other.into(),
        })
    }

    /// Tombstone a tuple.
    pub fn delete_tuple(&self, rid: Rid) -> Result<(), TableHeapError> {
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let result = {
            let mut guard = page.write();
            self.page_manager.delete_record(&mut guard, rid.slot)
        };
        self.buffer_pool.unpin_page(rid.page_id, result.is_ok())?;

        result.map_err(|e| match e {
            PageError::SlotOutOfRange(_) | PageError::SlotDeleted(_) => {
                TableHeapError::TupleNotFound(rid)
            }
            other => other.into(),
        })
    }

    /// Iterate over all live tuples in chain order.
    pub fn iter(&self) -> TableIterator<'_> {
        TableIterator {
            heap: self,
            current_page_id: self.first_page_id,
            current_slot: 0,
        }
    }
}

/// Walks the heap's page chain, yielding one `(Rid, bytes)` pair at a time
/// and skipping tombstoned slots.
pub struct TableIterator<'a> {
    heap: &'a TableHeap,
    current_page_id: PageId,
    current_slot: u32,
}

impl TableIterator<'_> {
    fn advance(&mut self) -> Result<Option<(Rid, Vec<u8>)>, TableHeapError> {
        loop {
            if self.current_page_id == INVALID_PAGE_ID {
                return Ok(None);
            }

            let page = self.heap.buffer_pool.fetch_page(self.current_page_id)?;
            let (slot_count, next_page_id, record) = {
                let guard = page.read();
                let header = self.heap.page_manager.header(&guard);
                let record = if self.current_slot < header.slot_count {
                    Some(self.heap.page_manager.get_record(&guard, self.current_slot))
                } else {
                    None
                };
                (header.slot_count, header.next_page_id, record)
            };
            self.heap.buffer_pool.unpin_page(self.current_page_id, false)?;

            match record {
                Some(Ok(bytes)) => {
                    let rid = Rid::new(self.current_page_id, self.current_slot);
                    self.current_slot += 1;
                    return Ok(Some((rid, bytes)));
                }
                Some(Err(PageError::SlotDeleted(_))) => {
                    self.current_slot += 1;
                }
                Some(Err(e)) => return Err(e.into()),
                None => {
                    debug_assert!(self.current_slot >= slot_count);
                    self.current_page_id = next_page_id;
                    self.current_slot = 0;
                }
            }
        }
    }
}

impl Iterator for TableIterator<'_> {
    type Item = Result<(Rid, Vec<u8>), TableHeapError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance().transpose()
    }
}
