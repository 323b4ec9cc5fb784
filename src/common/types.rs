use std::sync::Arc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Page ID type
pub type PageId = u32;

/// Sentinel meaning "no page"
pub const INVALID_PAGE_ID: PageId = PageId::MAX;

/// Page 0 persists the `index_name -> root_page_id` map
pub const ROOT_DIRECTORY_PAGE_ID: PageId = 0;

/// Buffer pool frame ID type
pub type FrameId = usize;

/// Transaction ID type
pub type TxnId = u32;

/// LSN (Log Sequence Number) type, reserved for a future log manager
pub type Lsn = u64;

/// Record ID: locates one tuple as a (page, slot) pair.
///
/// Opaque to the lock manager, which only needs equality, hashing and a
/// total order for deterministic iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Rid {
    pub page_id: PageId,
    pub slot: u32,
}

impl Rid {
    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }
}

impl std::fmt::Display for Rid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.page_id, self.slot)
    }
}

/// Page structure
#[derive(Debug, Clone)]
pub struct Page {
    pub data: [u8; PAGE_SIZE],
    pub page_id: PageId,
    pub lsn: Lsn,
}

impl Page {
    pub fn new(page_id: PageId) -> Self {
        Self {
            data: [0; PAGE_SIZE],
            page_id,
            lsn: 0,
        }
    }
}

/// Smart pointer to a page. The RwLock is the frame latch: readers share
/// it, a writer holds it exclusively. Pins are tracked by the buffer pool
/// and are orthogonal to latching.
pub type PagePtr = Arc<RwLock<Page>>;
