use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{Mutex, MutexGuard, RawRwLock};
use serde::{Deserialize, Serialize};

use crate::common::types::{Page, PageId, Rid, INVALID_PAGE_ID, ROOT_DIRECTORY_PAGE_ID};
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::BTreeNode;
use crate::index::btree::serialization::{deserialize_node, expect_leaf, serialize_node};
use crate::storage::buffer::BufferPoolManager;
use crate::storage::page::RootDirectory;

pub(crate) type PageReadGuard = ArcRwLockReadGuard<RawRwLock, Page>;
pub(crate) type PageWriteGuard = ArcRwLockWriteGuard<RawRwLock, Page>;

/// What a descent is for; decides latch mode and when ancestors are safe
/// to release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TreeOp {
    Search,
    Insert,
    Delete,
}

/// An owned latch on a frame, held across descent steps.
pub(crate) enum PageLatch {
    Read(PageReadGuard),
    Write(PageWriteGuard),
}

impl PageLatch {
    pub(crate) fn page(&self) -> &Page {
        match self {
            PageLatch::Read(guard) => guard,
            PageLatch::Write(guard) => guard,
        }
    }

    pub(crate) fn page_mut(&mut self) -> &mut Page {
        match self {
            PageLatch::Write(guard) => &mut **guard,
            PageLatch::Read(_) => unreachable!("write latch required to mutate a page"),
        }
    }
}

pub(crate) struct LatchedPage {
    pub page_id: PageId,
    pub latch: PageLatch,
    /// Whether this frame held the root when it was latched. Stays valid
    /// for the latch's lifetime: changing the root requires this latch.
    pub is_root: bool,
}

/// The chain of latched, pinned pages from the highest unsafe ancestor down
/// to the current node, plus (until the root is proven safe) the lock on
/// the root pointer, which acts as a virtual parent of the root frame.
pub(crate) struct DescentPath<'a> {
    pub root_guard: Option<MutexGuard<'a, PageId>>,
    pub pages: Vec<LatchedPage>,
}

impl DescentPath<'_> {
    /// Release everything still held, top-down. Released ancestors were
    /// never modified, so they unpin clean.
    pub(crate) fn release_all(&mut self, buffer_pool: &BufferPoolManager) -> Result<(), BTreeError> {
        self.root_guard = None;
        for LatchedPage { page_id, latch, .. } in self.pages.drain(..) {
            drop(latch);
            buffer_pool.unpin_page(page_id, false)?;
        }
        Ok(())
    }
}

/// A concurrent B+tree over buffer-pool pages.
///
/// Nodes live in pages and are addressed by page id; the buffer pool is the
/// only arena. Readers and writers crab down the tree with frame latches,
/// and a dedicated mutex guards the root page id against concurrent root
/// changes.
pub struct BPlusTree<K> {
    index_name: String,
    pub(crate) buffer_pool: Arc<BufferPoolManager>,
    pub(crate) root_page_id: Mutex<PageId>,
    pub(crate) leaf_max_size: usize,
    pub(crate) internal_max_size: usize,
    pub(crate) _phantom: PhantomData<K>,
}

impl<K> BPlusTree<K>
where
    K: Clone + Ord + Serialize + for<'de> Deserialize<'de> + Send + Sync + 'static,
{
    /// Open the index named `index_name`, picking up a root recorded on the
    /// directory page by an earlier run. A name never seen before starts as
    /// an empty tree.
    pub fn new(
        index_name: impl Into<String>,
        buffer_pool: Arc<BufferPoolManager>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self, BTreeError> {
        let index_name = index_name.into();

        let page = buffer_pool.fetch_page(ROOT_DIRECTORY_PAGE_ID)?;
        let recorded_root = {
            let guard = page.read();
            RootDirectory::root_of(&guard, &index_name)
        };
        buffer_pool.unpin_page(ROOT_DIRECTORY_PAGE_ID, false)?;

        Ok(Self {
            index_name,
            buffer_pool,
            root_page_id: Mutex::new(recorded_root.unwrap_or(INVALID_PAGE_ID)),
            leaf_max_size,
            internal_max_size,
            _phantom: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.index_name
    }

    pub fn is_empty(&self) -> bool {
        *self.root_page_id.lock() == INVALID_PAGE_ID
    }

    /// Current root page id (`INVALID_PAGE_ID` for an empty tree).
    pub fn root_page_id(&self) -> PageId {
        *self.root_page_id.lock()
    }

    /// Point query: descend with read latches and look the key up in the
    /// candidate leaf.
    pub fn get(&self, key: &K) -> Result<Option<Rid>, BTreeError> {
        let mut path = self.descend(Some(key), TreeOp::Search)?;
        let result = match path.pages.pop() {
            None => None,
            Some(LatchedPage { page_id, latch, .. }) => {
                let leaf = expect_leaf(deserialize_node::<K>(latch.page())?)?;
                let value = leaf.lookup(key);
                drop(latch);
                self.buffer_pool.unpin_page(page_id, false)?;
                value
            }
        };
        path.release_all(&self.buffer_pool)?;
        Ok(result)
    }

    /// Crab from the root to the leaf responsible for `key` (the leftmost
    /// leaf when `key` is `None`).
    ///
    /// Searches latch in read mode and keep only the current frame latched.
    /// Writers latch in write mode and release all ancestors, including the
    /// root-pointer lock, once the child cannot propagate a split (insert)
    /// or merge (delete) past it. On an empty tree the returned path has no
    /// pages and still holds the root-pointer lock.
    pub(crate) fn descend(
        &self,
        key: Option<&K>,
        op: TreeOp,
    ) -> Result<DescentPath<'_>, BTreeError> {
        let root_guard = self.root_page_id.lock();
        let mut current_id = *root_guard;
        let mut path = DescentPath {
            root_guard: Some(root_guard),
            pages: Vec::new(),
        };

        if current_id == INVALID_PAGE_ID {
            return Ok(path);
        }

        loop {
            let page = self.buffer_pool.fetch_page(current_id)?;
            let latch = match op {
                TreeOp::Search => PageLatch::Read(page.read_arc()),
                TreeOp::Insert | TreeOp::Delete => PageLatch::Write(page.write_arc()),
            };
            let node = deserialize_node::<K>(latch.page())?;

            let is_root = path.root_guard.is_some() && path.pages.is_empty();
            let child_is_safe = match op {
                TreeOp::Search => true,
                TreeOp::Insert => node.is_insert_safe(),
                TreeOp::Delete => node.is_delete_safe(is_root),
            };
            if child_is_safe {
                path.release_all(&self.buffer_pool)?;
            }
            path.pages.push(LatchedPage {
                page_id: current_id,
                latch,
                is_root,
            });

            match node {
                BTreeNode::Leaf(_) => return Ok(path),
                BTreeNode::Internal(internal) => {
                    current_id = match key {
                        Some(k) => internal.lookup(k),
                        None => internal.child_at(0),
                    };
                }
            }
        }
    }

    /// Rewrite a child's parent pointer through the buffer pool. Only ever
    /// called on pages outside the current latch chain.
    pub(crate) fn set_parent(&self, child_id: PageId, parent_id: PageId) -> Result<(), BTreeError> {
        let page = self.buffer_pool.fetch_page(child_id)?;
        {
            let mut guard = page.write();
            let mut node = deserialize_node::<K>(&guard)?;
            node.set_parent_page_id(parent_id);
            serialize_node(&node, &mut guard)?;
        }
        self.buffer_pool.unpin_page(child_id, true)?;
        Ok(())
    }

    /// Record the current root in the directory page. Called under the
    /// root-pointer lock whenever the root changes.
    pub(crate) fn persist_root(&self, root: PageId) -> Result<(), BTreeError> {
        let page = self.buffer_pool.fetch_page(ROOT_DIRECTORY_PAGE_ID)?;
        {
            let mut guard = page.write();
            if !RootDirectory::update_record(&mut guard, &self.index_name, root) {
                RootDirectory::insert_record(&mut guard, &self.index_name, root)?;
            }
        }
        self.buffer_pool.unpin_page(ROOT_DIRECTORY_PAGE_ID, true)?;
        Ok(())
    }
}
