use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::common::types::{PageId, Rid, INVALID_PAGE_ID};
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::LeafNode;
use crate::index::btree::serialization::{deserialize_node, expect_leaf};
use crate::storage::buffer::BufferPoolManager;
use super::base::{BPlusTree, LatchedPage, TreeOp};

impl<K> BPlusTree<K>
where
    K: Clone + Ord + Serialize + for<'de> Deserialize<'de> + Send + Sync + 'static,
{
    /// Ordered scan over the whole tree, following the leaf chain.
    pub fn iter(&self) -> Result<BTreeRangeIter<K>, BTreeError> {
        self.make_iter(None)
    }

    /// Ordered scan starting at the first key `>= key`.
    pub fn iter_from(&self, key: &K) -> Result<BTreeRangeIter<K>, BTreeError> {
        self.make_iter(Some(key))
    }

    /// Record ids for all keys in `[start, end]`.
    pub fn range_scan(&self, start: &K, end: &K) -> Result<Vec<Rid>, BTreeError> {
        if start > end {
            return Ok(Vec::new());
        }

        let mut result = Vec::new();
        for item in self.iter_from(start)? {
            let (key, rid) = item?;
            if &key > end {
                break;
            }
            result.push(rid);
        }
        Ok(result)
    }

    fn make_iter(&self, key: Option<&K>) -> Result<BTreeRangeIter<K>, BTreeError> {
        let mut path = self.descend(key, TreeOp::Search)?;

        let Some(LatchedPage { latch, .. }) = path.pages.pop() else {
            return Ok(BTreeRangeIter {
                buffer_pool: self.buffer_pool.clone(),
                leaf: None,
                index: 0,
            });
        };

        let leaf = expect_leaf(deserialize_node::<K>(latch.page())?)?;
        let index = match key {
            Some(k) => leaf.key_index(k),
            None => 0,
        };

        // Drop the latch but keep the pin: the iterator owns it from here.
        drop(latch);

        Ok(BTreeRangeIter {
            buffer_pool: self.buffer_pool.clone(),
            leaf: Some(leaf),
            index,
        })
    }
}

/// Iterator over the leaf-linked list. Pins exactly one leaf at a time and
/// works on a decoded snapshot of it; the pin moves forward with the scan
/// and is dropped before the next leaf is fetched.
pub struct BTreeRangeIter<K> {
    buffer_pool: Arc<BufferPoolManager>,
    leaf: Option<LeafNode<K>>,
    index: usize,
}

impl<K> BTreeRangeIter<K>
where
    K: Clone + Ord + Serialize + for<'de> Deserialize<'de> + Send + Sync + 'static,
{
    fn advance_to(&mut self, page_id: PageId) -> Result<(), BTreeError> {
        let page = self.buffer_pool.fetch_page(page_id)?;
        let decoded = {
            let guard = page.read();
            deserialize_node::<K>(&guard).and_then(expect_leaf)
        };
        match decoded {
            Ok(leaf) => {
                self.leaf = Some(leaf);
                self.index = 0;
                Ok(())
            }
            Err(e) => {
                let _ = self.buffer_pool.unpin_page(page_id, false);
                Err(e)
            }
        }
    }
}

impl<K> Iterator for BTreeRangeIter<K>
where
    K: Clone + Ord + Serialize + for<'de> Deserialize<'de> + Send + Sync + 'static,
{
    type Item = Result<(K, Rid), BTreeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let leaf = self.leaf.as_ref()?;

            if self.index < leaf.size() {
                let entry = leaf.entries[self.index].clone();
                self.index += 1;
                return Some(Ok(entry));
            }

            let current_id = leaf.page_id;
            let next_id = leaf.next_page_id;
            self.leaf = None;
            if let Err(e) = self.buffer_pool.unpin_page(current_id, false) {
                return Some(Err(e.into()));
            }
            if next_id == INVALID_PAGE_ID {
                return None;
            }
            if let Err(e) = self.advance_to(next_id) {
                return Some(Err(e));
            }
        }
    }
}

impl<K> Drop for BTreeRangeIter<K> {
    fn drop(&mut self) {
        if let Some(leaf) = self.leaf.take() {
            let _ = self.buffer_pool.unpin_page(leaf.page_id, false);
        }
    }
}
