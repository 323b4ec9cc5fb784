use serde::{Deserialize, Serialize};

use crate::common::types::{PageId, Rid, INVALID_PAGE_ID};
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::{BTreeNode, InternalNode, LeafNode};
use crate::index::btree::serialization::{deserialize_node, expect_internal, expect_leaf, serialize_node};
use super::base::{BPlusTree, DescentPath, LatchedPage, TreeOp};

impl<K> BPlusTree<K>
where
    K: Clone + Ord + Serialize + for<'de> Deserialize<'de> + Send + Sync + 'static,
{
    /// Insert a unique key. Returns `false` (tree unchanged) when the key
    /// already exists.
    pub fn insert(&self, key: K, value: Rid) -> Result<bool, BTreeError> {
        let mut path = self.descend(Some(&key), TreeOp::Insert)?;

        let Some(mut leaf_entry) = path.pages.pop() else {
            // Empty tree; the root-pointer lock is still held.
            self.start_new_tree(&mut path, key, value)?;
            return Ok(true);
        };

        let mut leaf = expect_leaf(deserialize_node::<K>(leaf_entry.latch.page())?)?;

        if !leaf.insert(key, value) {
            let LatchedPage { page_id, latch, .. } = leaf_entry;
            drop(latch);
            self.buffer_pool.unpin_page(page_id, false)?;
            path.release_all(&self.buffer_pool)?;
            return Ok(false);
        }

        if !leaf.is_overfull() {
            serialize_node(&BTreeNode::Leaf(leaf), leaf_entry.latch.page_mut())?;
            let LatchedPage { page_id, latch, .. } = leaf_entry;
            drop(latch);
            self.buffer_pool.unpin_page(page_id, true)?;
            path.release_all(&self.buffer_pool)?;
            return Ok(true);
        }

        // Overfull leaf: move the upper half into a fresh right sibling and
        // push the separator into the parent.
        let (new_page, new_page_id) = self.buffer_pool.new_page()?;
        let mut new_leaf = LeafNode::init(new_page_id, leaf.parent_page_id, self.leaf_max_size);
        leaf.move_half_to(&mut new_leaf);
        let separator = new_leaf.key_at(0).clone();

        serialize_node(&BTreeNode::Leaf(leaf), leaf_entry.latch.page_mut())?;
        {
            let mut guard = new_page.write();
            serialize_node(&BTreeNode::Leaf(new_leaf), &mut guard)?;
        }

        let LatchedPage { page_id: leaf_id, latch, .. } = leaf_entry;
        drop(latch);
        self.buffer_pool.unpin_page(leaf_id, true)?;
        self.buffer_pool.unpin_page(new_page_id, true)?;

        self.insert_into_parent(&mut path, leaf_id, separator, new_page_id)?;
        path.release_all(&self.buffer_pool)?;
        Ok(true)
    }

    /// First insert into an empty tree: a single leaf becomes the root and
    /// gets recorded in the directory page.
    fn start_new_tree(
        &self,
        path: &mut DescentPath<'_>,
        key: K,
        value: Rid,
    ) -> Result<(), BTreeError> {
        let (page, root_id) = self.buffer_pool.new_page()?;

        let mut root = LeafNode::init(root_id, INVALID_PAGE_ID, self.leaf_max_size);
        root.insert(key, value);
        {
            let mut guard = page.write();
            serialize_node(&BTreeNode::Leaf(root), &mut guard)?;
        }
        self.buffer_pool.unpin_page(root_id, true)?;

        let root_guard = path
            .root_guard
            .as_mut()
            .expect("new tree without the root lock");
        **root_guard = root_id;
        self.persist_root(root_id)?;

        log::debug!("index {} started a new tree at page {}", self.name(), root_id);
        Ok(())
    }

    /// Propagate a split upward: hang `(key, new_child)` to the right of
    /// `old_child` in its parent, splitting again as needed. Consumes the
    /// retained ancestor latches instead of re-fetching pages, so nothing
    /// is ever latched twice.
    fn insert_into_parent(
        &self,
        path: &mut DescentPath<'_>,
        mut old_child: PageId,
        mut key: K,
        mut new_child: PageId,
    ) -> Result<(), BTreeError> {
        loop {
            let Some(mut parent_entry) = path.pages.pop() else {
                // The split node was the root: grow the tree by one level.
                let (root_page, new_root_id) = self.buffer_pool.new_page()?;
                let root = InternalNode::populate_new_root(
                    new_root_id,
                    self.internal_max_size,
                    old_child,
                    key,
                    new_child,
                );
                {
                    let mut guard = root_page.write();
                    serialize_node(&BTreeNode::Internal(root), &mut guard)?;
                }
                self.buffer_pool.unpin_page(new_root_id, true)?;

                self.set_parent(old_child, new_root_id)?;
                self.set_parent(new_child, new_root_id)?;

                let root_guard = path
                    .root_guard
                    .as_mut()
                    .expect("root split without the root lock");
                **root_guard = new_root_id;
                self.persist_root(new_root_id)?;

                log::debug!("index {} grew a new root at page {}", self.name(), new_root_id);
                return Ok(());
            };

            let parent_id = parent_entry.page_id;
            let mut parent = expect_internal(deserialize_node::<K>(parent_entry.latch.page())?)?;
            parent.insert_node_after(old_child, key, new_child);

            if !parent.is_overfull() {
                serialize_node(&BTreeNode::Internal(parent), parent_entry.latch.page_mut())?;
                let LatchedPage { page_id, latch, .. } = parent_entry;
                drop(latch);
                self.buffer_pool.unpin_page(page_id, true)?;
                return Ok(());
            }

            // The parent overflows too; split it and keep climbing.
            let (sibling_page, sibling_id) = self.buffer_pool.new_page()?;
            let mut sibling =
                InternalNode::init(sibling_id, parent.parent_page_id, self.internal_max_size);
            parent.move_half_to(&mut sibling);
            let separator = sibling.entries[0].0.clone();

            serialize_node(&BTreeNode::Internal(parent), parent_entry.latch.page_mut())?;
            {
                let mut guard = sibling_page.write();
                serialize_node(&BTreeNode::Internal(sibling.clone()), &mut guard)?;
            }

            // Children that moved to the sibling get adopted.
            for &(_, child_id) in &sibling.entries {
                self.set_parent(child_id, sibling_id)?;
            }

            let LatchedPage { page_id, latch, .. } = parent_entry;
            drop(latch);
            self.buffer_pool.unpin_page(page_id, true)?;
            self.buffer_pool.unpin_page(sibling_id, true)?;

            old_child = parent_id;
            key = separator;
            new_child = sibling_id;
        }
    }
}
