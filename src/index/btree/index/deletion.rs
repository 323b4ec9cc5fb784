use serde::{Deserialize, Serialize};

use crate::common::types::{PageId, INVALID_PAGE_ID};
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::BTreeNode;
use crate::index::btree::serialization::{deserialize_node, expect_internal, expect_leaf, serialize_node};
use super::base::{BPlusTree, DescentPath, LatchedPage, TreeOp};

impl<K> BPlusTree<K>
where
    K: Clone + Ord + Serialize + for<'de> Deserialize<'de> + Send + Sync + 'static,
{
    /// Delete a key. Removing a key that is not present is a no-op.
    pub fn remove(&self, key: &K) -> Result<(), BTreeError> {
        let mut path = self.descend(Some(key), TreeOp::Delete)?;

        let Some(mut leaf_entry) = path.pages.pop() else {
            return Ok(()); // empty tree
        };

        let mut leaf = expect_leaf(deserialize_node::<K>(leaf_entry.latch.page())?)?;
        if !leaf.remove(key) {
            let LatchedPage { page_id, latch, .. } = leaf_entry;
            drop(latch);
            self.buffer_pool.unpin_page(page_id, false)?;
            path.release_all(&self.buffer_pool)?;
            return Ok(());
        }

        if leaf_entry.is_root {
            if leaf.size() == 0 {
                // Last entry of the whole tree.
                let LatchedPage { page_id, latch, .. } = leaf_entry;
                drop(latch);
                self.buffer_pool.unpin_page(page_id, false)?;
                self.buffer_pool.delete_page(page_id)?;

                let root_guard = path
                    .root_guard
                    .as_mut()
                    .expect("root shrink without the root lock");
                **root_guard = INVALID_PAGE_ID;
                self.persist_root(INVALID_PAGE_ID)?;
                log::debug!("index {} is now empty", self.name());
            } else {
                serialize_node(&BTreeNode::Leaf(leaf), leaf_entry.latch.page_mut())?;
                let LatchedPage { page_id, latch, .. } = leaf_entry;
                drop(latch);
                self.buffer_pool.unpin_page(page_id, true)?;
            }
            return Ok(());
        }

        if !leaf.is_underfull() {
            serialize_node(&BTreeNode::Leaf(leaf), leaf_entry.latch.page_mut())?;
            let LatchedPage { page_id, latch, .. } = leaf_entry;
            drop(latch);
            self.buffer_pool.unpin_page(page_id, true)?;
            path.release_all(&self.buffer_pool)?;
            return Ok(());
        }

        self.rebalance(&mut path, leaf_entry, BTreeNode::Leaf(leaf))?;
        path.release_all(&self.buffer_pool)
    }

    /// Fix an underfull, non-root node by borrowing from or merging with a
    /// sibling, climbing while merges shrink the parent. The direct parent
    /// is always the last retained latch in the path (the descent keeps
    /// ancestors latched exactly while a merge could reach them).
    fn rebalance(
        &self,
        path: &mut DescentPath<'_>,
        mut node_entry: LatchedPage,
        mut node: BTreeNode<K>,
    ) -> Result<(), BTreeError> {
        loop {
            let mut parent_entry = path
                .pages
                .pop()
                .expect("underfull non-root node without a latched parent");
            let mut parent = expect_internal(deserialize_node::<K>(parent_entry.latch.page())?)?;

            let node_index = parent
                .child_index(node_entry.page_id)
                .expect("node missing from its parent");
            // Prefer the right sibling; the rightmost child borrows left.
            let node_is_rightmost = node_index + 1 == parent.size();
            let (sibling_index, sibling_on_right) = if node_is_rightmost {
                (node_index - 1, false)
            } else {
                (node_index + 1, true)
            };
            let sibling_id = parent.child_at(sibling_index);

            let sibling_page = self.buffer_pool.fetch_page(sibling_id)?;
            let mut sibling_latch = sibling_page.write_arc();
            let mut sibling = deserialize_node::<K>(&sibling_latch)?;

            let combined_fits = match (&node, &sibling) {
                (BTreeNode::Leaf(n), BTreeNode::Leaf(s)) => n.size() + s.size() <= n.max_size,
                (BTreeNode::Internal(n), BTreeNode::Internal(s)) => {
                    n.size() + s.size() <= n.max_size
                }
                _ => return Err(BTreeError::UnexpectedNodeKind(sibling_id)),
            };

            if !combined_fits {
                // Redistribute a single entry. Deletes underflow by exactly
                // one, so one entry always restores min_size.
                match (&mut node, &mut sibling) {
                    (BTreeNode::Leaf(n), BTreeNode::Leaf(s)) => {
                        if sibling_on_right {
                            s.move_first_to_end_of(n);
                            parent.set_key_at(sibling_index, s.key_at(0).clone());
                        } else {
                            s.move_last_to_front_of(n);
                            parent.set_key_at(node_index, n.key_at(0).clone());
                        }
                    }
                    (BTreeNode::Internal(n), BTreeNode::Internal(s)) => {
                        if sibling_on_right {
                            let middle = parent.key_at(sibling_index).clone();
                            let (new_separator, moved_child) = s.move_first_to_end_of(n, middle);
                            parent.set_key_at(sibling_index, new_separator);
                            let adoptive_parent = n.page_id;
                            self.set_parent(moved_child, adoptive_parent)?;
                        } else {
                            let middle = parent.key_at(node_index).clone();
                            let (new_separator, moved_child) = s.move_last_to_front_of(n, middle);
                            parent.set_key_at(node_index, new_separator);
                            let adoptive_parent = n.page_id;
                            self.set_parent(moved_child, adoptive_parent)?;
                        }
                    }
                    _ => unreachable!("sibling kind checked above"),
                }

                serialize_node(&sibling, &mut sibling_latch)?;
                drop(sibling_latch);
                self.buffer_pool.unpin_page(sibling_id, true)?;

                serialize_node(&node, node_entry.latch.page_mut())?;
                let LatchedPage { page_id, latch, .. } = node_entry;
                drop(latch);
                self.buffer_pool.unpin_page(page_id, true)?;

                serialize_node(&BTreeNode::Internal(parent), parent_entry.latch.page_mut())?;
                let LatchedPage { page_id, latch, .. } = parent_entry;
                drop(latch);
                self.buffer_pool.unpin_page(page_id, true)?;
                return Ok(());
            }

            // Coalesce: the right-hand node of the pair drains into the
            // left and its page is deleted from the parent and the pool.
            let removed_entry_index;
            let deleted_page_id;
            if sibling_on_right {
                match (&mut node, &mut sibling) {
                    (BTreeNode::Leaf(n), BTreeNode::Leaf(s)) => s.move_all_to(n),
                    (BTreeNode::Internal(n), BTreeNode::Internal(s)) => {
                        let middle = parent.key_at(sibling_index).clone();
                        let moved: Vec<PageId> = s.entries.iter().map(|&(_, c)| c).collect();
                        s.move_all_to(n, middle);
                        let adoptive_parent = n.page_id;
                        for child in moved {
                            self.set_parent(child, adoptive_parent)?;
                        }
                    }
                    _ => unreachable!("sibling kind checked above"),
                }
                removed_entry_index = sibling_index;
                deleted_page_id = sibling_id;

                serialize_node(&node, node_entry.latch.page_mut())?;
                let LatchedPage { page_id, latch, .. } = node_entry;
                drop(latch);
                self.buffer_pool.unpin_page(page_id, true)?;

                drop(sibling_latch);
                self.buffer_pool.unpin_page(sibling_id, false)?;
            } else {
                match (&mut node, &mut sibling) {
                    (BTreeNode::Leaf(n), BTreeNode::Leaf(s)) => n.move_all_to(s),
                    (BTreeNode::Internal(n), BTreeNode::Internal(s)) => {
                        let middle = parent.key_at(node_index).clone();
                        let moved: Vec<PageId> = n.entries.iter().map(|&(_, c)| c).collect();
                        n.move_all_to(s, middle);
                        let adoptive_parent = s.page_id;
                        for child in moved {
                            self.set_parent(child, adoptive_parent)?;
                        }
                    }
                    _ => unreachable!("sibling kind checked above"),
                }
                removed_entry_index = node_index;
                deleted_page_id = node_entry.page_id;

                serialize_node(&sibling, &mut sibling_latch)?;
                drop(sibling_latch);
                self.buffer_pool.unpin_page(sibling_id, true)?;

                let LatchedPage { page_id, latch, .. } = node_entry;
                drop(latch);
                self.buffer_pool.unpin_page(page_id, false)?;
            }
            self.buffer_pool.delete_page(deleted_page_id)?;
            parent.remove(removed_entry_index);

            if parent_entry.is_root {
                if parent.size() == 1 {
                    // Root shrink: the surviving child becomes the root.
                    let only_child = parent.remove_and_return_only_child();
                    let LatchedPage { page_id, latch, .. } = parent_entry;
                    drop(latch);
                    self.buffer_pool.unpin_page(page_id, false)?;
                    self.buffer_pool.delete_page(page_id)?;

                    self.set_parent(only_child, INVALID_PAGE_ID)?;
                    let root_guard = path
                        .root_guard
                        .as_mut()
                        .expect("root shrink without the root lock");
                    **root_guard = only_child;
                    self.persist_root(only_child)?;
                    log::debug!("index {} root shrank to page {}", self.name(), only_child);
                } else {
                    serialize_node(&BTreeNode::Internal(parent), parent_entry.latch.page_mut())?;
                    let LatchedPage { page_id, latch, .. } = parent_entry;
                    drop(latch);
                    self.buffer_pool.unpin_page(page_id, true)?;
                }
                return Ok(());
            }

            if parent.is_underfull() {
                serialize_node(&BTreeNode::Internal(parent.clone()), parent_entry.latch.page_mut())?;
                node = BTreeNode::Internal(parent);
                node_entry = parent_entry;
                continue;
            }

            serialize_node(&BTreeNode::Internal(parent), parent_entry.latch.page_mut())?;
            let LatchedPage { page_id, latch, .. } = parent_entry;
            drop(latch);
            self.buffer_pool.unpin_page(page_id, true)?;
            return Ok(());
        }
    }
}
