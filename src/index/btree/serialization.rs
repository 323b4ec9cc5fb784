use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::common::types::{Page, INVALID_PAGE_ID, PAGE_SIZE};
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::{BTreeNode, InternalNode, LeafNode};

// Node header layout:
// - kind: u8 (1 = leaf, 2 = internal)
// - page_id: u32
// - parent_page_id: u32
// - max_size: u32
// - next_page_id: u32 (leaves only; INVALID_PAGE_ID otherwise)
// - payload_len: u32 (bincode-encoded entry vector)
const KIND_LEAF: u8 = 1;
const KIND_INTERNAL: u8 = 2;
const NODE_HEADER_SIZE: usize = 21;

/// Serialize a B+Tree node into a page's byte buffer.
pub fn serialize_node<K>(node: &BTreeNode<K>, page: &mut Page) -> Result<(), BTreeError>
where
    K: Serialize + Clone + Ord,
{
    let (kind, page_id, parent, max_size, next, payload) = match node {
        BTreeNode::Leaf(n) => (
            KIND_LEAF,
            n.page_id,
            n.parent_page_id,
            n.max_size,
            n.next_page_id,
            bincode::serialize(&n.entries)
                .map_err(|e| BTreeError::SerializationError(e.to_string()))?,
        ),
        BTreeNode::Internal(n) => (
            KIND_INTERNAL,
            n.page_id,
            n.parent_page_id,
            n.max_size,
            INVALID_PAGE_ID,
            bincode::serialize(&n.entries)
                .map_err(|e| BTreeError::SerializationError(e.to_string()))?,
        ),
    };

    if NODE_HEADER_SIZE + payload.len() > PAGE_SIZE {
        return Err(BTreeError::NodeTooLarge);
    }

    page.data[0] = kind;
    LittleEndian::write_u32(&mut page.data[1..5], page_id);
    LittleEndian::write_u32(&mut page.data[5..9], parent);
    LittleEndian::write_u32(&mut page.data[9..13], max_size as u32);
    LittleEndian::write_u32(&mut page.data[13..17], next);
    LittleEndian::write_u32(&mut page.data[17..21], payload.len() as u32);
    page.data[NODE_HEADER_SIZE..NODE_HEADER_SIZE + payload.len()].copy_from_slice(&payload);

    Ok(())
}

/// Deserialize a B+Tree node from a page's byte buffer.
pub fn deserialize_node<K>(page: &Page) -> Result<BTreeNode<K>, BTreeError>
where
    K: for<'de> Deserialize<'de> + Clone + Ord,
{
    let kind = page.data[0];
    let page_id = LittleEndian::read_u32(&page.data[1..5]);
    let parent_page_id = LittleEndian::read_u32(&page.data[5..9]);
    let max_size = LittleEndian::read_u32(&page.data[9..13]) as usize;
    let next_page_id = LittleEndian::read_u32(&page.data[13..17]);
    let payload_len = LittleEndian::read_u32(&page.data[17..21]) as usize;

    if NODE_HEADER_SIZE + payload_len > PAGE_SIZE {
        return Err(BTreeError::InvalidPageFormat);
    }
    let payload = &page.data[NODE_HEADER_SIZE..NODE_HEADER_SIZE + payload_len];

    match kind {
        KIND_LEAF => {
            let entries = bincode::deserialize(payload)
                .map_err(|e| BTreeError::DeserializationError(e.to_string()))?;
            Ok(BTreeNode::Leaf(LeafNode {
                page_id,
                parent_page_id,
                max_size,
                next_page_id,
                entries,
            }))
        }
        KIND_INTERNAL => {
            let entries = bincode::deserialize(payload)
                .map_err(|e| BTreeError::DeserializationError(e.to_string()))?;
            Ok(BTreeNode::Internal(InternalNode {
                page_id,
                parent_page_id,
                max_size,
                entries,
            }))
        }
        _ => Err(BTreeError::InvalidPageFormat),
    }
}

/// Unwrap a node expected to be a leaf.
pub fn expect_leaf<K>(node: BTreeNode<K>) -> Result<LeafNode<K>, BTreeError> {
    match node {
        BTreeNode::Leaf(leaf) => Ok(leaf),
        BTreeNode::Internal(n) => Err(BTreeError::UnexpectedNodeKind(n.page_id)),
    }
}

/// Unwrap a node expected to be internal.
pub fn expect_internal<K>(node: BTreeNode<K>) -> Result<InternalNode<K>, BTreeError> {
    match node {
        BTreeNode::Internal(internal) => Ok(internal),
        BTreeNode::Leaf(n) => Err(BTreeError::UnexpectedNodeKind(n.page_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::Rid;

    #[test]
    fn test_leaf_round_trip() {
        let mut leaf: LeafNode<i64> = LeafNode::init(7, 3, 4);
        leaf.insert(10, Rid::new(1, 100));
        leaf.insert(20, Rid::new(1, 200));
        leaf.next_page_id = 8;

        let mut page = Page::new(7);
        serialize_node(&BTreeNode::Leaf(leaf), &mut page).unwrap();

        let restored = expect_leaf(deserialize_node::<i64>(&page).unwrap()).unwrap();
        assert_eq!(restored.page_id, 7);
        assert_eq!(restored.parent_page_id, 3);
        assert_eq!(restored.max_size, 3);
        assert_eq!(restored.next_page_id, 8);
        assert_eq!(restored.entries, vec![(10, Rid::new(1, 100)), (20, Rid::new(1, 200))]);
    }

    #[test]
    fn test_internal_round_trip() {
        let mut node: InternalNode<String> = InternalNode::init(9, INVALID_PAGE_ID, 5);
        node.entries = vec![
            ("".to_string(), 100),
            ("k".to_string(), 101),
            ("t".to_string(), 102),
        ];

        let mut page = Page::new(9);
        serialize_node(&BTreeNode::Internal(node), &mut page).unwrap();

        let restored = expect_internal(deserialize_node::<String>(&page).unwrap()).unwrap();
        assert_eq!(restored.page_id, 9);
        assert_eq!(restored.size(), 3);
        assert_eq!(restored.lookup(&"m".to_string()), 101);
    }

    #[test]
    fn test_kind_mismatch_is_an_error() {
        let leaf: LeafNode<i64> = LeafNode::init(7, INVALID_PAGE_ID, 4);
        let mut page = Page::new(7);
        serialize_node(&BTreeNode::Leaf(leaf), &mut page).unwrap();

        let node = deserialize_node::<i64>(&page).unwrap();
        assert!(matches!(expect_internal(node), Err(BTreeError::UnexpectedNodeKind(7))));
    }

    #[test]
    fn test_oversized_node_is_rejected() {
        let mut leaf: LeafNode<String> = LeafNode::init(7, INVALID_PAGE_ID, 4);
        leaf.entries.push(("x".repeat(PAGE_SIZE), Rid::new(1, 1)));

        let mut page = Page::new(7);
        assert!(matches!(
            serialize_node(&BTreeNode::Leaf(leaf), &mut page),
            Err(BTreeError::NodeTooLarge)
        ));
    }
}
