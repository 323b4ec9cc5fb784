pub mod error;
pub mod node;
pub mod index;
pub mod serialization;

pub use error::BTreeError;
pub use index::BPlusTree;
pub use index::range_scan::BTreeRangeIter;
pub use node::{BTreeNode, InternalNode, LeafNode};
pub use serialization::{deserialize_node, serialize_node};
