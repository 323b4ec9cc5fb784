// Export public modules
pub mod common;
pub mod storage;
pub mod index;
pub mod transaction;
pub mod catalog;
pub mod query;

// Re-export key items for convenient access
pub use storage::buffer::BufferPoolManager;
pub use storage::buffer::BufferPoolError;
pub use storage::disk::DiskManager;
pub use storage::page::PageManager;
pub use storage::page::PageError;
pub use index::btree::BPlusTree;
pub use transaction::{LockManager, Transaction, TransactionManager, IsolationLevel, TransactionState};
pub use catalog::Catalog;
