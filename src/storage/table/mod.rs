pub mod heap;

pub use heap::{TableHeap, TableIterator};
