use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::common::types::PAGE_SIZE;
use crate::index::btree::{BPlusTree, BTreeError};
use crate::query::executor::result::{DataValue, Row};
use crate::storage::buffer::BufferPoolManager;
use crate::storage::table::heap::{TableHeap, TableHeapError};
use super::schema::Schema;

pub type TableOid = u32;
pub type IndexOid = u32;

// Keep index nodes comfortably inside a page with bincode-encoded values.
const DEFAULT_LEAF_MAX: usize = PAGE_SIZE / 64;
const DEFAULT_INTERNAL_MAX: usize = PAGE_SIZE / 32;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Table {0} already exists")]
    DuplicateTable(String),

    #[error("Table {0} does not exist")]
    UnknownTable(String),

    #[error("Index {0} already exists on table {1}")]
    DuplicateIndex(String, String),

    #[error("Column {0} does not exist")]
    UnknownColumn(String),

    #[error("Failed to decode tuple: {0}")]
    TupleDecode(String),

    #[error("Table heap error: {0}")]
    TableHeapError(#[from] TableHeapError),

    #[error("Index error: {0}")]
    BTreeError(#[from] BTreeError),
}

/// Metadata about a table. The catalog owns the heap; executors borrow it.
pub struct TableInfo {
    pub schema: Schema,
    pub name: String,
    pub heap: TableHeap,
    pub oid: TableOid,
}

/// Metadata about an index: a unique-key B+tree over one column.
pub struct IndexInfo {
    pub name: String,
    pub table_name: String,
    pub key_column: String,
    pub index: BPlusTree<DataValue>,
    pub oid: IndexOid,
}

/// In-memory catalog: tables keyed by name and oid, indexes keyed by
/// `(table_name, index_name)` and oid. Oids are dense, monotonic and
/// per-process.
pub struct Catalog {
    buffer_pool: Arc<BufferPoolManager>,
    tables: HashMap<TableOid, TableInfo>,
    table_names: HashMap<String, TableOid>,
    next_table_oid: TableOid,
    indexes: HashMap<IndexOid, IndexInfo>,
    index_names: HashMap<String, HashMap<String, IndexOid>>,
    next_index_oid: IndexOid,
}

impl Catalog {
    pub fn new(buffer_pool: Arc<BufferPoolManager>) -> Self {
        Self {
            buffer_pool,
            tables: HashMap::new(),
            table_names: HashMap::new(),
            next_table_oid: 0,
            indexes: HashMap::new(),
            index_names: HashMap::new(),
            next_index_oid: 0,
        }
    }

    /// Create a table with a fresh heap.
    pub fn create_table(
        &mut self,
        name: impl Into<String>,
        schema: Schema,
    ) -> Result<&TableInfo, CatalogError> {
        let name = name.into();
        if self.table_names.contains_key(&name) {
            return Err(CatalogError::DuplicateTable(name));
        }

        let oid = self.next_table_oid;
        self.next_table_oid += 1;

        let heap = TableHeap::new(self.buffer_pool.clone())?;
        let info = TableInfo {
            schema,
            name: name.clone(),
            heap,
            oid,
        };
        self.tables.insert(oid, info);
        self.table_names.insert(name, oid);

        Ok(&self.tables[&oid])
    }

    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.table_names.get(name).map(|oid| &self.tables[oid])
    }

    pub fn table_by_oid(&self, oid: TableOid) -> Option<&TableInfo> {
        self.tables.get(&oid)
    }

    /// Create an index over one column and backfill it from the table's
    /// existing tuples. Keys are unique; on duplicates the first tuple
    /// wins, matching the index's insert semantics.
    pub fn create_index(
        &mut self,
        index_name: impl Into<String>,
        table_name: &str,
        key_column: &str,
    ) -> Result<&IndexInfo, CatalogError> {
        let index_name = index_name.into();

        let table_oid = *self
            .table_names
            .get(table_name)
            .ok_or_else(|| CatalogError::UnknownTable(table_name.to_string()))?;
        let table = &self.tables[&table_oid];

        if self
            .index_names
            .get(table_name)
            .is_some_and(|m| m.contains_key(&index_name))
        {
            return Err(CatalogError::DuplicateIndex(
                index_name,
                table_name.to_string(),
            ));
        }

        let column_index = table
            .schema
            .column_index(key_column)
            .ok_or_else(|| CatalogError::UnknownColumn(key_column.to_string()))?;

        let index = BPlusTree::new(
            index_name.clone(),
            self.buffer_pool.clone(),
            DEFAULT_LEAF_MAX,
            DEFAULT_INTERNAL_MAX,
        )?;

        for item in table.heap.iter() {
            let (rid, bytes) = item?;
            let row: Row = bincode::deserialize(&bytes)
                .map_err(|e| CatalogError::TupleDecode(e.to_string()))?;
            index.insert(row[column_index].clone(), rid)?;
        }

        let oid = self.next_index_oid;
        self.next_index_oid += 1;

        let info = IndexInfo {
            name: index_name.clone(),
            table_name: table_name.to_string(),
            key_column: key_column.to_string(),
            index,
            oid,
        };
        self.indexes.insert(oid, info);
        self.index_names
            .entry(table_name.to_string())
            .or_default()
            .insert(index_name, oid);

        Ok(&self.indexes[&oid])
    }

    pub fn index(&self, table_name: &str, index_name: &str) -> Option<&IndexInfo> {
        let oid = self.index_names.get(table_name)?.get(index_name)?;
        self.indexes.get(oid)
    }

    pub fn index_by_oid(&self, oid: IndexOid) -> Option<&IndexInfo> {
        self.indexes.get(&oid)
    }

    pub fn table_indexes(&self, table_name: &str) -> Vec<&IndexInfo> {
        match self.index_names.get(table_name) {
            Some(map) => map.values().map(|oid| &self.indexes[oid]).collect(),
            None => Vec::new(),
        }
    }
}
