pub mod expression;
pub mod result;
pub mod scan;

pub use expression::{ColumnValueExpression, ComparisonExpression, ComparisonOp, ConstantExpression, Expression};
pub use result::{DataValue, Row};
pub use scan::SeqScanExecutor;

use thiserror::Error;

use crate::common::types::Rid;
use crate::storage::table::heap::TableHeapError;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Column {0} does not exist")]
    UnknownColumn(String),

    #[error("Predicate evaluated to a non-boolean value")]
    NonBooleanPredicate,

    #[error("Failed to decode tuple: {0}")]
    TupleDecode(String),

    #[error("Table heap error: {0}")]
    TableHeapError(#[from] TableHeapError),
}

/// Pull-based executor: `init` prepares iteration state, `next` yields one
/// output row (and the rid it came from) at a time.
pub trait Executor {
    fn init(&mut self) -> Result<(), ExecutionError>;
    fn next(&mut self) -> Result<Option<(Row, Rid)>, ExecutionError>;
}
