use crate::catalog::TableInfo;
use crate::common::types::Rid;
use crate::storage::table::TableIterator;
use super::expression::Expression;
use super::result::{DataValue, Row};
use super::{ExecutionError, Executor};

/// Sequential scan: walks the table heap's iterator, filters through an
/// optional predicate and projects through the output expressions (or
/// passes rows through unchanged when there are none).
pub struct SeqScanExecutor<'a> {
    table: &'a TableInfo,
    predicate: Option<Box<dyn Expression>>,
    projections: Option<Vec<Box<dyn Expression>>>,
    iter: Option<TableIterator<'a>>,
}

impl<'a> SeqScanExecutor<'a> {
    pub fn new(
        table: &'a TableInfo,
        predicate: Option<Box<dyn Expression>>,
        projections: Option<Vec<Box<dyn Expression>>>,
    ) -> Self {
        Self {
            table,
            predicate,
            projections,
            iter: None,
        }
    }
}

impl Executor for SeqScanExecutor<'_> {
    fn init(&mut self) -> Result<(), ExecutionError> {
        self.iter = Some(self.table.heap.iter());
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Row, Rid)>, ExecutionError> {
        let iter = self.iter.as_mut().expect("init() was not called");

        for item in iter {
            let (rid, bytes) = item?;
            let row: Row = bincode::deserialize(&bytes)
                .map_err(|e| ExecutionError::TupleDecode(e.to_string()))?;

            if let Some(predicate) = &self.predicate {
                match predicate.evaluate(&row, &self.table.schema)? {
                    DataValue::Boolean(true) => {}
                    DataValue::Boolean(false) => continue,
                    _ => return Err(ExecutionError::NonBooleanPredicate),
                }
            }

            let output = match &self.projections {
                Some(exprs) => exprs
                    .iter()
                    .map(|e| e.evaluate(&row, &self.table.schema))
                    .collect::<Result<Row, _>>()?,
                None => row,
            };

            return Ok(Some((output, rid)));
        }

        Ok(None)
    }
}
