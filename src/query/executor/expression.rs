use crate::catalog::Schema;
use super::result::{DataValue, Row};
use super::ExecutionError;

/// Expression tree evaluated against one row at a time.
pub trait Expression: Send + Sync {
    fn evaluate(&self, row: &Row, schema: &Schema) -> Result<DataValue, ExecutionError>;
}

/// Reads one column of the input row.
pub struct ColumnValueExpression {
    column: String,
}

impl ColumnValueExpression {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
        }
    }
}

impl Expression for ColumnValueExpression {
    fn evaluate(&self, row: &Row, schema: &Schema) -> Result<DataValue, ExecutionError> {
        let index = schema
            .column_index(&self.column)
            .ok_or_else(|| ExecutionError::UnknownColumn(self.column.clone()))?;
        Ok(row[index].clone())
    }
}

/// A literal.
pub struct ConstantExpression {
    value: DataValue,
}

impl ConstantExpression {
    pub fn new(value: DataValue) -> Self {
        Self { value }
    }
}

impl Expression for ConstantExpression {
    fn evaluate(&self, _row: &Row, _schema: &Schema) -> Result<DataValue, ExecutionError> {
        Ok(self.value.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// Compares two sub-expressions, yielding a boolean.
pub struct ComparisonExpression {
    op: ComparisonOp,
    left: Box<dyn Expression>,
    right: Box<dyn Expression>,
}

impl ComparisonExpression {
    pub fn new(op: ComparisonOp, left: Box<dyn Expression>, right: Box<dyn Expression>) -> Self {
        Self { op, left, right }
    }
}

impl Expression for ComparisonExpression {
    fn evaluate(&self, row: &Row, schema: &Schema) -> Result<DataValue, ExecutionError> {
        let left = self.left.evaluate(row, schema)?;
        let right = self.right.evaluate(row, schema)?;

        let result = match self.op {
            ComparisonOp::Eq => left == right,
            ComparisonOp::NotEq => left != right,
            ComparisonOp::Lt => left < right,
            ComparisonOp::LtEq => left <= right,
            ComparisonOp::Gt => left > right,
            ComparisonOp::GtEq => left >= right,
        };
        Ok(DataValue::Boolean(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, DataType};

    fn test_schema() -> Schema {
        Schema::new(vec![
            Column::new("id", DataType::Integer),
            Column::new("name", DataType::Text),
        ])
    }

    #[test]
    fn test_column_reference() {
        let schema = test_schema();
        let row = vec![DataValue::Integer(7), DataValue::Text("x".into())];

        let expr = ColumnValueExpression::new("name");
        assert_eq!(expr.evaluate(&row, &schema).unwrap(), DataValue::Text("x".into()));

        let missing = ColumnValueExpression::new("nope");
        assert!(matches!(
            missing.evaluate(&row, &schema),
            Err(ExecutionError::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_comparison() {
        let schema = test_schema();
        let row = vec![DataValue::Integer(7), DataValue::Text("x".into())];

        let expr = ComparisonExpression::new(
            ComparisonOp::Gt,
            Box::new(ColumnValueExpression::new("id")),
            Box::new(ConstantExpression::new(DataValue::Integer(5))),
        );
        assert_eq!(expr.evaluate(&row, &schema).unwrap(), DataValue::Boolean(true));
    }
}
