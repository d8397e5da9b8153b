//! Evaluation results come in two shapes: a single value that does not
//! depend on rows, or a column holding one value per row. Operators
//! broadcast singles over columns.

use crate::datatype::{Type, Value, element_type_of};
use crate::error::{AtlasError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum ResultSet {
    Single(Value),
    Column(Vec<Value>),
}

impl ResultSet {
    pub fn is_single(&self) -> bool {
        matches!(self, ResultSet::Single(_))
    }
    /// The value of a single result; a column is an error.
    pub fn value(&self) -> Result<&Value> {
        match self {
            ResultSet::Single(value) => Ok(value),
            ResultSet::Column(_) => Err(AtlasError::InvalidType {
                expected: "a single value".into(),
                actual: "a column".into(),
            }),
        }
    }
    pub fn into_value(self) -> Result<Value> {
        match self {
            ResultSet::Single(value) => Ok(value),
            ResultSet::Column(_) => Err(AtlasError::InvalidType {
                expected: "a single value".into(),
                actual: "a column".into(),
            }),
        }
    }
    /// Element type of a column, or the type of a single value.
    pub fn element_type(&self) -> Result<Type> {
        match self {
            ResultSet::Single(value) => Ok(value.get_type()),
            ResultSet::Column(values) => element_type_of(values),
        }
    }

    /// Applies `op` pairwise. Single with single gives a single; anything
    /// involving a column gives a column, and two columns must have the same
    /// number of rows.
    pub fn binary<F>(&self, right: &ResultSet, op: F) -> Result<ResultSet>
    where
        F: Fn(&Value, &Value) -> Result<Value>,
    {
        match (self, right) {
            (ResultSet::Single(l), ResultSet::Single(r)) => op(l, r).map(ResultSet::Single),
            (ResultSet::Single(l), ResultSet::Column(r)) => {
                r.iter().map(|r| op(l, r)).collect::<Result<Vec<_>>>().map(ResultSet::Column)
            }
            (ResultSet::Column(l), ResultSet::Single(r)) => {
                l.iter().map(|l| op(l, r)).collect::<Result<Vec<_>>>().map(ResultSet::Column)
            }
            (ResultSet::Column(l), ResultSet::Column(r)) => {
                if l.len() != r.len() {
                    return Err(AtlasError::IllegalArgument(format!(
                        "cannot combine columns of {} and {} rows",
                        l.len(),
                        r.len()
                    )));
                }
                l.iter().zip(r).map(|(l, r)| op(l, r)).collect::<Result<Vec<_>>>().map(ResultSet::Column)
            }
        }
    }
    /// Applies `op` to the single value or to every row of the column.
    pub fn unary<F>(&self, op: F) -> Result<ResultSet>
    where
        F: Fn(&Value) -> Result<Value>,
    {
        match self {
            ResultSet::Single(value) => op(value).map(ResultSet::Single),
            ResultSet::Column(values) => values.iter().map(op).collect::<Result<Vec<_>>>().map(ResultSet::Column),
        }
    }
}
