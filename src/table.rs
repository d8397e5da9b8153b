//! The relational view of a zone's children that a query runs against.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::construct::{AttributesMap, OtherHasher};
use crate::datatype::Value;
use crate::error::{AtlasError, Result};
use crate::result::ResultSet;

// ------------- TableRow -------------
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    columns: Vec<Value>,
}
impl TableRow {
    pub fn new(columns: Vec<Value>) -> Self {
        Self { columns }
    }
    pub fn len(&self) -> usize {
        self.columns.len()
    }
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.columns.get(index)
    }
    pub fn values(&self) -> &[Value] {
        &self.columns
    }
}

// ------------- Table -------------
/// Column names are sorted; every row has exactly one value per column.
#[derive(Debug, Clone)]
pub struct Table {
    columns: Arc<Vec<String>>,
    index: Arc<HashMap<String, usize, OtherHasher>>,
    rows: Vec<TableRow>,
}

impl Table {
    /// One row per child, one column per attribute name present in any child.
    /// Missing cells hold the untyped null.
    pub fn from_children(children: &[AttributesMap]) -> Self {
        let names: BTreeSet<&str> = children
            .iter()
            .flat_map(|attributes| attributes.attributes().map(|a| a.name()))
            .collect();
        let columns: Vec<String> = names.into_iter().map(String::from).collect();
        let index = columns.iter().enumerate().map(|(i, c)| (c.clone(), i)).collect();
        let rows = children
            .iter()
            .map(|attributes| {
                TableRow::new(
                    columns
                        .iter()
                        .map(|c| attributes.get_or_none(c).cloned().unwrap_or(Value::Null))
                        .collect(),
                )
            })
            .collect();
        Self { columns: Arc::new(columns), index: Arc::new(index), rows }
    }
    /// A table with the same columns and no rows.
    pub fn empty_like(other: &Table) -> Self {
        Self { columns: Arc::clone(&other.columns), index: Arc::clone(&other.index), rows: Vec::new() }
    }
    pub fn append_row(&mut self, row: TableRow) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(AtlasError::Invariant(format!(
                "row with {} values appended to a table with {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }
    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }
    pub fn len(&self) -> usize {
        self.rows.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
    /// All values of one column, in row order. Query attributes are not data
    /// and cannot be read as columns.
    pub fn column(&self, name: &str) -> Result<Vec<Value>> {
        reject_query_attribute(name)?;
        match self.column_index(name) {
            Some(i) => Ok(self.rows.iter().map(|row| row.columns[i].clone()).collect()),
            None => Ok(vec![Value::Null; self.rows.len()]),
        }
    }
    /// Reorders rows by the given permutation of row indices.
    pub fn reorder(&mut self, order: &[usize]) -> Result<()> {
        if order.len() != self.rows.len() {
            return Err(AtlasError::Invariant("row permutation has the wrong length".into()));
        }
        let mut rows = Vec::with_capacity(order.len());
        for &i in order {
            let row = self
                .rows
                .get(i)
                .ok_or_else(|| AtlasError::Invariant(format!("row {i} out of range")))?;
            rows.push(row.clone());
        }
        self.rows = rows;
        Ok(())
    }
}

fn reject_query_attribute(name: &str) -> Result<()> {
    if name.starts_with('&') {
        return Err(AtlasError::NoSuchAttribute(name.to_string()));
    }
    Ok(())
}

// ------------- Environment -------------
/// Resolves identifiers while evaluating. Per-row evaluation (WHERE, ORDER BY)
/// sees single values; whole-table evaluation (SELECT) sees columns.
#[derive(Debug, Clone, Copy)]
pub enum Environment<'t> {
    Row { row: &'t TableRow, table: &'t Table },
    Table(&'t Table),
}

impl<'t> Environment<'t> {
    pub fn row(row: &'t TableRow, table: &'t Table) -> Self {
        Environment::Row { row, table }
    }
    pub fn table(table: &'t Table) -> Self {
        Environment::Table(table)
    }
    /// An identifier no child carries resolves to null.
    pub fn resolve(&self, name: &str) -> Result<ResultSet> {
        reject_query_attribute(name)?;
        match self {
            Environment::Row { row, table } => {
                let value = table
                    .column_index(name)
                    .and_then(|i| row.get(i))
                    .cloned()
                    .unwrap_or(Value::Null);
                Ok(ResultSet::Single(value))
            }
            Environment::Table(table) => Ok(ResultSet::Column(table.column(name)?)),
        }
    }
}
