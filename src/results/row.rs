use std::collections::HashMap;
use std::sync::Arc;

use crate::types::SqlValue;

/// Column names of a result set and a name-to-position lookup, shared by every row.
#[derive(Debug, Default)]
pub(crate) struct Columns {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl Columns {
    pub(crate) fn new(names: Vec<String>) -> Self {
        let mut positions = HashMap::with_capacity(names.len());
        for (at, name) in names.iter().enumerate() {
            // first occurrence wins for duplicate labels
            positions.entry(name.clone()).or_insert(at);
        }
        Self { names, positions }
    }

    pub(crate) fn names(&self) -> &[String] {
        &self.names
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }
}

/// One materialized row. Lookups by index are 0-based, unlike the 1-based cursor getters.
#[derive(Debug, Clone)]
pub struct CustomDbRow {
    columns: Arc<Columns>,
    pub values: Vec<SqlValue>,
}

impl CustomDbRow {
    pub(crate) fn new(columns: Arc<Columns>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        self.columns.names()
    }

    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        self.columns.position(column_name)
    }

    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&SqlValue> {
        self.values.get(self.get_column_index(column_name)?)
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    pub(crate) fn shares_columns_with(&self, other: &CustomDbRow) -> bool {
        Arc::ptr_eq(&self.columns, &other.columns)
    }
}
