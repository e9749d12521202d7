use std::sync::Arc;

use super::row::{Columns, CustomDbRow};
use crate::types::SqlValue;

/// Rows drained from a cursor into memory.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub results: Vec<CustomDbRow>,
    columns: Arc<Columns>,
}

impl ResultSet {
    #[must_use]
    pub fn new(column_names: Vec<String>) -> Self {
        Self {
            results: Vec::new(),
            columns: Arc::new(Columns::new(column_names)),
        }
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        self.columns.names()
    }

    /// Append a row. `values` are expected in column order.
    pub fn push_row(&mut self, values: Vec<SqlValue>) {
        self.results
            .push(CustomDbRow::new(Arc::clone(&self.columns), values));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl IntoIterator for ResultSet {
    type Item = CustomDbRow;
    type IntoIter = std::vec::IntoIter<CustomDbRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}
