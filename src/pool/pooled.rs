use std::sync::Arc;

use super::{PoolEntry, PoolShared};
use crate::error::{DbError, DriverResultExt};
use crate::results::ResultCursor;
use crate::statement::{ParamSetter, bind_param};
use crate::types::SqlValue;

/// A prepared statement checked out of a [`StatementPool`](super::StatementPool).
///
/// Owns its link until handed back with [`close`](Self::close). Dropping it has the same
/// effect, so a statement cannot escape the housekeeping cycle.
pub struct PooledStatement {
    shared: Arc<PoolShared>,
    entry: Option<PoolEntry>,
}

impl std::fmt::Debug for PooledStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledStatement")
            .field("id", &self.id())
            .field("sql", &self.shared.sql)
            .finish()
    }
}

impl PooledStatement {
    pub(crate) fn new(shared: Arc<PoolShared>, entry: PoolEntry) -> Self {
        Self {
            shared,
            entry: Some(entry),
        }
    }

    /// Identifier of the underlying pooled entry. Stable across housekeeping cycles, so two
    /// checkouts reporting the same id used the same link.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.entry.as_ref().map_or(0, |entry| entry.id)
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.shared.sql
    }

    /// # Errors
    /// Returns [`DbError::Operation`] if the driver fails to run the query.
    pub async fn execute_query(&mut self) -> Result<ResultCursor, DbError> {
        let sql = Arc::clone(&self.shared.sql);
        let entry = self.entry_mut()?;
        let cursor = entry
            .handle
            .execute_query()
            .await
            .or_db(|| format!("Failed to execute a query statement; SQL: {sql}"))?;
        Ok(ResultCursor::new(cursor))
    }

    /// # Errors
    /// Returns [`DbError::Operation`] if the driver cannot reset the parameters.
    pub fn clear_parameters(&mut self) -> Result<(), DbError> {
        self.entry_mut()?
            .handle
            .clear_parameters()
            .or_db(|| "Failed to clear query parameters".to_string())
    }

    /// Hand the statement back to its pool.
    ///
    /// Does not close anything itself: the pool's housekeeping task commits the link and
    /// re-prepares the statement in the background before the statement is reused.
    pub fn close(mut self) {
        self.hand_back();
    }

    fn hand_back(&mut self) {
        if let Some(entry) = self.entry.take() {
            self.shared.schedule_housekeeping(entry);
        }
    }

    fn entry_mut(&mut self) -> Result<&mut PoolEntry, DbError> {
        self.entry
            .as_mut()
            .ok_or_else(|| DbError::config("pooled statement already handed back"))
    }
}

impl ParamSetter for PooledStatement {
    fn set_value(&mut self, index: usize, value: SqlValue) -> Result<(), DbError> {
        let entry = self.entry_mut()?;
        bind_param(entry.handle.as_mut(), index, value)
    }
}

impl Drop for PooledStatement {
    fn drop(&mut self) {
        self.hand_back();
    }
}
