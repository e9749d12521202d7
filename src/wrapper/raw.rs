use std::marker::PhantomData;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use super::{UnitOfWork, operation_failed, settle};
use crate::error::DbError;
use crate::link::{Link, LinkProvider};
use crate::results::ResultCursor;
use crate::types::{Concurrency, CursorType};

/// Runs SQL without parameters on an ad-hoc statement and hands the cursor to a processor.
pub struct StatementWrapper<P, R, F> {
    log_prefix: String,
    provider: Arc<dyn LinkProvider>,
    processor: F,
    _marker: PhantomData<fn(P) -> R>,
}

impl<P, R, F> StatementWrapper<P, R, F>
where
    P: Send,
    R: Send,
    F: for<'c> Fn(&'c mut ResultCursor, P) -> BoxFuture<'c, Result<R, DbError>> + Send + Sync,
{
    pub fn new(log_prefix: impl Into<String>, provider: Arc<dyn LinkProvider>, processor: F) -> Self {
        Self {
            log_prefix: log_prefix.into(),
            provider,
            processor,
            _marker: PhantomData,
        }
    }

    /// Run on a fresh link inside its own transaction. Commits exactly once on success.
    ///
    /// # Errors
    /// Returns the processor's error or a translated driver failure. The link has been rolled
    /// back and closed by the time the error is returned.
    pub async fn execute(&self, sql: &str, params: P) -> Result<R, DbError> {
        let mut unit = UnitOfWork::begin(&self.provider).await?;
        let outcome = match unit.link() {
            Ok(link) => self.execute_on(link, sql, params).await,
            Err(err) => Err(err),
        };
        unit.finish(outcome).await
    }

    /// Run on a caller-managed link. Does not commit, roll back or close it.
    ///
    /// # Errors
    /// Returns the processor's error or a translated driver failure.
    pub async fn execute_on(&self, link: &mut dyn Link, sql: &str, params: P) -> Result<R, DbError> {
        let prefix = self.log_prefix.as_str();
        let mut stmt = link
            .create_statement(CursorType::ForwardOnly, Concurrency::ReadOnly)
            .await
            .map_err(|e| operation_failed(prefix, "Failed to create a statement", sql, e))?;

        let outcome = match stmt.execute_query(sql).await {
            Ok(cursor) => {
                let mut cursor = ResultCursor::new(cursor);
                let processed = (self.processor)(&mut cursor, params).await;
                let closed = cursor.close().await;
                settle(processed, closed)
            }
            Err(e) => Err(operation_failed(prefix, "Failed to execute a query", sql, e)),
        };

        let closed = stmt
            .close()
            .await
            .map_err(|e| operation_failed(prefix, "Failed to close a statement", sql, e));
        settle(outcome, closed)
    }
}
