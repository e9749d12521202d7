use std::marker::PhantomData;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use super::{UnitOfWork, operation_failed, settle};
use crate::error::DbError;
use crate::link::{Link, LinkProvider};
use crate::statement::PreparedStatement;
use crate::types::{Concurrency, CursorType};

/// Runs a processor against a freshly prepared statement.
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use sql_statement_pool::prelude::*;
/// # async fn demo(provider: Arc<dyn LinkProvider>) -> Result<(), DbError> {
/// let count_orders = PreparedStatementWrapper::new(
///     "[orders]",
///     provider,
///     |stmt: &mut PreparedStatement, customer: i64| {
///         Box::pin(async move {
///             stmt.set_i64(1, customer)?;
///             let mut rows = stmt.execute_query().await?;
///             let count = if rows.next().await? { rows.get_i64(1)? } else { None };
///             rows.close().await?;
///             Ok::<_, DbError>(count.unwrap_or(0))
///         })
///     },
/// );
/// let n = count_orders
///     .execute("SELECT count(*) FROM orders WHERE customer_id = ?", 42)
///     .await?;
/// # let _ = n;
/// # Ok(())
/// # }
/// ```
pub struct PreparedStatementWrapper<P, R, F> {
    log_prefix: String,
    provider: Arc<dyn LinkProvider>,
    processor: F,
    _marker: PhantomData<fn(P) -> R>,
}

impl<P, R, F> PreparedStatementWrapper<P, R, F>
where
    P: Send,
    R: Send,
    F: for<'s> Fn(&'s mut PreparedStatement, P) -> BoxFuture<'s, Result<R, DbError>>
        + Send
        + Sync,
{
    pub fn new(log_prefix: impl Into<String>, provider: Arc<dyn LinkProvider>, processor: F) -> Self {
        Self {
            log_prefix: log_prefix.into(),
            provider,
            processor,
            _marker: PhantomData,
        }
    }

    /// Run on a fresh link inside its own transaction.
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
        let handle = link
            .prepare_statement_with(sql, CursorType::ForwardOnly, Concurrency::ReadOnly)
            .await
            .map_err(|e| operation_failed(&self.log_prefix, "Failed to prepare a statement", sql, e))?;
        let mut stmt = PreparedStatement::new(handle, Arc::from(sql));
        let outcome = (self.processor)(&mut stmt, params).await;
        let closed = stmt
            .close()
            .await
            .map_err(|e| operation_failed(&self.log_prefix, "Failed to close a prepared statement", sql, e));
        settle(outcome, closed)
    }
}
