use std::marker::PhantomData;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use super::{UnitOfWork, operation_failed, settle};
use crate::error::DbError;
use crate::link::{Link, LinkProvider};
use crate::results::ResultCursor;
use crate::statement::PreparedStatement;
use crate::types::{Concurrency, CursorType};

/// Result processor type of a wrapper built with
/// [`SimplePreparedStatementWrapper::without_results`].
pub type DiscardRows<P> =
    for<'c> fn(&'c mut ResultCursor, &'c P) -> BoxFuture<'c, Result<(), DbError>>;

/// Fixed SQL, a parameter binder, and an optional result processor.
///
/// Yields `None` when the statement produces no rows or no processor was given.
pub struct SimplePreparedStatementWrapper<P, R, B, F> {
    sql: Arc<str>,
    provider: Arc<dyn LinkProvider>,
    binder: B,
    processor: Option<F>,
    _marker: PhantomData<fn(P) -> R>,
}

impl<P, B> SimplePreparedStatementWrapper<P, (), B, DiscardRows<P>>
where
    P: Send + Sync,
    B: Fn(&mut PreparedStatement, &P) -> Result<(), DbError> + Send + Sync,
{
    /// A wrapper that binds and executes but never reads rows.
    pub fn without_results(
        sql: impl Into<String>,
        provider: Arc<dyn LinkProvider>,
        binder: B,
    ) -> Self {
        let sql: String = sql.into();
        Self {
            sql: Arc::from(sql),
            provider,
            binder,
            processor: None,
            _marker: PhantomData,
        }
    }
}

impl<P, R, B, F> SimplePreparedStatementWrapper<P, R, B, F>
where
    P: Send + Sync,
    R: Send,
    B: Fn(&mut PreparedStatement, &P) -> Result<(), DbError> + Send + Sync,
    F: for<'c> Fn(&'c mut ResultCursor, &'c P) -> BoxFuture<'c, Result<R, DbError>> + Send + Sync,
{
    pub fn new(
        sql: impl Into<String>,
        provider: Arc<dyn LinkProvider>,
        binder: B,
        processor: F,
    ) -> Self {
        let sql: String = sql.into();
        Self {
            sql: Arc::from(sql),
            provider,
            binder,
            processor: Some(processor),
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Run on a fresh link inside its own transaction.
    ///
    /// # Errors
    /// Returns the binder's or processor's error, or a translated driver failure. The link has
    /// been rolled back and closed by the time the error is returned.
    pub async fn execute(&self, params: P) -> Result<Option<R>, DbError> {
        let mut unit = UnitOfWork::begin(&self.provider).await?;
        let outcome = match unit.link() {
            Ok(link) => self.execute_on(link, &params).await,
            Err(err) => Err(err),
        };
        unit.finish(outcome).await
    }

    /// Run on a caller-managed link. Does not commit, roll back or close it.
    ///
    /// # Errors
    /// Returns the binder's or processor's error, or a translated driver failure.
    pub async fn execute_on(&self, link: &mut dyn Link, params: &P) -> Result<Option<R>, DbError> {
        let handle = link
            .prepare_statement_with(&self.sql, CursorType::ForwardOnly, Concurrency::ReadOnly)
            .await
            .map_err(|e| operation_failed("", "Failed to prepare a statement", &self.sql, e))?;
        let mut stmt = PreparedStatement::new(handle, Arc::clone(&self.sql));
        let outcome = self.bind_and_run(&mut stmt, params).await;
        let closed = stmt
            .close()
            .await
            .map_err(|e| operation_failed("", "Failed to close a prepared statement", &self.sql, e));
        settle(outcome, closed)
    }

    async fn bind_and_run(
        &self,
        stmt: &mut PreparedStatement,
        params: &P,
    ) -> Result<Option<R>, DbError> {
        (self.binder)(stmt, params)?;
        let Some(mut cursor) = stmt.execute().await? else {
            return Ok(None);
        };
        let processed = match &self.processor {
            Some(processor) => processor(&mut cursor, params).await.map(Some),
            None => Ok(None),
        };
        let closed = cursor.close().await;
        settle(processed, closed)
    }
}
