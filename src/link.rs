//! Contracts consumed from the database driver and the connection provider.
//!
//! Nothing in this module is implemented by the crate itself (apart from the test doubles
//! behind the `test-utils` feature). Every async method takes `&mut self`: a link or handle
//! is owned by exactly one task at a time and the borrow checker keeps it that way.

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::error::DriverError;
use crate::types::{Concurrency, CursorType, SqlType, SqlValue};

/// A live session to the database.
#[async_trait]
pub trait Link: Send {
    /// Whether the session is still connected. Invalid links must be discarded.
    async fn is_valid(&mut self) -> bool;

    async fn set_read_only(&mut self, read_only: bool) -> Result<(), DriverError>;

    async fn prepare_statement(&mut self, sql: &str)
    -> Result<Box<dyn PreparedHandle>, DriverError>;

    async fn prepare_statement_with(
        &mut self,
        sql: &str,
        cursor: CursorType,
        concurrency: Concurrency,
    ) -> Result<Box<dyn PreparedHandle>, DriverError>;

    async fn create_statement(
        &mut self,
        cursor: CursorType,
        concurrency: Concurrency,
    ) -> Result<Box<dyn StatementHandle>, DriverError>;

    /// Run a statement that produces no rows, without keeping a handle around.
    async fn execute(&mut self, sql: &str) -> Result<(), DriverError>;

    async fn prepare_call(&mut self, sql: &str) -> Result<Box<dyn CallableHandle>, DriverError>;

    async fn commit(&mut self) -> Result<(), DriverError>;

    async fn rollback(&mut self) -> Result<(), DriverError>;

    async fn close(&mut self) -> Result<(), DriverError>;

    /// Whether this link can prepare and execute parameterized statements.
    ///
    /// Providers that hand out non-SQL sessions return `false`; the execution wrappers refuse
    /// to run on such a link.
    fn supports_statements(&self) -> bool {
        true
    }
}

/// Precompiled statement with positional (1-based) parameters.
#[async_trait]
pub trait PreparedHandle: Send {
    fn bind(&mut self, index: usize, value: SqlValue) -> Result<(), DriverError>;

    fn clear_parameters(&mut self) -> Result<(), DriverError>;

    async fn execute_query(&mut self) -> Result<Box<dyn Cursor>, DriverError>;

    async fn execute_update(&mut self) -> Result<u64, DriverError>;

    async fn execute(&mut self) -> Result<Execution, DriverError>;

    async fn close(&mut self) -> Result<(), DriverError>;
}

/// Handle for ad-hoc SQL text without parameters.
#[async_trait]
pub trait StatementHandle: Send {
    async fn execute_query(&mut self, sql: &str) -> Result<Box<dyn Cursor>, DriverError>;

    async fn execute_update(&mut self, sql: &str) -> Result<u64, DriverError>;

    async fn close(&mut self) -> Result<(), DriverError>;
}

/// Prepared stored-procedure call with out parameters.
#[async_trait]
pub trait CallableHandle: PreparedHandle {
    fn register_out(&mut self, index: usize, sql_type: SqlType) -> Result<(), DriverError>;

    fn out_value(&self, index: usize) -> Result<SqlValue, DriverError>;
}

/// Forward cursor over a result set. Columns are 1-based.
#[async_trait]
pub trait Cursor: Send {
    /// Advance to the next row; `false` once the rows are exhausted.
    async fn next(&mut self) -> Result<bool, DriverError>;

    fn value(&self, column: usize) -> Result<SqlValue, DriverError>;

    fn column_names(&self) -> Result<Vec<String>, DriverError>;

    async fn close(&mut self) -> Result<(), DriverError>;
}

/// Outcome of a generic `execute`.
pub enum Execution {
    Rows(Box<dyn Cursor>),
    Updated(u64),
}

impl std::fmt::Debug for Execution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rows(_) => f.debug_tuple("Rows").field(&"<Cursor>").finish(),
            Self::Updated(n) => f.debug_tuple("Updated").field(n).finish(),
        }
    }
}

/// Source of new links and of the background context housekeeping runs on.
#[async_trait]
pub trait LinkProvider: Send + Sync + 'static {
    async fn new_link(&self) -> Result<Box<dyn Link>, DriverError>;

    /// Submit a fire-and-forget task. Must not block the caller.
    fn run_async(&self, task: BoxFuture<'static, ()>);
}
