//! Execution wrappers: run one unit of work on its own link and commit or roll back.
//!
//! All three variants share one shape. `execute` acquires a fresh link from the provider,
//! runs the work, commits on success or rolls back on failure, and always closes the link.
//! `execute_on` runs the same work on a caller-managed link and leaves the transaction alone.
//! Prepared and ad-hoc statements are created forward-only and read-only.

mod prepared;
mod raw;
mod simple;
mod unit_of_work;

pub use prepared::PreparedStatementWrapper;
pub use raw::StatementWrapper;
pub use simple::{DiscardRows, SimplePreparedStatementWrapper};
pub use unit_of_work::UnitOfWork;

use crate::error::{DbError, DriverError};

/// Translate a driver failure raised by the wrapper's own calls and log it.
fn operation_failed(prefix: &str, what: &str, sql: &str, source: DriverError) -> DbError {
    let reason = if prefix.is_empty() {
        format!("{what} (SQL: {sql})")
    } else {
        format!("{prefix} {what} (SQL: {sql})")
    };
    let err = DbError::operation(reason, source);
    tracing::error!(error = %err, "database operation error");
    err
}

/// Combine the outcome of the work with the outcome of closing what it used.
///
/// A close failure never hides an earlier failure; it is only returned when the work itself
/// succeeded.
fn settle<R>(outcome: Result<R, DbError>, closed: Result<(), DbError>) -> Result<R, DbError> {
    match (outcome, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            tracing::warn!(error = %close_err, "close failed after an earlier error");
            Err(err)
        }
    }
}
