use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{DbError, DriverError, DriverResultExt};
use crate::link::{CallableHandle, Execution, Link, PreparedHandle};
use crate::results::ResultCursor;
use crate::types::{SqlType, SqlValue};

/// Positional parameter setters shared by every statement type.
///
/// Positions are 1-based. A failed bind is reported as
/// "Failed to set <type> query parameter at position <n>".
pub trait ParamSetter {
    /// # Errors
    /// Returns [`DbError::Operation`] if the driver rejects the value.
    fn set_value(&mut self, index: usize, value: SqlValue) -> Result<(), DbError>;

    fn set_i16(&mut self, index: usize, x: i16) -> Result<(), DbError> {
        self.set_value(index, SqlValue::SmallInt(x))
    }

    fn set_i32(&mut self, index: usize, x: i32) -> Result<(), DbError> {
        self.set_value(index, SqlValue::Int(x))
    }

    fn set_i64(&mut self, index: usize, x: i64) -> Result<(), DbError> {
        self.set_value(index, SqlValue::BigInt(x))
    }

    fn set_f32(&mut self, index: usize, x: f32) -> Result<(), DbError> {
        self.set_value(index, SqlValue::Real(x))
    }

    fn set_f64(&mut self, index: usize, x: f64) -> Result<(), DbError> {
        self.set_value(index, SqlValue::Double(x))
    }

    fn set_string(&mut self, index: usize, x: &str) -> Result<(), DbError> {
        self.set_value(index, SqlValue::Text(x.to_owned()))
    }

    fn set_bool(&mut self, index: usize, x: bool) -> Result<(), DbError> {
        self.set_value(index, SqlValue::Bool(x))
    }

    fn set_date(&mut self, index: usize, x: NaiveDate) -> Result<(), DbError> {
        self.set_value(index, SqlValue::Date(x))
    }

    fn set_time(&mut self, index: usize, x: NaiveTime) -> Result<(), DbError> {
        self.set_value(index, SqlValue::Time(x))
    }

    fn set_timestamp(&mut self, index: usize, x: NaiveDateTime) -> Result<(), DbError> {
        self.set_value(index, SqlValue::Timestamp(x))
    }

    fn set_bytes(&mut self, index: usize, x: &[u8]) -> Result<(), DbError> {
        self.set_value(index, SqlValue::Blob(x.to_vec()))
    }

    /// Bind NULL, telling the driver which type the column has.
    fn set_null(&mut self, index: usize, sql_type: SqlType) -> Result<(), DbError> {
        self.set_value(index, SqlValue::Null(sql_type))
    }
}

pub(crate) fn bind_param<H>(handle: &mut H, index: usize, value: SqlValue) -> Result<(), DbError>
where
    H: PreparedHandle + ?Sized,
{
    let label = value.type_label();
    handle
        .bind(index, value)
        .or_db(|| format!("Failed to set {label} query parameter at position {index}"))
}

/// Prepared statement handed to statement processors for the duration of one call.
pub struct PreparedStatement {
    handle: Box<dyn PreparedHandle>,
    sql: Arc<str>,
}

impl std::fmt::Debug for PreparedStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedStatement")
            .field("sql", &self.sql)
            .finish_non_exhaustive()
    }
}

impl PreparedStatement {
    pub(crate) fn new(handle: Box<dyn PreparedHandle>, sql: Arc<str>) -> Self {
        Self { handle, sql }
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// # Errors
    /// Returns [`DbError::Operation`] if the driver fails to run the query.
    pub async fn execute_query(&mut self) -> Result<ResultCursor, DbError> {
        let cursor = self
            .handle
            .execute_query()
            .await
            .or_db(|| format!("Failed to execute a query statement; SQL: {}", self.sql))?;
        Ok(ResultCursor::new(cursor))
    }

    /// # Errors
    /// Returns [`DbError::Operation`] if the driver fails to run the statement.
    pub async fn execute_update(&mut self) -> Result<u64, DbError> {
        self.handle
            .execute_update()
            .await
            .or_db(|| format!("Failed to execute an update statement; SQL: {}", self.sql))
    }

    /// Execute a statement of unknown shape. Yields a cursor only if it produced rows.
    ///
    /// # Errors
    /// Returns [`DbError::Operation`] if the driver fails to run the statement.
    pub async fn execute(&mut self) -> Result<Option<ResultCursor>, DbError> {
        let outcome = self
            .handle
            .execute()
            .await
            .or_db(|| format!("Failed to execute a statement; SQL: {}", self.sql))?;
        Ok(match outcome {
            Execution::Rows(cursor) => Some(ResultCursor::new(cursor)),
            Execution::Updated(_) => None,
        })
    }

    /// # Errors
    /// Returns [`DbError::Operation`] if the driver cannot reset the parameters.
    pub fn clear_parameters(&mut self) -> Result<(), DbError> {
        self.handle
            .clear_parameters()
            .or_db(|| "Failed to clear query parameters".to_string())
    }

    /// Raw driver result; the wrappers attach their own log prefix.
    pub(crate) async fn close(&mut self) -> Result<(), DriverError> {
        self.handle.close().await
    }
}

impl ParamSetter for PreparedStatement {
    fn set_value(&mut self, index: usize, value: SqlValue) -> Result<(), DbError> {
        bind_param(self.handle.as_mut(), index, value)
    }
}

/// Prepared stored-procedure call.
pub struct CallableStatement {
    handle: Box<dyn CallableHandle>,
    sql: Arc<str>,
}

/// Prepare a procedure call on a caller-managed link.
///
/// # Errors
/// Returns [`DbError::Operation`] if the driver cannot prepare the call.
pub async fn prepare_call(link: &mut dyn Link, sql: &str) -> Result<CallableStatement, DbError> {
    let handle = link
        .prepare_call(sql)
        .await
        .or_db(|| format!("Failed to prepare a call; SQL: {sql}"))?;
    Ok(CallableStatement {
        handle,
        sql: Arc::from(sql),
    })
}

impl CallableStatement {
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// # Errors
    /// Returns [`DbError::Operation`] if the driver rejects the registration.
    pub fn register_out(&mut self, index: usize, sql_type: SqlType) -> Result<(), DbError> {
        self.handle
            .register_out(index, sql_type)
            .or_db(|| format!("Failed to register out parameter at position {index}"))
    }

    /// # Errors
    /// Returns [`DbError::Operation`] if the driver fails to run the call.
    pub async fn execute(&mut self) -> Result<Option<ResultCursor>, DbError> {
        let outcome = self
            .handle
            .execute()
            .await
            .or_db(|| format!("Failed to execute a call; SQL: {}", self.sql))?;
        Ok(match outcome {
            Execution::Rows(cursor) => Some(ResultCursor::new(cursor)),
            Execution::Updated(_) => None,
        })
    }

    /// # Errors
    /// Returns [`DbError::Operation`] if the out parameter cannot be read.
    pub fn get_out(&self, index: usize) -> Result<SqlValue, DbError> {
        self.handle
            .out_value(index)
            .or_db(|| format!("Failed to get out parameter at position {index}"))
    }

    /// # Errors
    /// Returns [`DbError::Operation`] if the driver fails to close the call.
    pub async fn close(mut self) -> Result<(), DbError> {
        self.handle
            .close()
            .await
            .or_db(|| format!("Failed to close a call; SQL: {}", self.sql))
    }
}

impl ParamSetter for CallableStatement {
    fn set_value(&mut self, index: usize, value: SqlValue) -> Result<(), DbError> {
        bind_param(self.handle.as_mut(), index, value)
    }
}
