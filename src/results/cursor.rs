use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use super::result_set::ResultSet;
use crate::error::{DbError, DriverError, DriverResultExt};
use crate::link::Cursor;
use crate::types::SqlValue;

/// Result cursor handed to processors and returned by pooled statements.
///
/// Wraps the driver cursor so that every failure surfaces as [`DbError`]. Typed getters take
/// a 1-based column and return `None` for SQL NULL.
pub struct ResultCursor {
    cursor: Box<dyn Cursor>,
    last_was_null: bool,
    closed: bool,
}

impl std::fmt::Debug for ResultCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCursor")
            .field("last_was_null", &self.last_was_null)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl ResultCursor {
    pub(crate) fn new(cursor: Box<dyn Cursor>) -> Self {
        Self {
            cursor,
            last_was_null: false,
            closed: false,
        }
    }

    /// Step to the next row.
    ///
    /// # Errors
    /// Returns [`DbError::Operation`] if the driver fails to advance.
    pub async fn next(&mut self) -> Result<bool, DbError> {
        self.cursor
            .next()
            .await
            .or_db(|| "Failed to step to the next row of the result set".to_string())
    }

    /// Whether the last value fetched was SQL NULL.
    #[must_use]
    pub fn was_null(&self) -> bool {
        self.last_was_null
    }

    /// # Errors
    /// Returns [`DbError::Operation`] if the driver cannot describe the columns.
    pub fn column_names(&self) -> Result<Vec<String>, DbError> {
        self.cursor
            .column_names()
            .or_db(|| "Failed to read the column names of the result set".to_string())
    }

    /// Raw value of a column in the current row, NULL included.
    ///
    /// # Errors
    /// Returns [`DbError::Operation`] if the driver cannot produce the value.
    pub fn get_value(&mut self, column: usize) -> Result<SqlValue, DbError> {
        let value = self
            .cursor
            .value(column)
            .or_db(|| format!("Failed to get a value from column {column} of the result set"))?;
        self.last_was_null = value.is_null();
        Ok(value)
    }

    pub fn get_i64(&mut self, column: usize) -> Result<Option<i64>, DbError> {
        self.fetch(column, "long", |v| v.as_i64().ok_or_else(|| mismatch(&v)))
    }

    pub fn get_i32(&mut self, column: usize) -> Result<Option<i32>, DbError> {
        self.fetch(column, "int", |v| {
            let wide = v.as_i64().ok_or_else(|| mismatch(&v))?;
            Ok(i32::try_from(wide)?)
        })
    }

    pub fn get_i16(&mut self, column: usize) -> Result<Option<i16>, DbError> {
        self.fetch(column, "short", |v| {
            let wide = v.as_i64().ok_or_else(|| mismatch(&v))?;
            Ok(i16::try_from(wide)?)
        })
    }

    pub fn get_f64(&mut self, column: usize) -> Result<Option<f64>, DbError> {
        self.fetch(column, "double", |v| v.as_f64().ok_or_else(|| mismatch(&v)))
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn get_f32(&mut self, column: usize) -> Result<Option<f32>, DbError> {
        self.fetch(column, "float", |v| match v {
            SqlValue::Real(x) => Ok(x),
            SqlValue::Double(x) => Ok(x as f32),
            other => Err(mismatch(&other)),
        })
    }

    pub fn get_string(&mut self, column: usize) -> Result<Option<String>, DbError> {
        self.fetch(column, "string", |v| match v {
            SqlValue::Text(s) => Ok(s),
            other => Err(mismatch(&other)),
        })
    }

    pub fn get_bool(&mut self, column: usize) -> Result<Option<bool>, DbError> {
        self.fetch(column, "boolean", |v| v.as_bool().ok_or_else(|| mismatch(&v)))
    }

    pub fn get_date(&mut self, column: usize) -> Result<Option<NaiveDate>, DbError> {
        self.fetch(column, "date", |v| match v {
            SqlValue::Date(d) => Ok(d),
            SqlValue::Timestamp(ts) => Ok(ts.date()),
            other => Err(mismatch(&other)),
        })
    }

    pub fn get_time(&mut self, column: usize) -> Result<Option<NaiveTime>, DbError> {
        self.fetch(column, "time", |v| match v {
            SqlValue::Time(t) => Ok(t),
            SqlValue::Timestamp(ts) => Ok(ts.time()),
            other => Err(mismatch(&other)),
        })
    }

    pub fn get_timestamp(&mut self, column: usize) -> Result<Option<NaiveDateTime>, DbError> {
        self.fetch(column, "timestamp", |v| {
            v.as_timestamp().ok_or_else(|| mismatch(&v))
        })
    }

    pub fn get_bytes(&mut self, column: usize) -> Result<Option<Vec<u8>>, DbError> {
        self.fetch(column, "bytes", |v| match v {
            SqlValue::Blob(b) => Ok(b),
            other => Err(mismatch(&other)),
        })
    }

    /// Drain the remaining rows into memory. The cursor stays open.
    ///
    /// # Errors
    /// Returns [`DbError::Operation`] if stepping or reading a value fails.
    pub async fn fetch_all(&mut self) -> Result<ResultSet, DbError> {
        let mut result_set = ResultSet::new(self.column_names()?);
        let width = result_set.column_names().len();
        while self.next().await? {
            let values = (1..=width)
                .map(|column| self.get_value(column))
                .collect::<Result<Vec<_>, _>>()?;
            result_set.push_row(values);
        }
        Ok(result_set)
    }

    /// Drain the remaining rows and close the cursor.
    ///
    /// # Errors
    /// Returns the fetch failure if there was one, otherwise any close failure.
    pub async fn into_result_set(mut self) -> Result<ResultSet, DbError> {
        let fetched = self.fetch_all().await;
        let closed = self.close().await;
        let result_set = fetched?;
        closed?;
        Ok(result_set)
    }

    /// Close the underlying cursor. Closing twice is a no-op.
    ///
    /// # Errors
    /// Returns [`DbError::Operation`] if the driver fails to close the cursor.
    pub async fn close(&mut self) -> Result<(), DbError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.cursor
            .close()
            .await
            .or_db(|| "Failed to close the result set".to_string())
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn fetch<T>(
        &mut self,
        column: usize,
        label: &'static str,
        convert: impl FnOnce(SqlValue) -> Result<T, DriverError>,
    ) -> Result<Option<T>, DbError> {
        let value = self
            .cursor
            .value(column)
            .or_db(|| fetch_reason(label, column))?;
        self.last_was_null = value.is_null();
        if self.last_was_null {
            return Ok(None);
        }
        convert(value).map(Some).or_db(|| fetch_reason(label, column))
    }
}

fn fetch_reason(label: &str, column: usize) -> String {
    let article = if label.starts_with(['a', 'e', 'i', 'o', 'u']) {
        "an"
    } else {
        "a"
    };
    format!("Failed to get {article} {label} value from column {column} of the result set")
}

fn mismatch(value: &SqlValue) -> DriverError {
    format!("column holds a {} value", value.type_label()).into()
}
