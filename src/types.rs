use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// SQL type code used for typed nulls and out-parameter registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Varchar,
    Boolean,
    Date,
    Time,
    Timestamp,
    Blob,
}

/// Values bound as statement parameters or read back from a cursor.
///
/// Integer and floating point widths are kept apart so a driver can bind exactly
/// the width the caller asked for:
/// ```rust
/// use sql_statement_pool::prelude::*;
///
/// let params = vec![
///     SqlValue::BigInt(1),
///     SqlValue::Text("alice".into()),
///     SqlValue::Null(SqlType::Timestamp),
/// ];
/// assert!(params[2].is_null());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Real(f32),
    Double(f64),
    Text(String),
    Bool(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Blob(Vec<u8>),
    /// NULL carrying the type the driver should bind it as
    Null(SqlType),
}

impl SqlValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(_))
    }

    /// Label used when reporting a failed bind or fetch.
    #[must_use]
    pub fn type_label(&self) -> &'static str {
        match self {
            SqlValue::SmallInt(_) => "short",
            SqlValue::Int(_) => "int",
            SqlValue::BigInt(_) => "long",
            SqlValue::Real(_) => "float",
            SqlValue::Double(_) => "double",
            SqlValue::Text(_) => "string",
            SqlValue::Bool(_) => "boolean",
            SqlValue::Date(_) => "date",
            SqlValue::Time(_) => "time",
            SqlValue::Timestamp(_) => "timestamp",
            SqlValue::Blob(_) => "bytes",
            SqlValue::Null(_) => "null",
        }
    }

    /// Widen any integer variant to `i64`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::SmallInt(v) => Some(i64::from(*v)),
            SqlValue::Int(v) => Some(i64::from(*v)),
            SqlValue::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Real(v) => Some(f64::from(*v)),
            SqlValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let SqlValue::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(value) => Some(*value),
            other => match other.as_i64() {
                Some(1) => Some(true),
                Some(0) => Some(false),
                _ => None,
            },
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            SqlValue::Timestamp(value) => Some(*value),
            SqlValue::Date(value) => value.and_hms_opt(0, 0, 0),
            SqlValue::Text(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
                .ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let SqlValue::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }
}

/// Scrolling behaviour requested for a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CursorType {
    #[default]
    ForwardOnly,
    ScrollInsensitive,
    ScrollSensitive,
}

/// Whether rows of a cursor may be updated in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Concurrency {
    #[default]
    ReadOnly,
    Updatable,
}
