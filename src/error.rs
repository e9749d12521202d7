use thiserror::Error;

/// Failure reported by a driver-level call on a [`Link`](crate::link::Link) or one of its handles.
///
/// Callers of this crate never see a `DriverError` on its own: it only travels as the
/// `source` of [`DbError::Operation`].
pub type DriverError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum DbError {
    /// A database operation failed at the driver.
    ///
    /// `reason` names the operation, and where it applies the offending SQL text or
    /// parameter position.
    #[error("{reason}")]
    Operation {
        reason: String,
        #[source]
        source: DriverError,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Other database error: {0}")]
    Other(String),
}

impl DbError {
    /// Wrap a driver failure. The driver's message is appended to `reason`.
    pub fn operation(reason: impl Into<String>, source: DriverError) -> Self {
        let reason = reason.into();
        DbError::Operation {
            reason: format!("{reason}: {source}"),
            source,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        DbError::ConfigError(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        DbError::Other(msg.into())
    }

    #[must_use]
    pub fn is_operation(&self) -> bool {
        matches!(self, DbError::Operation { .. })
    }

    /// Reason text of an operation failure, `None` for the other kinds.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            DbError::Operation { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Attach a reason to a driver-level result.
pub(crate) trait DriverResultExt<T> {
    fn or_db(self, reason: impl FnOnce() -> String) -> Result<T, DbError>;
}

impl<T> DriverResultExt<T> for Result<T, DriverError> {
    fn or_db(self, reason: impl FnOnce() -> String) -> Result<T, DbError> {
        self.map_err(|source| DbError::operation(reason(), source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_reason_carries_driver_message() {
        let err = DbError::operation("Failed to commit", "connection reset".into());
        assert!(err.is_operation());
        assert_eq!(err.reason(), Some("Failed to commit: connection reset"));
        assert_eq!(err.to_string(), "Failed to commit: connection reset");
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("connection reset"));
    }

    #[test]
    fn or_db_only_touches_errors() {
        let ok: Result<u8, DriverError> = Ok(3);
        assert_eq!(ok.or_db(|| unreachable!()).ok(), Some(3));

        let failed: Result<u8, DriverError> = Err("boom".into());
        let err = failed.or_db(|| "Failed to step".to_string()).unwrap_err();
        assert_eq!(err.reason(), Some("Failed to step: boom"));
    }

    #[test]
    fn config_errors_are_not_operations() {
        let err = DbError::config("pool is shut down");
        assert!(!err.is_operation());
        assert_eq!(err.reason(), None);
        assert_eq!(err.to_string(), "Configuration error: pool is shut down");
    }
}
