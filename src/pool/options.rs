use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::StatementPool;
use crate::link::LinkProvider;

/// Options for a [`StatementPool`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatementPoolOptions {
    /// Put each new link into read-only mode before preparing (default `true`)
    pub read_only: bool,
    /// Name used in log fields instead of the SQL text
    pub label: Option<String>,
}

impl Default for StatementPoolOptions {
    fn default() -> Self {
        Self {
            read_only: true,
            label: None,
        }
    }
}

impl StatementPoolOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Fluent builder for a [`StatementPool`].
pub struct StatementPoolBuilder {
    provider: Arc<dyn LinkProvider>,
    sql: String,
    opts: StatementPoolOptions,
}

impl StatementPoolBuilder {
    #[must_use]
    pub fn new(provider: Arc<dyn LinkProvider>, sql: String) -> Self {
        Self {
            provider,
            sql,
            opts: StatementPoolOptions::default(),
        }
    }

    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.opts.read_only = read_only;
        self
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.opts.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn build(self) -> StatementPool {
        StatementPool::with_options(self.provider, self.sql, self.opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_read_only() {
        let opts = StatementPoolOptions::new();
        assert!(opts.read_only);
        assert!(opts.label.is_none());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let opts: StatementPoolOptions = serde_json::from_str(r#"{"label":"lookup"}"#).unwrap();
        assert_eq!(opts, StatementPoolOptions::new().with_label("lookup"));
    }
}
