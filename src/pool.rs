//! Pool of prepared statements for one fixed SQL text.
//!
//! Each idle entry owns a link with the statement already prepared on it. A checked-out
//! [`PooledStatement`] owns its entry exclusively; handing it back routes the entry through
//! [`housekeeping`] (close, commit, re-prepare) before it can be acquired again.

mod housekeeping;
mod options;
mod pooled;

pub use options::{StatementPoolBuilder, StatementPoolOptions};
pub use pooled::PooledStatement;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender};

use crate::error::{DbError, DriverResultExt};
use crate::link::{Link, LinkProvider, PreparedHandle};

/// A statement prepared on the link that owns it.
pub(crate) struct PoolEntry {
    pub(crate) id: u64,
    pub(crate) link: Box<dyn Link>,
    pub(crate) handle: Box<dyn PreparedHandle>,
}

pub(crate) struct PoolShared {
    pub(crate) sql: Arc<str>,
    provider: Arc<dyn LinkProvider>,
    options: StatementPoolOptions,
    idle_tx: Sender<PoolEntry>,
    idle_rx: Receiver<PoolEntry>,
    next_id: AtomicU64,
    shut_down: AtomicBool,
}

impl PoolShared {
    pub(crate) fn label(&self) -> &str {
        self.options.label.as_deref().unwrap_or(&self.sql)
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Put a freshly housekept entry back into the idle collection.
    pub(crate) async fn return_entry(&self, entry: PoolEntry) {
        if self.is_shut_down() {
            retire(entry, self.label()).await;
            return;
        }
        if let Err(crossbeam_channel::SendError(entry)) = self.idle_tx.send(entry) {
            retire(entry, self.label()).await;
            return;
        }
        // shutdown may have drained between the check and the push
        if self.is_shut_down() {
            self.drain().await;
        }
    }

    async fn drain(&self) {
        while let Ok(entry) = self.idle_rx.try_recv() {
            retire(entry, self.label()).await;
        }
    }

    pub(crate) fn schedule_housekeeping(self: &Arc<Self>, entry: PoolEntry) {
        let shared = Arc::clone(self);
        self.provider
            .run_async(Box::pin(housekeeping::run(shared, entry)));
    }
}

/// Close a link for good. Failures are logged and otherwise ignored.
pub(crate) async fn retire(entry: PoolEntry, label: &str) {
    let PoolEntry {
        id,
        mut link,
        mut handle,
    } = entry;
    if let Err(err) = handle.close().await {
        tracing::debug!(label, statement_id = id, error = %err, "closing retired statement failed");
    }
    if let Err(err) = link.close().await {
        tracing::debug!(label, statement_id = id, error = %err, "closing retired link failed");
    }
}

/// Pooled prepared statements for one SQL text.
///
/// Cloning is cheap and every clone refers to the same idle collection. The collection is an
/// unbounded lock-free queue: [`acquire`](Self::acquire) never waits for capacity, a miss
/// simply builds a new statement on a new link.
#[derive(Clone)]
pub struct StatementPool {
    shared: Arc<PoolShared>,
}

impl std::fmt::Debug for StatementPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementPool")
            .field("sql", &self.shared.sql)
            .field("idle", &self.idle_count())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl StatementPool {
    pub fn new(provider: Arc<dyn LinkProvider>, sql: impl Into<String>) -> Self {
        Self::with_options(provider, sql, StatementPoolOptions::default())
    }

    pub fn with_options(
        provider: Arc<dyn LinkProvider>,
        sql: impl Into<String>,
        options: StatementPoolOptions,
    ) -> Self {
        let (idle_tx, idle_rx) = crossbeam_channel::unbounded();
        let sql: String = sql.into();
        Self {
            shared: Arc::new(PoolShared {
                sql: Arc::from(sql),
                provider,
                options,
                idle_tx,
                idle_rx,
                next_id: AtomicU64::new(1),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn builder(provider: Arc<dyn LinkProvider>, sql: impl Into<String>) -> StatementPoolBuilder {
        StatementPoolBuilder::new(provider, sql.into())
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.shared.sql
    }

    #[must_use]
    pub fn options(&self) -> &StatementPoolOptions {
        &self.shared.options
    }

    /// Statements currently idle and ready to hand out.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.shared.idle_rx.len()
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shared.is_shut_down()
    }

    /// Check out a statement.
    ///
    /// Reuses an idle statement if its link still reports valid. An idle statement whose link
    /// is invalid is closed and dropped, and a new statement is built instead.
    ///
    /// # Errors
    /// Returns [`DbError::ConfigError`] after [`shutdown`](Self::shutdown), or
    /// [`DbError::Operation`] if building a new statement fails. In the latter case the
    /// partially built link has already been closed.
    pub async fn acquire(&self) -> Result<PooledStatement, DbError> {
        if self.is_shut_down() {
            return Err(DbError::config(format!(
                "statement pool is shut down; SQL: {}",
                self.shared.sql
            )));
        }

        if let Ok(mut entry) = self.shared.idle_rx.try_recv() {
            if entry.link.is_valid().await {
                tracing::trace!(label = self.shared.label(), statement_id = entry.id, "reusing pooled statement");
                return Ok(PooledStatement::new(Arc::clone(&self.shared), entry));
            }
            tracing::debug!(
                label = self.shared.label(),
                statement_id = entry.id,
                "discarding pooled statement with an invalid link"
            );
            retire(entry, self.shared.label()).await;
        }

        let entry = self.construct().await?;
        Ok(PooledStatement::new(Arc::clone(&self.shared), entry))
    }

    /// Hand a statement back. Equivalent to [`PooledStatement::close`].
    ///
    /// The statement becomes reusable only once its housekeeping task has committed the
    /// finished transaction and re-prepared the SQL; that work runs on the provider's
    /// background context, not on the caller.
    pub fn release(&self, statement: PooledStatement) {
        statement.close();
    }

    /// Close every idle statement's link and refuse further acquisitions.
    ///
    /// Statements still checked out are retired by their housekeeping task when handed back.
    pub async fn shutdown(&self) {
        self.shared.shut_down.store(true, Ordering::Release);
        self.shared.drain().await;
        tracing::debug!(label = self.shared.label(), "statement pool shut down");
    }

    async fn construct(&self) -> Result<PoolEntry, DbError> {
        let shared = &self.shared;
        let mut link = shared
            .provider
            .new_link()
            .await
            .or_db(|| format!("Failed to obtain a database link; SQL: {}", shared.sql))?;

        let read_only = shared.options.read_only;
        if let Err(err) = link
            .set_read_only(read_only)
            .await
            .or_db(|| format!("Failed to set the read-only mode to {read_only}"))
        {
            close_link(link.as_mut(), shared.label()).await;
            return Err(err);
        }

        let handle = match link
            .prepare_statement(&shared.sql)
            .await
            .or_db(|| format!("Failed to prepare a statement; SQL: {}", shared.sql))
        {
            Ok(handle) => handle,
            Err(err) => {
                close_link(link.as_mut(), shared.label()).await;
                return Err(err);
            }
        };

        let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(label = shared.label(), statement_id = id, "prepared new pooled statement");
        Ok(PoolEntry { id, link, handle })
    }
}

async fn close_link(link: &mut dyn Link, label: &str) {
    if let Err(err) = link.close().await {
        tracing::debug!(label, error = %err, "closing partially built link failed");
    }
}
