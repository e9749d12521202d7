use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use super::{Fault, FaultAction, FaultRule, LinkEvent, MockState, Script};
use crate::error::{DbError, DriverError};
use crate::housekeeper::{Housekeeper, HousekeeperConfig};
use crate::link::{Link, LinkProvider};
use crate::types::SqlValue;

use super::mock_link::MockLink;

/// Provider of [`MockLink`]s with a real [`Housekeeper`] behind `run_async`.
///
/// ```rust
/// # use std::sync::Arc;
/// # use sql_statement_pool::prelude::*;
/// # use sql_statement_pool::test_utils::MockProvider;
/// # #[tokio::main]
/// # async fn main() -> Result<(), DbError> {
/// let mock = MockProvider::start()?;
/// let pool = StatementPool::new(mock.provider(), "SELECT ?");
/// let mut stmt = pool.acquire().await?;
/// stmt.set_i32(1, 5)?;
/// let mut rows = stmt.execute_query().await?;
/// assert!(rows.next().await?);
/// assert_eq!(rows.get_i32(1)?, Some(5));
/// rows.close().await?;
/// stmt.close();
/// mock.settle().await;
/// assert_eq!(pool.idle_count(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MockProvider {
    state: Arc<MockState>,
    housekeeper: Housekeeper,
}

impl MockProvider {
    /// Start with the default housekeeping configuration.
    ///
    /// # Errors
    /// Returns [`DbError::ConfigError`] when called outside a tokio runtime.
    pub fn start() -> Result<Arc<Self>, DbError> {
        Self::start_with(HousekeeperConfig::new().with_name("mock-housekeeping"))
    }

    /// # Errors
    /// Returns [`DbError::ConfigError`] when called outside a tokio runtime.
    pub fn start_with(config: HousekeeperConfig) -> Result<Arc<Self>, DbError> {
        Ok(Arc::new(Self {
            state: Arc::new(MockState::default()),
            housekeeper: Housekeeper::start(config)?,
        }))
    }

    /// This provider as the trait object pools and wrappers take.
    #[must_use]
    pub fn provider(self: &Arc<Self>) -> Arc<dyn LinkProvider> {
        Arc::clone(self) as Arc<dyn LinkProvider>
    }

    #[must_use]
    pub fn housekeeper(&self) -> &Housekeeper {
        &self.housekeeper
    }

    /// Wait until every housekeeping task submitted so far has finished.
    pub async fn settle(&self) {
        self.housekeeper.wait_idle().await;
    }

    pub async fn shutdown(&self) {
        self.housekeeper.shutdown().await;
    }

    #[must_use]
    pub fn links_opened(&self) -> usize {
        self.state.journal().links.len()
    }

    #[must_use]
    pub fn link_ids(&self) -> Vec<u64> {
        self.state.journal().links.keys().copied().collect()
    }

    #[must_use]
    pub fn last_link(&self) -> Option<u64> {
        self.state.journal().links.keys().next_back().copied()
    }

    #[must_use]
    pub fn events(&self, link: u64) -> Vec<LinkEvent> {
        self.state
            .journal()
            .links
            .get(&link)
            .map(|record| record.events.clone())
            .unwrap_or_default()
    }

    /// Events of `link` matching `filter`.
    #[must_use]
    pub fn count(&self, link: u64, filter: impl Fn(&LinkEvent) -> bool) -> usize {
        self.state
            .journal()
            .links
            .get(&link)
            .map_or(0, |record| record.events.iter().filter(|e| filter(e)).count())
    }

    #[must_use]
    pub fn commit_count(&self, link: u64) -> usize {
        self.count(link, |e| matches!(e, LinkEvent::Commit))
    }

    #[must_use]
    pub fn rollback_count(&self, link: u64) -> usize {
        self.count(link, |e| matches!(e, LinkEvent::Rollback))
    }

    #[must_use]
    pub fn close_count(&self, link: u64) -> usize {
        self.count(link, |e| matches!(e, LinkEvent::Close))
    }

    #[must_use]
    pub fn is_closed(&self, link: u64) -> bool {
        self.state
            .journal()
            .links
            .get(&link)
            .is_some_and(|record| record.closed)
    }

    /// Links handed out and not closed yet.
    #[must_use]
    pub fn open_links(&self) -> Vec<u64> {
        self.state
            .journal()
            .links
            .iter()
            .filter(|(_, record)| !record.closed)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Statements and calls prepared on `link` and not closed yet.
    #[must_use]
    pub fn open_statements(&self, link: u64) -> usize {
        self.state
            .journal()
            .links
            .get(&link)
            .map_or(0, |record| record.open_statements)
    }

    /// Make `link` report itself invalid from now on.
    pub fn invalidate(&self, link: u64) {
        if let Some(record) = self.state.journal().links.get_mut(&link) {
            record.invalid = true;
        }
    }

    /// Fail every `fault` call on any link until cleared.
    pub fn fail(&self, fault: Fault) {
        self.add_rule(fault, FaultAction::Fail, None, None);
    }

    /// Fail every `fault` call on `link` until cleared.
    pub fn fail_on(&self, link: u64, fault: Fault) {
        self.add_rule(fault, FaultAction::Fail, Some(link), None);
    }

    /// Fail the next `fault` call on any link, once.
    pub fn fail_next(&self, fault: Fault) {
        self.add_rule(fault, FaultAction::Fail, None, Some(1));
    }

    /// Make the next link-level `fault` call on any link wait for `delay` before going
    /// ahead normally. Has no effect on `Close`, `NewLink`, statement or cursor calls.
    pub fn stall_next(&self, fault: Fault, delay: Duration) {
        self.add_rule(fault, FaultAction::Stall(delay), None, Some(1));
    }

    /// Make the next link-level `fault` call on any link panic. Same scope as
    /// [`stall_next`](Self::stall_next).
    pub fn panic_next(&self, fault: Fault) {
        self.add_rule(fault, FaultAction::Panic, None, Some(1));
    }

    pub fn clear_faults(&self) {
        self.state.journal().faults.clear();
    }

    /// Hand out links that cannot execute statements.
    pub fn set_statements_supported(&self, supported: bool) {
        self.state.journal().statements_supported = supported;
    }

    /// Return `rows` for any query whose SQL text equals `sql` (ignoring surrounding
    /// whitespace), instead of echoing the parameters.
    pub fn script_rows(&self, sql: &str, columns: &[&str], rows: Vec<Vec<SqlValue>>) {
        let script = Script {
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            rows,
        };
        self.state
            .journal()
            .scripts
            .insert(sql.trim().to_string(), script);
    }

    /// Misuse observed so far: calls on closed links, statements or cursors.
    #[must_use]
    pub fn violations(&self) -> Vec<String> {
        self.state.journal().violations.clone()
    }

    fn add_rule(
        &self,
        fault: Fault,
        action: FaultAction,
        link: Option<u64>,
        remaining: Option<usize>,
    ) {
        self.state.journal().faults.push(FaultRule {
            fault,
            action,
            link,
            remaining,
        });
    }
}

#[async_trait]
impl LinkProvider for MockProvider {
    async fn new_link(&self) -> Result<Box<dyn Link>, DriverError> {
        tokio::task::yield_now().await;
        self.state.trip(None, Fault::NewLink)?;
        let id = self.state.open_link();
        tracing::trace!(link = id, "mock link opened");
        Ok(Box::new(MockLink::new(id, Arc::clone(&self.state))))
    }

    fn run_async(&self, task: BoxFuture<'static, ()>) {
        self.housekeeper.submit(task);
    }
}
