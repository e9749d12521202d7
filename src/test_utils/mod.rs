//! In-memory link provider for tests, benchmarks and the simulator.
//!
//! [`MockProvider`] hands out [`MockLink`]s that record every call into a shared journal,
//! echo bound parameters back as a single result row, return scripted rows for chosen SQL
//! texts, and fail on demand. Misuse such as touching a closed link or closing a statement
//! twice does not panic; it is recorded and reported by [`MockProvider::violations`].

mod mock_link;
mod mock_provider;

pub use mock_link::{MockCallable, MockCursor, MockLink, MockPrepared, MockStatement};
pub use mock_provider::MockProvider;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DriverError;
use crate::types::SqlValue;

/// Something that happened on a mock link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LinkEvent {
    SetReadOnly(bool),
    Prepare { sql: String },
    PrepareCall { sql: String },
    CreateStatement,
    Execute { sql: String },
    Bind { index: usize, value: SqlValue },
    ClearParameters,
    Query { sql: String },
    Update { sql: String },
    CloseCursor,
    CloseStatement { sql: String },
    Commit,
    Rollback,
    Close,
}

/// Driver call that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Fault {
    NewLink,
    SetReadOnly,
    Prepare,
    CreateStatement,
    Execute,
    Bind,
    Query,
    CursorNext,
    CursorClose,
    StatementClose,
    Commit,
    Rollback,
    /// The link is torn down anyway; only the reported outcome is an error.
    Close,
}

/// Error raised by the mock driver.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct MockFailure(pub String);

/// What a matching fault rule does to the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FaultAction {
    Fail,
    /// Link-level calls only: wait this long before going ahead
    Stall(Duration),
    /// Link-level calls only
    Panic,
}

#[derive(Debug)]
struct FaultRule {
    fault: Fault,
    action: FaultAction,
    link: Option<u64>,
    /// `None` fires forever
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct LinkRecord {
    events: Vec<LinkEvent>,
    closed: bool,
    invalid: bool,
    open_statements: usize,
}

#[derive(Debug, Clone)]
struct Script {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
}

#[derive(Debug)]
struct Journal {
    next_link: u64,
    links: BTreeMap<u64, LinkRecord>,
    faults: Vec<FaultRule>,
    scripts: HashMap<String, Script>,
    statements_supported: bool,
    violations: Vec<String>,
}

impl Default for Journal {
    fn default() -> Self {
        Self {
            next_link: 1,
            links: BTreeMap::new(),
            faults: Vec::new(),
            scripts: HashMap::new(),
            statements_supported: true,
            violations: Vec::new(),
        }
    }
}

/// State shared by a provider and every link it handed out.
#[derive(Debug, Default)]
pub(crate) struct MockState {
    journal: Mutex<Journal>,
}

impl MockState {
    fn journal(&self) -> MutexGuard<'_, Journal> {
        match self.journal.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn open_link(&self) -> u64 {
        let mut journal = self.journal();
        let id = journal.next_link;
        journal.next_link += 1;
        journal.links.insert(id, LinkRecord::default());
        id
    }

    /// Consume the first rule for `fault` on `link` whose action passes `wanted`.
    fn take_rule(
        &self,
        link: Option<u64>,
        fault: Fault,
        wanted: impl Fn(FaultAction) -> bool,
    ) -> Option<FaultAction> {
        let mut journal = self.journal();
        let position = journal.faults.iter().position(|rule| {
            rule.fault == fault && wanted(rule.action) && (rule.link.is_none() || rule.link == link)
        })?;
        let rule = &mut journal.faults[position];
        let action = rule.action;
        if let Some(remaining) = rule.remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                journal.faults.remove(position);
            }
        }
        Some(action)
    }

    /// Fail the call if a failure rule matches.
    fn trip(&self, link: Option<u64>, fault: Fault) -> Result<(), DriverError> {
        if self
            .take_rule(link, fault, |action| action == FaultAction::Fail)
            .is_none()
        {
            return Ok(());
        }
        let target = link.map_or_else(|| "provider".to_string(), |id| format!("link {id}"));
        Err(Box::new(MockFailure(format!("injected {fault:?} failure on {target}"))))
    }

    fn record(&self, link: u64, event: LinkEvent) {
        if let Some(record) = self.journal().links.get_mut(&link) {
            record.events.push(event);
        }
    }

    fn violation(&self, message: String) {
        tracing::warn!(%message, "mock driver misuse");
        self.journal().violations.push(message);
    }

    /// Report a call on a link that was already closed. Returns whether the link is open.
    fn check_open(&self, link: u64, call: &str) -> bool {
        let closed = self
            .journal()
            .links
            .get(&link)
            .is_none_or(|record| record.closed);
        if closed {
            self.violation(format!("{call} on closed link {link}"));
        }
        !closed
    }

    fn statement_opened(&self, link: u64) {
        if let Some(record) = self.journal().links.get_mut(&link) {
            record.open_statements += 1;
        }
    }

    fn statement_closed(&self, link: u64) {
        if let Some(record) = self.journal().links.get_mut(&link) {
            record.open_statements = record.open_statements.saturating_sub(1);
        }
    }

    fn script(&self, sql: &str) -> Option<Script> {
        self.journal().scripts.get(sql.trim()).cloned()
    }
}

fn closed_failure(what: &str) -> DriverError {
    Box::new(MockFailure(format!("{what} is closed")))
}
