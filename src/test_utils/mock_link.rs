use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::{Fault, FaultAction, LinkEvent, MockFailure, MockState, Script, closed_failure};
use crate::error::DriverError;
use crate::link::{CallableHandle, Cursor, Execution, Link, PreparedHandle, StatementHandle};
use crate::types::{Concurrency, CursorType, SqlType, SqlValue};

/// Link handed out by [`MockProvider`](super::MockProvider).
#[derive(Debug)]
pub struct MockLink {
    id: u64,
    state: Arc<MockState>,
}

impl MockLink {
    pub(crate) fn new(id: u64, state: Arc<MockState>) -> Self {
        Self { id, state }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    async fn call(&self, name: &str, fault: Fault) -> Result<(), DriverError> {
        tokio::task::yield_now().await;
        match self
            .state
            .take_rule(Some(self.id), fault, |action| action != FaultAction::Fail)
        {
            Some(FaultAction::Stall(delay)) => tokio::time::sleep(delay).await,
            Some(FaultAction::Panic) => panic!("injected {fault:?} panic on link {}", self.id),
            _ => {}
        }
        if !self.state.check_open(self.id, name) {
            return Err(closed_failure("link"));
        }
        self.state.trip(Some(self.id), fault)
    }

    fn prepared(&self, sql: &str) -> MockPrepared {
        self.state.statement_opened(self.id);
        MockPrepared {
            link: self.id,
            sql: sql.to_string(),
            params: BTreeMap::new(),
            closed: false,
            state: Arc::clone(&self.state),
        }
    }
}

#[async_trait]
impl Link for MockLink {
    async fn is_valid(&mut self) -> bool {
        tokio::task::yield_now().await;
        let journal = self.state.journal();
        journal
            .links
            .get(&self.id)
            .is_some_and(|record| !record.closed && !record.invalid)
    }

    async fn set_read_only(&mut self, read_only: bool) -> Result<(), DriverError> {
        self.call("set_read_only", Fault::SetReadOnly).await?;
        self.state.record(self.id, LinkEvent::SetReadOnly(read_only));
        Ok(())
    }

    async fn prepare_statement(
        &mut self,
        sql: &str,
    ) -> Result<Box<dyn PreparedHandle>, DriverError> {
        self.call("prepare_statement", Fault::Prepare).await?;
        self.state.record(self.id, LinkEvent::Prepare { sql: sql.to_string() });
        Ok(Box::new(self.prepared(sql)))
    }

    async fn prepare_statement_with(
        &mut self,
        sql: &str,
        _cursor: CursorType,
        _concurrency: Concurrency,
    ) -> Result<Box<dyn PreparedHandle>, DriverError> {
        self.prepare_statement(sql).await
    }

    async fn create_statement(
        &mut self,
        _cursor: CursorType,
        _concurrency: Concurrency,
    ) -> Result<Box<dyn StatementHandle>, DriverError> {
        self.call("create_statement", Fault::CreateStatement).await?;
        self.state.record(self.id, LinkEvent::CreateStatement);
        self.state.statement_opened(self.id);
        Ok(Box::new(MockStatement {
            link: self.id,
            closed: false,
            state: Arc::clone(&self.state),
        }))
    }

    async fn execute(&mut self, sql: &str) -> Result<(), DriverError> {
        self.call("execute", Fault::Execute).await?;
        self.state.record(self.id, LinkEvent::Execute { sql: sql.to_string() });
        Ok(())
    }

    async fn prepare_call(&mut self, sql: &str) -> Result<Box<dyn CallableHandle>, DriverError> {
        self.call("prepare_call", Fault::Prepare).await?;
        self.state.record(self.id, LinkEvent::PrepareCall { sql: sql.to_string() });
        Ok(Box::new(MockCallable {
            inner: self.prepared(sql),
            outs: BTreeMap::new(),
        }))
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        self.call("commit", Fault::Commit).await?;
        self.state.record(self.id, LinkEvent::Commit);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        self.call("rollback", Fault::Rollback).await?;
        self.state.record(self.id, LinkEvent::Rollback);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        tokio::task::yield_now().await;
        if !self.state.check_open(self.id, "close") {
            return Err(closed_failure("link"));
        }
        {
            let mut journal = self.state.journal();
            if let Some(record) = journal.links.get_mut(&self.id) {
                record.closed = true;
                record.events.push(LinkEvent::Close);
            }
        }
        self.state.trip(Some(self.id), Fault::Close)
    }

    fn supports_statements(&self) -> bool {
        self.state.journal().statements_supported
    }
}

/// Prepared statement on a [`MockLink`].
///
/// Executing a query returns the scripted rows for its SQL if there are any, otherwise one row
/// holding the bound parameters in position order under columns `p1`, `p2`, ...
#[derive(Debug)]
pub struct MockPrepared {
    link: u64,
    sql: String,
    params: BTreeMap<usize, SqlValue>,
    closed: bool,
    state: Arc<MockState>,
}

impl MockPrepared {
    fn check(&self, call: &str) -> Result<(), DriverError> {
        if self.closed {
            self.state
                .violation(format!("{call} on closed statement `{}` of link {}", self.sql, self.link));
            return Err(closed_failure("statement"));
        }
        if !self.state.check_open(self.link, call) {
            return Err(closed_failure("link"));
        }
        Ok(())
    }

    fn rows(&self) -> MockCursor {
        let script = self.state.script(&self.sql).unwrap_or_else(|| {
            if self.params.is_empty() {
                return Script {
                    columns: Vec::new(),
                    rows: Vec::new(),
                };
            }
            Script {
                columns: self.params.keys().map(|index| format!("p{index}")).collect(),
                rows: vec![self.params.values().cloned().collect()],
            }
        });
        MockCursor::new(self.link, script, Arc::clone(&self.state))
    }

    fn returns_rows(&self) -> bool {
        self.state.script(&self.sql).is_some() || {
            let head = self.sql.trim_start();
            head.get(..6).is_some_and(|word| word.eq_ignore_ascii_case("select"))
        }
    }
}

#[async_trait]
impl PreparedHandle for MockPrepared {
    fn bind(&mut self, index: usize, value: SqlValue) -> Result<(), DriverError> {
        self.check("bind")?;
        self.state.trip(Some(self.link), Fault::Bind)?;
        if index == 0 {
            return Err(Box::new(MockFailure("parameter positions start at 1".into())));
        }
        self.state.record(
            self.link,
            LinkEvent::Bind {
                index,
                value: value.clone(),
            },
        );
        self.params.insert(index, value);
        Ok(())
    }

    fn clear_parameters(&mut self) -> Result<(), DriverError> {
        self.check("clear_parameters")?;
        self.state.record(self.link, LinkEvent::ClearParameters);
        self.params.clear();
        Ok(())
    }

    async fn execute_query(&mut self) -> Result<Box<dyn Cursor>, DriverError> {
        tokio::task::yield_now().await;
        self.check("execute_query")?;
        self.state.trip(Some(self.link), Fault::Query)?;
        self.state.record(self.link, LinkEvent::Query { sql: self.sql.clone() });
        Ok(Box::new(self.rows()))
    }

    async fn execute_update(&mut self) -> Result<u64, DriverError> {
        tokio::task::yield_now().await;
        self.check("execute_update")?;
        self.state.trip(Some(self.link), Fault::Execute)?;
        self.state.record(self.link, LinkEvent::Update { sql: self.sql.clone() });
        Ok(1)
    }

    async fn execute(&mut self) -> Result<Execution, DriverError> {
        if self.returns_rows() {
            self.execute_query().await.map(Execution::Rows)
        } else {
            self.execute_update().await.map(Execution::Updated)
        }
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        tokio::task::yield_now().await;
        self.check("close statement")?;
        self.closed = true;
        self.state.statement_closed(self.link);
        self.state.record(self.link, LinkEvent::CloseStatement { sql: self.sql.clone() });
        self.state.trip(Some(self.link), Fault::StatementClose)
    }
}

/// Stored-procedure call on a [`MockLink`]. An out parameter reads back whatever was bound at
/// the same position, or NULL of the registered type.
#[derive(Debug)]
pub struct MockCallable {
    inner: MockPrepared,
    outs: BTreeMap<usize, SqlType>,
}

#[async_trait]
impl PreparedHandle for MockCallable {
    fn bind(&mut self, index: usize, value: SqlValue) -> Result<(), DriverError> {
        self.inner.bind(index, value)
    }

    fn clear_parameters(&mut self) -> Result<(), DriverError> {
        self.inner.clear_parameters()
    }

    async fn execute_query(&mut self) -> Result<Box<dyn Cursor>, DriverError> {
        self.inner.execute_query().await
    }

    async fn execute_update(&mut self) -> Result<u64, DriverError> {
        self.inner.execute_update().await
    }

    async fn execute(&mut self) -> Result<Execution, DriverError> {
        self.inner.execute().await
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.inner.close().await
    }
}

impl CallableHandle for MockCallable {
    fn register_out(&mut self, index: usize, sql_type: SqlType) -> Result<(), DriverError> {
        self.inner.check("register_out")?;
        self.outs.insert(index, sql_type);
        Ok(())
    }

    fn out_value(&self, index: usize) -> Result<SqlValue, DriverError> {
        let Some(sql_type) = self.outs.get(&index) else {
            return Err(Box::new(MockFailure(format!(
                "parameter {index} was not registered as an out parameter"
            ))));
        };
        Ok(self
            .inner
            .params
            .get(&index)
            .cloned()
            .unwrap_or(SqlValue::Null(*sql_type)))
    }
}

/// Ad-hoc statement on a [`MockLink`]. Queries return scripted rows, or no rows at all.
#[derive(Debug)]
pub struct MockStatement {
    link: u64,
    closed: bool,
    state: Arc<MockState>,
}

impl MockStatement {
    fn check(&self, call: &str) -> Result<(), DriverError> {
        if self.closed {
            self.state
                .violation(format!("{call} on closed ad-hoc statement of link {}", self.link));
            return Err(closed_failure("statement"));
        }
        if !self.state.check_open(self.link, call) {
            return Err(closed_failure("link"));
        }
        Ok(())
    }
}

#[async_trait]
impl StatementHandle for MockStatement {
    async fn execute_query(&mut self, sql: &str) -> Result<Box<dyn Cursor>, DriverError> {
        tokio::task::yield_now().await;
        self.check("execute_query")?;
        self.state.trip(Some(self.link), Fault::Query)?;
        self.state.record(self.link, LinkEvent::Query { sql: sql.to_string() });
        let script = self.state.script(sql).unwrap_or(Script {
            columns: Vec::new(),
            rows: Vec::new(),
        });
        Ok(Box::new(MockCursor::new(self.link, script, Arc::clone(&self.state))))
    }

    async fn execute_update(&mut self, sql: &str) -> Result<u64, DriverError> {
        tokio::task::yield_now().await;
        self.check("execute_update")?;
        self.state.trip(Some(self.link), Fault::Execute)?;
        self.state.record(self.link, LinkEvent::Update { sql: sql.to_string() });
        Ok(1)
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        tokio::task::yield_now().await;
        self.check("close statement")?;
        self.closed = true;
        self.state.statement_closed(self.link);
        self.state.record(
            self.link,
            LinkEvent::CloseStatement {
                sql: String::new(),
            },
        );
        self.state.trip(Some(self.link), Fault::StatementClose)
    }
}

/// Cursor over rows materialized when the query ran.
#[derive(Debug)]
pub struct MockCursor {
    link: u64,
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
    /// Rows consumed so far; the current row is `position - 1`
    position: usize,
    closed: bool,
    state: Arc<MockState>,
}

impl MockCursor {
    fn new(link: u64, script: Script, state: Arc<MockState>) -> Self {
        Self {
            link,
            columns: script.columns,
            rows: script.rows,
            position: 0,
            closed: false,
            state,
        }
    }

    fn check(&self, call: &str) -> Result<(), DriverError> {
        if self.closed {
            self.state
                .violation(format!("{call} on closed cursor of link {}", self.link));
            return Err(closed_failure("cursor"));
        }
        Ok(())
    }
}

#[async_trait]
impl Cursor for MockCursor {
    async fn next(&mut self) -> Result<bool, DriverError> {
        tokio::task::yield_now().await;
        self.check("next")?;
        self.state.trip(Some(self.link), Fault::CursorNext)?;
        if self.position < self.rows.len() {
            self.position += 1;
            Ok(true)
        } else {
            self.position = self.rows.len() + 1;
            Ok(false)
        }
    }

    fn value(&self, column: usize) -> Result<SqlValue, DriverError> {
        self.check("value")?;
        let row = self
            .position
            .checked_sub(1)
            .and_then(|index| self.rows.get(index))
            .ok_or_else(|| MockFailure("cursor is not positioned on a row".into()))?;
        column
            .checked_sub(1)
            .and_then(|index| row.get(index))
            .cloned()
            .ok_or_else(|| Box::new(MockFailure(format!("no column {column}"))) as DriverError)
    }

    fn column_names(&self) -> Result<Vec<String>, DriverError> {
        self.check("column_names")?;
        Ok(self.columns.clone())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        tokio::task::yield_now().await;
        self.check("close cursor")?;
        self.closed = true;
        self.state.record(self.link, LinkEvent::CloseCursor);
        self.state.trip(Some(self.link), Fault::CursorClose)
    }
}
