use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use sql_statement_pool::prelude::*;
use sql_statement_pool::test_utils::MockProvider;
use tokio::runtime::{Builder, Runtime};

use crate::args::SimConfig;
use crate::model::{Op, TaskState};
use crate::oracle::Oracle;

const LOOKUP: &str = "SELECT ?";
const LISTING: &str = "SELECT name FROM fruit";
const LISTING_ROWS: usize = 3;

type EchoFn = for<'s> fn(&'s mut PreparedStatement, (i64, bool)) -> BoxFuture<'s, Result<i64, DbError>>;
type CountFn = for<'c> fn(&'c mut ResultCursor, ()) -> BoxFuture<'c, Result<usize, DbError>>;

fn echo_or_reject(
    stmt: &mut PreparedStatement,
    (value, reject): (i64, bool),
) -> BoxFuture<'_, Result<i64, DbError>> {
    Box::pin(async move {
        stmt.set_i64(1, value)?;
        let mut rows = stmt.execute_query().await?;
        let seen = if rows.next().await? {
            rows.get_i64(1)?
        } else {
            None
        };
        rows.close().await?;
        if reject {
            return Err(DbError::other(format!("processor rejected {value}")));
        }
        seen.ok_or_else(|| DbError::other("echo returned no row"))
    })
}

fn count_rows(rows: &mut ResultCursor, (): ()) -> BoxFuture<'_, Result<usize, DbError>> {
    Box::pin(async move {
        let mut count = 0;
        while rows.next().await? {
            count += 1;
        }
        Ok::<_, DbError>(count)
    })
}

/// Outcome of one step, for the event log.
#[derive(Debug)]
pub(crate) struct StepOutcome {
    pub(crate) result: Result<String, String>,
    pub(crate) link: Option<u64>,
}

impl StepOutcome {
    fn ok(label: impl Into<String>) -> Self {
        Self {
            result: Ok(label.into()),
            link: None,
        }
    }

    fn failed(err: &DbError) -> Self {
        Self {
            result: Err(err.to_string()),
            link: None,
        }
    }
}

/// Runs simulated steps against a real pool and wrappers over the mock provider.
///
/// A current-thread runtime drives each step to completion. Housekeeping tasks only make
/// progress while a step is being driven, so they lag behind releases the way a busy worker
/// pool would.
pub(crate) struct SimBackend {
    runtime: Runtime,
    pub(crate) mock: Arc<MockProvider>,
    pub(crate) pool: StatementPool,
    wrapper: PreparedStatementWrapper<(i64, bool), i64, EchoFn>,
    raw: StatementWrapper<(), usize, CountFn>,
    held: HashMap<usize, PooledStatement>,
}

impl SimBackend {
    pub(crate) fn new(config: &SimConfig) -> Result<Self, String> {
        let runtime = Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|err| format!("failed to build runtime: {err}"))?;
        let keeper = HousekeeperConfig::new()
            .with_workers(config.housekeepers)
            .with_name("sim-housekeeping");
        let mock = runtime
            .block_on(async { MockProvider::start_with(keeper) })
            .map_err(|err| err.to_string())?;
        mock.script_rows(
            LISTING,
            &["name"],
            ["apple", "pear", "plum"]
                .iter()
                .map(|name| vec![SqlValue::Text((*name).to_string())])
                .collect(),
        );

        let provider = mock.provider();
        let pool = StatementPool::builder(Arc::clone(&provider), LOOKUP)
            .label("sim-lookup")
            .build();
        let wrapper =
            PreparedStatementWrapper::new("[sim]", Arc::clone(&provider), echo_or_reject as EchoFn);
        let raw = StatementWrapper::new("[sim-raw]", provider, count_rows as CountFn);

        Ok(Self {
            runtime,
            mock,
            pool,
            wrapper,
            raw,
            held: HashMap::new(),
        })
    }

    pub(crate) fn held_count(&self) -> usize {
        self.held.len()
    }

    /// Apply one step. `Err` means a property was violated.
    pub(crate) fn apply(
        &mut self,
        task: &mut TaskState,
        op: Op,
        oracle: &mut Oracle,
        rng: &mut ChaCha8Rng,
    ) -> Result<StepOutcome, String> {
        match op {
            Op::Sleep(_) => Ok(StepOutcome::ok("slept")),
            Op::Acquire => self.acquire(task),
            Op::Query(value) => self.query(task, value),
            Op::Release | Op::Drop => self.hand_back(task, op == Op::Release),
            Op::Wrapped { value, reject } => self.wrapped(value, reject),
            Op::Raw => self.raw(),
            Op::Inject(fault) => {
                self.mock.fail_next(fault);
                Ok(StepOutcome::ok(format!("armed {fault:?}")))
            }
            Op::Invalidate => {
                let candidates = oracle.open_pool_links(&self.mock);
                if candidates.is_empty() {
                    return Ok(StepOutcome::ok("no pooled link to invalidate"));
                }
                let link = candidates[rng.random_range(0..candidates.len())];
                self.mock.invalidate(link);
                Ok(StepOutcome {
                    result: Ok("invalidated".to_string()),
                    link: Some(link),
                })
            }
            Op::Settle => {
                self.runtime.block_on(self.mock.settle());
                oracle.check_settled(&self.mock, self.pool.idle_count(), self.held.len())?;
                Ok(StepOutcome::ok(format!("settled idle={}", self.pool.idle_count())))
            }
        }
    }

    fn acquire(&mut self, task: &mut TaskState) -> Result<StepOutcome, String> {
        if task.held.is_some() {
            return Err(format!("task {} acquired twice", task.id));
        }
        match self.runtime.block_on(self.pool.acquire()) {
            Ok(stmt) => {
                let id = stmt.id();
                task.held = Some(id);
                self.held.insert(task.id, stmt);
                Ok(StepOutcome::ok(format!("statement {id}")))
            }
            Err(err) => Ok(StepOutcome::failed(&err)),
        }
    }

    fn query(&mut self, task: &TaskState, value: i64) -> Result<StepOutcome, String> {
        let stmt = self
            .held
            .get_mut(&task.id)
            .ok_or_else(|| format!("task {} queried without a statement", task.id))?;
        let outcome = self.runtime.block_on(async {
            stmt.set_i64(1, value)?;
            let mut rows = stmt.execute_query().await?;
            let seen = if rows.next().await? {
                rows.get_i64(1)?
            } else {
                None
            };
            rows.close().await?;
            Ok::<_, DbError>(seen)
        });
        match outcome {
            Ok(Some(seen)) if seen == value => Ok(StepOutcome::ok(format!("echo {seen}"))),
            Ok(seen) => Err(format!(
                "task {} bound {value} but read {seen:?}",
                task.id
            )),
            Err(err) => Ok(StepOutcome::failed(&err)),
        }
    }

    fn hand_back(&mut self, task: &mut TaskState, close: bool) -> Result<StepOutcome, String> {
        let stmt = self
            .held
            .remove(&task.id)
            .ok_or_else(|| format!("task {} released without a statement", task.id))?;
        task.held = None;
        let id = stmt.id();
        if close {
            self.pool.release(stmt);
        } else {
            drop(stmt);
        }
        Ok(StepOutcome::ok(format!("handed back {id}")))
    }

    fn wrapped(&mut self, value: i64, reject: bool) -> Result<StepOutcome, String> {
        let before = self.mock.links_opened();
        let outcome = self
            .runtime
            .block_on(self.wrapper.execute(LOOKUP, (value, reject)));
        let link = (self.mock.links_opened() > before)
            .then(|| self.mock.last_link())
            .flatten();

        if let Some(link) = link {
            Oracle::check_unit_of_work(&self.mock, link, outcome.is_ok())?;
        }
        let mut step = match outcome {
            Ok(seen) if seen == value && !reject => StepOutcome::ok(format!("wrapped {seen}")),
            Ok(seen) => return Err(format!("wrapper bound {value} but returned {seen}")),
            Err(err) => StepOutcome::failed(&err),
        };
        step.link = link;
        Ok(step)
    }

    fn raw(&mut self) -> Result<StepOutcome, String> {
        let before = self.mock.links_opened();
        let outcome = self.runtime.block_on(self.raw.execute(LISTING, ()));
        let link = (self.mock.links_opened() > before)
            .then(|| self.mock.last_link())
            .flatten();

        if let Some(link) = link {
            Oracle::check_unit_of_work(&self.mock, link, outcome.is_ok())?;
        }
        let mut step = match outcome {
            Ok(LISTING_ROWS) => StepOutcome::ok(format!("listed {LISTING_ROWS}")),
            Ok(count) => return Err(format!("raw wrapper listed {count} rows")),
            Err(err) => StepOutcome::failed(&err),
        };
        step.link = link;
        Ok(step)
    }

    /// Hand everything back, shut the pool down and check nothing leaked.
    pub(crate) fn finish(&mut self, oracle: &mut Oracle) -> Result<(), String> {
        for (_, stmt) in self.held.drain() {
            stmt.close();
        }
        self.mock.clear_faults();
        self.runtime.block_on(async {
            self.mock.settle().await;
            self.pool.shutdown().await;
            self.mock.settle().await;
        });
        oracle.check_links(&self.mock)?;
        let open = self.mock.open_links();
        if !open.is_empty() {
            return Err(format!("links left open after shutdown: {open:?}"));
        }
        self.runtime.block_on(self.mock.shutdown());
        Ok(())
    }
}
