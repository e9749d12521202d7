use sql_statement_pool::test_utils::Fault;

/// One step a simulated task can take.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Op {
    /// Check a statement out of the pool
    Acquire,
    /// Bind a value on the held statement, query it and check the echo
    Query(i64),
    /// Hand the held statement back with `close`
    Release,
    /// Hand the held statement back by dropping it
    Drop,
    /// Run a unit of work through the prepared-statement wrapper
    Wrapped { value: i64, reject: bool },
    /// Run a scripted query through the raw statement wrapper
    Raw,
    /// Arm a one-shot driver fault
    Inject(Fault),
    /// Make one open pooled link report itself invalid
    Invalidate,
    /// Wait for housekeeping, then check for leaked links
    Settle,
    Sleep(u64),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct TaskState {
    pub(crate) id: usize,
    /// Id of the pooled statement this task holds, if any
    pub(crate) held: Option<u64>,
}

pub(crate) const FAULTS: [Fault; 13] = [
    Fault::NewLink,
    Fault::SetReadOnly,
    Fault::Prepare,
    Fault::CreateStatement,
    Fault::Execute,
    Fault::Bind,
    Fault::Query,
    Fault::CursorNext,
    Fault::CursorClose,
    Fault::StatementClose,
    Fault::Commit,
    Fault::Rollback,
    Fault::Close,
];
