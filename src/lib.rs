//! Pooled prepared statements and transactional execution wrappers over pluggable async
//! database links.
//!
//! The driver side is abstracted by the traits in [`link`]. On top of them sit a
//! [`StatementPool`] that keeps one prepared statement per link ready for reuse, a
//! [`Housekeeper`] that finalizes handed-back statements off the caller's task, and three
//! execution wrappers that run a unit of work inside its own transaction.

pub mod error;
pub mod housekeeper;
pub mod link;
pub mod pool;
pub mod prelude;
pub mod results;
pub mod statement;
pub mod types;
pub mod wrapper;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use error::{DbError, DriverError};
pub use housekeeper::{Housekeeper, HousekeeperConfig};
pub use pool::{PooledStatement, StatementPool, StatementPoolBuilder, StatementPoolOptions};
pub use results::{CustomDbRow, ResultCursor, ResultSet};
pub use statement::{CallableStatement, ParamSetter, PreparedStatement, prepare_call};
pub use types::{Concurrency, CursorType, SqlType, SqlValue};
pub use wrapper::{
    DiscardRows, PreparedStatementWrapper, SimplePreparedStatementWrapper, StatementWrapper,
    UnitOfWork,
};
