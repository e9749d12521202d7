//! Convenient imports for common functionality.
//!
//! Brings the pool, the wrappers, the driver traits and the value types into scope, together
//! with [`ParamSetter`] so that the typed `set_*` methods resolve.

pub use crate::error::{DbError, DriverError};
pub use crate::housekeeper::{Housekeeper, HousekeeperConfig};
pub use crate::link::{
    CallableHandle, Cursor, Execution, Link, LinkProvider, PreparedHandle, StatementHandle,
};
pub use crate::pool::{PooledStatement, StatementPool, StatementPoolBuilder, StatementPoolOptions};
pub use crate::results::{CustomDbRow, ResultCursor, ResultSet};
pub use crate::statement::{CallableStatement, ParamSetter, PreparedStatement, prepare_call};
pub use crate::types::{Concurrency, CursorType, SqlType, SqlValue};
pub use crate::wrapper::{
    DiscardRows, PreparedStatementWrapper, SimplePreparedStatementWrapper, StatementWrapper,
    UnitOfWork,
};
