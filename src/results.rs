//! Result adapters: a driver cursor wrapped with error translation, and materialised rows.

mod cursor;
mod result_set;
mod row;

pub use cursor::ResultCursor;
pub use result_set::ResultSet;
pub use row::CustomDbRow;
