//! SQLite persistence for catalog entries, monitored components and
//! process-wide tracker state.

pub mod pool;
pub mod rows;
pub mod schema;
pub mod sqlite;

pub use pool::{init_db_pool, DbPool};
pub use sqlite::SqliteStore;
