//! Sqlite-backed `TaskStore`: reference tables plus the `tasks` sink table,
//! with schema applied at open.

pub mod storage;

pub use storage::*;
