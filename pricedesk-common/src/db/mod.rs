//! SQLite persistence for overrides and market settings

pub mod init;
pub mod sqlite_storage;

pub use init::*;
pub use sqlite_storage::SqliteStorage;
