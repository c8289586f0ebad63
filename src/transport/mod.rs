//! Storage transports used by sources and materializers.

/// SQLite connection handle and identifier helpers.
pub mod sqlite;

pub use sqlite::Database;
