//! Turfpoint Persistence - SQLite storage layer

pub mod cache;
pub mod sqlite;

pub use sqlite::Database;
