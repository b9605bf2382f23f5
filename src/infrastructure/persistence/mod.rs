//! SQLite persistence adapters

mod selection_repository;

pub use selection_repository::SqliteSelectionLog;
