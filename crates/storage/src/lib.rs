#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{InMemoryLocalStore, LocalStore, StorageError};
pub use sqlite::{SqliteInitError, SqliteLocalStore};
