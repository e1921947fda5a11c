//! Storage abstraction and implementations for drill data.
//!
//! This crate provides a trait-based data-access interface with a JSON-file
//! reference implementation (feature `json`, on by default), an in-memory
//! store, and an optional SQLite backend (feature `sqlite`).

#![warn(missing_docs)]

pub mod trait_;
#[cfg(feature = "json")]
pub mod json_storage;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite_storage;

pub use trait_::{Storage, StorageError, Result};
#[cfg(feature = "json")]
pub use json_storage::JsonStorage;
pub use memory::MemoryStorage;
#[cfg(feature = "sqlite")]
pub use sqlite_storage::SqliteStorage;
