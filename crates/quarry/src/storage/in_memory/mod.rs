//! In-memory storage backend.
//!
//! All rows are held in RAM and **lost when the process exits** unless the
//! storage is wrapped for JSONL persistence (see
//! [`StorageBackend::Jsonl`](crate::storage::StorageBackend::Jsonl)), or
//! saved explicitly with [`save_to_dir`].
//!
//! # Architecture
//!
//! - `BTreeMap<String, Table>` of tables, each a `BTreeMap<RowId, Row>` so
//!   unsorted results come back in id order
//! - Auto-increment ids per table, continuing after the largest id seen
//! - Compiled queries are folded into a plan: AND groups separated by OR
//!   clauses, sort keys, optional row cap, eager-load relations
//! - Eager loading attaches `<relation>_count` computed from the related
//!   table's foreign key column
//!
//! # Thread Safety
//!
//! The database is wrapped in `Arc<Mutex<InMemoryDatabase>>`. Every call
//! takes the lock once, so each operation sees a consistent snapshot.

mod evaluate;
mod inner;
mod jsonl;
mod sorting;
mod trait_impl;

use crate::storage::{RowStorage, TableSchema};
use std::sync::Arc;
use tokio::sync::Mutex;

pub use inner::{CREATED_AT, InMemoryDatabase, UPDATED_AT};
pub use jsonl::{LoadWarning, load_from_dir, reload_from_dir, save_to_dir};

/// Thread-safe in-memory storage; implements [`RowStorage`].
pub type InMemoryStorage = Arc<Mutex<InMemoryDatabase>>;

/// Creates in-memory storage holding empty `tables`.
///
/// # Example
///
/// ```
/// use quarry::storage::in_memory::new_in_memory_storage;
/// use quarry::storage::{RowStorage, TableSchema};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let storage = new_in_memory_storage(vec![TableSchema::new("tickets")]);
///     assert_eq!(storage.tables().await.unwrap(), vec!["tickets"]);
/// }
/// ```
#[must_use]
pub fn new_in_memory_storage(tables: Vec<TableSchema>) -> Arc<dyn RowStorage> {
    Arc::new(new_database(tables))
}

/// Creates the concrete storage, for callers that need persistence helpers.
#[must_use]
pub fn new_database(tables: Vec<TableSchema>) -> InMemoryStorage {
    Arc::new(Mutex::new(InMemoryDatabase::new(tables)))
}
