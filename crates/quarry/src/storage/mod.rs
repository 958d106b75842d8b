//! Storage abstraction layer for quarry.
//!
//! A [`Repository`](crate::Repository) compiles its accumulated state into a
//! [`CompiledQuery`] and hands it to a [`RowStorage`] backend together with
//! the table name. Backends apply the steps in order: eager-load counts,
//! filters, sort keys, named scopes and the row cap.
//!
//! Two backends are provided:
//!
//! - **In-memory**: tables of rows held in RAM, lost when the process exits
//! - **JSONL**: the in-memory backend loaded from and saved to one
//!   `<table>.jsonl` file per table
//!
//! # Architecture
//!
//! The trait is async so a backend may perform real I/O per call, and
//! object safe so repositories can share one `Arc<dyn RowStorage>`. Every
//! method takes `&self`; backends synchronise internally.
//!
//! # Test Utilities
//!
//! [`MockStorage`] records every compiled query it receives and returns
//! empty results. Enable the `test-util` feature to use it from other
//! crates:
//!
//! ```toml
//! [dev-dependencies]
//! quarry = { version = "...", features = ["test-util"] }
//! ```
//!
//! # Example
//!
//! ```no_run
//! use quarry::storage::{create_storage, StorageBackend, TableSchema};
//! use quarry::Repository;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = create_storage(
//!         StorageBackend::Jsonl(".quarry".into()),
//!         vec![TableSchema::new("tickets").with_timestamps(true)],
//!     )
//!     .await?;
//!
//!     let mut tickets = Repository::open(storage, "Ticket", "tickets").await?;
//!     let open = tickets.add_where("status", "open").count().await?;
//!     println!("{open} open tickets");
//!     Ok(())
//! }
//! ```

use crate::domain::{Columns, Row, RowId, Scalar};
use crate::error::BackendResult;
use crate::query::{CompiledQuery, QueryStep};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod in_memory;
pub mod scopes;

pub use in_memory::LoadWarning;
pub use scopes::{ScopeDefinition, ScopeFn, ScopeRegistry};

/// Row storage backend.
///
/// # Method Categories
///
/// - **Queries**: `select`, `count`, `delete_where`, `paginate`
/// - **Direct lookups**: `find`, `find_by_column`
/// - **Scopes**: `apply_named_scope`, `scope_names`
/// - **Writes**: `insert`, `insert_many`, `first_or_insert`, `update`, `delete_by_ids`
/// - **Introspection**: `tables`, `export`
/// - **Persistence**: `save`, `reload`
///
/// Query methods receive the compiled steps unchanged. A
/// [`QueryStep::Scope`] is expanded by the backend, via
/// [`apply_named_scope`](Self::apply_named_scope), into the filters and
/// sort keys it stands for.
#[async_trait]
pub trait RowStorage: Send + Sync {
    // ========== Queries ==========

    /// Returns the rows matching `query`, projected to `columns`.
    ///
    /// # Errors
    ///
    /// Fails for unknown tables, relations or scopes.
    async fn select(
        &self,
        table: &str,
        query: &CompiledQuery,
        columns: &Columns,
    ) -> BackendResult<Vec<Row>>;

    /// Counts the rows matching `query`.
    async fn count(&self, table: &str, query: &CompiledQuery) -> BackendResult<usize>;

    /// Deletes the rows matching `query` and returns how many were removed.
    async fn delete_where(&self, table: &str, query: &CompiledQuery) -> BackendResult<usize>;

    /// Returns one page of the rows matching `query`.
    ///
    /// `total` counts every matching row. Pages are 1-based; a page past
    /// the end is empty.
    async fn paginate(
        &self,
        table: &str,
        query: &CompiledQuery,
        columns: &Columns,
        request: &PageRequest,
    ) -> BackendResult<Page<Row>>;

    // ========== Direct lookups ==========

    /// Looks up a row by primary key. Only eager-load steps of `query` apply.
    async fn find(
        &self,
        table: &str,
        id: RowId,
        query: &CompiledQuery,
        columns: &Columns,
    ) -> BackendResult<Option<Row>>;

    /// Returns the first row whose `column` equals `value`. Only eager-load
    /// steps of `query` apply.
    async fn find_by_column(
        &self,
        table: &str,
        column: &str,
        value: &Scalar,
        query: &CompiledQuery,
        columns: &Columns,
    ) -> BackendResult<Option<Row>>;

    // ========== Scopes ==========

    /// Expands a named scope into the steps it stands for.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Scope`](crate::error::BackendError::Scope)
    /// if the scope is undefined or rejects `args`.
    async fn apply_named_scope(
        &self,
        table: &str,
        name: &str,
        args: &[Scalar],
    ) -> BackendResult<Vec<QueryStep>>;

    /// Names of the scopes defined for `table`.
    async fn scope_names(&self, table: &str) -> BackendResult<Vec<String>>;

    // ========== Writes ==========

    /// Inserts a row, assigning an id if it has none. Returns the stored row.
    ///
    /// # Errors
    ///
    /// Returns a constraint error if the id is taken or not an integer.
    async fn insert(&self, table: &str, row: Row) -> BackendResult<Row>;

    /// Inserts rows as one batch without maintaining timestamps. Either
    /// every row is inserted or none is.
    async fn insert_many(&self, table: &str, rows: Vec<Row>) -> BackendResult<usize>;

    /// Returns the first row containing every column of `row`, inserting
    /// `row` if none does.
    async fn first_or_insert(&self, table: &str, row: Row) -> BackendResult<Row>;

    /// Merges `changes` into the row with `id`. Returns `None` if absent.
    async fn update(&self, table: &str, id: RowId, changes: Row) -> BackendResult<Option<Row>>;

    /// Deletes rows by id, returning how many existed.
    async fn delete_by_ids(&self, table: &str, ids: &[RowId]) -> BackendResult<usize>;

    // ========== Introspection ==========

    /// Names of all tables, sorted.
    async fn tables(&self) -> BackendResult<Vec<String>>;

    /// Every row of `table` in id order.
    async fn export(&self, table: &str) -> BackendResult<Vec<Row>>;

    // ========== Persistence ==========

    /// Persists all tables. A no-op for purely in-memory storage.
    async fn save(&self) -> BackendResult<()>;

    /// Discards unsaved changes by reloading from the persistent store.
    async fn reload(&self) -> BackendResult<()>;
}

/// Pagination parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Rows per page (at least 1).
    pub per_page: usize,
    /// 1-based page number.
    pub page: usize,
    /// Name of the request parameter carrying the page number.
    pub page_name: String,
}

impl PageRequest {
    /// Creates a request, clamping `per_page` and `page` to at least 1.
    pub fn new(per_page: usize, page: usize, page_name: impl Into<String>) -> Self {
        Self {
            per_page: per_page.max(1),
            page: page.max(1),
            page_name: page_name.into(),
        }
    }

    /// Index of the first row on the page.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Rows on this page.
    pub items: Vec<T>,
    /// Rows matching the query across all pages.
    pub total: usize,
    /// 1-based page number.
    pub page: usize,
    /// Page size.
    pub per_page: usize,
    /// Request parameter carrying the page number.
    pub page_name: String,
}

impl<T> Page<T> {
    /// Wraps a complete result set as a single page.
    pub fn single(items: Vec<T>, page_name: impl Into<String>) -> Self {
        let total = items.len();
        Self {
            items,
            total,
            page: 1,
            per_page: total,
            page_name: page_name.into(),
        }
    }

    /// Number of the last page (at least 1).
    #[must_use]
    pub fn last_page(&self) -> usize {
        if self.per_page == 0 {
            1
        } else {
            self.total.div_ceil(self.per_page).max(1)
        }
    }

    /// Returns `true` if later pages exist.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.page < self.last_page()
    }
}

/// A has-many relation used for eager-load counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Relation {
    /// Relation name; counts are attached as `<name>_count`.
    pub name: String,
    /// Related table.
    pub table: String,
    /// Column of the related table holding this table's id.
    pub foreign_key: String,
}

/// Definition of one table.
#[derive(Debug, Clone, Default)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Maintain `created_at` / `updated_at` on single-row writes.
    pub timestamps: bool,
    /// Relations available for eager loading.
    pub relations: Vec<Relation>,
    /// Named scopes.
    pub scopes: ScopeRegistry,
}

impl TableSchema {
    /// A table with no timestamps, relations or scopes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets timestamp maintenance.
    #[must_use]
    pub fn with_timestamps(mut self, timestamps: bool) -> Self {
        self.timestamps = timestamps;
        self
    }

    /// Adds a has-many relation.
    #[must_use]
    pub fn with_relation(
        mut self,
        name: impl Into<String>,
        table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relations.push(Relation {
            name: name.into(),
            table: table.into(),
            foreign_key: foreign_key.into(),
        });
        self
    }

    /// Adds a closure scope.
    #[must_use]
    pub fn with_scope<F>(mut self, name: impl Into<String>, scope: F) -> Self
    where
        F: Fn(&[Scalar]) -> Result<Vec<QueryStep>, String> + Send + Sync + 'static,
    {
        self.scopes.register(name, scope);
        self
    }

    /// Adds a declarative scope.
    #[must_use]
    pub fn with_scope_definition(mut self, definition: ScopeDefinition) -> Self {
        self.scopes.define(definition);
        self
    }
}

/// Storage backend type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// In-memory storage (ephemeral).
    InMemory,

    /// JSONL persistence, one `<table>.jsonl` file per table in this directory.
    Jsonl(PathBuf),
}

impl StorageBackend {
    /// Returns the data directory, if the backend persists to disk.
    #[must_use]
    pub fn data_path(&self) -> Option<&Path> {
        match self {
            StorageBackend::Jsonl(path) => Some(path),
            StorageBackend::InMemory => None,
        }
    }
}

/// In-memory storage persisted to a JSONL directory.
///
/// All queries go to the in-memory tables; `save` writes every table
/// atomically and `reload` replaces the rows with what is on disk.
struct JsonlBackedStorage {
    inner: in_memory::InMemoryStorage,
    dir: PathBuf,
}

#[async_trait]
impl RowStorage for JsonlBackedStorage {
    async fn select(
        &self,
        table: &str,
        query: &CompiledQuery,
        columns: &Columns,
    ) -> BackendResult<Vec<Row>> {
        self.inner.select(table, query, columns).await
    }

    async fn count(&self, table: &str, query: &CompiledQuery) -> BackendResult<usize> {
        self.inner.count(table, query).await
    }

    async fn delete_where(&self, table: &str, query: &CompiledQuery) -> BackendResult<usize> {
        self.inner.delete_where(table, query).await
    }

    async fn paginate(
        &self,
        table: &str,
        query: &CompiledQuery,
        columns: &Columns,
        request: &PageRequest,
    ) -> BackendResult<Page<Row>> {
        self.inner.paginate(table, query, columns, request).await
    }

    async fn find(
        &self,
        table: &str,
        id: RowId,
        query: &CompiledQuery,
        columns: &Columns,
    ) -> BackendResult<Option<Row>> {
        self.inner.find(table, id, query, columns).await
    }

    async fn find_by_column(
        &self,
        table: &str,
        column: &str,
        value: &Scalar,
        query: &CompiledQuery,
        columns: &Columns,
    ) -> BackendResult<Option<Row>> {
        self.inner
            .find_by_column(table, column, value, query, columns)
            .await
    }

    async fn apply_named_scope(
        &self,
        table: &str,
        name: &str,
        args: &[Scalar],
    ) -> BackendResult<Vec<QueryStep>> {
        self.inner.apply_named_scope(table, name, args).await
    }

    async fn scope_names(&self, table: &str) -> BackendResult<Vec<String>> {
        self.inner.scope_names(table).await
    }

    async fn insert(&self, table: &str, row: Row) -> BackendResult<Row> {
        self.inner.insert(table, row).await
    }

    async fn insert_many(&self, table: &str, rows: Vec<Row>) -> BackendResult<usize> {
        self.inner.insert_many(table, rows).await
    }

    async fn first_or_insert(&self, table: &str, row: Row) -> BackendResult<Row> {
        self.inner.first_or_insert(table, row).await
    }

    async fn update(&self, table: &str, id: RowId, changes: Row) -> BackendResult<Option<Row>> {
        self.inner.update(table, id, changes).await
    }

    async fn delete_by_ids(&self, table: &str, ids: &[RowId]) -> BackendResult<usize> {
        self.inner.delete_by_ids(table, ids).await
    }

    async fn tables(&self) -> BackendResult<Vec<String>> {
        self.inner.tables().await
    }

    async fn export(&self, table: &str) -> BackendResult<Vec<Row>> {
        self.inner.export(table).await
    }

    async fn save(&self) -> BackendResult<()> {
        in_memory::save_to_dir(&self.inner, &self.dir).await
    }

    async fn reload(&self) -> BackendResult<()> {
        let warnings = in_memory::reload_from_dir(&self.inner, &self.dir).await?;
        for warning in &warnings {
            tracing::warn!(warning = %warning, "JSONL reload warning");
        }
        Ok(())
    }
}

/// Creates a storage backend holding the given tables.
///
/// For [`StorageBackend::Jsonl`] the directory is created if missing, and
/// every `<table>.jsonl` in it is loaded. Files for tables not listed in
/// `tables` are loaded with a default schema. Load warnings are logged
/// and do not fail the call.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or read.
pub async fn create_storage(
    backend: StorageBackend,
    tables: Vec<TableSchema>,
) -> BackendResult<Arc<dyn RowStorage>> {
    match backend {
        StorageBackend::InMemory => Ok(in_memory::new_in_memory_storage(tables)),
        StorageBackend::Jsonl(dir) => {
            tokio::fs::create_dir_all(&dir).await?;
            let (inner, warnings) = in_memory::load_from_dir(&dir, tables).await?;
            for warning in &warnings {
                // Storage is still usable; bad lines were skipped.
                tracing::warn!(warning = %warning, "JSONL load warning");
            }
            tracing::debug!(dir = %dir.display(), "opened JSONL storage");
            Ok(Arc::new(JsonlBackedStorage { inner, dir }))
        }
    }
}

// ========== Test Utilities ==========

/// Id of the single row [`MockStorage`] can find.
#[cfg(any(test, feature = "test-util"))]
pub const MOCK_ROW_ID: RowId = RowId(1);

/// A storage double that records compiled queries.
///
/// Queries return no rows (except [`MOCK_ROW_ID`] for `find`), counts
/// are zero, and every table accepts any scope name listed in
/// [`MockStorage::with_scopes`].
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Clone, Default)]
pub struct MockStorage {
    scopes: Vec<String>,
    calls: Arc<std::sync::Mutex<Vec<RecordedCall>>>,
}

/// A query received by [`MockStorage`].
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Trait method name.
    pub method: &'static str,
    /// Table argument.
    pub table: String,
    /// Compiled query argument (empty for writes).
    pub query: CompiledQuery,
}

#[cfg(any(test, feature = "test-util"))]
impl MockStorage {
    /// Creates a mock with no scopes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock that reports `names` as defined scopes.
    #[must_use]
    pub fn with_scopes(names: &[&str]) -> Self {
        Self {
            scopes: names.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    /// Calls recorded so far.
    ///
    /// # Panics
    ///
    /// Panics if the recording mutex is poisoned.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("mock mutex poisoned").clone()
    }

    /// Compiled query of the most recent call.
    #[must_use]
    pub fn last_query(&self) -> Option<CompiledQuery> {
        self.calls().last().map(|call| call.query.clone())
    }

    fn record(&self, method: &'static str, table: &str, query: &CompiledQuery) {
        self.calls
            .lock()
            .expect("mock mutex poisoned")
            .push(RecordedCall {
                method,
                table: table.to_string(),
                query: query.clone(),
            });
    }

    /// The row [`MockStorage`] returns for [`MOCK_ROW_ID`].
    #[must_use]
    pub fn test_row(id: RowId) -> Row {
        [
            ("id", Scalar::from(id)),
            ("title", Scalar::from("Test Row")),
        ]
        .into_iter()
        .collect()
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl RowStorage for MockStorage {
    async fn select(
        &self,
        table: &str,
        query: &CompiledQuery,
        _columns: &Columns,
    ) -> BackendResult<Vec<Row>> {
        self.record("select", table, query);
        Ok(vec![])
    }

    async fn count(&self, table: &str, query: &CompiledQuery) -> BackendResult<usize> {
        self.record("count", table, query);
        Ok(0)
    }

    async fn delete_where(&self, table: &str, query: &CompiledQuery) -> BackendResult<usize> {
        self.record("delete_where", table, query);
        Ok(0)
    }

    async fn paginate(
        &self,
        table: &str,
        query: &CompiledQuery,
        _columns: &Columns,
        request: &PageRequest,
    ) -> BackendResult<Page<Row>> {
        self.record("paginate", table, query);
        Ok(Page {
            items: vec![],
            total: 0,
            page: request.page,
            per_page: request.per_page,
            page_name: request.page_name.clone(),
        })
    }

    async fn find(
        &self,
        table: &str,
        id: RowId,
        query: &CompiledQuery,
        _columns: &Columns,
    ) -> BackendResult<Option<Row>> {
        self.record("find", table, query);
        Ok((id == MOCK_ROW_ID).then(|| Self::test_row(id)))
    }

    async fn find_by_column(
        &self,
        table: &str,
        _column: &str,
        _value: &Scalar,
        query: &CompiledQuery,
        _columns: &Columns,
    ) -> BackendResult<Option<Row>> {
        self.record("find_by_column", table, query);
        Ok(None)
    }

    async fn apply_named_scope(
        &self,
        _table: &str,
        _name: &str,
        _args: &[Scalar],
    ) -> BackendResult<Vec<QueryStep>> {
        Ok(vec![])
    }

    async fn scope_names(&self, _table: &str) -> BackendResult<Vec<String>> {
        Ok(self.scopes.clone())
    }

    async fn insert(&self, table: &str, mut row: Row) -> BackendResult<Row> {
        self.record("insert", table, &CompiledQuery::default());
        if row.id().is_none() {
            row.insert("id", MOCK_ROW_ID);
        }
        Ok(row)
    }

    async fn insert_many(&self, table: &str, rows: Vec<Row>) -> BackendResult<usize> {
        self.record("insert_many", table, &CompiledQuery::default());
        Ok(rows.len())
    }

    async fn first_or_insert(&self, table: &str, row: Row) -> BackendResult<Row> {
        self.insert(table, row).await
    }

    async fn update(&self, table: &str, _id: RowId, _changes: Row) -> BackendResult<Option<Row>> {
        self.record("update", table, &CompiledQuery::default());
        Ok(None)
    }

    async fn delete_by_ids(&self, table: &str, _ids: &[RowId]) -> BackendResult<usize> {
        self.record("delete_by_ids", table, &CompiledQuery::default());
        Ok(0)
    }

    async fn tables(&self) -> BackendResult<Vec<String>> {
        Ok(vec![])
    }

    async fn export(&self, _table: &str) -> BackendResult<Vec<Row>> {
        Ok(vec![])
    }

    async fn save(&self) -> BackendResult<()> {
        Ok(())
    }

    async fn reload(&self) -> BackendResult<()> {
        // No backing store
        Ok(())
    }
}
