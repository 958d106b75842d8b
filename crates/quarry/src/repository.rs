//! The repository: a reusable query builder bound to one table.
//!
//! Builder methods accumulate a [`QuerySpec`]; each execution method
//! compiles the parts it needs, clears the per-call state, and runs one
//! storage call. Eager-load relations survive the reset unless the
//! repository was opened with [`ResetPolicy::Uniform`].
//!
//! ```no_run
//! # use quarry::storage::in_memory::new_in_memory_storage;
//! # use quarry::storage::TableSchema;
//! # use quarry::Repository;
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> quarry::Result<()> {
//! # let storage = new_in_memory_storage(vec![TableSchema::new("tickets")]);
//! let mut tickets = Repository::open(storage, "Ticket", "tickets").await?;
//!
//! let urgent = tickets
//!     .add_where("status", "open")
//!     .add_order_by("priority", false)
//!     .set_limit(10)
//!     .fetch_filtered(["id", "title"])
//!     .await?;
//!
//! // Filters were cleared: this counts every ticket.
//! let total = tickets.count().await?;
//! # let _ = (urgent, total);
//! # Ok(())
//! # }
//! ```

use crate::domain::{Columns, Operand, Row, RowId, Scalar};
use crate::error::{BackendError, Error, ErrorContext, Operation, Result};
use crate::query::conditions::{Normalized, normalize, parse_order};
use crate::query::{
    CompileMode, CompiledQuery, Conditions, Direction, FilterClause, InClause, ORDER_BY_PARAM,
    Operator, OrderSpec, QuerySpec, RequestParams, ResetPolicy, RowLimit,
};
use crate::storage::{Page, PageRequest, RowStorage};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Default page size for [`Repository::fetch_page`].
pub const DEFAULT_PER_PAGE: usize = 25;

/// Default page parameter name.
pub const DEFAULT_PAGE_NAME: &str = "page";

/// Repository behaviour settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryOptions {
    /// What executions clear.
    pub reset_policy: ResetPolicy,
    /// Page size used when `fetch_page` gets a zero limit.
    pub per_page: usize,
    /// Page parameter name used when `fetch_page` gets an empty one.
    pub page_name: String,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            reset_policy: ResetPolicy::default(),
            per_page: DEFAULT_PER_PAGE,
            page_name: DEFAULT_PAGE_NAME.to_string(),
        }
    }
}

/// Relation names for [`Repository::with_relations`]: one name or a list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationList(Vec<String>);

impl From<&str> for RelationList {
    fn from(name: &str) -> Self {
        Self(vec![name.to_string()])
    }
}

impl From<String> for RelationList {
    fn from(name: String) -> Self {
        Self(vec![name])
    }
}

impl From<Vec<String>> for RelationList {
    fn from(names: Vec<String>) -> Self {
        Self(names)
    }
}

impl From<Vec<&str>> for RelationList {
    fn from(names: Vec<&str>) -> Self {
        Self(names.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for RelationList {
    fn from(names: &[&str]) -> Self {
        Self(names.iter().map(|n| (*n).to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for RelationList {
    fn from(names: [&str; N]) -> Self {
        Self(names.iter().map(|n| (*n).to_string()).collect())
    }
}

/// A query builder bound to one table of a storage backend.
///
/// A repository is meant for sequential use within one request: execution
/// methods take `&mut self`, so it cannot run two queries at once.
pub struct Repository {
    storage: Arc<dyn RowStorage>,
    entity: String,
    table: String,
    spec: QuerySpec,
    scopes: BTreeSet<String>,
    options: RepositoryOptions,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("entity", &self.entity)
            .field("table", &self.table)
            .field("spec", &self.spec)
            .field("scopes", &self.scopes)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Repository {
    /// Opens a repository with default options.
    ///
    /// `entity` names what the table stores (e.g. `billing::Invoice`) and is
    /// used in error context and message keys.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the backend does not know `table`.
    pub async fn open(
        storage: Arc<dyn RowStorage>,
        entity: impl Into<String>,
        table: impl Into<String>,
    ) -> Result<Self> {
        Self::open_with(storage, entity, table, RepositoryOptions::default()).await
    }

    /// Opens a repository with explicit options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the backend does not know `table`.
    pub async fn open_with(
        storage: Arc<dyn RowStorage>,
        entity: impl Into<String>,
        table: impl Into<String>,
        options: RepositoryOptions,
    ) -> Result<Self> {
        let mut repository = Self {
            storage,
            entity: entity.into(),
            table: table.into(),
            spec: QuerySpec::default(),
            scopes: BTreeSet::new(),
            options,
        };
        repository.refresh_scopes().await?;
        Ok(repository)
    }

    /// Re-reads the scope names the backend defines for the table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the backend call fails.
    pub async fn refresh_scopes(&mut self) -> Result<()> {
        let names = self
            .storage
            .scope_names(&self.table)
            .await
            .map_err(|source| self.storage_error(self.context(Operation::Open), source))?;
        self.scopes = names.into_iter().collect();
        Ok(())
    }

    /// Entity name used in error context.
    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Table this repository queries.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The accumulated specification.
    #[must_use]
    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    /// Options in effect.
    #[must_use]
    pub fn options(&self) -> &RepositoryOptions {
        &self.options
    }

    /// Scope names accepted by [`apply_scope`](Self::apply_scope).
    pub fn scope_names(&self) -> impl Iterator<Item = &str> {
        self.scopes.iter().map(String::as_str)
    }

    // ========== Builder ==========

    /// Adds `column = value`.
    pub fn add_where(&mut self, column: impl Into<String>, value: impl Into<Scalar>) -> &mut Self {
        self.add_where_op(column, value, Operator::Eq)
    }

    /// Adds `column <operator> value`, AND-ed with the other filters.
    pub fn add_where_op(
        &mut self,
        column: impl Into<String>,
        value: impl Into<Scalar>,
        operator: Operator,
    ) -> &mut Self {
        self.spec
            .wheres
            .push(FilterClause::new(column, operator, value));
        self
    }

    /// Adds `OR column <operator> value`.
    pub fn add_or_where(
        &mut self,
        column: impl Into<String>,
        value: impl Into<Scalar>,
        operator: Operator,
    ) -> &mut Self {
        self.spec
            .or_wheres
            .push(FilterClause::new(column, operator, value));
        self
    }

    /// Adds `column IN (values)`. A single value becomes a one-element list.
    pub fn add_where_in(&mut self, column: impl Into<String>, values: impl Into<Operand>) -> &mut Self {
        self.spec.where_ins.push(InClause {
            column: column.into(),
            values: values.into().into_list(),
        });
        self
    }

    /// Adds filters from `[column, value, operator?]` tuples.
    ///
    /// Two-element tuples compare with `=`; a list value becomes an IN
    /// filter. Malformed tuples are skipped; see
    /// [`try_add_where_from_pairs`](Self::try_add_where_from_pairs) for the
    /// checked form.
    pub fn add_where_from_pairs(&mut self, conditions: impl Into<Conditions>) -> &mut Self {
        for tuple in conditions.into().into_tuples() {
            if let Ok(parsed) = normalize(&tuple) {
                self.push_normalized(parsed);
            }
        }
        self
    }

    /// Checked form of [`add_where_from_pairs`](Self::add_where_from_pairs).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContractViolation`] for the first malformed tuple;
    /// no filter from `conditions` is added in that case.
    pub fn try_add_where_from_pairs(&mut self, conditions: impl Into<Conditions>) -> Result<&mut Self> {
        let parsed = conditions
            .into()
            .into_tuples()
            .iter()
            .enumerate()
            .map(|(index, tuple)| {
                normalize(tuple).map_err(|reason| Error::ContractViolation {
                    reason: format!("condition {}: {reason}", index + 1),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        for condition in parsed {
            self.push_normalized(condition);
        }
        Ok(self)
    }

    fn push_normalized(&mut self, condition: Normalized) {
        match condition {
            Normalized::Where(clause) => self.spec.wheres.push(clause),
            Normalized::WhereIn(clause) => self.spec.where_ins.push(clause),
        }
    }

    /// Adds a sort key: `true` sorts ascending, `false` descending.
    pub fn add_order_by(&mut self, column: impl Into<String>, ascending: bool) -> &mut Self {
        self.spec
            .order_bys
            .push(OrderSpec::new(column, Direction::from_ascending(ascending)));
        self
    }

    /// Sets the row cap, replacing any earlier one. A negative limit means
    /// unlimited and sends fetches down the unfiltered path.
    pub fn set_limit(&mut self, limit: impl Into<RowLimit>) -> &mut Self {
        self.spec.limit = limit.into();
        self
    }

    /// Replaces the eager-load relations.
    pub fn with_relations(&mut self, relations: impl Into<RelationList>) -> &mut Self {
        self.spec.relations = relations.into().0;
        self
    }

    /// Records a named scope. A later call with the same name replaces the
    /// arguments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownScope`] if the backend defines no such scope
    /// for this table.
    pub fn apply_scope(&mut self, name: &str, args: Vec<Scalar>) -> Result<&mut Self> {
        if !self.scopes.contains(name) {
            let context = self
                .context(Operation::ApplyScope)
                .with_subject(format!("scope={name}"))
                .with_property("args", &args);
            return Err(Error::UnknownScope {
                scope: name.to_string(),
                context: Box::new(context),
            });
        }
        self.spec.scopes.insert(name, args);
        Ok(self)
    }

    /// Adds filters from explicit conditions plus request parameters.
    ///
    /// The `order_by` parameter (`"column,direction"` or a list of them) is
    /// turned into sort keys first. Remaining parameters become
    /// `[key, value]` tuples appended after `conditions`.
    pub fn set_filters_from_request(
        &mut self,
        conditions: impl Into<Conditions>,
        mut params: RequestParams,
    ) -> &mut Self {
        if let Some(order) = params.take(ORDER_BY_PARAM) {
            self.spec.order_bys.extend(parse_order(&order));
        }
        let mut tuples = conditions.into().into_tuples();
        tuples.extend(params.into_tuples());
        self.add_where_from_pairs(tuples)
    }

    /// Compiles the current state for `mode` without executing or resetting.
    #[must_use]
    pub fn compile(&self, mode: CompileMode) -> CompiledQuery {
        self.spec.compile(mode)
    }

    /// Compile mode `operation` would use if run now.
    ///
    /// An unlimited row limit sends `fetch_filtered`, `fetch_one` and
    /// `fetch_page` down the `fetch_all` path, which only eager-loads.
    #[must_use]
    pub fn mode_for(&self, operation: Operation) -> CompileMode {
        match operation {
            Operation::Count | Operation::Delete => CompileMode::Filters,
            Operation::FetchFiltered | Operation::FetchOne | Operation::FetchPage
                if self.spec.limit.is_unlimited() =>
            {
                CompileMode::EagerOnly
            }
            Operation::FetchFiltered | Operation::FetchOne => CompileMode::Select,
            Operation::FetchPage => CompileMode::Paginate,
            _ => CompileMode::EagerOnly,
        }
    }

    /// Clears per-call state as an execution would.
    pub fn reset(&mut self) {
        self.spec.reset(self.options.reset_policy);
    }

    /// Compiles for `mode`, then resets.
    fn take_query(&mut self, mode: CompileMode) -> CompiledQuery {
        let query = self.spec.compile(mode);
        self.reset();
        query
    }

    // ========== Execution ==========

    /// Returns every row with eager-load counts; filters, sort keys, scopes
    /// and the limit are ignored (and cleared).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the backend fails.
    pub async fn fetch_all(&mut self, columns: impl Into<Columns>) -> Result<Vec<Row>> {
        let columns = columns.into();
        let query = self.take_query(CompileMode::EagerOnly);
        self.storage
            .select(&self.table, &query, &columns)
            .await
            .map_err(|source| {
                self.storage_error(self.query_context(Operation::FetchAll, &query, &columns), source)
            })
    }

    /// Counts rows matching the filters and scopes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the backend fails.
    pub async fn count(&mut self) -> Result<usize> {
        let query = self.take_query(CompileMode::Filters);
        self.storage
            .count(&self.table, &query)
            .await
            .map_err(|source| {
                self.storage_error(
                    self.query_context(Operation::Count, &query, &Columns::All),
                    source,
                )
            })
    }

    /// Returns rows matching everything accumulated: relations, filters,
    /// sort keys, scopes and limit.
    ///
    /// With an unlimited limit this behaves like [`fetch_all`](Self::fetch_all).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the backend fails.
    pub async fn fetch_filtered(&mut self, columns: impl Into<Columns>) -> Result<Vec<Row>> {
        if self.spec.limit.is_unlimited() {
            return self.fetch_all(columns).await;
        }
        let columns = columns.into();
        let query = self.take_query(CompileMode::Select);
        self.storage
            .select(&self.table, &query, &columns)
            .await
            .map_err(|source| {
                self.storage_error(
                    self.query_context(Operation::FetchFiltered, &query, &columns),
                    source,
                )
            })
    }

    /// Like [`fetch_filtered`](Self::fetch_filtered) but returns the first row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if nothing matches, [`Error::Storage`]
    /// if the backend fails.
    pub async fn fetch_one(&mut self, columns: impl Into<Columns>) -> Result<Row> {
        let columns = columns.into();
        let query = self.take_query(self.mode_for(Operation::FetchOne));
        let rows = self
            .storage
            .select(&self.table, &query, &columns)
            .await
            .map_err(|source| {
                self.storage_error(self.query_context(Operation::FetchOne, &query, &columns), source)
            })?;
        rows.into_iter().next().ok_or_else(|| Error::NotFound {
            context: Box::new(self.query_context(Operation::FetchOne, &query, &columns)),
        })
    }

    /// Returns one page of matching rows.
    ///
    /// A negative `limit` (or an unlimited accumulated limit) returns
    /// [`fetch_all`](Self::fetch_all) as a single page. A zero `limit` uses
    /// the configured page size. The accumulated limit never caps a page.
    /// `page` defaults to 1.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the backend fails.
    pub async fn fetch_page(
        &mut self,
        limit: impl Into<RowLimit>,
        columns: impl Into<Columns>,
        page_name: &str,
        page: Option<usize>,
    ) -> Result<Page<Row>> {
        let page_name = if page_name.is_empty() {
            self.options.page_name.clone()
        } else {
            page_name.to_string()
        };
        let per_page = match limit.into() {
            RowLimit::Unlimited => None,
            RowLimit::Rows(0) | RowLimit::Unset => Some(self.options.per_page),
            RowLimit::Rows(n) => Some(n),
        };
        let Some(per_page) = per_page.filter(|_| !self.spec.limit.is_unlimited()) else {
            let items = self.fetch_all(columns).await?;
            return Ok(Page::single(items, page_name));
        };

        let columns = columns.into();
        let request = PageRequest::new(per_page, page.unwrap_or(1), page_name);
        let query = self.take_query(CompileMode::Paginate);
        self.storage
            .paginate(&self.table, &query, &columns, &request)
            .await
            .map_err(|source| {
                let context = self
                    .query_context(Operation::FetchPage, &query, &columns)
                    .with_property("per_page", request.per_page)
                    .with_property("page", request.page);
                self.storage_error(context, source)
            })
    }

    /// Deletes rows matching the filters and scopes; returns how many.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the backend fails.
    pub async fn delete(&mut self) -> Result<usize> {
        let query = self.take_query(CompileMode::Filters);
        self.storage
            .delete_where(&self.table, &query)
            .await
            .map_err(|source| {
                self.storage_error(
                    self.query_context(Operation::Delete, &query, &Columns::All),
                    source,
                )
            })
    }

    /// Looks up a row by id with eager-load counts; filters are ignored
    /// (and cleared).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no row has `id`, [`Error::Storage`]
    /// if the backend fails.
    pub async fn fetch_by_id(&mut self, id: impl Into<RowId>, columns: impl Into<Columns>) -> Result<Row> {
        let id = id.into();
        let columns = columns.into();
        let query = self.take_query(CompileMode::EagerOnly);
        let context = || {
            self.query_context(Operation::FetchById, &query, &columns)
                .with_subject(format!("id={id}"))
                .with_property("id", id)
        };
        match self.storage.find(&self.table, id, &query, &columns).await {
            Ok(Some(row)) => Ok(row),
            Ok(None) => Err(Error::NotFound {
                context: Box::new(context()),
            }),
            Err(source) => Err(self.storage_error(context(), source)),
        }
    }

    /// Returns the first row whose `column` equals `value`, or `None`.
    /// Only eager-load relations apply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the backend fails.
    pub async fn fetch_by_column(
        &mut self,
        column: &str,
        value: impl Into<Scalar>,
        columns: impl Into<Columns>,
    ) -> Result<Option<Row>> {
        let value = value.into();
        let columns = columns.into();
        let query = self.take_query(CompileMode::EagerOnly);
        self.storage
            .find_by_column(&self.table, column, &value, &query, &columns)
            .await
            .map_err(|source| {
                let context = self
                    .query_context(Operation::FetchByColumn, &query, &columns)
                    .with_property("column", column)
                    .with_property("item", &value);
                self.storage_error(context, source)
            })
    }

    // ========== Writes ==========

    /// Inserts a row and returns it as stored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the backend rejects the row.
    pub async fn create(&mut self, row: Row) -> Result<Row> {
        self.reset();
        let context = self.context(Operation::Create).with_property("row", &row);
        self.storage
            .insert(&self.table, row)
            .await
            .map_err(|source| self.storage_error(context, source))
    }

    /// Returns the first row containing every column of `row`, creating it
    /// if none does.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the backend fails.
    pub async fn first_or_create(&mut self, row: Row) -> Result<Row> {
        self.reset();
        let context = self
            .context(Operation::FirstOrCreate)
            .with_property("row", &row);
        self.storage
            .first_or_insert(&self.table, row)
            .await
            .map_err(|source| self.storage_error(context, source))
    }

    /// Inserts rows in one batch. Timestamps are not maintained.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if any row is rejected; nothing is
    /// inserted then.
    pub async fn create_many(&mut self, rows: Vec<Row>) -> Result<usize> {
        self.reset();
        let context = self
            .context(Operation::CreateMany)
            .with_property("rows", rows.len());
        self.storage
            .insert_many(&self.table, rows)
            .await
            .map_err(|source| self.storage_error(context, source))
    }

    /// Merges `changes` into the row with `id` and returns the result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no row has `id`, [`Error::Storage`]
    /// if the backend rejects the change.
    pub async fn update_by_id(&mut self, id: impl Into<RowId>, changes: Row) -> Result<Row> {
        self.reset();
        let id = id.into();
        let context = self
            .context(Operation::UpdateById)
            .with_subject(format!("id={id}"))
            .with_property("changes", &changes);
        match self.storage.update(&self.table, id, changes).await {
            Ok(Some(row)) => Ok(row),
            Ok(None) => Err(Error::NotFound {
                context: Box::new(context),
            }),
            Err(source) => Err(self.storage_error(context, source)),
        }
    }

    /// Deletes the row with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no row has `id`.
    pub async fn delete_by_id(&mut self, id: impl Into<RowId>) -> Result<()> {
        self.reset();
        let id = id.into();
        let context = self
            .context(Operation::DeleteById)
            .with_subject(format!("id={id}"))
            .with_property("id", id);
        match self.storage.delete_by_ids(&self.table, &[id]).await {
            Ok(0) => Err(Error::NotFound {
                context: Box::new(context),
            }),
            Ok(_) => Ok(()),
            Err(source) => Err(self.storage_error(context, source)),
        }
    }

    /// Deletes rows by id; returns how many existed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the backend fails.
    pub async fn delete_many_by_id(&mut self, ids: &[RowId]) -> Result<usize> {
        self.reset();
        let context = self
            .context(Operation::DeleteManyById)
            .with_property("ids", ids);
        self.storage
            .delete_by_ids(&self.table, ids)
            .await
            .map_err(|source| self.storage_error(context, source))
    }

    // ========== Error context ==========

    fn context(&self, operation: Operation) -> ErrorContext {
        ErrorContext::new(self.entity.clone(), operation).with_property("table", &self.table)
    }

    fn query_context(
        &self,
        operation: Operation,
        query: &CompiledQuery,
        columns: &Columns,
    ) -> ErrorContext {
        self.context(operation)
            .with_property("columns", columns)
            .with_property("query", query)
    }

    #[allow(clippy::unused_self)]
    fn storage_error(&self, context: ErrorContext, source: BackendError) -> Error {
        Error::Storage {
            context: Box::new(context),
            source,
        }
    }
}
