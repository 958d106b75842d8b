//! `RowStorage` implementation for in-memory storage.

use super::InMemoryStorage;
use crate::domain::{Columns, Row, RowId, Scalar};
use crate::error::BackendResult;
use crate::query::{CompiledQuery, QueryStep};
use crate::storage::{Page, PageRequest, RowStorage};
use async_trait::async_trait;
use std::cmp::Ordering;

#[async_trait]
impl RowStorage for InMemoryStorage {
    async fn select(
        &self,
        table: &str,
        query: &CompiledQuery,
        columns: &Columns,
    ) -> BackendResult<Vec<Row>> {
        let inner = self.lock().await;
        inner.select(table, query, columns)
    }

    async fn count(&self, table: &str, query: &CompiledQuery) -> BackendResult<usize> {
        let inner = self.lock().await;
        let (_, rows) = inner.matching(table, query)?;
        Ok(rows.len())
    }

    async fn delete_where(&self, table: &str, query: &CompiledQuery) -> BackendResult<usize> {
        let mut inner = self.lock().await;
        let removed = inner.delete_where(table, query)?;
        tracing::debug!(table, removed, "deleted matching rows");
        Ok(removed)
    }

    async fn paginate(
        &self,
        table: &str,
        query: &CompiledQuery,
        columns: &Columns,
        request: &PageRequest,
    ) -> BackendResult<Page<Row>> {
        let inner = self.lock().await;
        inner.paginate(table, query, columns, request)
    }

    async fn find(
        &self,
        table: &str,
        id: RowId,
        query: &CompiledQuery,
        columns: &Columns,
    ) -> BackendResult<Option<Row>> {
        let inner = self.lock().await;
        let Some(row) = inner.table(table)?.rows.get(&id).cloned() else {
            return Ok(None);
        };
        let relations: Vec<String> = query.relations().map(str::to_string).collect();
        Ok(inner.finish(table, &relations, vec![row], columns)?.pop())
    }

    async fn find_by_column(
        &self,
        table: &str,
        column: &str,
        value: &Scalar,
        query: &CompiledQuery,
        columns: &Columns,
    ) -> BackendResult<Option<Row>> {
        let inner = self.lock().await;
        let Some(row) = inner
            .table(table)?
            .rows
            .values()
            .find(|row| match value {
                Scalar::Null => row.value(column).is_null(),
                _ => row.value(column).compare(value) == Some(Ordering::Equal),
            })
            .cloned()
        else {
            return Ok(None);
        };
        let relations: Vec<String> = query.relations().map(str::to_string).collect();
        Ok(inner.finish(table, &relations, vec![row], columns)?.pop())
    }

    async fn apply_named_scope(
        &self,
        table: &str,
        name: &str,
        args: &[Scalar],
    ) -> BackendResult<Vec<QueryStep>> {
        let inner = self.lock().await;
        inner.table(table)?.schema.scopes.expand(name, args)
    }

    async fn scope_names(&self, table: &str) -> BackendResult<Vec<String>> {
        let inner = self.lock().await;
        Ok(inner.table(table)?.schema.scopes.names())
    }

    async fn insert(&self, table: &str, row: Row) -> BackendResult<Row> {
        let mut inner = self.lock().await;
        let row = inner.table_mut(table)?.insert(row, true)?;
        tracing::debug!(table, id = ?row.id(), "inserted row");
        Ok(row)
    }

    async fn insert_many(&self, table: &str, rows: Vec<Row>) -> BackendResult<usize> {
        let mut inner = self.lock().await;
        let inserted = inner.insert_many(table, rows)?;
        tracing::debug!(table, inserted, "inserted batch");
        Ok(inserted)
    }

    async fn first_or_insert(&self, table: &str, row: Row) -> BackendResult<Row> {
        let mut inner = self.lock().await;
        let target = inner.table_mut(table)?;
        if let Some(existing) = target.rows.values().find(|r| r.contains(&row)) {
            return Ok(existing.clone());
        }
        target.insert(row, true)
    }

    async fn update(&self, table: &str, id: RowId, changes: Row) -> BackendResult<Option<Row>> {
        let mut inner = self.lock().await;
        inner.table_mut(table)?.update(id, changes)
    }

    async fn delete_by_ids(&self, table: &str, ids: &[RowId]) -> BackendResult<usize> {
        let mut inner = self.lock().await;
        let target = inner.table_mut(table)?;
        Ok(ids
            .iter()
            .filter(|id| target.rows.remove(*id).is_some())
            .count())
    }

    async fn tables(&self) -> BackendResult<Vec<String>> {
        let inner = self.lock().await;
        Ok(inner.tables.keys().cloned().collect())
    }

    async fn export(&self, table: &str) -> BackendResult<Vec<Row>> {
        let inner = self.lock().await;
        Ok(inner.table(table)?.rows.values().cloned().collect())
    }

    async fn save(&self) -> BackendResult<()> {
        // In-memory only; JsonlBackedStorage persists.
        Ok(())
    }

    async fn reload(&self) -> BackendResult<()> {
        Ok(())
    }
}
