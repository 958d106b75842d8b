//! Core in-memory data structures.
//!
//! [`InMemoryDatabase`] holds every table and is wrapped in
//! `Arc<Mutex<>>` for shared async access.

use super::evaluate::Plan;
use super::sorting::sort_rows;
use crate::domain::{Columns, PRIMARY_KEY, Row, RowId, Scalar};
use crate::error::{BackendError, BackendResult};
use crate::query::CompiledQuery;
use crate::storage::{Page, PageRequest, TableSchema};
use chrono::Utc;
use std::collections::BTreeMap;

/// Timestamp column set on insert.
pub const CREATED_AT: &str = "created_at";
/// Timestamp column set on insert and update.
pub const UPDATED_AT: &str = "updated_at";

/// One table: schema plus rows keyed by id.
#[derive(Debug)]
pub(crate) struct Table {
    pub(super) schema: TableSchema,
    pub(super) rows: BTreeMap<RowId, Row>,
    next_id: i64,
}

impl Table {
    pub(super) fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Replaces all rows, keeping the schema.
    ///
    /// Rows must leave room for a following id; see [`id_has_successor`].
    pub(super) fn replace_rows(&mut self, rows: BTreeMap<RowId, Row>) {
        self.next_id = rows
            .keys()
            .next_back()
            .map_or(1, |id| id.0.saturating_add(1));
        self.rows = rows;
    }

    /// Assigns or validates the id of `row` without storing it.
    fn claim_id(&mut self, row: &mut Row) -> BackendResult<RowId> {
        let id = match row.get(PRIMARY_KEY) {
            None | Some(Scalar::Null) => {
                let id = RowId(self.next_id);
                row.insert(PRIMARY_KEY, id);
                id
            }
            Some(Scalar::Int(id)) => RowId(*id),
            Some(other) => {
                return Err(BackendError::Constraint {
                    table: self.schema.name.clone(),
                    message: format!("id must be an integer, got {other}"),
                });
            }
        };
        if self.rows.contains_key(&id) {
            return Err(BackendError::Constraint {
                table: self.schema.name.clone(),
                message: format!("duplicate id {id}"),
            });
        }
        let Some(following) = id.0.checked_add(1) else {
            return Err(BackendError::Constraint {
                table: self.schema.name.clone(),
                message: format!("id {id} is out of range"),
            });
        };
        self.next_id = self.next_id.max(following);
        Ok(id)
    }

    pub(super) fn insert(&mut self, mut row: Row, stamp: bool) -> BackendResult<Row> {
        let id = self.claim_id(&mut row)?;
        if stamp && self.schema.timestamps {
            let now = Scalar::from(Utc::now().to_rfc3339());
            if row.value(CREATED_AT).is_null() {
                row.insert(CREATED_AT, now.clone());
            }
            if row.value(UPDATED_AT).is_null() {
                row.insert(UPDATED_AT, now);
            }
        }
        self.rows.insert(id, row.clone());
        Ok(row)
    }

    pub(super) fn update(&mut self, id: RowId, mut changes: Row) -> BackendResult<Option<Row>> {
        if let Some(new_id) = changes.remove(PRIMARY_KEY) {
            if new_id != Scalar::from(id) {
                return Err(BackendError::Constraint {
                    table: self.schema.name.clone(),
                    message: format!("cannot change id {id} to {new_id}"),
                });
            }
        }
        let timestamps = self.schema.timestamps;
        let Some(row) = self.rows.get_mut(&id) else {
            return Ok(None);
        };
        row.merge(changes);
        if timestamps {
            row.insert(UPDATED_AT, Utc::now().to_rfc3339());
        }
        Ok(Some(row.clone()))
    }
}

/// All tables of an in-memory database.
///
/// Not used directly; see [`InMemoryStorage`](super::InMemoryStorage).
#[derive(Debug, Default)]
pub struct InMemoryDatabase {
    pub(super) tables: BTreeMap<String, Table>,
}

impl InMemoryDatabase {
    pub(crate) fn new(schemas: Vec<TableSchema>) -> Self {
        let tables = schemas
            .into_iter()
            .map(|schema| (schema.name.clone(), Table::new(schema)))
            .collect();
        Self { tables }
    }

    pub(super) fn table(&self, name: &str) -> BackendResult<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| BackendError::UnknownTable(name.to_string()))
    }

    pub(super) fn table_mut(&mut self, name: &str) -> BackendResult<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| BackendError::UnknownTable(name.to_string()))
    }

    /// Filters and sorts `table`'s rows; the plan's limit is not applied.
    pub(super) fn matching(&self, table: &str, query: &CompiledQuery) -> BackendResult<(Plan, Vec<Row>)> {
        let table = self.table(table)?;
        let plan = Plan::build(query, &table.schema.scopes)?;
        let mut rows: Vec<Row> = table
            .rows
            .values()
            .filter(|row| plan.matches(row))
            .cloned()
            .collect();
        sort_rows(&mut rows, &plan.orders);
        Ok((plan, rows))
    }

    /// Attaches `<relation>_count` columns and projects to `columns`.
    pub(super) fn finish(
        &self,
        table: &str,
        relations: &[String],
        rows: Vec<Row>,
        columns: &Columns,
    ) -> BackendResult<Vec<Row>> {
        let schema = &self.table(table)?.schema;
        let mut counters = Vec::with_capacity(relations.len());
        for name in relations {
            let relation = schema
                .relations
                .iter()
                .find(|r| &r.name == name)
                .ok_or_else(|| BackendError::UnknownRelation {
                    table: table.to_string(),
                    relation: name.clone(),
                })?;
            let related = self.table(&relation.table)?;
            let mut counts: BTreeMap<i64, i64> = BTreeMap::new();
            for row in related.rows.values() {
                if let Some(key) = foreign_key(row.value(&relation.foreign_key)) {
                    *counts.entry(key).or_default() += 1;
                }
            }
            counters.push((format!("{name}_count"), counts));
        }

        let count_columns: Vec<String> = counters.iter().map(|(c, _)| c.clone()).collect();
        Ok(rows
            .into_iter()
            .map(|mut row| {
                for (column, counts) in &counters {
                    let count = row
                        .id()
                        .and_then(|id| counts.get(&id.0).copied())
                        .unwrap_or(0);
                    row.insert(column.clone(), count);
                }
                row.project(columns, &count_columns)
            })
            .collect())
    }

    pub(super) fn select(
        &self,
        table: &str,
        query: &CompiledQuery,
        columns: &Columns,
    ) -> BackendResult<Vec<Row>> {
        let (plan, mut rows) = self.matching(table, query)?;
        if let Some(limit) = plan.limit {
            rows.truncate(limit);
        }
        self.finish(table, &plan.relations, rows, columns)
    }

    pub(super) fn paginate(
        &self,
        table: &str,
        query: &CompiledQuery,
        columns: &Columns,
        request: &PageRequest,
    ) -> BackendResult<Page<Row>> {
        let (plan, rows) = self.matching(table, query)?;
        let total = rows.len();
        let items: Vec<Row> = rows
            .into_iter()
            .skip(request.offset())
            .take(request.per_page)
            .collect();
        Ok(Page {
            items: self.finish(table, &plan.relations, items, columns)?,
            total,
            page: request.page,
            per_page: request.per_page,
            page_name: request.page_name.clone(),
        })
    }

    pub(super) fn delete_where(&mut self, table: &str, query: &CompiledQuery) -> BackendResult<usize> {
        let (_, rows) = self.matching(table, query)?;
        let table = self.table_mut(table)?;
        let mut removed = 0;
        for id in rows.iter().filter_map(Row::id) {
            if table.rows.remove(&id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub(super) fn insert_many(&mut self, table: &str, rows: Vec<Row>) -> BackendResult<usize> {
        let target = self.table_mut(table)?;
        // Validate the whole batch against a scratch copy first.
        let mut scratch = Table {
            schema: TableSchema::new(target.schema.name.clone()),
            rows: target.rows.clone(),
            next_id: target.next_id,
        };
        for row in rows {
            scratch.insert(row, false)?;
        }
        let inserted = scratch.rows.len() - target.rows.len();
        target.rows = scratch.rows;
        target.next_id = scratch.next_id;
        Ok(inserted)
    }
}

/// Ids up to `i64::MAX - 1` are storable; the auto-increment counter
/// needs room for one more.
pub(super) fn id_has_successor(id: RowId) -> bool {
    id.0.checked_add(1).is_some()
}

/// Foreign keys are integer ids, possibly stored as numeric text.
fn foreign_key(value: &Scalar) -> Option<i64> {
    match value {
        Scalar::Int(id) => Some(*id),
        Scalar::Text(text) => text.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titled(title: &str) -> Row {
        [("title", title)].into_iter().collect()
    }

    #[test]
    fn ids_auto_increment_past_explicit_ids() {
        let mut table = Table::new(TableSchema::new("notes"));
        let first = table.insert(titled("a"), true).unwrap();
        let mut explicit = titled("b");
        explicit.insert("id", 10);
        table.insert(explicit, true).unwrap();
        let third = table.insert(titled("c"), true).unwrap();

        assert_eq!(first.id(), Some(RowId(1)));
        assert_eq!(third.id(), Some(RowId(11)));
    }

    #[test]
    fn duplicate_id_is_a_constraint_violation() {
        let mut table = Table::new(TableSchema::new("notes"));
        let row = table.insert(titled("a"), true).unwrap();
        let err = table.insert(row, true).unwrap_err();
        assert!(matches!(err, BackendError::Constraint { .. }));
    }

    #[test]
    fn timestamps_only_when_enabled_and_stamping() {
        let mut stamped = Table::new(TableSchema::new("notes").with_timestamps(true));
        let row = stamped.insert(titled("a"), true).unwrap();
        assert!(row.get(CREATED_AT).is_some());
        assert_eq!(row.get(CREATED_AT), row.get(UPDATED_AT));

        let batch = stamped.insert(titled("b"), false).unwrap();
        assert!(batch.get(CREATED_AT).is_none());

        let mut plain = Table::new(TableSchema::new("notes"));
        assert!(plain.insert(titled("a"), true).unwrap().get(CREATED_AT).is_none());
    }

    #[test]
    fn update_refuses_id_change() {
        let mut table = Table::new(TableSchema::new("notes"));
        table.insert(titled("a"), true).unwrap();
        let mut changes = titled("b");
        changes.insert("id", 2);
        assert!(table.update(RowId(1), changes).is_err());
        assert_eq!(table.update(RowId(5), titled("x")).unwrap(), None);
    }

    #[test]
    fn failed_batch_inserts_nothing() {
        let mut db = InMemoryDatabase::new(vec![TableSchema::new("notes")]);
        let mut dup = titled("dup");
        dup.insert("id", 1);
        let err = db
            .insert_many("notes", vec![titled("a"), dup])
            .unwrap_err();
        assert!(matches!(err, BackendError::Constraint { .. }));
        assert!(db.table("notes").unwrap().rows.is_empty());
    }

    #[test]
    fn id_without_successor_is_rejected() {
        let mut table = Table::new(TableSchema::new("notes"));
        let mut last = titled("last");
        last.insert("id", i64::MAX);
        let err = table.insert(last, true).unwrap_err();
        assert!(matches!(err, BackendError::Constraint { ref message, .. } if message.contains("out of range")));
        assert!(table.rows.is_empty());

        let mut below = titled("below");
        below.insert("id", i64::MAX - 1);
        table.insert(below, true).unwrap();
        let err = table.insert(titled("next"), true).unwrap_err();
        assert!(matches!(err, BackendError::Constraint { .. }));
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn replace_rows_resets_next_id() {
        let mut table = Table::new(TableSchema::new("notes"));
        let mut rows = BTreeMap::new();
        let mut row = titled("x");
        row.insert("id", 7);
        rows.insert(RowId(7), row);
        table.replace_rows(rows);
        assert_eq!(table.insert(titled("y"), true).unwrap().id(), Some(RowId(8)));
    }
}
