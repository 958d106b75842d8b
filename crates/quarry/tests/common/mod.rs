//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use quarry::domain::{Row, Scalar};
use quarry::query::{FilterClause, Operator, QueryStep};
use quarry::storage::in_memory::new_in_memory_storage;
use quarry::storage::scopes::equals;
use quarry::storage::{RowStorage, TableSchema};
use quarry::Repository;
use std::sync::Arc;

/// Builds a row from column/value pairs.
pub fn row<const N: usize>(pairs: [(&str, Scalar); N]) -> Row {
    pairs.into_iter().collect()
}

/// Ids of `rows` in order.
pub fn ids(rows: &[Row]) -> Vec<i64> {
    rows.iter().filter_map(Row::id).map(|id| id.0).collect()
}

/// Schema of the `tickets` table: `comments` relation plus three scopes.
pub fn tickets_schema() -> TableSchema {
    TableSchema::new("tickets")
        .with_relation("comments", "comments", "ticket_id")
        .with_relation("watchers", "watchers", "ticket_id")
        .with_scope("open", |_| Ok(vec![equals("status", "open")]))
        .with_scope("team", |args| match args {
            [team] => Ok(vec![equals("team", team.clone())]),
            _ => Err(format!("team expects 1 argument, got {}", args.len())),
        })
        .with_scope("priority-above", |args| match args {
            [min] => Ok(vec![QueryStep::Where(FilterClause::new(
                "priority",
                Operator::Gt,
                min.clone(),
            ))]),
            _ => Err("priority-above expects 1 argument".to_string()),
        })
}

/// Every table the fixtures use, empty.
pub fn schemas() -> Vec<TableSchema> {
    vec![
        tickets_schema(),
        TableSchema::new("comments"),
        TableSchema::new("watchers"),
        TableSchema::new("audits").with_timestamps(true),
    ]
}

/// The rows of the three-row status example.
pub fn status_rows() -> Vec<Row> {
    vec![
        row([("id", 1.into()), ("status", "active".into())]),
        row([("id", 2.into()), ("status", "closed".into())]),
        row([("id", 3.into()), ("status", "active".into())]),
    ]
}

/// Six tickets across two teams, with comments on tickets 1 and 3 and a
/// watcher on ticket 1.
pub fn ticket_rows() -> Vec<Row> {
    let ticket = |id: i64, title: &str, status: &str, priority: i64, team: &str| {
        row([
            ("id", id.into()),
            ("title", title.into()),
            ("status", status.into()),
            ("priority", priority.into()),
            ("team", team.into()),
        ])
    };
    vec![
        ticket(1, "Login fails", "open", 3, "core"),
        ticket(2, "Typo in footer", "closed", 1, "web"),
        ticket(3, "Crash on save", "open", 5, "core"),
        ticket(4, "Slow search", "open", 2, "web"),
        ticket(5, "Broken link", "closed", 1, "web"),
        ticket(6, "Export to CSV", "open", 4, "core"),
    ]
}

/// Storage holding [`ticket_rows`] plus their comments and watchers.
pub async fn seeded_storage() -> Arc<dyn RowStorage> {
    let storage = new_in_memory_storage(schemas());
    storage.insert_many("tickets", ticket_rows()).await.unwrap();
    let comment = |ticket: i64| row([("ticket_id", ticket.into()), ("body", "note".into())]);
    storage
        .insert_many("comments", vec![comment(1), comment(1), comment(3)])
        .await
        .unwrap();
    storage
        .insert("watchers", row([("ticket_id", 1.into())]))
        .await
        .unwrap();
    storage
}

/// A repository over the seeded `tickets` table.
pub async fn tickets() -> Repository {
    Repository::open(seeded_storage().await, "support::Ticket", "tickets")
        .await
        .unwrap()
}

/// A repository over a `tickets` table holding only [`status_rows`].
pub async fn status_repository() -> Repository {
    let storage = new_in_memory_storage(schemas());
    storage.insert_many("tickets", status_rows()).await.unwrap();
    Repository::open(storage, "support::Ticket", "tickets")
        .await
        .unwrap()
}
