//! Tests for JSONL-backed storage: saving, reopening and resilient loading.

use quarry::domain::{Columns, RowId, Scalar};
use quarry::storage::in_memory::{LoadWarning, load_from_dir, new_database, save_to_dir};
use quarry::storage::{RowStorage, StorageBackend, TableSchema, create_storage};
use quarry::Repository;
use rstest::{fixture, rstest};
use tempfile::TempDir;

mod common;
use common::{ids, row, schemas, ticket_rows, tickets_schema};

#[fixture]
fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

#[rstest]
#[tokio::test]
async fn test_save_and_reopen(temp_dir: TempDir) {
    let dir = temp_dir.path().join("data");
    let storage = create_storage(StorageBackend::Jsonl(dir.clone()), schemas())
        .await
        .unwrap();
    storage.insert_many("tickets", ticket_rows()).await.unwrap();
    storage.save().await.unwrap();
    assert!(dir.join("tickets.jsonl").exists());
    assert!(dir.join("audits.jsonl").exists());

    let reopened = create_storage(StorageBackend::Jsonl(dir), schemas())
        .await
        .unwrap();
    let mut repo = Repository::open(reopened, "support::Ticket", "tickets")
        .await
        .unwrap();
    let open = repo
        .apply_scope("open", vec![])
        .unwrap()
        .fetch_filtered(Columns::All)
        .await
        .unwrap();
    assert_eq!(ids(&open), vec![1, 3, 4, 6]);

    // Auto-increment continues after the loaded ids.
    let created = repo.create(row([("title", "next".into())])).await.unwrap();
    assert_eq!(created.id(), Some(RowId(7)));
}

#[rstest]
#[tokio::test]
async fn test_unsaved_changes_are_discarded_by_reload(temp_dir: TempDir) {
    let dir = temp_dir.path().to_path_buf();
    let storage = create_storage(StorageBackend::Jsonl(dir.clone()), schemas())
        .await
        .unwrap();
    storage.insert("tickets", row([("title", "kept".into())])).await.unwrap();
    storage.save().await.unwrap();

    storage.insert("tickets", row([("title", "lost".into())])).await.unwrap();
    storage.reload().await.unwrap();

    let rows = storage.export("tickets").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].value("title"), &Scalar::from("kept"));
}

#[rstest]
#[tokio::test]
async fn test_malformed_lines_become_warnings(temp_dir: TempDir) {
    let dir = temp_dir.path();
    tokio::fs::write(
        dir.join("tickets.jsonl"),
        concat!(
            "{\"id\":1,\"title\":\"ok\"}\n",
            "{not json\n",
            "{\"title\":\"no id\"}\n",
            "{\"id\":1,\"title\":\"again\"}\n",
            "{\"id\":4,\"title\":\"also ok\"}\n",
        ),
    )
    .await
    .unwrap();

    let (storage, warnings) = load_from_dir(dir, vec![tickets_schema()]).await.unwrap();

    assert_eq!(warnings.len(), 3);
    assert!(matches!(
        warnings[0],
        LoadWarning::MalformedJson { line_number: 2, .. }
    ));
    assert!(matches!(warnings[1], LoadWarning::MissingId { record: 2, .. }));
    assert!(matches!(
        warnings[2],
        LoadWarning::DuplicateId { id: RowId(1), .. }
    ));

    let rows = storage.export("tickets").await.unwrap();
    assert_eq!(ids(&rows), vec![1, 4]);
    assert_eq!(rows[0].value("title"), &Scalar::from("ok"));
}

#[rstest]
#[tokio::test]
async fn test_invalid_utf8_line_is_skipped(temp_dir: TempDir) {
    let dir = temp_dir.path();
    let mut content = b"{\"id\":1,\"body\":\"first\"}\n".to_vec();
    content.extend_from_slice(b"\xff\xfe\n");
    content.extend_from_slice(b"{\"id\":2,\"body\":\"second\"}\n");
    tokio::fs::write(dir.join("notes.jsonl"), content).await.unwrap();

    let storage = create_storage(
        StorageBackend::Jsonl(dir.to_path_buf()),
        vec![TableSchema::new("notes")],
    )
    .await
    .unwrap();
    assert_eq!(ids(&storage.export("notes").await.unwrap()), vec![1, 2]);

    let (_, warnings) = load_from_dir(dir, vec![]).await.unwrap();
    assert!(matches!(
        warnings.as_slice(),
        [LoadWarning::MalformedJson { line_number: 2, .. }]
    ));
}

#[rstest]
#[tokio::test]
async fn test_id_without_successor_is_skipped_on_load(temp_dir: TempDir) {
    let dir = temp_dir.path();
    let content = format!("{{\"id\":3}}\n{{\"id\":{}}}\n", i64::MAX);
    tokio::fs::write(dir.join("notes.jsonl"), content).await.unwrap();

    let (storage, warnings) = load_from_dir(dir, vec![]).await.unwrap();

    assert_eq!(
        warnings,
        vec![LoadWarning::IdOutOfRange {
            table: "notes".into(),
            id: RowId(i64::MAX),
        }]
    );
    let created = storage.insert("notes", row([("body", "new".into())])).await.unwrap();
    assert_eq!(created.id(), Some(RowId(4)));
}

#[rstest]
#[tokio::test]
async fn test_undeclared_table_files_are_loaded(temp_dir: TempDir) {
    let dir = temp_dir.path();
    tokio::fs::write(dir.join("labels.jsonl"), "{\"id\":3,\"name\":\"bug\"}\n")
        .await
        .unwrap();

    let storage = create_storage(
        StorageBackend::Jsonl(dir.to_path_buf()),
        vec![TableSchema::new("tickets")],
    )
    .await
    .unwrap();

    assert_eq!(storage.tables().await.unwrap(), vec!["labels", "tickets"]);
    assert_eq!(storage.export("labels").await.unwrap().len(), 1);
}

#[rstest]
#[tokio::test]
async fn test_save_to_dir_writes_one_line_per_row(temp_dir: TempDir) {
    let storage = new_database(vec![TableSchema::new("notes")]);
    storage
        .insert_many(
            "notes",
            vec![row([("body", "a".into())]), row([("body", "b".into())])],
        )
        .await
        .unwrap();

    save_to_dir(&storage, temp_dir.path()).await.unwrap();

    let content = tokio::fs::read_to_string(temp_dir.path().join("notes.jsonl"))
        .await
        .unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("\"id\":1"));
    assert!(lines[1].contains("\"body\":\"b\""));
}

#[tokio::test]
async fn test_in_memory_backend_ignores_save() {
    let storage = create_storage(StorageBackend::InMemory, schemas())
        .await
        .unwrap();
    storage.save().await.unwrap();
    assert!(StorageBackend::InMemory.data_path().is_none());
}
