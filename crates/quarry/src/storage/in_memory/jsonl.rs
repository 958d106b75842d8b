//! JSONL persistence for in-memory storage.
//!
//! Each table lives in `<dir>/<table>.jsonl`, one row object per line,
//! in id order.

use super::InMemoryStorage;
use super::inner::{InMemoryDatabase, Table, id_has_successor};
use crate::domain::{Row, RowId};
use crate::error::BackendResult;
use crate::storage::TableSchema;
use quarry_jsonl::{Warning as JsonlWarning, read_jsonl_resilient, write_jsonl_atomic};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Non-fatal problems found while loading table files.
///
/// The offending line or row is skipped; everything else loads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadWarning {
    /// A line that is not a JSON object.
    MalformedJson {
        /// Table being loaded.
        table: String,
        /// 1-based line number.
        line_number: usize,
        /// Parser message.
        error: String,
    },

    /// A row without an integer `id`.
    MissingId {
        /// Table being loaded.
        table: String,
        /// 1-based index among the parsed rows.
        record: usize,
    },

    /// A row whose id is too large to leave room for new rows.
    IdOutOfRange {
        /// Table being loaded.
        table: String,
        /// The rejected id.
        id: RowId,
    },

    /// A second row with an id already loaded; the first one wins.
    DuplicateId {
        /// Table being loaded.
        table: String,
        /// The repeated id.
        id: RowId,
    },
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedJson {
                table,
                line_number,
                error,
            } => write!(f, "{table}.jsonl line {line_number}: malformed row ({error})"),
            Self::MissingId { table, record } => {
                write!(f, "{table}.jsonl record {record}: missing integer id")
            }
            Self::IdOutOfRange { table, id } => {
                write!(f, "{table}.jsonl: id {id} is out of range")
            }
            Self::DuplicateId { table, id } => {
                write!(f, "{table}.jsonl: duplicate id {id}, keeping the first")
            }
        }
    }
}

fn table_path(dir: &Path, table: &str) -> PathBuf {
    dir.join(format!("{table}.jsonl"))
}

/// Reads one table file into rows keyed by id.
async fn read_table(
    dir: &Path,
    table: &str,
) -> BackendResult<(BTreeMap<RowId, Row>, Vec<LoadWarning>)> {
    let path = table_path(dir, table);
    let mut rows = BTreeMap::new();
    let mut warnings = Vec::new();
    if !tokio::fs::try_exists(&path).await? {
        return Ok((rows, warnings));
    }

    let (parsed, jsonl_warnings) = read_jsonl_resilient::<Row, _>(&path).await?;
    for warning in jsonl_warnings {
        let (line_number, error) = match warning {
            JsonlWarning::MalformedJson { line_number, error } => (line_number, error),
            JsonlWarning::SkippedLine {
                line_number,
                reason,
            } => (line_number, reason),
        };
        warnings.push(LoadWarning::MalformedJson {
            table: table.to_string(),
            line_number,
            error,
        });
    }

    for (index, row) in parsed.into_iter().enumerate() {
        let Some(id) = row.id() else {
            warnings.push(LoadWarning::MissingId {
                table: table.to_string(),
                record: index + 1,
            });
            continue;
        };
        if !id_has_successor(id) {
            warnings.push(LoadWarning::IdOutOfRange {
                table: table.to_string(),
                id,
            });
            continue;
        }
        if rows.contains_key(&id) {
            warnings.push(LoadWarning::DuplicateId {
                table: table.to_string(),
                id,
            });
            continue;
        }
        rows.insert(id, row);
    }

    Ok((rows, warnings))
}

/// Table names with a `.jsonl` file in `dir`.
async fn discover_tables(dir: &Path) -> BackendResult<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "jsonl") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Loads storage from a directory of table files.
///
/// Declared tables without a file start empty. Files for undeclared
/// tables are loaded with a default schema.
///
/// # Errors
///
/// Returns an error if the directory or a table file cannot be read.
/// Malformed lines are reported as warnings instead.
pub async fn load_from_dir(
    dir: &Path,
    schemas: Vec<TableSchema>,
) -> BackendResult<(InMemoryStorage, Vec<LoadWarning>)> {
    let mut db = InMemoryDatabase::new(schemas);
    for name in discover_tables(dir).await? {
        db.tables
            .entry(name.clone())
            .or_insert_with(|| Table::new(TableSchema::new(name)));
    }

    let mut warnings = Vec::new();
    let names: Vec<String> = db.tables.keys().cloned().collect();
    for name in names {
        let (rows, table_warnings) = read_table(dir, &name).await?;
        warnings.extend(table_warnings);
        if let Some(table) = db.tables.get_mut(&name) {
            table.replace_rows(rows);
        }
    }

    Ok((Arc::new(Mutex::new(db)), warnings))
}

/// Replaces every table's rows with the contents of its file.
///
/// Tables whose file is missing become empty.
pub async fn reload_from_dir(storage: &InMemoryStorage, dir: &Path) -> BackendResult<Vec<LoadWarning>> {
    let names: Vec<String> = storage.lock().await.tables.keys().cloned().collect();

    let mut loaded = Vec::with_capacity(names.len());
    let mut warnings = Vec::new();
    for name in names {
        let (rows, table_warnings) = read_table(dir, &name).await?;
        warnings.extend(table_warnings);
        loaded.push((name, rows));
    }

    let mut inner = storage.lock().await;
    for (name, rows) in loaded {
        if let Some(table) = inner.tables.get_mut(&name) {
            table.replace_rows(rows);
        }
    }
    Ok(warnings)
}

/// Writes every table to `<dir>/<table>.jsonl`, each file replaced atomically.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or a file cannot
/// be written. Tables written before the failure keep their new contents.
pub async fn save_to_dir(storage: &InMemoryStorage, dir: &Path) -> BackendResult<()> {
    let snapshot: Vec<(String, Vec<Row>)> = {
        let inner = storage.lock().await;
        inner
            .tables
            .iter()
            .map(|(name, table)| (name.clone(), table.rows.values().cloned().collect()))
            .collect()
    };

    tokio::fs::create_dir_all(dir).await?;
    for (name, rows) in &snapshot {
        write_jsonl_atomic(table_path(dir, name), rows).await?;
    }
    tracing::debug!(dir = %dir.display(), tables = snapshot.len(), "saved tables");
    Ok(())
}
