//! Integration tests for the quarry CLI.
//!
//! Each test runs the built binary inside a temporary project holding a
//! `quarry.yaml` and seeded JSONL tables.

use rstest::{fixture, rstest};
use serde_json::Value;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const CONFIG: &str = r#"
repository:
  per-page: 2
tables:
  - name: tickets
    entity: support::Ticket
    relations:
      - name: comments
        table: comments
        foreign-key: ticket_id
    scopes:
      - name: open
        where:
          - { column: status, value: open }
      - name: priority-above
        where:
          - { column: priority, operator: ">", value: $1 }
        order-by:
          - { column: priority, direction: desc }
  - name: comments
"#;

const TICKETS: &str = concat!(
    "{\"id\":1,\"title\":\"Login fails\",\"status\":\"open\",\"priority\":3,\"team\":\"core\"}\n",
    "{\"id\":2,\"title\":\"Typo in footer\",\"status\":\"closed\",\"priority\":1,\"team\":\"web\"}\n",
    "{\"id\":3,\"title\":\"Crash on save\",\"status\":\"open\",\"priority\":5,\"team\":\"core\"}\n",
    "{\"id\":4,\"title\":\"Slow search\",\"status\":\"open\",\"priority\":2,\"team\":\"web\"}\n",
);

const COMMENTS: &str = concat!(
    "{\"id\":1,\"ticket_id\":3,\"body\":\"seen\"}\n",
    "{\"id\":2,\"ticket_id\":3,\"body\":\"fixing\"}\n",
);

// ============================================================================
// Test Fixtures
// ============================================================================

/// A project directory with configuration and seeded tables.
#[fixture]
fn project() -> TempDir {
    let temp = TempDir::new().expect("Failed to create temp directory");
    std::fs::write(temp.path().join("quarry.yaml"), CONFIG).unwrap();
    let data = temp.path().join(".quarry");
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(data.join("tickets.jsonl"), TICKETS).unwrap();
    std::fs::write(data.join("comments.jsonl"), COMMENTS).unwrap();
    temp
}

fn run_quarry(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_quarry"))
        .args(args)
        .current_dir(dir)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute quarry binary")
}

fn run_json(dir: &Path, args: &[&str]) -> Value {
    let mut all = vec!["--json"];
    all.extend_from_slice(args);
    let output = run_quarry(dir, &all);
    assert!(
        output.status.success(),
        "quarry {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

fn ids(value: &Value) -> Vec<i64> {
    value
        .as_array()
        .expect("array of rows")
        .iter()
        .filter_map(|row| row["id"].as_i64())
        .collect()
}

// ============================================================================
// Help and Defaults
// ============================================================================

#[test]
fn test_cli_help_lists_commands() {
    let temp = TempDir::new().unwrap();
    let output = run_quarry(temp.path(), &["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["query", "count", "show", "delete", "tables"] {
        assert!(stdout.contains(command), "missing {command} in help");
    }
}

#[test]
fn test_cli_no_args() {
    let temp = TempDir::new().unwrap();
    let output = run_quarry(temp.path(), &[]);
    assert!(output.status.success());
}

// ============================================================================
// Query and Count
// ============================================================================

#[rstest]
fn test_count_with_filters(project: TempDir) {
    let all = run_json(project.path(), &["count", "tickets"]);
    assert_eq!(all["count"], 4);

    let open_web = run_json(
        project.path(),
        &["count", "tickets", "-w", "status=open", "--where-in", "team=web,mobile"],
    );
    assert_eq!(open_web["count"], 1);
}

#[rstest]
fn test_query_sorted_and_limited(project: TempDir) {
    let rows = run_json(
        project.path(),
        &["query", "tickets", "-w", "status=open", "-o", "priority,desc", "-n", "2"],
    );
    assert_eq!(ids(&rows), vec![3, 1]);
}

#[rstest]
fn test_query_declared_scope_with_argument(project: TempDir) {
    let rows = run_json(project.path(), &["query", "tickets", "-s", "priority-above:1"]);
    assert_eq!(ids(&rows), vec![3, 1, 4]);
}

#[rstest]
fn test_query_request_params(project: TempDir) {
    let rows = run_json(
        project.path(),
        &["query", "tickets", "-P", "team=core", "-P", "order_by=id,desc"],
    );
    assert_eq!(ids(&rows), vec![3, 1]);
}

#[rstest]
fn test_query_page_uses_configured_size(project: TempDir) {
    let page = run_json(project.path(), &["query", "tickets", "--page", "2"]);
    assert_eq!(ids(&page["items"]), vec![3, 4]);
    assert_eq!(page["total"], 4);
    assert_eq!(page["per_page"], 2);
}

#[rstest]
fn test_query_relations_and_columns(project: TempDir) {
    let rows = run_json(
        project.path(),
        &["query", "tickets", "--with", "comments", "-c", "title", "-w", "id=3"],
    );
    assert_eq!(rows[0]["comments_count"], 2);
    assert_eq!(rows[0]["title"], "Crash on save");
    assert!(rows[0].get("status").is_none());
}

#[rstest]
fn test_query_first_not_found_fails(project: TempDir) {
    let output = run_quarry(
        project.path(),
        &["query", "tickets", "--first", "-w", "status=archived"],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not found"), "stderr: {stderr}");
}

#[rstest]
fn test_explain_prints_steps_in_order(project: TempDir) {
    let output = run_quarry(
        project.path(),
        &[
            "query", "tickets", "-n", "5", "-s", "open", "-o", "id", "-w", "team=core", "--explain",
        ],
    );
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let where_at = stdout.find("where team = 'core'").expect("where step");
    let order_at = stdout.find("order by id asc").expect("order step");
    let scope_at = stdout.find("scope open()").expect("scope step");
    let limit_at = stdout.find("limit 5").expect("limit step");
    assert!(where_at < order_at && order_at < scope_at && scope_at < limit_at);
}

#[rstest]
fn test_explain_unlimited_limit_shows_fetch_all_path(project: TempDir) {
    let args = ["query", "tickets", "-w", "status=closed", "-n", "-1", "--with", "comments"];
    let rows = run_json(project.path(), &args);
    assert_eq!(ids(&rows), vec![1, 2, 3, 4]);

    let mut explain = args.to_vec();
    explain.push("--explain");
    let steps = run_json(project.path(), &explain);
    assert_eq!(
        steps,
        serde_json::json!([{ "step": "eager_load", "relation": "comments" }])
    );
}

#[rstest]
fn test_unknown_scope_fails(project: TempDir) {
    let output = run_quarry(project.path(), &["count", "tickets", "-s", "archived"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("archived"));
}

// ============================================================================
// Show, Delete and Tables
// ============================================================================

#[rstest]
fn test_show_with_relation(project: TempDir) {
    let row = run_json(project.path(), &["show", "tickets", "3", "--with", "comments"]);
    assert_eq!(row["id"], 3);
    assert_eq!(row["comments_count"], 2);
}

#[rstest]
fn test_delete_requires_filter(project: TempDir) {
    let output = run_quarry(project.path(), &["delete", "tickets"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Refusing"));
    assert_eq!(run_json(project.path(), &["count", "tickets"])["count"], 4);
}

#[rstest]
fn test_delete_persists(project: TempDir) {
    let result = run_json(project.path(), &["delete", "tickets", "-w", "status=closed"]);
    assert_eq!(result["deleted"], 1);

    assert_eq!(run_json(project.path(), &["count", "tickets"])["count"], 3);
    let saved = std::fs::read_to_string(project.path().join(".quarry/tickets.jsonl")).unwrap();
    assert_eq!(saved.lines().count(), 3);
}

#[rstest]
fn test_tables_lists_counts_and_scopes(project: TempDir) {
    let tables = run_json(project.path(), &["tables", "--scopes"]);
    let tickets = tables
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["table"] == "tickets")
        .expect("tickets listed");
    assert_eq!(tickets["rows"], 4);
    assert_eq!(tickets["scopes"], serde_json::json!(["open", "priority-above"]));
}

#[rstest]
fn test_env_overrides_page_size(project: TempDir) {
    let output = Command::new(env!("CARGO_BIN_EXE_quarry"))
        .args(["--json", "query", "tickets", "--page", "1"])
        .current_dir(project.path())
        .env("QUARRY_REPOSITORY_PER_PAGE", "3")
        .output()
        .unwrap();
    assert!(output.status.success());
    let page: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(page["per_page"], 3);
}
