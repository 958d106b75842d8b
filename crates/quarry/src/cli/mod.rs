//! CLI argument parsing and command dispatch.
//!
//! The CLI drives a [`Repository`](crate::Repository) from the command
//! line: every flag maps to one builder call, and the command picks the
//! execution method.
//!
//! # Commands
//!
//! - `query`: Fetch rows (all matching, first, or one page)
//! - `count`: Count matching rows
//! - `show`: Show one row by id
//! - `delete`: Delete matching rows (filters required)
//! - `tables`: List tables with row counts
//!
//! # Global Flags
//!
//! - `--json`: Output in JSON format
//! - `--config <path>`: Use this configuration file instead of the
//!   nearest `quarry.yaml`
//!
//! # Example
//!
//! ```bash
//! quarry query tickets --where status=open --order-by priority,desc -n 10
//! quarry query tickets --scope priority-above:2 --with comments --page 2
//! quarry count tickets --where-in team=core,web
//! quarry query tickets --where "priority,>=,3" --explain
//! ```

mod args;
mod execute;
pub mod parse;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use args::{CountArgs, DeleteArgs, FilterArgs, QueryArgs, ShowArgs, TablesArgs};
pub use execute::apply_filters;

/// Quarry - query tables through a reusable repository builder
///
/// Filters, sort keys, scopes and limits accumulate on a repository and are
/// cleared after each query. Tables are stored as JSONL files.
#[derive(Parser, Debug)]
#[command(name = "quarry")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output in JSON format for programmatic use
    #[arg(long, global = true)]
    pub json: bool,

    /// Configuration file (default: nearest quarry.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Fetch rows from a table
    ///
    /// Without --first or --page, returns every row matching the filters,
    /// sorted and capped by --limit.
    Query(QueryArgs),

    /// Count rows matching the filters and scopes
    Count(CountArgs),

    /// Show one row by id
    Show(ShowArgs),

    /// Delete rows matching the filters and scopes
    ///
    /// At least one filter or scope is required.
    Delete(DeleteArgs),

    /// List tables with their row counts
    Tables(TablesArgs),
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        <Self as Parser>::parse()
    }

    /// Parse CLI arguments from an iterator (for testing)
    ///
    /// # Errors
    ///
    /// Returns a clap error for invalid arguments.
    pub fn try_parse_from<I, T>(iter: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(iter)
    }

    /// Execute the CLI command
    ///
    /// Repository failures are reported through
    /// [`report_error`](crate::activity::report_error) before being returned.
    ///
    /// # Errors
    ///
    /// Returns any configuration, storage or output error.
    pub async fn execute(&self) -> Result<()> {
        let result = self.dispatch().await;
        if let Err(err) = &result {
            if let Some(error) = err.downcast_ref::<crate::Error>() {
                crate::activity::report_error(error);
            }
        }
        result
    }

    async fn dispatch(&self) -> Result<()> {
        use crate::app::App;
        use crate::output::OutputMode;

        let output_mode = if self.json {
            OutputMode::Json
        } else {
            OutputMode::Text
        };

        let Some(command) = &self.command else {
            println!("Quarry repository query builder");
            println!("Use --help for more information");
            return Ok(());
        };

        let app = App::from_directory(&std::env::current_dir()?, self.config.as_deref()).await?;
        match command {
            Commands::Query(args) => execute::execute_query(&app, args, output_mode).await,
            Commands::Count(args) => execute::execute_count(&app, args, output_mode).await,
            Commands::Show(args) => execute::execute_show(&app, args, output_mode).await,
            Commands::Delete(args) => execute::execute_delete(&app, args, output_mode).await,
            Commands::Tables(args) => execute::execute_tables(&app, args, output_mode).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Direction, Operator};

    #[test]
    fn test_parse_no_command() {
        let cli = Cli::try_parse_from(["quarry"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.json);
    }

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::try_parse_from(["quarry", "count", "tickets", "--json", "--config", "q.yaml"])
            .unwrap();
        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("q.yaml")));
        assert!(matches!(cli.command, Some(Commands::Count(_))));
    }

    #[test]
    fn test_parse_query_filters() {
        let cli = Cli::try_parse_from([
            "quarry",
            "query",
            "tickets",
            "-w",
            "status=open",
            "--where",
            "priority,>,2",
            "--where-in",
            "team=core,web",
            "--order-by",
            "priority,desc",
            "-n",
            "-1",
            "--with",
            "comments,watchers",
            "--scope",
            "mine:7",
        ])
        .unwrap();
        let Some(Commands::Query(args)) = cli.command else {
            panic!("Expected Query command");
        };
        assert_eq!(args.table, "tickets");
        assert_eq!(args.filters.wheres.len(), 2);
        assert_eq!(args.filters.wheres[1].operator, Operator::Gt);
        assert_eq!(args.filters.where_ins[0].values.len(), 2);
        assert_eq!(args.order_by[0].direction, Direction::Desc);
        assert_eq!(args.limit, Some(-1));
        assert_eq!(args.relations, vec!["comments", "watchers"]);
        assert_eq!(args.filters.scopes[0].name, "mine");
    }

    #[test]
    fn test_parse_rejects_bad_filter() {
        let result = Cli::try_parse_from(["quarry", "query", "tickets", "--where", "status"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_first_conflicts_with_page() {
        let result = Cli::try_parse_from(["quarry", "query", "tickets", "--first", "--page", "2"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_per_page_requires_page() {
        assert!(Cli::try_parse_from(["quarry", "query", "t", "--per-page", "5"]).is_err());
        let cli =
            Cli::try_parse_from(["quarry", "query", "t", "--page", "2", "--per-page", "-1"]).unwrap();
        let Some(Commands::Query(args)) = cli.command else {
            panic!("Expected Query command");
        };
        assert_eq!(args.per_page, Some(-1));
    }

    #[test]
    fn test_parse_show() {
        let cli = Cli::try_parse_from(["quarry", "show", "tickets", "3", "--with", "comments"]).unwrap();
        let Some(Commands::Show(args)) = cli.command else {
            panic!("Expected Show command");
        };
        assert_eq!(args.id, 3);
        assert_eq!(args.relations, vec!["comments"]);
    }

    #[test]
    fn test_delete_without_filters_parses() {
        let cli = Cli::try_parse_from(["quarry", "delete", "tickets"]).unwrap();
        let Some(Commands::Delete(args)) = cli.command else {
            panic!("Expected Delete command");
        };
        assert!(args.filters.is_empty());
    }
}
