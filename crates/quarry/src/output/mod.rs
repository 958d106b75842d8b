//! Output formatting for CLI commands.
//!
//! Rows print as a width-aware table in text mode and as JSON with
//! `--json`. Submodules:
//! - [`color`]: Color and styling helpers

pub mod color;

use crate::domain::{PRIMARY_KEY, Row, Scalar};
use crate::query::CompiledQuery;
use crate::storage::Page;
use serde::Serialize;
use std::env;
use std::io::{self, Write};

pub use color::{error, success, warning};

use color::{bold, colorize_cell, colorize_step_kind, dimmed};

// ============================================================================
// Output Configuration
// ============================================================================

const DEFAULT_TERMINAL_WIDTH: usize = 80;
const MIN_COLUMN_WIDTH: usize = 4;
const COLUMN_GAP: &str = "  ";
const ELLIPSIS: char = '…';

/// Configuration for output formatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    /// Total width available for a table row.
    pub max_width: usize,
    /// Whether to use colors in output.
    pub use_colors: bool,
}

impl OutputConfig {
    /// Create a new `OutputConfig` with explicit values.
    #[must_use]
    pub fn new(max_width: usize, use_colors: bool) -> Self {
        Self {
            max_width,
            use_colors,
        }
    }

    /// Create an `OutputConfig` from the terminal and environment.
    ///
    /// Reads:
    /// - `QUARRY_MAX_WIDTH`: table width (default: terminal width)
    /// - `NO_COLOR`: any value disables colors
    /// - `QUARRY_COLOR`: `0` or `false` disables colors
    #[must_use]
    pub fn from_env() -> Self {
        let max_width = match env::var("QUARRY_MAX_WIDTH") {
            Ok(s) if !s.is_empty() => s.parse().unwrap_or_else(|_| {
                tracing::warn!(
                    env_var = "QUARRY_MAX_WIDTH",
                    value = %s,
                    "Invalid value, using terminal width"
                );
                terminal_width()
            }),
            _ => terminal_width(),
        };

        let use_colors = env::var("NO_COLOR").is_err()
            && env::var("QUARRY_COLOR")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true);

        Self {
            max_width,
            use_colors,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TERMINAL_WIDTH, true)
    }
}

fn terminal_width() -> usize {
    terminal_size::terminal_size().map_or(DEFAULT_TERMINAL_WIDTH, |(w, _)| usize::from(w.0))
}

/// Output format mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable text format
    Text,
    /// JSON format for programmatic use
    Json,
}

// ============================================================================
// Public Dispatch Functions
// ============================================================================

/// Print rows in the specified format.
///
/// # Errors
///
/// Returns an error if writing to stdout fails.
pub fn print_rows(rows: &[Row], mode: OutputMode) -> io::Result<()> {
    match mode {
        OutputMode::Json => print_json(&rows),
        OutputMode::Text => {
            let mut handle = io::stdout().lock();
            let config = OutputConfig::from_env();
            write_table(&mut handle, rows, &config)?;
            writeln!(handle, "{}", dimmed(&row_total(rows.len()), &config))
        }
    }
}

/// Print a single row as `column: value` lines.
///
/// # Errors
///
/// Returns an error if writing to stdout fails.
pub fn print_row(row: &Row, mode: OutputMode) -> io::Result<()> {
    match mode {
        OutputMode::Json => print_json(row),
        OutputMode::Text => write_record(&mut io::stdout().lock(), row, &OutputConfig::from_env()),
    }
}

/// Print one page of rows with its position.
///
/// # Errors
///
/// Returns an error if writing to stdout fails.
pub fn print_page(page: &Page<Row>, mode: OutputMode) -> io::Result<()> {
    match mode {
        OutputMode::Json => print_json(page),
        OutputMode::Text => {
            let mut handle = io::stdout().lock();
            let config = OutputConfig::from_env();
            write_table(&mut handle, &page.items, &config)?;
            writeln!(handle, "{}", dimmed(&page_footer(page), &config))
        }
    }
}

/// Print a count.
///
/// # Errors
///
/// Returns an error if writing to stdout fails.
pub fn print_count(count: usize, mode: OutputMode) -> io::Result<()> {
    match mode {
        OutputMode::Json => print_json(&serde_json::json!({ "count": count })),
        OutputMode::Text => writeln!(io::stdout().lock(), "{count}"),
    }
}

/// Print the steps of a compiled query.
///
/// # Errors
///
/// Returns an error if writing to stdout fails.
pub fn print_explain(query: &CompiledQuery, mode: OutputMode) -> io::Result<()> {
    match mode {
        OutputMode::Json => print_json(query),
        OutputMode::Text => write_explain(&mut io::stdout().lock(), query, &OutputConfig::from_env()),
    }
}

/// Print any serializable value as pretty JSON.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
    let mut handle = io::stdout().lock();
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(handle, "{json}")
}

// ============================================================================
// Text Formatting
// ============================================================================

fn row_total(n: usize) -> String {
    if n == 1 {
        "(1 row)".to_string()
    } else {
        format!("({n} rows)")
    }
}

fn page_footer(page: &Page<Row>) -> String {
    format!(
        "{} {} of {}, {} total",
        page.page_name,
        page.page,
        page.last_page(),
        row_total(page.total).trim_matches(|c| c == '(' || c == ')')
    )
}

fn display_value(value: &Scalar) -> String {
    match value {
        Scalar::Null => "NULL".to_string(),
        other => other.to_string().replace('\n', " "),
    }
}

/// Column order: `id` first, then every other column in first-seen order.
fn table_columns(rows: &[Row]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    if rows.iter().any(|row| row.get(PRIMARY_KEY).is_some()) {
        columns.push(PRIMARY_KEY.to_string());
    }
    for row in rows {
        for column in row.columns() {
            if !columns.iter().any(|c| c == column) {
                columns.push(column.to_string());
            }
        }
    }
    columns
}

/// Shrinks the widest columns until the row fits in `max_width`.
fn fit_widths(mut widths: Vec<usize>, max_width: usize) -> Vec<usize> {
    let gaps = COLUMN_GAP.len() * widths.len().saturating_sub(1);
    let budget = max_width.saturating_sub(gaps);
    while widths.iter().sum::<usize>() > budget {
        let Some((index, &widest)) = widths.iter().enumerate().max_by_key(|(_, w)| **w) else {
            break;
        };
        if widest <= MIN_COLUMN_WIDTH {
            break;
        }
        widths[index] = widest - 1;
    }
    widths
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
    out.push(ELLIPSIS);
    out
}

fn pad(text: &str, styled: String, width: usize) -> String {
    let fill = width.saturating_sub(text.chars().count());
    format!("{styled}{}", " ".repeat(fill))
}

fn write_table<W: Write>(w: &mut W, rows: &[Row], config: &OutputConfig) -> io::Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let columns = table_columns(rows);
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| columns.iter().map(|c| display_value(row.value(c))).collect())
        .collect();
    let natural: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            cells
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(column.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();
    let widths = fit_widths(natural, config.max_width);

    let header: Vec<String> = columns
        .iter()
        .zip(&widths)
        .map(|(column, &width)| {
            let text = truncate(column, width);
            pad(&text, bold(&text, config), width)
        })
        .collect();
    writeln!(w, "{}", header.join(COLUMN_GAP).trim_end())?;

    for (row, row_cells) in rows.iter().zip(&cells) {
        let line: Vec<String> = columns
            .iter()
            .zip(row_cells)
            .zip(&widths)
            .map(|((column, cell), &width)| {
                let text = truncate(cell, width);
                pad(&text, colorize_cell(column, row.value(column), &text, config), width)
            })
            .collect();
        writeln!(w, "{}", line.join(COLUMN_GAP).trim_end())?;
    }
    Ok(())
}

fn write_record<W: Write>(w: &mut W, row: &Row, config: &OutputConfig) -> io::Result<()> {
    let label_width = row.columns().map(|c| c.chars().count()).max().unwrap_or(0);
    let value_width = config.max_width.saturating_sub(label_width + 2).max(20);
    let indent = " ".repeat(label_width + 2);

    for (column, value) in row.iter() {
        let text = match value {
            Scalar::Null => "NULL".to_string(),
            other => other.to_string(),
        };
        let label = format!("{column:>label_width$}");
        let mut lines = textwrap::wrap(&text, value_width).into_iter();
        let first = lines.next().map(std::borrow::Cow::into_owned).unwrap_or_default();
        writeln!(
            w,
            "{}  {}",
            bold(&label, config),
            colorize_cell(column, value, &first, config)
        )?;
        for line in lines {
            writeln!(w, "{indent}{line}")?;
        }
    }
    Ok(())
}

fn write_explain<W: Write>(w: &mut W, query: &CompiledQuery, config: &OutputConfig) -> io::Result<()> {
    if query.is_empty() {
        return writeln!(w, "{}", dimmed("(no steps: every row)", config));
    }
    for (i, step) in query.steps().iter().enumerate() {
        writeln!(
            w,
            "{:>2}. {:<9} {step}",
            i + 1,
            colorize_step_kind(step.kind(), config)
        )?;
    }
    Ok(())
}
