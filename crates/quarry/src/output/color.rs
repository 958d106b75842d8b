//! Color and styling helpers for CLI output.
//!
//! Semantic Color Theme:
//!   - Success:   green   (true, completed actions)
//!   - Warning:   yellow  (numbers, load warnings)
//!   - Error:     red     (false, failures)
//!   - Info:      cyan    (ids, relation counts)
//!   - Muted:     dimmed  (NULL, step kinds, footers)
//!   - Emphasis:  bold    (headers)

use crate::domain::{PRIMARY_KEY, Scalar};
use crate::query::StepKind;
use colored::Colorize;

use super::OutputConfig;

/// Apply semantic "success" color (green) to text.
pub fn success(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.green().to_string()
}

/// Apply semantic "error" color (red) to text.
pub fn error(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.red().to_string()
}

/// Apply semantic "warning" color (yellow) to text.
pub fn warning(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.yellow().to_string()
}

/// Bold, for column headers and field names.
pub(crate) fn bold(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.bold().to_string()
}

/// Dimmed, for secondary information.
pub(crate) fn dimmed(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.dimmed().to_string()
}

/// Colors an already formatted cell by the value it came from.
///
/// `text` may be truncated, so it is passed separately from `value`.
pub(crate) fn colorize_cell(column: &str, value: &Scalar, text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    if column == PRIMARY_KEY || column.ends_with("_count") {
        return text.cyan().to_string();
    }
    match value {
        Scalar::Null => text.dimmed().to_string(),
        Scalar::Bool(true) => text.green().to_string(),
        Scalar::Bool(false) => text.red().to_string(),
        Scalar::Int(_) | Scalar::Float(_) => text.yellow().to_string(),
        Scalar::Text(_) => text.to_string(),
    }
}

/// Colors the kind label of an explained query step.
pub(crate) fn colorize_step_kind(kind: StepKind, config: &OutputConfig) -> String {
    let label = format!("{kind:?}");
    if !config.use_colors {
        return label;
    }
    match kind {
        StepKind::EagerLoad => label.cyan().to_string(),
        StepKind::Where | StepKind::OrWhere | StepKind::WhereIn => label.yellow().to_string(),
        StepKind::Scope => label.magenta().to_string(),
        StepKind::OrderBy | StepKind::Limit => label.dimmed().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_color() -> OutputConfig {
        OutputConfig::new(80, false)
    }

    #[test]
    fn plain_when_colors_disabled() {
        let config = no_color();
        assert_eq!(success("ok", &config), "ok");
        assert_eq!(error("bad", &config), "bad");
        assert_eq!(colorize_cell("id", &Scalar::Int(1), "1", &config), "1");
        assert_eq!(colorize_step_kind(StepKind::OrWhere, &config), "OrWhere");
    }

    #[test]
    fn colors_wrap_text_when_enabled() {
        colored::control::set_override(true);
        let config = OutputConfig::new(80, true);
        let cell = colorize_cell("title", &Scalar::Null, "NULL", &config);
        assert!(cell.contains("NULL"));
        assert_ne!(cell, "NULL");
        colored::control::unset_override();
    }
}
