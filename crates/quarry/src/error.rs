//! Error types for quarry operations.
//!
//! Repository operations fail with [`Error`]. Failures that reach the
//! storage layer carry an [`ErrorContext`] naming the entity, the
//! operation and the parameters involved, so the caller's logging
//! collaborator can report them without inspecting the builder.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::io;
use thiserror::Error;

/// The error type for repository operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A single-row fetch matched nothing.
    #[error("{} not found ({})", .context.entity, .context.operation)]
    NotFound {
        /// What was being looked up.
        context: Box<ErrorContext>,
    },

    /// The storage backend failed.
    #[error("storage failure in {}::{}: {source}", .context.entity, .context.operation)]
    Storage {
        /// What was being attempted.
        context: Box<ErrorContext>,
        /// The backend's error.
        #[source]
        source: BackendError,
    },

    /// A condition tuple was malformed (checked variants only).
    #[error("malformed condition: {reason}")]
    ContractViolation {
        /// Description of the offending input.
        reason: String,
    },

    /// A scope name the backend does not define.
    #[error("unknown scope '{scope}' for {}", .context.entity)]
    UnknownScope {
        /// The rejected scope name.
        scope: String,
        /// The `apply_scope` call that named it.
        context: Box<ErrorContext>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the structured context for errors raised during execution.
    #[must_use]
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::NotFound { context }
            | Self::Storage { context, .. }
            | Self::UnknownScope { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Returns `true` for [`Error::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// A specialized Result type for quarry operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum BackendError {
    /// A uniqueness or shape constraint was violated.
    #[error("constraint violation on '{table}': {message}")]
    Constraint {
        /// Table the write targeted.
        table: String,
        /// What was violated.
        message: String,
    },

    /// The table is not defined in the backend.
    #[error("unknown table '{0}'")]
    UnknownTable(String),

    /// An eager-load relation is not defined on the table.
    #[error("unknown relation '{relation}' on '{table}'")]
    UnknownRelation {
        /// Table being queried.
        table: String,
        /// The undefined relation.
        relation: String,
    },

    /// A named scope rejected its arguments.
    #[error("scope '{scope}' failed: {message}")]
    Scope {
        /// The scope that failed.
        scope: String,
        /// Why it failed.
        message: String,
    },

    /// Reading or writing a JSONL table file failed.
    #[error("JSONL error: {0}")]
    Jsonl(#[from] quarry_jsonl::Error),

    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A specialized Result type for storage backends.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Repository operations, as recorded in [`ErrorContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// `open`: resolving the table and its scopes
    Open,
    /// `fetch_all`
    FetchAll,
    /// `count`
    Count,
    /// `fetch_filtered`
    FetchFiltered,
    /// `fetch_one`
    FetchOne,
    /// `fetch_page`
    FetchPage,
    /// `fetch_by_id`
    FetchById,
    /// `fetch_by_column`
    FetchByColumn,
    /// `delete`
    Delete,
    /// `create`
    Create,
    /// `first_or_create`
    FirstOrCreate,
    /// `create_many`
    CreateMany,
    /// `update_by_id`
    UpdateById,
    /// `delete_by_id`
    DeleteById,
    /// `delete_many_by_id`
    DeleteManyById,
    /// `apply_scope`
    ApplyScope,
}

impl Operation {
    /// Method name of the operation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::FetchAll => "fetch_all",
            Self::Count => "count",
            Self::FetchFiltered => "fetch_filtered",
            Self::FetchOne => "fetch_one",
            Self::FetchPage => "fetch_page",
            Self::FetchById => "fetch_by_id",
            Self::FetchByColumn => "fetch_by_column",
            Self::Delete => "delete",
            Self::Create => "create",
            Self::FirstOrCreate => "first_or_create",
            Self::CreateMany => "create_many",
            Self::UpdateById => "update_by_id",
            Self::DeleteById => "delete_by_id",
            Self::DeleteManyById => "delete_many_by_id",
            Self::ApplyScope => "apply_scope",
        }
    }

    /// Message-key suffix for failures of this operation.
    #[must_use]
    pub fn error_type(self) -> &'static str {
        match self {
            Self::Open => "make_model_error",
            Self::FetchAll
            | Self::Count
            | Self::FetchFiltered
            | Self::FetchOne
            | Self::FetchPage
            | Self::FetchById
            | Self::FetchByColumn => "get_error",
            Self::Create | Self::FirstOrCreate | Self::CreateMany => "create_error",
            Self::UpdateById => "update_error",
            Self::Delete | Self::DeleteById | Self::DeleteManyById => "delete_error",
            Self::ApplyScope => "set_scopes_error",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured payload attached to execution errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorContext {
    /// Entity path the repository serves, e.g. `billing::Invoice`.
    pub entity: String,
    /// The operation that failed.
    pub operation: Operation,
    /// The specific row involved, if any (e.g. `id=3`).
    pub subject: Option<String>,
    /// Operation parameters worth logging.
    pub properties: Map<String, Value>,
}

impl ErrorContext {
    /// Creates a context with no subject or properties.
    pub fn new(entity: impl Into<String>, operation: Operation) -> Self {
        Self {
            entity: entity.into(),
            operation,
            subject: None,
            properties: Map::new(),
        }
    }

    /// Sets the subject.
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Adds a property. Values that fail to serialize are recorded as `null`.
    #[must_use]
    pub fn with_property(mut self, key: &str, value: impl Serialize) -> Self {
        self.properties.insert(
            key.to_string(),
            serde_json::to_value(value).unwrap_or(Value::Null),
        );
        self
    }

    /// Translation key for the failure, see [`message_key`].
    #[must_use]
    pub fn message_key(&self) -> String {
        message_key(&self.entity, self.operation)
    }
}

/// Builds the translation key for a failed operation on an entity.
///
/// Path segments are snake-cased and joined with dots under an
/// `exceptions` prefix; a `models` segment becomes `admin`.
///
/// ```
/// use quarry::error::{message_key, Operation};
///
/// assert_eq!(
///     message_key("billing::LineItem", Operation::FetchOne),
///     "exceptions.billing.line_item.get_error"
/// );
/// ```
#[must_use]
pub fn message_key(entity: &str, operation: Operation) -> String {
    let mut parts = vec!["exceptions".to_string()];
    parts.extend(
        entity
            .split("::")
            .filter(|segment| !segment.is_empty())
            .map(snake_case)
            .map(|segment| {
                if segment == "models" {
                    "admin".to_string()
                } else {
                    segment
                }
            }),
    );
    parts.push(operation.error_type().to_string());
    parts.join(".")
}

/// `LineItem` -> `line_item`, `HTTPServer` -> `http_server`.
pub(crate) fn snake_case(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_is_lower)
            {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }
    out
}
