//! Error activity reporting.
//!
//! The repository never logs; it returns errors carrying an
//! [`ErrorContext`]. Callers hand those errors to [`report_error`], which
//! emits one structured `tracing` event per failure.

use crate::error::{Error, ErrorContext};
use serde::Serialize;
use serde_json::{Map, Value};

/// Log name attached to every error activity.
pub const ERROR_LOG_NAME: &str = "error";

/// A failure, flattened for logging or persistence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorActivity {
    /// Always [`ERROR_LOG_NAME`].
    pub log_name: &'static str,
    /// Translation key, e.g. `exceptions.ticket.get_error`.
    pub message_key: Option<String>,
    /// One-line description, see [`describe`].
    pub description: String,
    /// Entity the failing repository serves.
    pub entity: Option<String>,
    /// Row the failure concerned.
    pub subject: Option<String>,
    /// Parameters of the failing call.
    pub properties: Map<String, Value>,
}

impl ErrorActivity {
    /// Builds the activity for `error`.
    #[must_use]
    pub fn from_error(error: &Error) -> Self {
        let context = error.context();
        Self {
            log_name: ERROR_LOG_NAME,
            message_key: context.map(ErrorContext::message_key),
            description: describe(error),
            entity: context.map(|c| c.entity.clone()),
            subject: context.and_then(|c| c.subject.clone()),
            properties: context.map(|c| c.properties.clone()).unwrap_or_default(),
        }
    }
}

/// Formats `error` as `Exception: "<message>" @ <entity>::<operation>()`,
/// followed by ` on <subject>` when a row is involved.
#[must_use]
pub fn describe(error: &Error) -> String {
    let mut line = format!("Exception: \"{error}\"");
    if let Some(context) = error.context() {
        line.push_str(&format!(" @ {}::{}()", context.entity, context.operation));
        if let Some(subject) = &context.subject {
            line.push_str(" on ");
            line.push_str(subject);
        }
    }
    line
}

/// Emits a structured `error` event for `error` and returns the activity.
pub fn report_error(error: &Error) -> ErrorActivity {
    let activity = ErrorActivity::from_error(error);
    let properties = Value::Object(activity.properties.clone());
    tracing::error!(
        log_name = activity.log_name,
        message_key = activity.message_key.as_deref().unwrap_or_default(),
        entity = activity.entity.as_deref().unwrap_or_default(),
        subject = activity.subject.as_deref().unwrap_or_default(),
        properties = %properties,
        "{}",
        activity.description
    );
    activity
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BackendError, Operation};

    #[test]
    fn describes_not_found_with_subject() {
        let error = Error::NotFound {
            context: Box::new(
                ErrorContext::new("billing::Invoice", Operation::FetchById)
                    .with_subject("id=4")
                    .with_property("id", 4),
            ),
        };
        let activity = report_error(&error);

        assert_eq!(
            activity.description,
            format!("Exception: \"{error}\" @ billing::Invoice::fetch_by_id() on id=4")
        );
        assert_eq!(
            activity.message_key.as_deref(),
            Some("exceptions.billing.invoice.get_error")
        );
        assert_eq!(activity.properties.get("id"), Some(&Value::from(4)));
    }

    #[test]
    fn storage_failures_keep_operation() {
        let error = Error::Storage {
            context: Box::new(ErrorContext::new("Ticket", Operation::Create)),
            source: BackendError::UnknownTable("tickets".into()),
        };
        let activity = ErrorActivity::from_error(&error);
        assert!(activity.description.ends_with("@ Ticket::create()"));
        assert_eq!(activity.subject, None);
    }

    #[test]
    fn contextless_errors_still_report() {
        let error = Error::Config("bad".into());
        let activity = ErrorActivity::from_error(&error);
        assert_eq!(activity.message_key, None);
        assert_eq!(activity.description, "Exception: \"Configuration error: bad\"");
        assert!(activity.properties.is_empty());
    }
}
