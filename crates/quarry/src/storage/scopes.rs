//! Named scopes: backend-side query transformations invoked by name.
//!
//! A scope expands into plain query steps (filters and sort keys) given
//! its positional arguments. Scopes are registered per table either as
//! closures or as declarative [`ScopeDefinition`]s loaded from config,
//! whose values may reference arguments as `$1`, `$2`, ...

use crate::domain::Scalar;
use crate::error::{BackendError, BackendResult};
use crate::query::{FilterClause, InClause, Operator, OrderSpec, QueryStep};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Scope implementation: arguments in, steps out.
pub type ScopeFn = Arc<dyn Fn(&[Scalar]) -> Result<Vec<QueryStep>, String> + Send + Sync>;

/// Scopes defined for one table.
#[derive(Clone, Default)]
pub struct ScopeRegistry {
    scopes: BTreeMap<String, ScopeFn>,
}

impl ScopeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a closure scope, replacing any scope of the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, scope: F)
    where
        F: Fn(&[Scalar]) -> Result<Vec<QueryStep>, String> + Send + Sync + 'static,
    {
        self.scopes.insert(name.into(), Arc::new(scope));
    }

    /// Registers a declarative scope.
    pub fn define(&mut self, definition: ScopeDefinition) {
        let name = definition.name.clone();
        self.scopes
            .insert(name, Arc::new(move |args| definition.expand(args)));
    }

    /// Returns `true` if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.scopes.contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.scopes.keys().cloned().collect()
    }

    /// Expands `name(args)` into steps.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Scope`] if the scope is not registered, the
    /// scope rejects its arguments, or it produces a step other than a
    /// filter or sort key.
    pub fn expand(&self, name: &str, args: &[Scalar]) -> BackendResult<Vec<QueryStep>> {
        let scope = self.scopes.get(name).ok_or_else(|| BackendError::Scope {
            scope: name.to_string(),
            message: "not defined".to_string(),
        })?;

        let steps = scope(args).map_err(|message| BackendError::Scope {
            scope: name.to_string(),
            message,
        })?;

        if let Some(step) = steps.iter().find(|step| {
            !matches!(
                step,
                QueryStep::Where(_)
                    | QueryStep::OrWhere(_)
                    | QueryStep::WhereIn(_)
                    | QueryStep::OrderBy(_)
            )
        }) {
            return Err(BackendError::Scope {
                scope: name.to_string(),
                message: format!("scopes may only filter or sort, got `{step}`"),
            });
        }

        Ok(steps)
    }
}

impl fmt::Debug for ScopeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.scopes.keys()).finish()
    }
}

/// A scope declared in configuration.
///
/// ```yaml
/// name: priority-above
/// where:
///   - column: priority
///     operator: ">"
///     value: $1
/// order-by:
///   - column: priority
///     direction: desc
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScopeDefinition {
    /// Scope name.
    pub name: String,
    /// AND-ed comparisons.
    #[serde(default, rename = "where")]
    pub wheres: Vec<FilterClause>,
    /// OR-ed comparisons.
    #[serde(default)]
    pub or_where: Vec<FilterClause>,
    /// Membership tests.
    #[serde(default)]
    pub where_in: Vec<InClause>,
    /// Sort keys.
    #[serde(default)]
    pub order_by: Vec<OrderSpec>,
}

impl ScopeDefinition {
    /// Substitutes `$N` references and emits steps.
    fn expand(&self, args: &[Scalar]) -> Result<Vec<QueryStep>, String> {
        let mut steps = Vec::new();
        for clause in &self.wheres {
            steps.push(QueryStep::Where(bind_clause(clause, args)?));
        }
        for clause in &self.or_where {
            steps.push(QueryStep::OrWhere(bind_clause(clause, args)?));
        }
        for clause in &self.where_in {
            let values = clause
                .values
                .iter()
                .map(|v| bind_value(v, args))
                .collect::<Result<Vec<_>, _>>()?;
            steps.push(QueryStep::WhereIn(InClause {
                column: clause.column.clone(),
                values,
            }));
        }
        for order in &self.order_by {
            steps.push(QueryStep::OrderBy(order.clone()));
        }
        Ok(steps)
    }
}

fn bind_clause(clause: &FilterClause, args: &[Scalar]) -> Result<FilterClause, String> {
    Ok(FilterClause {
        column: clause.column.clone(),
        operator: clause.operator,
        value: bind_value(&clause.value, args)?,
    })
}

/// Resolves `$N` (1-based) to the N-th argument; other values pass through.
fn bind_value(value: &Scalar, args: &[Scalar]) -> Result<Scalar, String> {
    let Some(index) = value
        .as_str()
        .and_then(|s| s.strip_prefix('$'))
        .and_then(|n| n.parse::<usize>().ok())
    else {
        return Ok(value.clone());
    };

    index
        .checked_sub(1)
        .and_then(|i| args.get(i))
        .cloned()
        .ok_or_else(|| format!("argument ${index} is missing ({} given)", args.len()))
}

/// Convenience for closure scopes: `column = value`.
#[must_use]
pub fn equals(column: &str, value: impl Into<Scalar>) -> QueryStep {
    QueryStep::Where(FilterClause::new(column, Operator::Eq, value))
}
