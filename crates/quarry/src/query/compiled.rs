//! Compiled query representation handed to storage backends.

use super::clause::{FilterClause, InClause, OrderSpec, ScopeInvocation};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which parts of the accumulated state an operation compiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompileMode {
    /// Eager-load relations only (`fetch_all`, `fetch_by_id`, `fetch_by_column`).
    EagerOnly,
    /// Filters and scopes (`count`, `delete`).
    Filters,
    /// Everything except the row limit (`fetch_page`).
    Paginate,
    /// Everything (`fetch_filtered`, `fetch_one`).
    Select,
}

impl CompileMode {
    pub(crate) fn eager_load(self) -> bool {
        !matches!(self, Self::Filters)
    }

    pub(crate) fn filters(self) -> bool {
        !matches!(self, Self::EagerOnly)
    }

    pub(crate) fn ordering(self) -> bool {
        matches!(self, Self::Paginate | Self::Select)
    }

    pub(crate) fn limit(self) -> bool {
        matches!(self, Self::Select)
    }
}

/// One instruction of a compiled query, in application order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum QueryStep {
    /// Attach `<relation>_count` to each row.
    EagerLoad {
        /// Relation name.
        relation: String,
    },
    /// AND-ed comparison.
    Where(FilterClause),
    /// OR-ed comparison; starts a new conjunctive group.
    OrWhere(FilterClause),
    /// AND-ed membership test.
    WhereIn(InClause),
    /// Sort key.
    OrderBy(OrderSpec),
    /// Named backend scope.
    Scope(ScopeInvocation),
    /// Row cap.
    Limit {
        /// Maximum rows returned.
        rows: usize,
    },
}

/// Discriminant of a [`QueryStep`]; ordered the way steps are compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StepKind {
    /// [`QueryStep::EagerLoad`]
    EagerLoad,
    /// [`QueryStep::Where`]
    Where,
    /// [`QueryStep::OrWhere`]
    OrWhere,
    /// [`QueryStep::WhereIn`]
    WhereIn,
    /// [`QueryStep::OrderBy`]
    OrderBy,
    /// [`QueryStep::Scope`]
    Scope,
    /// [`QueryStep::Limit`]
    Limit,
}

impl QueryStep {
    /// Kind of this step.
    #[must_use]
    pub fn kind(&self) -> StepKind {
        match self {
            Self::EagerLoad { .. } => StepKind::EagerLoad,
            Self::Where(_) => StepKind::Where,
            Self::OrWhere(_) => StepKind::OrWhere,
            Self::WhereIn(_) => StepKind::WhereIn,
            Self::OrderBy(_) => StepKind::OrderBy,
            Self::Scope(_) => StepKind::Scope,
            Self::Limit { .. } => StepKind::Limit,
        }
    }
}

impl fmt::Display for QueryStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EagerLoad { relation } => write!(f, "with count({relation})"),
            Self::Where(clause) => write!(f, "where {clause}"),
            Self::OrWhere(clause) => write!(f, "or where {clause}"),
            Self::WhereIn(clause) => write!(f, "where {clause}"),
            Self::OrderBy(order) => write!(f, "order by {} {}", order.column, order.direction),
            Self::Scope(scope) => write!(f, "scope {scope}"),
            Self::Limit { rows } => write!(f, "limit {rows}"),
        }
    }
}

/// An ordered list of query steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompiledQuery {
    steps: Vec<QueryStep>,
}

impl CompiledQuery {
    /// Creates a query from steps, keeping their order.
    #[must_use]
    pub fn new(steps: Vec<QueryStep>) -> Self {
        Self { steps }
    }

    /// All steps in application order.
    #[must_use]
    pub fn steps(&self) -> &[QueryStep] {
        &self.steps
    }

    /// Step kinds in application order.
    #[must_use]
    pub fn kinds(&self) -> Vec<StepKind> {
        self.steps.iter().map(QueryStep::kind).collect()
    }

    /// Relations requested for eager loading.
    pub fn relations(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().filter_map(|step| match step {
            QueryStep::EagerLoad { relation } => Some(relation.as_str()),
            _ => None,
        })
    }

    /// Returns `true` if the query has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub(crate) fn push(&mut self, step: QueryStep) {
        self.steps.push(step);
    }
}

impl IntoIterator for CompiledQuery {
    type Item = QueryStep;
    type IntoIter = std::vec::IntoIter<QueryStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.into_iter()
    }
}

impl fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{step}")?;
        }
        Ok(())
    }
}
