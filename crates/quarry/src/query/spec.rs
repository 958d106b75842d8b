//! The accumulated query specification.

use super::clause::{FilterClause, InClause, OrderSpec, RowLimit, ScopeInvocation};
use super::compiled::{CompileMode, CompiledQuery, QueryStep};
use crate::domain::Scalar;
use serde::{Deserialize, Serialize};

/// What an execution operation clears afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResetPolicy {
    /// Clear clauses, orders, scopes and the limit; relations persist until
    /// overwritten.
    #[default]
    KeepRelations,
    /// Clear relations as well.
    Uniform,
}

/// Scope invocations keyed by name.
///
/// Registering a name again replaces its arguments but keeps its
/// position, so iteration follows first registration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeSet {
    entries: Vec<ScopeInvocation>,
}

impl ScopeSet {
    /// Records `name(args)`, replacing any earlier invocation of `name`.
    pub fn insert(&mut self, name: impl Into<String>, args: Vec<Scalar>) {
        let name = name.into();
        if let Some(existing) = self.entries.iter_mut().find(|s| s.name == name) {
            existing.args = args;
        } else {
            self.entries.push(ScopeInvocation { name, args });
        }
    }

    /// Arguments recorded for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[Scalar]> {
        self.entries
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.args.as_slice())
    }

    /// Invocations in first-registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ScopeInvocation> {
        self.entries.iter()
    }

    /// Number of distinct scopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no scope is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every invocation.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Filters, orders, scopes, limit and eager-load relations accumulated by
/// a [`Repository`](crate::Repository) between executions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    pub(crate) wheres: Vec<FilterClause>,
    pub(crate) or_wheres: Vec<FilterClause>,
    pub(crate) where_ins: Vec<InClause>,
    pub(crate) order_bys: Vec<OrderSpec>,
    pub(crate) scopes: ScopeSet,
    pub(crate) limit: RowLimit,
    pub(crate) relations: Vec<String>,
}

impl QuerySpec {
    /// AND clauses in insertion order.
    #[must_use]
    pub fn wheres(&self) -> &[FilterClause] {
        &self.wheres
    }

    /// OR clauses in insertion order.
    #[must_use]
    pub fn or_wheres(&self) -> &[FilterClause] {
        &self.or_wheres
    }

    /// IN clauses in insertion order.
    #[must_use]
    pub fn where_ins(&self) -> &[InClause] {
        &self.where_ins
    }

    /// Sort keys, primary first.
    #[must_use]
    pub fn order_bys(&self) -> &[OrderSpec] {
        &self.order_bys
    }

    /// Recorded scope invocations.
    #[must_use]
    pub fn scopes(&self) -> &ScopeSet {
        &self.scopes
    }

    /// Current row limit.
    #[must_use]
    pub fn limit(&self) -> RowLimit {
        self.limit
    }

    /// Relations to eager-load.
    #[must_use]
    pub fn relations(&self) -> &[String] {
        &self.relations
    }

    /// Returns `true` if nothing but relations is set.
    #[must_use]
    pub fn is_clear(&self) -> bool {
        self.wheres.is_empty()
            && self.or_wheres.is_empty()
            && self.where_ins.is_empty()
            && self.order_bys.is_empty()
            && self.scopes.is_empty()
            && self.limit == RowLimit::Unset
    }

    /// Compiles the parts selected by `mode`.
    ///
    /// Steps are emitted as: eager-load, AND, OR, IN, ORDER BY, scopes,
    /// limit. Each group keeps insertion order.
    #[must_use]
    pub fn compile(&self, mode: CompileMode) -> CompiledQuery {
        let mut query = CompiledQuery::default();

        if mode.eager_load() {
            for relation in &self.relations {
                query.push(QueryStep::EagerLoad {
                    relation: relation.clone(),
                });
            }
        }

        if mode.filters() {
            for clause in &self.wheres {
                query.push(QueryStep::Where(clause.clone()));
            }
            for clause in &self.or_wheres {
                query.push(QueryStep::OrWhere(clause.clone()));
            }
            for clause in &self.where_ins {
                query.push(QueryStep::WhereIn(clause.clone()));
            }
        }

        if mode.ordering() {
            for order in &self.order_bys {
                query.push(QueryStep::OrderBy(order.clone()));
            }
        }

        if mode.filters() {
            for scope in self.scopes.iter() {
                query.push(QueryStep::Scope(scope.clone()));
            }
        }

        if mode.limit() {
            if let Some(rows) = self.limit.rows() {
                query.push(QueryStep::Limit { rows });
            }
        }

        query
    }

    /// Clears per-call state according to `policy`.
    pub fn reset(&mut self, policy: ResetPolicy) {
        self.wheres.clear();
        self.or_wheres.clear();
        self.where_ins.clear();
        self.order_bys.clear();
        self.scopes.clear();
        self.limit = RowLimit::Unset;
        if policy == ResetPolicy::Uniform {
            self.relations.clear();
        }
    }
}
