//! Predicate evaluation over rows.
//!
//! Compiled steps are folded into a [`Plan`]. Filters follow SQL
//! precedence: consecutive AND clauses form a group and each OR clause
//! starts a new group, so `a AND b OR c AND d` matches `(a AND b) OR (c AND d)`.
//! Each applied scope is its own parenthesised conjunct, so
//! `a OR b` with scope `s` matches `(a OR b) AND (s)`.

use crate::domain::{Row, Scalar};
use crate::error::BackendResult;
use crate::query::{CompiledQuery, FilterClause, InClause, Operator, OrderSpec, QueryStep};
use crate::storage::ScopeRegistry;
use std::cmp::Ordering;

#[derive(Debug, Clone)]
enum Condition {
    Compare(FilterClause),
    In(InClause),
}

impl Condition {
    fn matches(&self, row: &Row) -> bool {
        match self {
            Self::Compare(clause) => compare(row.value(&clause.column), clause.operator, &clause.value),
            Self::In(clause) => {
                let actual = row.value(&clause.column);
                clause
                    .values
                    .iter()
                    .any(|v| actual.compare(v) == Some(Ordering::Equal))
            }
        }
    }
}

/// A filter and how it joins the conditions before it.
#[derive(Debug)]
enum Link {
    And(Condition),
    Or(Condition),
}

/// OR of AND groups.
#[derive(Debug, Default)]
struct Disjunction {
    groups: Vec<Vec<Condition>>,
}

impl Disjunction {
    fn add(&mut self, link: Link) {
        let condition = match link {
            Link::And(condition) => condition,
            Link::Or(condition) => {
                // A leading OR has nothing to disjoin with and joins the first group.
                if !self.is_empty() {
                    self.groups.push(Vec::new());
                }
                condition
            }
        };
        if self.groups.is_empty() {
            self.groups.push(Vec::new());
        }
        let last = self.groups.len() - 1;
        self.groups[last].push(condition);
    }

    fn is_empty(&self) -> bool {
        self.groups.iter().all(Vec::is_empty)
    }

    /// An empty disjunction matches every row.
    fn matches(&self, row: &Row) -> bool {
        self.is_empty()
            || self
                .groups
                .iter()
                .filter(|g| !g.is_empty())
                .any(|group| group.iter().all(|condition| condition.matches(row)))
    }
}

/// Executable form of a compiled query.
#[derive(Debug, Default)]
pub(super) struct Plan {
    pub(super) relations: Vec<String>,
    filters: Disjunction,
    scopes: Vec<Disjunction>,
    pub(super) orders: Vec<OrderSpec>,
    pub(super) limit: Option<usize>,
}

impl Plan {
    /// Folds `query` into a plan, expanding scopes through `scopes`.
    pub(super) fn build(query: &CompiledQuery, scopes: &ScopeRegistry) -> BackendResult<Self> {
        let mut plan = Self::default();
        for step in query.steps() {
            if let QueryStep::Scope(scope) = step {
                let mut conjunct = Disjunction::default();
                for expanded in scopes.expand(&scope.name, &scope.args)? {
                    if let Some(link) = plan.push(expanded) {
                        conjunct.add(link);
                    }
                }
                if !conjunct.is_empty() {
                    plan.scopes.push(conjunct);
                }
            } else if let Some(link) = plan.push(step.clone()) {
                plan.filters.add(link);
            }
        }
        Ok(plan)
    }

    /// Applies a non-filter step and hands filters back to the caller.
    fn push(&mut self, step: QueryStep) -> Option<Link> {
        match step {
            QueryStep::Where(clause) => return Some(Link::And(Condition::Compare(clause))),
            QueryStep::WhereIn(clause) => return Some(Link::And(Condition::In(clause))),
            QueryStep::OrWhere(clause) => return Some(Link::Or(Condition::Compare(clause))),
            QueryStep::EagerLoad { relation } => self.relations.push(relation),
            QueryStep::OrderBy(order) => self.orders.push(order),
            QueryStep::Limit { rows } => self.limit = Some(rows),
            // Scopes are expanded in `build`; registry output never nests them.
            QueryStep::Scope(_) => {}
        }
        None
    }

    /// Returns `true` if `row` satisfies the filters and every scope.
    /// No filters match all.
    pub(super) fn matches(&self, row: &Row) -> bool {
        self.filters.matches(row) && self.scopes.iter().all(|scope| scope.matches(row))
    }
}

/// Evaluates `actual <op> expected` with SQL-like `NULL` handling.
///
/// `= NULL` tests for null and `!= NULL` for non-null; any other
/// comparison involving `NULL` is false.
pub(super) fn compare(actual: &Scalar, operator: Operator, expected: &Scalar) -> bool {
    match (operator, expected) {
        (Operator::Eq, Scalar::Null) => return actual.is_null(),
        (Operator::Ne, Scalar::Null) => return !actual.is_null(),
        _ => {}
    }
    if actual.is_null() {
        return false;
    }

    match operator {
        Operator::Like => like(&actual.to_string(), &expected.to_string()),
        Operator::Ne => actual.compare(expected) != Some(Ordering::Equal),
        Operator::Eq => actual.compare(expected) == Some(Ordering::Equal),
        Operator::Lt => actual.compare(expected) == Some(Ordering::Less),
        Operator::Le => matches!(
            actual.compare(expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::Gt => actual.compare(expected) == Some(Ordering::Greater),
        Operator::Ge => matches!(
            actual.compare(expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
    }
}

/// Case-insensitive `LIKE`: `%` matches any run, `_` one character, and
/// `\` escapes the next character.
pub(super) fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();

    // Tokens: None = %, Some(None) = _, Some(Some(c)) = literal.
    let mut tokens: Vec<Option<Option<char>>> = Vec::with_capacity(pattern.len());
    let mut chars = pattern.into_iter();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '%' => None,
            '_' => Some(None),
            '\\' => Some(Some(chars.next().unwrap_or('\\'))),
            other => Some(Some(other)),
        });
    }

    // matched[j]: the text prefix consumed so far matches tokens[..j].
    let mut matched = vec![false; tokens.len() + 1];
    matched[0] = true;
    for j in 0..tokens.len() {
        if tokens[j].is_none() {
            matched[j + 1] = matched[j];
        }
    }

    for &c in &text {
        let mut next = vec![false; tokens.len() + 1];
        for j in 0..tokens.len() {
            next[j + 1] = match tokens[j] {
                None => next[j] || matched[j + 1],
                Some(None) => matched[j],
                Some(Some(literal)) => matched[j] && literal == c,
            };
        }
        matched = next;
    }

    matched[tokens.len()]
}
