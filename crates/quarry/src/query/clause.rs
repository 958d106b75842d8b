//! Individual query clauses.

use crate::domain::Scalar;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Comparison operator of a filter clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Operator {
    /// `=`
    #[default]
    #[serde(rename = "=")]
    Eq,
    /// `!=` (also parsed from `<>`)
    #[serde(rename = "!=", alias = "<>")]
    Ne,
    /// `<`
    #[serde(rename = "<")]
    Lt,
    /// `<=`
    #[serde(rename = "<=")]
    Le,
    /// `>`
    #[serde(rename = ">")]
    Gt,
    /// `>=`
    #[serde(rename = ">=")]
    Ge,
    /// `like`, with `%` and `_` wildcards
    #[serde(rename = "like", alias = "LIKE")]
    Like,
}

impl Operator {
    /// SQL spelling of the operator.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "like",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Ok(Self::Eq),
            "!=" | "<>" => Ok(Self::Ne),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            "like" => Ok(Self::Like),
            other => Err(format!(
                "Invalid operator: '{other}'. Must be one of: =, !=, <>, <, <=, >, >=, like"
            )),
        }
    }
}

/// A single `column <op> value` comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterClause {
    /// Column name. Not validated here.
    pub column: String,
    /// Comparison operator.
    #[serde(default)]
    pub operator: Operator,
    /// Right-hand side.
    pub value: Scalar,
}

impl FilterClause {
    /// Creates a clause.
    pub fn new(column: impl Into<String>, operator: Operator, value: impl Into<Scalar>) -> Self {
        Self {
            column: column.into(),
            operator,
            value: value.into(),
        }
    }
}

impl fmt::Display for FilterClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.operator, &self.value) {
            (Operator::Eq, Scalar::Null) => write!(f, "{} is null", self.column),
            (Operator::Ne, Scalar::Null) => write!(f, "{} is not null", self.column),
            (op, Scalar::Text(text)) => write!(f, "{} {op} '{text}'", self.column),
            (op, value) => write!(f, "{} {op} {value}", self.column),
        }
    }
}

/// Membership test: `column in (values...)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InClause {
    /// Column name.
    pub column: String,
    /// Accepted values, in the order given.
    pub values: Vec<Scalar>,
}

impl fmt::Display for InClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<String> = self
            .values
            .iter()
            .map(|v| match v {
                Scalar::Text(text) => format!("'{text}'"),
                other => other.to_string(),
            })
            .collect();
        write!(f, "{} in ({})", self.column, values.join(", "))
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Ascending (smallest first, `NULL` first).
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl Direction {
    /// Maps the builder's boolean flag: `true` is ascending.
    #[must_use]
    pub fn from_ascending(ascending: bool) -> Self {
        if ascending { Self::Asc } else { Self::Desc }
    }

    /// Interprets a direction token from a request parameter.
    ///
    /// `desc`, `0`, `false` and the empty string are descending; every
    /// other token, including `asc`, `1` and `true`, is ascending.
    #[must_use]
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "desc" | "0" | "false" | "" => Self::Desc,
            _ => Self::Asc,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => write!(f, "asc"),
            Self::Desc => write!(f, "desc"),
        }
    }
}

/// One `ORDER BY` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Column to sort by.
    pub column: String,
    /// Direction.
    #[serde(default)]
    pub direction: Direction,
}

impl OrderSpec {
    /// Creates an order entry.
    pub fn new(column: impl Into<String>, direction: Direction) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }
}

/// A named backend scope with its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeInvocation {
    /// Scope name as registered by the backend.
    pub name: String,
    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<Scalar>,
}

impl fmt::Display for ScopeInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self.args.iter().map(ToString::to_string).collect();
        write!(f, "{}({})", self.name, args.join(", "))
    }
}

/// Row cap for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RowLimit {
    /// No cap. Set explicitly with a negative limit; fetch operations that
    /// see it take the unfiltered retrieval path.
    Unlimited,
    /// At most this many rows.
    Rows(usize),
    /// No limit was set.
    #[default]
    Unset,
}

impl RowLimit {
    /// Returns `true` for the explicit [`RowLimit::Unlimited`] sentinel.
    #[must_use]
    pub fn is_unlimited(self) -> bool {
        matches!(self, Self::Unlimited)
    }

    /// The cap, if one applies.
    #[must_use]
    pub fn rows(self) -> Option<usize> {
        match self {
            Self::Rows(n) => Some(n),
            Self::Unlimited | Self::Unset => None,
        }
    }
}

impl From<i64> for RowLimit {
    fn from(n: i64) -> Self {
        usize::try_from(n).map_or(Self::Unlimited, Self::Rows)
    }
}

impl From<i32> for RowLimit {
    fn from(n: i32) -> Self {
        Self::from(i64::from(n))
    }
}

impl From<usize> for RowLimit {
    fn from(n: usize) -> Self {
        Self::Rows(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("=", Operator::Eq)]
    #[case("<>", Operator::Ne)]
    #[case("!=", Operator::Ne)]
    #[case(">=", Operator::Ge)]
    #[case("LIKE", Operator::Like)]
    fn operator_parses(#[case] input: &str, #[case] expected: Operator) {
        assert_eq!(input.parse::<Operator>().unwrap(), expected);
    }

    #[test]
    fn operator_rejects_unknown() {
        let err = "between".parse::<Operator>().unwrap_err();
        assert!(err.contains("between"));
    }

    #[rstest]
    #[case("asc", Direction::Asc)]
    #[case("1", Direction::Asc)]
    #[case("true", Direction::Asc)]
    #[case("sideways", Direction::Asc)]
    #[case("desc", Direction::Desc)]
    #[case("DESC", Direction::Desc)]
    #[case("0", Direction::Desc)]
    #[case("false", Direction::Desc)]
    #[case("", Direction::Desc)]
    fn direction_tokens(#[case] token: &str, #[case] expected: Direction) {
        assert_eq!(Direction::from_token(token), expected);
    }

    #[test]
    fn boolean_direction_true_is_ascending() {
        assert_eq!(Direction::from_ascending(true), Direction::Asc);
        assert_eq!(Direction::from_ascending(false), Direction::Desc);
    }

    #[rstest]
    #[case(-1, RowLimit::Unlimited)]
    #[case(-20, RowLimit::Unlimited)]
    #[case(0, RowLimit::Rows(0))]
    #[case(15, RowLimit::Rows(15))]
    fn limit_from_signed(#[case] n: i64, #[case] expected: RowLimit) {
        assert_eq!(RowLimit::from(n), expected);
    }

    #[test]
    fn clauses_display_as_sql() {
        assert_eq!(
            FilterClause::new("status", Operator::Eq, "active").to_string(),
            "status = 'active'"
        );
        assert_eq!(
            FilterClause::new("closed_at", Operator::Eq, Scalar::Null).to_string(),
            "closed_at is null"
        );
        let clause = InClause {
            column: "id".into(),
            values: vec![Scalar::Int(1), Scalar::Int(2)],
        };
        assert_eq!(clause.to_string(), "id in (1, 2)");
    }
}
