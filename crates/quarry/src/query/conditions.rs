//! Loosely-typed condition input: tuples and request parameters.

use super::clause::{Direction, FilterClause, InClause, Operator, OrderSpec};
use crate::domain::{Operand, Scalar};
use serde::{Deserialize, Serialize};

/// Reserved request parameter holding sort instructions.
pub const ORDER_BY_PARAM: &str = "order_by";

/// A raw `[column, value, operator?]` tuple.
pub type ConditionTuple = Vec<Operand>;

/// One condition tuple or a sequence of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Conditions {
    /// `[[column, value, op?], ...]`
    Many(Vec<ConditionTuple>),
    /// `[column, value, op?]`
    One(ConditionTuple),
}

impl Conditions {
    /// No conditions.
    #[must_use]
    pub fn none() -> Self {
        Self::Many(Vec::new())
    }

    /// Flattens into a list of tuples.
    #[must_use]
    pub fn into_tuples(self) -> Vec<ConditionTuple> {
        match self {
            Self::Many(tuples) => tuples,
            Self::One(tuple) if tuple.is_empty() => Vec::new(),
            Self::One(tuple) => vec![tuple],
        }
    }
}

impl Default for Conditions {
    fn default() -> Self {
        Self::none()
    }
}

impl From<ConditionTuple> for Conditions {
    fn from(tuple: ConditionTuple) -> Self {
        Self::One(tuple)
    }
}

impl From<Vec<ConditionTuple>> for Conditions {
    fn from(tuples: Vec<ConditionTuple>) -> Self {
        Self::Many(tuples)
    }
}

/// Builds a [`ConditionTuple`] from heterogeneous values.
///
/// ```
/// use quarry::cond;
///
/// let tuple = cond!["priority", 3, ">="];
/// assert_eq!(tuple.len(), 3);
/// ```
#[macro_export]
macro_rules! cond {
    ($($item:expr),* $(,)?) => {
        vec![$($crate::domain::Operand::from($item)),*]
    };
}

/// Flat key to value request parameters, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParams {
    entries: Vec<(String, Operand)>,
}

impl RequestParams {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, replacing an earlier value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Operand>) {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Removes and returns `key`.
    pub fn take(&mut self, key: &str) -> Option<Operand> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Returns `true` if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Converts each entry into a `[key, value]` tuple.
    #[must_use]
    pub fn into_tuples(self) -> Vec<ConditionTuple> {
        self.entries
            .into_iter()
            .map(|(key, value)| vec![Operand::from(key), value])
            .collect()
    }
}

impl<K: Into<String>, V: Into<Operand>> FromIterator<(K, V)> for RequestParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

/// A tuple after normalisation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Normalized {
    Where(FilterClause),
    WhereIn(InClause),
}

/// Normalises one tuple, or explains why it is malformed.
pub(crate) fn normalize(tuple: &[Operand]) -> Result<Normalized, String> {
    let (column, value, operator) = match tuple {
        [column, value] => (column, value, None),
        [column, value, operator] => (column, value, Some(operator)),
        [] | [_] => {
            return Err(format!(
                "condition needs at least a column and a value, got {} element(s)",
                tuple.len()
            ));
        }
        _ => {
            return Err(format!(
                "condition has {} elements, expected [column, value, operator?]",
                tuple.len()
            ));
        }
    };

    let column = match column {
        Operand::Scalar(Scalar::Text(name)) if !name.is_empty() => name.clone(),
        other => return Err(format!("condition column must be a name, got {other:?}")),
    };

    let operator = match operator {
        None | Some(Operand::Scalar(Scalar::Null)) => Operator::Eq,
        Some(Operand::Scalar(Scalar::Text(op))) if op.trim().is_empty() => Operator::Eq,
        Some(Operand::Scalar(Scalar::Text(op))) => op.parse()?,
        Some(other) => return Err(format!("condition operator must be text, got {other:?}")),
    };

    Ok(match value {
        Operand::List(values) => Normalized::WhereIn(InClause {
            column,
            values: values.clone(),
        }),
        Operand::Scalar(value) => Normalized::Where(FilterClause {
            column,
            operator,
            value: value.clone(),
        }),
    })
}

/// Parses an `order_by` parameter: `"column,direction"` or a list of them.
///
/// A missing direction is ascending. Entries without a column are dropped.
pub(crate) fn parse_order(value: &Operand) -> Vec<OrderSpec> {
    let entries: Vec<String> = match value {
        Operand::Scalar(Scalar::Null) => Vec::new(),
        Operand::Scalar(single) => vec![single.to_string()],
        Operand::List(many) => many
            .iter()
            .filter(|v| !v.is_null())
            .map(ToString::to_string)
            .collect(),
    };

    entries
        .iter()
        .filter_map(|entry| {
            let mut parts = entry.splitn(2, ',');
            let column = parts.next()?.trim();
            if column.is_empty() {
                return None;
            }
            let direction = parts.next().map_or(Direction::Asc, Direction::from_token);
            Some(OrderSpec::new(column, direction))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cond;
    use rstest::rstest;

    #[test]
    fn two_element_tuple_defaults_to_equals() {
        let parsed = normalize(&cond!["status", "active"]).unwrap();
        assert_eq!(
            parsed,
            Normalized::Where(FilterClause::new("status", Operator::Eq, "active"))
        );
    }

    #[test]
    fn list_value_routes_to_where_in() {
        let parsed = normalize(&cond!["id", vec![1, 2, 3]]).unwrap();
        assert_eq!(
            parsed,
            Normalized::WhereIn(InClause {
                column: "id".into(),
                values: vec![Scalar::Int(1), Scalar::Int(2), Scalar::Int(3)],
            })
        );
    }

    #[rstest]
    #[case::empty(vec![])]
    #[case::column_only(cond!["status"])]
    #[case::numeric_column(cond![5, "x"])]
    #[case::bad_operator(cond!["a", 1, "between"])]
    #[case::too_long(cond!["a", 1, "=", "extra"])]
    fn malformed_tuples_are_rejected(#[case] tuple: ConditionTuple) {
        assert!(normalize(&tuple).is_err());
    }

    #[test]
    fn untagged_conditions_prefer_many() {
        let many: Conditions = serde_json::from_str(r#"[["status","active"],["id",[1,2]]]"#).unwrap();
        assert_eq!(many.into_tuples().len(), 2);

        let one: Conditions = serde_json::from_str(r#"["status","active"]"#).unwrap();
        assert_eq!(one.into_tuples(), vec![cond!["status", "active"]]);
    }

    #[rstest]
    #[case::bare_column("name", vec![OrderSpec::new("name", Direction::Asc)])]
    #[case::desc("name,desc", vec![OrderSpec::new("name", Direction::Desc)])]
    #[case::zero("name,0", vec![OrderSpec::new("name", Direction::Desc)])]
    #[case::trailing_comma("name,", vec![OrderSpec::new("name", Direction::Desc)])]
    #[case::no_column(",desc", vec![])]
    fn order_param_parses(#[case] raw: &str, #[case] expected: Vec<OrderSpec>) {
        assert_eq!(parse_order(&Operand::from(raw)), expected);
    }

    #[test]
    fn order_param_accepts_list() {
        let orders = parse_order(&Operand::from(vec!["priority,desc", "id"]));
        assert_eq!(
            orders,
            vec![
                OrderSpec::new("priority", Direction::Desc),
                OrderSpec::new("id", Direction::Asc)
            ]
        );
    }

    #[test]
    fn request_params_keep_insertion_order() {
        let mut params: RequestParams =
            [("status", "open"), ("order_by", "id,desc"), ("team", "core")]
                .into_iter()
                .collect();
        params.insert("status", "closed");

        assert_eq!(params.take(ORDER_BY_PARAM), Some(Operand::from("id,desc")));
        assert_eq!(
            params.into_tuples(),
            vec![cond!["status", "closed"], cond!["team", "core"]]
        );
    }
}
