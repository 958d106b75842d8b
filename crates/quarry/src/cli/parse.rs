//! Value parsers for CLI filter arguments.
//!
//! Used by clap's `value_parser` attribute so malformed filters are
//! rejected at parse time with a specific message.

use crate::domain::{Operand, Scalar};
use crate::query::{Direction, Operator, OrderSpec};
use std::str::FromStr;

/// A `--where` / `--or-where` filter.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereArg {
    /// Column name.
    pub column: String,
    /// Comparison operator.
    pub operator: Operator,
    /// Right-hand side.
    pub value: Scalar,
}

/// A `--where-in` filter.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereInArg {
    /// Column name.
    pub column: String,
    /// Accepted values.
    pub values: Vec<Scalar>,
}

/// A `--param key=value` request parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamArg {
    /// Parameter name.
    pub key: String,
    /// Parameter value; comma-separated values become a list.
    pub value: Operand,
}

/// A `--scope name[:arg,...]` invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeArg {
    /// Scope name.
    pub name: String,
    /// Arguments in order.
    pub args: Vec<Scalar>,
}

/// Interprets a command-line literal.
///
/// `null`, `true`, `false`, integers and floats get their scalar type;
/// anything else, or a value in double quotes, is text.
pub fn parse_scalar(s: &str) -> Scalar {
    let s = s.trim();
    if let Some(quoted) = s.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')) {
        return Scalar::from(quoted);
    }
    match s {
        "null" => Scalar::Null,
        "true" => Scalar::Bool(true),
        "false" => Scalar::Bool(false),
        _ => s
            .parse::<i64>()
            .map(Scalar::Int)
            .or_else(|_| s.parse::<f64>().map(Scalar::Float))
            .unwrap_or_else(|_| Scalar::from(s)),
    }
}

fn non_empty_column(column: &str) -> Result<String, String> {
    let column = column.trim();
    if column.is_empty() {
        return Err("Column name cannot be empty".to_string());
    }
    Ok(column.to_string())
}

/// Parses `column=value` or `column,operator,value`.
pub fn parse_where(s: &str) -> Result<WhereArg, String> {
    let parts: Vec<&str> = s.splitn(3, ',').collect();
    if let [column, operator, value] = parts.as_slice() {
        if let Ok(operator) = Operator::from_str(operator.trim()) {
            return Ok(WhereArg {
                column: non_empty_column(column)?,
                operator,
                value: parse_scalar(value),
            });
        }
    }

    let (column, value) = s.split_once('=').ok_or_else(|| {
        format!("Invalid filter '{s}'. Expected column=value or column,operator,value")
    })?;
    Ok(WhereArg {
        column: non_empty_column(column)?,
        operator: Operator::Eq,
        value: parse_scalar(value),
    })
}

/// Parses `column=a,b,c`.
pub fn parse_where_in(s: &str) -> Result<WhereInArg, String> {
    let (column, values) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid filter '{s}'. Expected column=value1,value2"))?;
    Ok(WhereInArg {
        column: non_empty_column(column)?,
        values: values.split(',').map(parse_scalar).collect(),
    })
}

/// Parses `key=value`; a value containing commas becomes a list, except
/// for `order_by` whose `column,direction` form is kept intact.
pub fn parse_param(s: &str) -> Result<ParamArg, String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid parameter '{s}'. Expected key=value"))?;
    let key = non_empty_column(key)?;
    let value = if value.contains(',') && key != crate::query::ORDER_BY_PARAM {
        Operand::List(value.split(',').map(parse_scalar).collect())
    } else {
        Operand::Scalar(parse_scalar(value))
    };
    Ok(ParamArg { key, value })
}

/// Parses `column[,asc|desc]`.
pub fn parse_order_by(s: &str) -> Result<OrderSpec, String> {
    let (column, direction) = match s.split_once(',') {
        Some((column, direction)) => (column, Direction::from_token(direction.trim())),
        None => (s, Direction::Asc),
    };
    Ok(OrderSpec::new(non_empty_column(column)?, direction))
}

/// Parses `name` or `name:arg1,arg2`.
pub fn parse_scope(s: &str) -> Result<ScopeArg, String> {
    let (name, args) = match s.split_once(':') {
        Some((name, args)) => (name, args.split(',').map(parse_scalar).collect()),
        None => (s, Vec::new()),
    };
    let name = name.trim();
    if name.is_empty() {
        return Err("Scope name cannot be empty".to_string());
    }
    Ok(ScopeArg {
        name: name.to_string(),
        args,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("42", Scalar::Int(42))]
    #[case("2.5", Scalar::Float(2.5))]
    #[case("null", Scalar::Null)]
    #[case("true", Scalar::Bool(true))]
    #[case("open", Scalar::from("open"))]
    #[case("\"42\"", Scalar::from("42"))]
    fn scalars(#[case] input: &str, #[case] expected: Scalar) {
        assert_eq!(parse_scalar(input), expected);
    }

    #[rstest]
    #[case("status=open", "status", Operator::Eq, Scalar::from("open"))]
    #[case("priority,>=,3", "priority", Operator::Ge, Scalar::Int(3))]
    #[case("title,like,%bug%", "title", Operator::Like, Scalar::from("%bug%"))]
    #[case("note=a,b", "note", Operator::Eq, Scalar::from("a,b"))]
    fn where_filters(
        #[case] input: &str,
        #[case] column: &str,
        #[case] operator: Operator,
        #[case] value: Scalar,
    ) {
        let parsed = parse_where(input).unwrap();
        assert_eq!(parsed.column, column);
        assert_eq!(parsed.operator, operator);
        assert_eq!(parsed.value, value);
    }

    #[rstest]
    #[case("status")]
    #[case("=open")]
    fn malformed_where(#[case] input: &str) {
        assert!(parse_where(input).is_err());
    }

    #[test]
    fn where_in_values() {
        let parsed = parse_where_in("id=1,2,3").unwrap();
        assert_eq!(parsed.column, "id");
        assert_eq!(parsed.values, vec![Scalar::Int(1), Scalar::Int(2), Scalar::Int(3)]);
    }

    #[test]
    fn params_keep_order_by_intact() {
        let order = parse_param("order_by=priority,desc").unwrap();
        assert_eq!(order.value, Operand::from("priority,desc"));

        let list = parse_param("team=core,web").unwrap();
        assert_eq!(list.value, Operand::from(vec!["core", "web"]));
    }

    #[test]
    fn order_and_scope() {
        assert_eq!(
            parse_order_by("priority,desc").unwrap(),
            OrderSpec::new("priority", Direction::Desc)
        );
        assert_eq!(
            parse_order_by("title").unwrap(),
            OrderSpec::new("title", Direction::Asc)
        );

        let scope = parse_scope("priority-above:2").unwrap();
        assert_eq!(scope.name, "priority-above");
        assert_eq!(scope.args, vec![Scalar::Int(2)]);
        assert!(parse_scope(":1").is_err());
    }
}
