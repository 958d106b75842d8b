//! CLI argument structs for all commands.

use clap::{Args, Parser};

use super::parse::{
    ParamArg, ScopeArg, WhereArg, WhereInArg, parse_order_by, parse_param, parse_scope,
    parse_where, parse_where_in,
};
use crate::query::OrderSpec;

/// Filters shared by `query`, `count` and `delete`.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// AND filter: `column=value` or `column,operator,value`
    ///
    /// Operators: =, !=, <, <=, >, >=, like. Repeat for more filters.
    #[arg(short = 'w', long = "where", value_parser = parse_where)]
    pub wheres: Vec<WhereArg>,

    /// OR filter, same format as --where
    #[arg(long = "or-where", value_parser = parse_where)]
    pub or_wheres: Vec<WhereArg>,

    /// Membership filter: `column=value1,value2`
    #[arg(long = "where-in", value_parser = parse_where_in)]
    pub where_ins: Vec<WhereInArg>,

    /// Request parameter: `key=value`
    ///
    /// Each parameter becomes an equality filter, except `order_by`
    /// which sets sort keys.
    #[arg(short = 'P', long = "param", value_parser = parse_param)]
    pub params: Vec<ParamArg>,

    /// Named scope: `name` or `name:arg1,arg2`
    #[arg(short, long = "scope", value_parser = parse_scope)]
    pub scopes: Vec<ScopeArg>,
}

impl FilterArgs {
    /// Returns `true` if no filter of any kind was given.
    pub fn is_empty(&self) -> bool {
        self.wheres.is_empty()
            && self.or_wheres.is_empty()
            && self.where_ins.is_empty()
            && self.params.is_empty()
            && self.scopes.is_empty()
    }
}

/// Arguments for the `query` command
#[derive(Parser, Debug, Clone)]
pub struct QueryArgs {
    /// Table to query
    pub table: String,

    /// Filters to apply
    #[command(flatten)]
    pub filters: FilterArgs,

    /// Sort key: `column[,asc|desc]`. Repeat for secondary keys.
    #[arg(short, long = "order-by", value_parser = parse_order_by)]
    pub order_by: Vec<OrderSpec>,

    /// Maximum number of rows; negative means unlimited
    #[arg(short = 'n', long, allow_negative_numbers = true)]
    pub limit: Option<i64>,

    /// Relations to eager load (adds `<relation>_count` columns)
    #[arg(long = "with", value_delimiter = ',')]
    pub relations: Vec<String>,

    /// Columns to return (comma-separated, default all)
    #[arg(short, long, value_delimiter = ',')]
    pub columns: Vec<String>,

    /// Return only the first matching row
    #[arg(long, conflicts_with = "page")]
    pub first: bool,

    /// Page number to return (paginates the result)
    #[arg(long)]
    pub page: Option<usize>,

    /// Rows per page; negative returns everything as one page
    #[arg(long, allow_negative_numbers = true, requires = "page")]
    pub per_page: Option<i64>,

    /// Print the compiled query instead of running it
    #[arg(long)]
    pub explain: bool,
}

/// Arguments for the `count` command
#[derive(Parser, Debug, Clone)]
pub struct CountArgs {
    /// Table to count
    pub table: String,

    /// Filters to apply
    #[command(flatten)]
    pub filters: FilterArgs,

    /// Print the compiled query instead of running it
    #[arg(long)]
    pub explain: bool,
}

/// Arguments for the `show` command
#[derive(Parser, Debug, Clone)]
pub struct ShowArgs {
    /// Table holding the row
    pub table: String,

    /// Row id
    pub id: i64,

    /// Relations to eager load
    #[arg(long = "with", value_delimiter = ',')]
    pub relations: Vec<String>,

    /// Columns to return (comma-separated, default all)
    #[arg(short, long, value_delimiter = ',')]
    pub columns: Vec<String>,
}

/// Arguments for the `delete` command
#[derive(Parser, Debug, Clone)]
pub struct DeleteArgs {
    /// Table to delete from
    pub table: String,

    /// Filters to apply
    #[command(flatten)]
    pub filters: FilterArgs,

    /// Print the compiled query instead of running it
    #[arg(long)]
    pub explain: bool,
}

/// Arguments for the `tables` command
#[derive(Parser, Debug, Clone)]
pub struct TablesArgs {
    /// Also list each table's scopes
    #[arg(long)]
    pub scopes: bool,
}
