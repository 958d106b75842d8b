//! Command execution logic.

use anyhow::Result;

use super::args::{CountArgs, DeleteArgs, FilterArgs, QueryArgs, ShowArgs, TablesArgs};
use crate::app::App;
use crate::domain::{Columns, RowId};
use crate::error::Operation;
use crate::output::{self, OutputMode};
use crate::query::{CompileMode, Conditions, Direction, RequestParams, RowLimit};
use crate::repository::Repository;

/// Applies shared filter arguments to a repository.
///
/// Request parameters go through the same path a web request would:
/// `order_by` becomes sort keys, everything else an equality filter.
pub fn apply_filters(repo: &mut Repository, filters: &FilterArgs) -> Result<()> {
    for filter in &filters.wheres {
        repo.add_where_op(filter.column.clone(), filter.value.clone(), filter.operator);
    }
    for filter in &filters.or_wheres {
        repo.add_or_where(filter.column.clone(), filter.value.clone(), filter.operator);
    }
    for filter in &filters.where_ins {
        repo.add_where_in(filter.column.clone(), filter.values.clone());
    }
    if !filters.params.is_empty() {
        let params: RequestParams = filters
            .params
            .iter()
            .map(|p| (p.key.clone(), p.value.clone()))
            .collect();
        repo.set_filters_from_request(Conditions::none(), params);
    }
    for scope in &filters.scopes {
        repo.apply_scope(&scope.name, scope.args.clone())?;
    }
    Ok(())
}

fn columns(names: &[String]) -> Columns {
    Columns::from_names(names)
}

/// Execute the query command
pub async fn execute_query(app: &App, args: &QueryArgs, output_mode: OutputMode) -> Result<()> {
    let mut repo = app.repository(&args.table).await?;
    apply_filters(&mut repo, &args.filters)?;
    for order in &args.order_by {
        repo.add_order_by(order.column.clone(), order.direction == Direction::Asc);
    }
    if let Some(limit) = args.limit {
        repo.set_limit(limit);
    }
    if !args.relations.is_empty() {
        repo.with_relations(args.relations.clone());
    }

    if args.explain {
        let operation = if args.first {
            Operation::FetchOne
        } else if args.page.is_some() {
            Operation::FetchPage
        } else {
            Operation::FetchFiltered
        };
        // A negative page size returns every row, like an unlimited limit.
        let mode = if args.page.is_some() && args.per_page.is_some_and(|n| n < 0) {
            CompileMode::EagerOnly
        } else {
            repo.mode_for(operation)
        };
        output::print_explain(&repo.compile(mode), output_mode)?;
        return Ok(());
    }

    let columns = columns(&args.columns);
    if args.first {
        let row = repo.fetch_one(columns).await?;
        output::print_row(&row, output_mode)?;
    } else if let Some(page) = args.page {
        let per_page = args.per_page.map_or(RowLimit::Rows(0), RowLimit::from);
        let page = repo.fetch_page(per_page, columns, "", Some(page)).await?;
        output::print_page(&page, output_mode)?;
    } else {
        let rows = repo.fetch_filtered(columns).await?;
        output::print_rows(&rows, output_mode)?;
    }
    Ok(())
}

/// Execute the count command
pub async fn execute_count(app: &App, args: &CountArgs, output_mode: OutputMode) -> Result<()> {
    let mut repo = app.repository(&args.table).await?;
    apply_filters(&mut repo, &args.filters)?;

    if args.explain {
        output::print_explain(&repo.compile(repo.mode_for(Operation::Count)), output_mode)?;
        return Ok(());
    }

    let count = repo.count().await?;
    output::print_count(count, output_mode)?;
    Ok(())
}

/// Execute the show command
pub async fn execute_show(app: &App, args: &ShowArgs, output_mode: OutputMode) -> Result<()> {
    let mut repo = app.repository(&args.table).await?;
    if !args.relations.is_empty() {
        repo.with_relations(args.relations.clone());
    }
    let row = repo.fetch_by_id(RowId(args.id), columns(&args.columns)).await?;
    output::print_row(&row, output_mode)?;
    Ok(())
}

/// Execute the delete command
pub async fn execute_delete(app: &App, args: &DeleteArgs, output_mode: OutputMode) -> Result<()> {
    if args.filters.is_empty() {
        anyhow::bail!(
            "Refusing to delete every row of '{}': give at least one filter or scope",
            args.table
        );
    }

    let mut repo = app.repository(&args.table).await?;
    apply_filters(&mut repo, &args.filters)?;

    if args.explain {
        output::print_explain(&repo.compile(repo.mode_for(Operation::Delete)), output_mode)?;
        return Ok(());
    }

    let deleted = repo.delete().await?;
    app.save().await?;

    match output_mode {
        OutputMode::Json => output::print_json(&serde_json::json!({
            "table": args.table,
            "deleted": deleted,
        }))?,
        OutputMode::Text => {
            let config = output::OutputConfig::from_env();
            let noun = if deleted == 1 { "row" } else { "rows" };
            println!(
                "{}",
                output::success(
                    &format!("Deleted {deleted} {noun} from {}", args.table),
                    &config
                )
            );
        }
    }
    Ok(())
}

/// Execute the tables command
pub async fn execute_tables(app: &App, args: &TablesArgs, output_mode: OutputMode) -> Result<()> {
    let storage = app.storage();
    let mut listing = Vec::new();
    for table in storage.tables().await? {
        let rows = storage.export(&table).await?.len();
        let scopes = if args.scopes {
            storage.scope_names(&table).await?
        } else {
            Vec::new()
        };
        listing.push((table, rows, scopes));
    }

    match output_mode {
        OutputMode::Json => {
            let json: Vec<_> = listing
                .iter()
                .map(|(table, rows, scopes)| {
                    serde_json::json!({ "table": table, "rows": rows, "scopes": scopes })
                })
                .collect();
            output::print_json(&json)?;
        }
        OutputMode::Text => {
            for (table, rows, scopes) in &listing {
                if scopes.is_empty() {
                    println!("{table} ({rows})");
                } else {
                    println!("{table} ({rows})  scopes: {}", scopes.join(", "));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::parse::{parse_param, parse_scope, parse_where, parse_where_in};
    use crate::query::StepKind;
    use crate::storage::MockStorage;
    use std::sync::Arc;

    #[tokio::test]
    async fn filters_compile_in_builder_order() {
        let mock = MockStorage::with_scopes(&["open"]);
        let mut repo = Repository::open(Arc::new(mock), "Ticket", "tickets")
            .await
            .unwrap();
        let filters = FilterArgs {
            wheres: vec![parse_where("priority,>,2").unwrap()],
            or_wheres: vec![parse_where("owner=null").unwrap()],
            where_ins: vec![parse_where_in("team=core,web").unwrap()],
            params: vec![
                parse_param("order_by=id,desc").unwrap(),
                parse_param("status=open").unwrap(),
            ],
            scopes: vec![parse_scope("open").unwrap()],
        };

        apply_filters(&mut repo, &filters).unwrap();

        assert_eq!(
            repo.compile(CompileMode::Select).kinds(),
            vec![
                StepKind::Where,
                StepKind::Where,
                StepKind::OrWhere,
                StepKind::WhereIn,
                StepKind::OrderBy,
                StepKind::Scope,
            ]
        );
    }

    #[tokio::test]
    async fn unknown_scope_is_an_error() {
        let mut repo = Repository::open(Arc::new(MockStorage::new()), "Ticket", "tickets")
            .await
            .unwrap();
        let filters = FilterArgs {
            scopes: vec![parse_scope("archived").unwrap()],
            ..FilterArgs::default()
        };
        let err = apply_filters(&mut repo, &filters).unwrap_err();
        assert!(err.to_string().contains("archived"));
    }
}
