use anyhow::Context;
use clap::Args;
use serde_json::{Map, Value};

use crate::cli::utils::{output_record, read_input};
use crate::cli::OutputFormat;
use crate::database::query_builder::{BuildError, QueryBuilder, QuerySpec, QueryType};
use crate::database::statement::PreparedStatement;

#[derive(Args)]
pub struct SqlArgs {
    #[arg(help = "Query spec JSON file, or - for stdin")]
    pub file: String,

    #[arg(long = "join", value_name = "TABLE:ON", help = "Inner join applied to select queries, repeatable")]
    pub joins: Vec<String>,

    #[arg(long, help = "Render search specs with = instead of LIKE")]
    pub exact: bool,
}

pub fn handle(args: SqlArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let source = read_input(&args.file)?;
    let spec: QuerySpec = serde_json::from_str(&source).context("query spec is not valid JSON")?;
    let joins = args
        .joins
        .iter()
        .map(|join| parse_join(join))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let sql = render(spec, &joins, args.exact)?;
    let statement = PreparedStatement::parse(&sql)?;

    let mut record = Map::new();
    record.insert("sql".to_string(), Value::String(sql.clone()));
    record.insert("positional".to_string(), Value::String(statement.sql().to_string()));
    record.insert(
        "parameters".to_string(),
        Value::Array(
            statement
                .parameter_names()
                .into_iter()
                .map(|name| Value::String(name.to_string()))
                .collect(),
        ),
    );
    output_record(&output_format, &record)
}

/// `table:on condition`, split at the first colon
fn parse_join(join: &str) -> anyhow::Result<(String, String)> {
    match join.split_once(':') {
        Some((table, on)) if !table.trim().is_empty() && !on.trim().is_empty() => {
            Ok((table.trim().to_string(), on.trim().to_string()))
        }
        _ => anyhow::bail!("join '{}' must look like TABLE:ON", join),
    }
}

/// Build `spec` through the terminal method its type selects
pub fn render(spec: QuerySpec, joins: &[(String, String)], exact: bool) -> Result<String, BuildError> {
    let kind = spec.kind;
    let mut builder = QueryBuilder::new();
    builder.build_query(spec);
    for (table, on) in joins {
        builder.inner_join(table, on);
    }

    match kind {
        Some(QueryType::Insert) => builder.insert_query(),
        Some(QueryType::Select) | Some(QueryType::Join) => builder.select_query(),
        Some(QueryType::Update) => builder.update_query(),
        Some(QueryType::Delete) => builder.delete_query(),
        Some(QueryType::Search) if exact => builder.search_query_exact(),
        Some(QueryType::Search) => builder.search_query(),
        Some(QueryType::Raw) => builder.raw_query(),
        None => Err(BuildError::MissingType),
    }
}
