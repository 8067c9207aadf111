//! `metrisql`: parse a metrics DSL file against a `model.toml` schema,
//! then check, explain, or run the query it declares.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use metrisql::config;
use metrisql::dsl::{self, ast::Item};
use metrisql::executor::{self, Row, Table, Tables};
use metrisql::explain::{self, sql, ExplainOptions};
use metrisql::model::SemanticModel;
use metrisql::planner::{self, PlanBuilderOptions, QuerySpec};
use metrisql::value::Value;

#[derive(Parser)]
#[command(name = "metrisql", about = "A semantic metrics engine CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a DSL file, build its first query's logical plan, and report diagnostics.
    Check { model: PathBuf, query: PathBuf },
    /// Print the EXPLAIN tree (or SQL rendering) of a DSL file's first query.
    Explain {
        model: PathBuf,
        query: PathBuf,
        #[arg(long)]
        verbose: bool,
        #[arg(long)]
        sql: bool,
    },
    /// Execute a DSL file's first query against JSON-encoded tables.
    Run { model: PathBuf, query: PathBuf, data: PathBuf },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<(), String> {
    match command {
        Command::Check { model, query } => {
            let (semantic_model, query_spec) = load_model_and_query(&model, &query)?;
            let plan = planner::build_logical_plan(&query_spec, &semantic_model, PlanBuilderOptions::default())
                .map_err(|e| e.to_string())?;
            for diagnostic in &plan.diagnostics {
                eprintln!("warning: {diagnostic}");
            }
            println!("plan ok: root={} nodes={}", plan.root_node_id, plan.nodes.len());
            Ok(())
        }
        Command::Explain {
            model,
            query,
            verbose,
            sql: want_sql,
        } => {
            let (semantic_model, query_spec) = load_model_and_query(&model, &query)?;
            let plan = planner::build_logical_plan(&query_spec, &semantic_model, PlanBuilderOptions::default())
                .map_err(|e| e.to_string())?;
            if want_sql {
                println!("{}", sql::plan_to_sql(&plan));
            } else {
                let options = ExplainOptions {
                    verbose,
                    show_expressions: verbose,
                };
                print!("{}", explain::explain_plan(&plan, options));
            }
            Ok(())
        }
        Command::Run { model, query, data } => {
            let (semantic_model, query_spec) = load_model_and_query(&model, &query)?;
            let plan = planner::build_logical_plan(&query_spec, &semantic_model, PlanBuilderOptions::default())
                .map_err(|e| e.to_string())?;
            let tables = load_tables(&data)?;
            let result = executor::run_query(&plan, &semantic_model, &tables);
            print_table(&result.columns, &result.rows);
            Ok(())
        }
    }
}

fn load_model_and_query(model_path: &PathBuf, query_path: &PathBuf) -> Result<(SemanticModel, QuerySpec), String> {
    let config = config::load_model_config(model_path).map_err(|e| e.to_string())?;
    let mut builder = config::builder_from_config(&config);

    let source = std::fs::read_to_string(query_path).map_err(|e| format!("reading {query_path:?}: {e}"))?;
    let parsed = dsl::parse(&source);
    if !parsed.is_ok() {
        return Err(dsl::render_errors(&source, &parsed.errors));
    }

    let mut query_decl = None;
    for item in &parsed.program.items {
        match &item.value {
            Item::Metric(decl) => {
                builder = builder.metric(
                    decl.name.value.clone(),
                    Some(decl.base_fact.value.clone()),
                    decl.expr.value.clone(),
                );
            }
            Item::Query(decl) => {
                if query_decl.is_none() {
                    query_decl = Some(decl.clone());
                }
            }
        }
    }

    let semantic_model = builder.build().map_err(|errors| format!("{errors:?}"))?;
    let query_decl = query_decl.ok_or_else(|| "no `query { ... }` declaration found".to_string())?;

    let query_spec = QuerySpec {
        dimensions: query_decl.dimensions.iter().map(|s| s.value.clone()).collect(),
        metrics: query_decl.metrics.iter().map(|s| s.value.clone()).collect(),
        where_clause: query_decl.where_clause.map(|s| s.value),
        having: query_decl.having.map(|s| s.value),
    };

    Ok((semantic_model, query_spec))
}

fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::Str(s.clone()),
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Null => Value::Null,
        other => Value::Str(other.to_string()),
    }
}

fn load_tables(path: &PathBuf) -> Result<Tables, String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("reading {path:?}: {e}"))?;
    let raw: HashMap<String, Vec<HashMap<String, serde_json::Value>>> =
        serde_json::from_str(&text).map_err(|e| format!("parsing {path:?}: {e}"))?;

    let mut tables = HashMap::new();
    for (table_name, rows) in raw {
        let rows = rows
            .into_iter()
            .map(|row| Row(row.into_iter().map(|(k, v)| (k, json_to_value(&v))).collect()))
            .collect();
        tables.insert(table_name, Table { rows });
    }
    Ok(Tables(tables))
}

fn print_table(columns: &[String], rows: &[Row]) {
    println!("{}", columns.join("\t"));
    for row in rows {
        let cells: Vec<String> = columns.iter().map(|c| row.get(c).to_string()).collect();
        println!("{}", cells.join("\t"));
    }
}
