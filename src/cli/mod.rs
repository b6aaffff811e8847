//! CLI module for gds-client.
//!
//! Subcommands:
//! - `cypher`: Run a raw Cypher query
//! - `call`: Call a procedure
//! - `function`: Call a function
//! - `construct`: Build a named graph from JSON record files
//! - `version`: Show the server plugin version

mod call;
mod construct;
mod cypher;
mod version;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use color_eyre::Result;
use serde_json::Value as JsonValue;

use crate::call_parameters::CallParameters;
use crate::config::Config;
use crate::context::Context;
use crate::error::AppError;
use crate::tabular::TabularResult;

/// gds-client - Graph Data Science query runner
#[derive(Parser)]
#[command(name = "gds-client")]
#[command(about = "Call Graph Data Science procedures, functions and Cypher from the command line")]
#[command(version)]
pub struct App {
    /// Run in verbose mode
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Target database (defaults to the configured one, then the server default)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Show raw server errors instead of classified ones
    #[arg(long, global = true)]
    pub raw_errors: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a raw Cypher query
    Cypher {
        /// The query text
        query: String,

        #[command(flatten)]
        params: ParamArgs,
    },

    /// Call a procedure, e.g. `gds.graph.list`
    Call {
        /// Dotted procedure name
        endpoint: String,

        #[command(flatten)]
        params: ParamArgs,

        /// Field to yield (repeatable; all fields when omitted)
        #[arg(short, long = "yield", value_name = "FIELD")]
        yields: Vec<String>,

        /// Log progress while the procedure runs
        #[arg(long)]
        log: bool,
    },

    /// Call a function, e.g. `gds.version`
    Function {
        /// Dotted function name
        endpoint: String,

        #[command(flatten)]
        params: ParamArgs,

        /// Field to yield (repeatable)
        #[arg(short, long = "yield", value_name = "FIELD")]
        yields: Vec<String>,
    },

    /// Build a named graph from node and relationship record files
    Construct {
        /// Name of the graph to create
        graph_name: String,

        /// JSON array of node records with a `nodeId` field (repeatable)
        #[arg(long, value_name = "FILE")]
        nodes: Vec<PathBuf>,

        /// JSON array of relationship records with `sourceNodeId` and `targetNodeId` (repeatable)
        #[arg(long, value_name = "FILE")]
        relationships: Vec<PathBuf>,

        /// Read concurrency (defaults to `runner.default_concurrency`)
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Relationship type to treat as undirected (repeatable)
        #[arg(long, value_name = "TYPE")]
        undirected: Vec<String>,
    },

    /// Show the server plugin version
    Version,
}

/// Positional parameters shared by the query commands.
#[derive(Args, Debug, Clone, Default)]
pub struct ParamArgs {
    /// Parameter as NAME=VALUE; VALUE is parsed as JSON, else taken as a string.
    /// Order is kept: it is the argument order of the call.
    #[arg(short, long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, JsonValue)>,
}

impl ParamArgs {
    pub fn into_call_parameters(self) -> CallParameters {
        self.params.into_iter().collect()
    }
}

/// Parses `NAME=VALUE`.
fn parse_param(raw: &str) -> Result<(String, JsonValue), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{}`", raw))?;
    if name.is_empty() {
        return Err(format!("missing parameter name in `{}`", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| JsonValue::String(value.into()));
    Ok((name.to_string(), value))
}

impl App {
    /// Run the CLI application.
    pub async fn run(self) -> Result<()> {
        let config = Config::load()?;
        let ctx = Context::connect(config).await?;
        if let Some(database) = &self.database {
            ctx.runner.set_database(Some(database.clone()));
        }

        let outcome = match &self.command {
            Command::Cypher { query, params } => {
                self.run_cypher(&ctx, query, params.clone()).await
            }
            Command::Call {
                endpoint,
                params,
                yields,
                log,
            } => {
                self.run_call(&ctx, endpoint, params.clone(), yields, *log)
                    .await
            }
            Command::Function {
                endpoint,
                params,
                yields,
            } => {
                self.run_function(&ctx, endpoint, params.clone(), yields)
                    .await
            }
            Command::Construct {
                graph_name,
                nodes,
                relationships,
                concurrency,
                undirected,
            } => {
                self.run_construct(&ctx, graph_name, nodes, relationships, *concurrency, undirected)
                    .await
            }
            Command::Version => self.run_version(&ctx).await,
        };

        settle(outcome, ctx.runner.close().await)
    }

    /// Whether remote errors should be reclassified.
    fn custom_error(&self) -> bool {
        !self.raw_errors
    }
}

/// Combines a command's outcome with closing the runner.
///
/// A command error wins; a close failure behind it is only logged.
fn settle(outcome: Result<()>, closed: Result<(), AppError>) -> Result<()> {
    match (outcome, closed) {
        (Ok(()), closed) => closed.map_err(Into::into),
        (Err(e), Err(close_err)) => {
            tracing::warn!(error = %close_err, "Failed to close query runner");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
    }
}

/// Prints a result as a JSON array of records.
fn print_result(result: TabularResult) -> Result<()> {
    let records = result.into_records();
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_param_json() {
        assert_eq!(
            parse_param("config={\"concurrency\":4}").unwrap(),
            ("config".to_string(), json!({"concurrency": 4}))
        );
        assert_eq!(parse_param("n=10").unwrap().1, json!(10));
    }

    #[test]
    fn test_parse_param_string_fallback() {
        assert_eq!(
            parse_param("graph_name=my-graph").unwrap(),
            ("graph_name".to_string(), json!("my-graph"))
        );
        assert_eq!(parse_param("empty=").unwrap().1, json!(""));
    }

    #[test]
    fn test_settle_keeps_command_error() {
        let err = settle(Err(color_eyre::eyre::eyre!("query failed")), Err(AppError::Closed))
            .unwrap_err();
        assert_eq!(err.to_string(), "query failed");

        let err = settle(Ok(()), Err(AppError::Closed)).unwrap_err();
        assert!(err.to_string().contains("closed"));

        assert!(settle(Ok(()), Ok(())).is_ok());
    }

    #[test]
    fn test_parse_param_invalid() {
        assert!(parse_param("no-equals").is_err());
        assert!(parse_param("=1").is_err());
    }

    #[test]
    fn test_cli_parses_call() {
        let app = App::try_parse_from([
            "gds-client",
            "call",
            "gds.graph.drop",
            "-p",
            "graph_name=g",
            "-p",
            "fail_if_missing=false",
            "--yield",
            "graphName",
            "--log",
            "--database",
            "movies",
        ])
        .unwrap();

        assert_eq!(app.database.as_deref(), Some("movies"));
        match app.command {
            Command::Call {
                endpoint,
                params,
                yields,
                log,
            } => {
                assert_eq!(endpoint, "gds.graph.drop");
                let params = params.into_call_parameters();
                assert_eq!(params.placeholder_str(), "$graph_name, $fail_if_missing");
                assert_eq!(params.get("fail_if_missing"), Some(&json!(false)));
                assert_eq!(yields, vec!["graphName".to_string()]);
                assert!(log);
            }
            _ => panic!("expected call command"),
        }
    }

    #[test]
    fn test_cli_parses_construct() {
        let app = App::try_parse_from([
            "gds-client",
            "construct",
            "g",
            "--nodes",
            "a.json",
            "--nodes",
            "b.json",
            "--relationships",
            "r.json",
            "--undirected",
            "KNOWS",
        ])
        .unwrap();

        match app.command {
            Command::Construct {
                graph_name,
                nodes,
                relationships,
                concurrency,
                undirected,
            } => {
                assert_eq!(graph_name, "g");
                assert_eq!(nodes.len(), 2);
                assert_eq!(relationships, vec![PathBuf::from("r.json")]);
                assert_eq!(concurrency, None);
                assert_eq!(undirected, vec!["KNOWS".to_string()]);
            }
            _ => panic!("expected construct command"),
        }
    }
}
