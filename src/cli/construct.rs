//! Graph construction command handler.

use std::path::{Path, PathBuf};

use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::context::Context;
use crate::tabular::TabularResult;

use super::{print_result, App};

/// Reads a JSON array of records into a frame.
fn read_frame(path: &Path) -> Result<TabularResult> {
    let raw = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
    let records: Vec<IndexMap<String, JsonValue>> = serde_json::from_str(&raw)
        .wrap_err_with(|| format!("{} is not a JSON array of records", path.display()))?;
    Ok(TabularResult::from_records(records))
}

impl App {
    /// Build a named graph from node and relationship files.
    pub async fn run_construct(
        &self,
        ctx: &Context,
        graph_name: &str,
        nodes: &[PathBuf],
        relationships: &[PathBuf],
        concurrency: Option<usize>,
        undirected: &[String],
    ) -> Result<()> {
        if nodes.is_empty() {
            return Err(eyre!("At least one --nodes file is required"));
        }

        let node_frames = nodes
            .iter()
            .map(|p| read_frame(p))
            .collect::<Result<Vec<_>>>()?;
        let relationship_frames = relationships
            .iter()
            .map(|p| read_frame(p))
            .collect::<Result<Vec<_>>>()?;

        let concurrency = concurrency.unwrap_or(ctx.config.runner.default_concurrency);
        let undirected = (!undirected.is_empty()).then(|| undirected.to_vec());

        tracing::info!(graph_name, concurrency, "Constructing graph");
        let summary = ctx
            .runner
            .create_graph_constructor(graph_name, concurrency, undirected)
            .run(node_frames, relationship_frames)
            .await?;

        print_result(summary)
    }
}
