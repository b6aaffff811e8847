//! Raw Cypher command handler.

use color_eyre::Result;

use crate::context::Context;
use crate::query_runner::CypherOptions;

use super::{print_result, App, ParamArgs};

impl App {
    /// Run a Cypher query and print its rows.
    pub async fn run_cypher(&self, ctx: &Context, query: &str, params: ParamArgs) -> Result<()> {
        let options = CypherOptions::new()
            .params(params.into_call_parameters())
            .custom_error(self.custom_error());

        let result = ctx.runner.run_cypher(query, options).await?;
        tracing::debug!(rows = result.len(), "Query complete");

        print_result(result)
    }
}
