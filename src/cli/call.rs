//! Procedure and function call command handlers.

use color_eyre::Result;

use crate::context::Context;
use crate::query_runner::{detect_server_version, CallOptions};

use super::{print_result, App, ParamArgs};

impl App {
    fn call_options(&self, params: ParamArgs, yields: &[String]) -> CallOptions {
        let mut options = CallOptions::new()
            .params(params.into_call_parameters())
            .custom_error(self.custom_error());
        if !yields.is_empty() {
            options = options.yields(yields.iter().cloned());
        }
        options
    }

    /// Call a procedure and print its rows.
    pub async fn run_call(
        &self,
        ctx: &Context,
        endpoint: &str,
        params: ParamArgs,
        yields: &[String],
        log: bool,
    ) -> Result<()> {
        let options = self.call_options(params, yields).logging(log);

        // The progress endpoint depends on the plugin version.
        if log {
            if let Err(e) = detect_server_version(ctx.runner.as_ref()).await {
                tracing::warn!(error = %e, "Could not detect server version; assuming a current one");
            }
        }

        tracing::info!(endpoint, "Calling procedure");
        let result = ctx.runner.call_procedure(endpoint, options).await?;

        if let Some(bookmarks) = ctx.runner.last_bookmarks() {
            tracing::debug!(?bookmarks, "Call produced bookmarks");
        }
        print_result(result)
    }

    /// Call a function and print its value.
    pub async fn run_function(
        &self,
        ctx: &Context,
        endpoint: &str,
        params: ParamArgs,
        yields: &[String],
    ) -> Result<()> {
        let options = self.call_options(params, yields);

        tracing::info!(endpoint, "Calling function");
        let result = ctx.runner.call_function(endpoint, options).await?;

        print_result(result)
    }
}
