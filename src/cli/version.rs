//! Server version command handler.

use color_eyre::Result;

use crate::context::Context;
use crate::query_runner::detect_server_version;

use super::App;

impl App {
    /// Print the Graph Data Science plugin version of the connected server.
    pub async fn run_version(&self, ctx: &Context) -> Result<()> {
        let version = detect_server_version(ctx.runner.as_ref()).await?;
        println!("{}", version);
        Ok(())
    }
}
