use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;

use taskdeck::registry::TaskRegistry;

#[derive(Args, Debug)]
pub struct McpArgs {
    /// Reload the catalog whenever its file changes
    #[arg(long)]
    watch: bool,
}

/// Start the MCP server over stdio.
///
/// # Errors
///
/// Returns an error if the watcher cannot start or the MCP transport fails.
pub async fn run(
    args: &McpArgs,
    registry: TaskRegistry,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let registry = Arc::new(registry);
    // Kept alive for the lifetime of the server
    let _watcher = if args.watch {
        Some(taskdeck::watch::watch_catalog(Arc::clone(&registry))?)
    } else {
        None
    };
    taskdeck::mcp::run(registry).await?;
    Ok(ExitCode::SUCCESS)
}
