mod list;
mod mcp;
mod run;
mod schema;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use taskdeck::settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "taskdeck", about = "Script catalog and task runner")]
struct Cli {
    /// Path to settings file (auto-detected if not specified)
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Catalog file, overriding the settings
    #[arg(short, long)]
    catalog: Option<PathBuf>,

    /// Directory for task log files, overriding the settings
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Log file path (enables file logging in addition to stderr)
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the commands in the catalog
    List(list::ListArgs),
    /// Print the JSON Schema of the catalog format
    Schema,
    /// Run one command and follow its output until it ends
    Run(run::RunArgs),
    /// Start an MCP server over stdio
    Mcp(mcp::McpArgs),
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_file = cli
        .log_file
        .as_ref()
        .map(std::fs::File::create)
        .transpose()?;
    taskdeck::logger::init(log_file)?;

    // Schema needs no catalog
    if let Commands::Schema = cli.command {
        return schema::run();
    }

    let mut settings = Settings::load(cli.settings.as_deref())?;
    if let Some(catalog) = cli.catalog {
        settings.catalog = Some(catalog);
    }
    if let Some(log_dir) = cli.log_dir {
        settings.log_dir = Some(log_dir);
    }
    let registry = taskdeck::load_registry(&settings)?;

    match cli.command {
        Commands::List(ref args) => list::run(args, &registry),
        Commands::Run(ref args) => run::run(args, &registry).await,
        Commands::Mcp(ref args) => mcp::run(args, registry).await,
        Commands::Schema => schema::run(),
    }
}
