use std::process::ExitCode;

use taskdeck::catalog::Catalog;

/// Print the catalog JSON Schema to stdout.
///
/// # Errors
///
/// Returns an error if the schema cannot be serialized.
pub fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(&Catalog::schema())?);
    Ok(ExitCode::SUCCESS)
}
