use std::process::ExitCode;

use clap::Args;

use taskdeck::commands::parameter::Parameter;
use taskdeck::registry::TaskRegistry;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Print the catalog as JSON, with ids assigned and paths resolved
    #[arg(long)]
    json: bool,
}

fn describe(param: &Parameter) -> String {
    let kind = match param {
        Parameter::Input(_) => "input",
        Parameter::Select(p) if p.multiple => "select, multiple",
        Parameter::Select(_) => "select",
        Parameter::Switch(_) => "switch",
    };
    let required = if param.required() { ", required" } else { "" };
    format!("{} ({kind}{required}): {}", param.name(), param.label())
}

/// Print the catalog's commands, one per line, with their parameters.
///
/// # Errors
///
/// Returns an error if JSON output cannot be serialized.
pub fn run(
    args: &ListArgs,
    registry: &TaskRegistry,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let catalog = registry.catalog();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&*catalog)?);
        return Ok(ExitCode::SUCCESS);
    }

    for (group, cmd) in catalog.commands() {
        let group = if group.is_empty() {
            String::new()
        } else {
            format!("{group} > ")
        };
        println!("{:>4}  {group}{} [{}]", cmd.id, cmd.name, cmd.kind);
        for param in &cmd.parameters {
            println!("        {}", describe(param));
        }
    }
    Ok(ExitCode::SUCCESS)
}
