use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;

use clap::Args;
use log::warn;

use taskdeck::commands::command::Command;
use taskdeck::commands::ids::NodeId;
use taskdeck::commands::parameter::{ExecuteParams, ParamValue, Parameter};
use taskdeck::registry::TaskRegistry;
use taskdeck::task::TaskStatus;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Command id, as shown by `taskdeck list`
    id: NodeId,

    /// Parameter value as `name=value`; repeat for each parameter. Switches
    /// take `true`/`false`, multiple selects a comma-separated list.
    #[arg(short, long = "param", value_name = "NAME=VALUE", allow_hyphen_values = true)]
    param: Vec<String>,
}

/// Turn `name=value` strings into typed values using the command's
/// parameter definitions. Declared switches that are not given default to
/// off, so they need not be spelled out.
fn parse_params(command: &Command, raw: &[String]) -> Result<ExecuteParams, String> {
    let mut params = ExecuteParams::new();
    for entry in raw {
        let (name, value) = entry
            .split_once('=')
            .ok_or_else(|| format!("Expected NAME=VALUE, got '{entry}'"))?;
        let value = match command.parameter(name) {
            Some(Parameter::Switch(_)) => ParamValue::Switch(
                value
                    .parse()
                    .map_err(|_| format!("Expected true or false for '{name}', got '{value}'"))?,
            ),
            Some(Parameter::Select(p)) if p.multiple => {
                ParamValue::List(value.split(',').map(str::to_string).collect())
            }
            _ => ParamValue::Text(value.to_string()),
        };
        params.insert(name.to_string(), value);
    }
    for param in &command.parameters {
        if let Parameter::Switch(p) = param {
            params
                .entry(p.name.clone())
                .or_insert(ParamValue::Switch(p.default));
        }
    }
    Ok(params)
}

/// Start a command and stream its log to stdout until the task ends. Ctrl-C
/// stops the task.
///
/// # Errors
///
/// Returns an error if the command cannot be started or its log read.
pub async fn run(
    args: &RunArgs,
    registry: &TaskRegistry,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let command = registry
        .catalog()
        .find_command(args.id)
        .ok_or_else(|| format!("Command not found: {}", args.id))?;
    let params = parse_params(&command, &args.param)?;
    let task_id = registry.execute(args.id, &params)?;
    eprintln!("Started task {task_id}");

    let mut offset = 0;
    let mut stdout = std::io::stdout();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        // Read the status before the log so output written just before exit is not lost
        let status = registry.status(task_id)?;
        let chunk = registry.log(task_id, offset, None)?;
        offset += chunk.len() as u64;
        stdout.write_all(&chunk)?;
        stdout.flush()?;
        if status.is_terminal() {
            break;
        }
        tokio::select! {
            () = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = &mut ctrl_c => {
                warn!("Interrupted, stopping task {task_id}");
                if let Err(e) = registry.stop(task_id, false) {
                    warn!("Unable to stop task {task_id}: {e}");
                }
            }
        }
    }

    let summary = registry.task(task_id)?;
    eprintln!("Task {task_id} {}", summary.status);
    Ok(match (summary.status, summary.exit_code) {
        (TaskStatus::Finish, Some(0)) => ExitCode::SUCCESS,
        (TaskStatus::Finish, Some(code)) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        _ => ExitCode::FAILURE,
    })
}
