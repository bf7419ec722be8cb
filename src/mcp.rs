use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};
use rmcp::{ServerHandler, ServiceExt, tool, tool_handler, tool_router, transport::stdio};
use serde::Serialize;

use crate::catalog::Catalog;
use crate::commands::command::ScriptKind;
use crate::commands::ids::NodeId;
use crate::commands::parameter::{ExecuteParams, Parameter};
use crate::registry::{RegistryError, TaskRegistry};
use crate::task::{TaskError, TaskId, TaskStatus};

// ---------------------------------------------------------------------------
// Parameter structs
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct ListCommandsParams {
    /// Filter by group path or command name/label (case-insensitive substring
    /// match).
    #[schemars(default)]
    filter: Option<String>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct ExecuteCommandParams {
    /// Numeric id of the command, as returned by `list_commands`.
    command_id: NodeId,
    /// Value per declared parameter name: a string for `input` and single
    /// `select` parameters, a list of strings for multiple `select`
    /// parameters, and a boolean for `switch` parameters. Every declared
    /// parameter must be present.
    #[schemars(default)]
    params: Option<ExecuteParams>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct TaskParams {
    /// Task id returned by `execute_command`.
    task_id: TaskId,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct TaskLogParams {
    /// Task id returned by `execute_command`.
    task_id: TaskId,
    /// Byte offset to start reading from. Pass the previous `next_offset` to
    /// follow a running task.
    #[schemars(default)]
    offset: Option<u64>,
    /// Maximum number of bytes to return.
    #[schemars(default)]
    max_bytes: Option<u64>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct StopTaskParams {
    /// Task id returned by `execute_command`.
    task_id: TaskId,
    /// Kill immediately instead of asking the process to exit first.
    #[schemars(default)]
    force: Option<bool>,
}

// ---------------------------------------------------------------------------
// Response structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct CommandInfo<'a> {
    id: NodeId,
    name: &'a str,
    label: &'a str,
    description: &'a str,
    group: String,
    kind: ScriptKind,
    path: String,
    parameters: &'a [Parameter],
}

#[derive(Serialize)]
struct ExecuteResult {
    task_id: TaskId,
    status: TaskStatus,
}

#[derive(Serialize)]
struct StatusResult {
    task_id: TaskId,
    status: TaskStatus,
}

#[derive(Serialize)]
struct DeleteResult {
    task_id: TaskId,
    deleted: bool,
}

#[derive(Serialize)]
struct LogResult {
    task_id: TaskId,
    offset: u64,
    next_offset: u64,
    content: String,
}

#[derive(Serialize)]
struct ReloadResult {
    source: String,
    commands: usize,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TaskdeckMcp {
    registry: Arc<TaskRegistry>,
    tool_router: ToolRouter<Self>,
}

/// Convert any `Display` error into an MCP internal error.
fn mcp_err(e: impl std::fmt::Display) -> rmcp::ErrorData {
    rmcp::ErrorData::internal_error(e.to_string(), None)
}

/// Caller mistakes become `invalid_params`; I/O and catalog failures are
/// internal errors.
fn registry_err(e: RegistryError) -> rmcp::ErrorData {
    match e {
        RegistryError::CommandNotFound(_)
        | RegistryError::TaskNotFound(_)
        | RegistryError::UnsupportedKind(_)
        | RegistryError::Validation(_)
        | RegistryError::StillRunning(_)
        | RegistryError::NotRunning { .. }
        | RegistryError::Task(
            TaskError::IllegalTransition { .. }
            | TaskError::ScriptNotFound(_)
            | TaskError::LogFileExists(_)
            | TaskError::EmptyCommandLine,
        ) => rmcp::ErrorData::invalid_params(e.to_string(), None),
        RegistryError::Catalog(_)
        | RegistryError::LogDir { .. }
        | RegistryError::Task(TaskError::LogFile { .. } | TaskError::Spawn { .. }) => mcp_err(e),
    }
}

fn json_result(value: &impl Serialize) -> Result<CallToolResult, rmcp::ErrorData> {
    let json = serde_json::to_string_pretty(value).map_err(mcp_err)?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

fn command_listing(catalog: &Catalog, filter: Option<&str>) -> Result<String, rmcp::ErrorData> {
    let filter = filter.map(str::to_lowercase);
    let commands = catalog.commands();
    let infos: Vec<CommandInfo> = commands
        .iter()
        .filter(|(group, cmd)| match filter {
            Some(ref f) => [group.as_str(), cmd.name.as_str(), cmd.label.as_str()]
                .iter()
                .any(|field| field.to_lowercase().contains(f)),
            None => true,
        })
        .map(|(group, cmd)| CommandInfo {
            id: cmd.id,
            name: &cmd.name,
            label: &cmd.label,
            description: &cmd.description,
            group: group.clone(),
            kind: cmd.kind,
            path: cmd.path.display().to_string(),
            parameters: &cmd.parameters,
        })
        .collect();
    serde_json::to_string_pretty(&infos).map_err(mcp_err)
}

#[tool_router]
impl TaskdeckMcp {
    fn new(registry: Arc<TaskRegistry>) -> Self {
        Self {
            registry,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "List the scripts available in the catalog. Each result includes the \
        command's numeric id, name, label, description, enclosing group path, script type, \
        resolved script path and its parameter definitions (input, select or switch). Call \
        this first to find the id and parameters to pass to execute_command."
    )]
    async fn list_commands(
        &self,
        Parameters(params): Parameters<ListCommandsParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let catalog = self.registry.catalog();
        let json = command_listing(&catalog, params.filter.as_deref())?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(
        description = "Return the JSON Schema of the catalog source format, describing every \
        node type and parameter type a catalog may contain."
    )]
    async fn command_schema(&self) -> Result<CallToolResult, rmcp::ErrorData> {
        json_result(&Catalog::schema())
    }

    #[tool(
        description = "Re-read the catalog file after it was edited. Command ids are assigned \
        afresh, so list_commands again afterwards. Running and finished tasks are kept."
    )]
    async fn reload_commands(&self) -> Result<CallToolResult, rmcp::ErrorData> {
        let registry = Arc::clone(&self.registry);
        let catalog = tokio::task::spawn_blocking(move || registry.reload())
            .await
            .map_err(mcp_err)?
            .map_err(registry_err)?;
        json_result(&ReloadResult {
            source: catalog.source().display().to_string(),
            commands: catalog.commands().len(),
        })
    }

    #[tool(
        description = "Start a script as a background task and return its task id without \
        waiting for it to finish. Parameters are validated against the command's definitions \
        first. Follow progress with task_status and task_log."
    )]
    async fn execute_command(
        &self,
        Parameters(params): Parameters<ExecuteCommandParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let registry = Arc::clone(&self.registry);
        let result = tokio::task::spawn_blocking(move || {
            let values = params.params.unwrap_or_default();
            let task_id = registry.execute(params.command_id, &values)?;
            Ok::<_, RegistryError>(ExecuteResult {
                task_id,
                status: registry.status(task_id)?,
            })
        })
        .await
        .map_err(mcp_err)?
        .map_err(registry_err)?;
        json_result(&result)
    }

    #[tool(
        description = "Return a task's status: PRE (not started), RUNNING, FINISH (exited on \
        its own, see exitCode) or TERMINATED (stopped), together with its command line, log \
        file and timestamps."
    )]
    async fn task_status(
        &self,
        Parameters(params): Parameters<TaskParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let registry = Arc::clone(&self.registry);
        let summary = tokio::task::spawn_blocking(move || registry.task(params.task_id))
            .await
            .map_err(mcp_err)?
            .map_err(registry_err)?;
        json_result(&summary)
    }

    #[tool(
        description = "Read a task's combined stdout and stderr. Returns the text from \
        `offset` and the offset to pass next time, so a running task can be followed \
        incrementally."
    )]
    async fn task_log(
        &self,
        Parameters(params): Parameters<TaskLogParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let registry = Arc::clone(&self.registry);
        let offset = params.offset.unwrap_or(0);
        let bytes = tokio::task::spawn_blocking(move || {
            registry.log(params.task_id, offset, params.max_bytes)
        })
        .await
        .map_err(mcp_err)?
        .map_err(registry_err)?;
        json_result(&LogResult {
            task_id: params.task_id,
            offset,
            next_offset: offset + bytes.len() as u64,
            content: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    #[tool(
        description = "List all tasks with their status, ordered by task id. `lastUpdate` \
        changes whenever a task is created or deleted or the catalog is reloaded."
    )]
    async fn list_tasks(&self) -> Result<CallToolResult, rmcp::ErrorData> {
        let registry = Arc::clone(&self.registry);
        let list = tokio::task::spawn_blocking(move || registry.list())
            .await
            .map_err(mcp_err)?;
        json_result(&list)
    }

    #[tool(
        description = "Forget a task that is no longer running. Its log file is kept on disk. \
        Running tasks must be stopped first."
    )]
    async fn delete_task(
        &self,
        Parameters(params): Parameters<TaskParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let registry = Arc::clone(&self.registry);
        tokio::task::spawn_blocking(move || registry.delete(params.task_id))
            .await
            .map_err(mcp_err)?
            .map_err(registry_err)?;
        json_result(&DeleteResult {
            task_id: params.task_id,
            deleted: true,
        })
    }

    #[tool(
        description = "Stop a running task. The process is asked to exit and killed if it is \
        still alive after a grace period; with `force` it is killed immediately. The task \
        ends up TERMINATED."
    )]
    async fn stop_task(
        &self,
        Parameters(params): Parameters<StopTaskParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let registry = Arc::clone(&self.registry);
        let force = params.force.unwrap_or(false);
        let status = tokio::task::spawn_blocking(move || {
            registry.stop(params.task_id, force)?;
            registry.status(params.task_id)
        })
        .await
        .map_err(mcp_err)?
        .map_err(registry_err)?;
        json_result(&StatusResult {
            task_id: params.task_id,
            status,
        })
    }
}

#[tool_handler]
impl ServerHandler for TaskdeckMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Taskdeck runs scripts from a catalog as background tasks. Recommended \
                workflow: (1) call list_commands to find a command id and its parameters, \
                (2) start it with execute_command, (3) poll task_status and read output with \
                task_log until the status is FINISH or TERMINATED, (4) use stop_task to end a \
                task early and delete_task to forget finished ones."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Start the MCP server over stdio. Tasks keep running when the client
/// disconnects.
///
/// # Errors
///
/// Returns an error if the MCP transport fails.
pub async fn run(registry: Arc<TaskRegistry>) -> Result<(), Box<dyn std::error::Error>> {
    let server = TaskdeckMcp::new(registry);
    let service = server.serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}
