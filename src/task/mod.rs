//! A single execution of a command
//!
//! A task owns its child process and the write end of its log file while it
//! runs. Status is pulled, not pushed: every status query polls the process
//! without blocking and performs the RUNNING → FINISH transition when the
//! child has exited.

pub mod log;
mod process;

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use ::log::{info, warn};
use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::commands::command::Command;
use crate::commands::ids::NodeId;

/// How long a stopped process gets to exit before it is killed
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Task is {current}, operation requires {required}")]
    IllegalTransition {
        current: TaskStatus,
        required: TaskStatus,
    },
    #[error("Log file already exists: {0}")]
    LogFileExists(PathBuf),
    #[error("Unable to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Script not found: {0}")]
    ScriptNotFound(PathBuf),
    #[error("Empty command line")]
    EmptyCommandLine,
    #[error("Unable to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Lifecycle of a task. `Finish` and `Terminated` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    /// Created, not started
    #[default]
    Pre,
    Running,
    /// The process exited on its own, with any exit code
    Finish,
    /// Stopped on request
    Terminated,
}

impl TaskStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Finish | TaskStatus::Terminated)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskStatus::Pre => "PRE",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Finish => "FINISH",
            TaskStatus::Terminated => "TERMINATED",
        })
    }
}

/// Identifier of a task, distinct from catalog node IDs
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of task IDs: the current time in microseconds, bumped when needed
/// so that every ID is strictly greater than the one before.
#[derive(Debug, Default)]
pub struct TaskIdSource {
    last: AtomicU64,
}

impl TaskIdSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> TaskId {
        let now = u64::try_from(Utc::now().timestamp_micros()).unwrap_or_default();
        let mut last = self.last.load(Ordering::Acquire);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return TaskId(candidate),
                Err(actual) => last = actual,
            }
        }
    }
}

#[derive(Debug)]
struct RunningProcess {
    child: Child,
    log: File,
}

#[derive(Debug, Default)]
struct TaskState {
    status: TaskStatus,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    exit_code: Option<i32>,
    /// Present exactly while RUNNING
    process: Option<RunningProcess>,
}

/// Point-in-time view of a task
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub task_id: TaskId,
    pub command_id: NodeId,
    pub command_name: String,
    pub status: TaskStatus,
    pub exit_code: Option<i32>,
    pub argv: Vec<String>,
    pub log_file: PathBuf,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// One execution of a command
#[derive(Debug)]
pub struct Task {
    id: TaskId,
    command: Arc<Command>,
    argv: Vec<String>,
    log_path: PathBuf,
    created_at: DateTime<Utc>,
    state: Mutex<TaskState>,
}

impl Task {
    /// Create a task in PRE state.
    ///
    /// # Errors
    ///
    /// Returns `TaskError::LogFileExists` if `log_path` is already taken and
    /// `TaskError::EmptyCommandLine` if `argv` is empty.
    pub fn new(
        id: TaskId,
        command: Arc<Command>,
        argv: Vec<String>,
        log_path: PathBuf,
    ) -> Result<Self, TaskError> {
        if argv.is_empty() {
            return Err(TaskError::EmptyCommandLine);
        }
        if log_path.exists() {
            return Err(TaskError::LogFileExists(log_path));
        }
        Ok(Self {
            id,
            command,
            argv,
            log_path,
            created_at: Utc::now(),
            state: Mutex::new(TaskState::default()),
        })
    }

    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    #[must_use]
    pub fn command(&self) -> &Arc<Command> {
        &self.command
    }

    #[must_use]
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Start the process: PRE → RUNNING. Does not wait for it.
    ///
    /// If the process cannot be spawned the task stays in PRE and the log
    /// file is removed again.
    ///
    /// # Errors
    ///
    /// Returns `TaskError::IllegalTransition` unless the task is PRE, and
    /// `LogFileExists`, `LogFile` or `Spawn` if starting fails.
    pub fn execute(&self) -> Result<(), TaskError> {
        let mut state = self.state.lock();
        if state.status != TaskStatus::Pre {
            return Err(TaskError::IllegalTransition {
                current: state.status,
                required: TaskStatus::Pre,
            });
        }

        let log = OpenOptions::new()
            .append(true)
            .create_new(true)
            .open(&self.log_path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    TaskError::LogFileExists(self.log_path.clone())
                } else {
                    TaskError::LogFile {
                        path: self.log_path.clone(),
                        source: e,
                    }
                }
            })?;

        let (program, args) = self
            .argv
            .split_first()
            .ok_or(TaskError::EmptyCommandLine)?;
        let child = match process::spawn(program, args, &log, self.command.new_console) {
            Ok(child) => child,
            Err(source) => {
                drop(log);
                if let Err(e) = std::fs::remove_file(&self.log_path) {
                    warn!("Unable to remove log file {}: {e}", self.log_path.display());
                }
                return Err(TaskError::Spawn {
                    program: program.clone(),
                    source,
                });
            }
        };

        info!(
            "Task {} started '{}' (pid {})",
            self.id,
            self.command.name,
            child.id()
        );
        state.status = TaskStatus::Running;
        state.started_at = Some(Utc::now());
        state.process = Some(RunningProcess { child, log });
        Ok(())
    }

    /// Non-blocking check for process exit; RUNNING → FINISH when it has.
    fn refresh(&self, state: &mut TaskState) {
        let Some(process) = state.process.as_mut() else {
            return;
        };
        match process.child.try_wait() {
            Ok(Some(exit)) => {
                info!(
                    "Task {} ('{}') finished: {exit}",
                    self.id, self.command.name
                );
                state.status = TaskStatus::Finish;
                state.ended_at = Some(Utc::now());
                state.exit_code = exit.code();
                state.process = None;
            }
            Ok(None) => {}
            Err(e) => warn!("Unable to poll task {}: {e}", self.id),
        }
    }

    /// Current status, polling the process first.
    pub fn status(&self) -> TaskStatus {
        let mut state = self.state.lock();
        self.refresh(&mut state);
        state.status
    }

    /// Exit code once the process has been reaped; `None` when killed by a
    /// signal or still running.
    pub fn exit_code(&self) -> Option<i32> {
        let mut state = self.state.lock();
        self.refresh(&mut state);
        state.exit_code
    }

    /// Stop the process: RUNNING → TERMINATED.
    ///
    /// The status changes and the log handle closes before the process is
    /// waited on, so the grace period never holds the task lock.
    ///
    /// # Errors
    ///
    /// Returns `TaskError::IllegalTransition` unless the task is RUNNING,
    /// including when the process exited just before the request.
    pub fn stop(&self, force: bool, grace: Duration) -> Result<(), TaskError> {
        let running = {
            let mut state = self.state.lock();
            self.refresh(&mut state);
            if state.status != TaskStatus::Running {
                return Err(TaskError::IllegalTransition {
                    current: state.status,
                    required: TaskStatus::Running,
                });
            }
            state.status = TaskStatus::Terminated;
            state.ended_at = Some(Utc::now());
            state.process.take()
        };

        if let Some(RunningProcess { child, log }) = running {
            drop(log);
            info!(
                "Stopping task {} ('{}'){}",
                self.id,
                self.command.name,
                if force { " forcefully" } else { "" }
            );
            match process::terminate(child, grace, force) {
                Ok(exit) => self.state.lock().exit_code = exit.code(),
                Err(e) => warn!("Unable to stop task {}: {e}", self.id),
            }
        }
        Ok(())
    }

    /// Read the task's output; see [`log::read_log`].
    ///
    /// # Errors
    ///
    /// Returns `TaskError::LogFile` on I/O errors other than a missing file.
    pub fn read_log(&self, offset: u64, max_bytes: Option<u64>) -> Result<Vec<u8>, TaskError> {
        log::read_log(&self.log_path, offset, max_bytes).map_err(|e| TaskError::LogFile {
            path: self.log_path.clone(),
            source: e,
        })
    }

    #[must_use]
    pub fn summary(&self) -> TaskSummary {
        let mut state = self.state.lock();
        self.refresh(&mut state);
        TaskSummary {
            task_id: self.id,
            command_id: self.command.id,
            command_name: self.command.name.clone(),
            status: state.status,
            exit_code: state.exit_code,
            argv: self.argv.clone(),
            log_file: self.log_path.clone(),
            created_at: self.created_at,
            started_at: state.started_at,
            ended_at: state.ended_at,
        }
    }
}
