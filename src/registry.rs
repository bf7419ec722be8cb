//! Concurrent registry of tasks
//!
//! The registry owns the current catalog, the builders and every task that
//! has not been deleted. It is shared behind an `Arc` by all transports.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::builder::{BuilderError, BuilderRegistry};
use crate::catalog::Catalog;
use crate::catalog_file::CatalogError;
use crate::commands::ids::NodeId;
use crate::commands::parameter::{ExecuteParams, ValidationError, validate};
use crate::task::log::log_file_name;
use crate::task::{
    DEFAULT_STOP_GRACE, Task, TaskError, TaskId, TaskIdSource, TaskStatus, TaskSummary,
};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Command not found: {0}")]
    CommandNotFound(NodeId),
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),
    #[error(transparent)]
    UnsupportedKind(#[from] BuilderError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Task {0} is still running")]
    StillRunning(TaskId),
    #[error("Task {task_id} is not running ({status})")]
    NotRunning { task_id: TaskId, status: TaskStatus },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error("Unable to create log directory {path}: {source}")]
    LogDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Snapshot of all tasks, ordered by task ID
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskList {
    pub last_update: DateTime<Utc>,
    pub tasks: Vec<TaskSummary>,
}

#[derive(Debug)]
pub struct TaskRegistry {
    catalog: RwLock<Arc<Catalog>>,
    builders: BuilderRegistry,
    tasks: Mutex<HashMap<TaskId, Arc<Task>>>,
    ids: TaskIdSource,
    log_dir: PathBuf,
    last_update: Mutex<DateTime<Utc>>,
    stop_grace: Duration,
}

impl TaskRegistry {
    /// Create a registry writing task logs into `log_dir`, which is created
    /// if needed.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::LogDir` if the directory cannot be created.
    pub fn new(
        catalog: Catalog,
        builders: BuilderRegistry,
        log_dir: &Path,
    ) -> Result<Self, RegistryError> {
        std::fs::create_dir_all(log_dir).map_err(|e| RegistryError::LogDir {
            path: log_dir.to_path_buf(),
            source: e,
        })?;
        debug!(
            "Task registry ready (logs: {}, builders: {builders:?})",
            log_dir.display()
        );
        Ok(Self {
            catalog: RwLock::new(Arc::new(catalog)),
            builders,
            tasks: Mutex::new(HashMap::new()),
            ids: TaskIdSource::new(),
            log_dir: log_dir.to_path_buf(),
            last_update: Mutex::new(Utc::now()),
            stop_grace: DEFAULT_STOP_GRACE,
        })
    }

    /// How long `stop` waits for a graceful exit before killing.
    #[must_use]
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    #[must_use]
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// The current catalog. Callers keep a consistent snapshot even if a
    /// reload happens meanwhile.
    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog.read())
    }

    /// Re-read the catalog source and swap it in. Existing tasks keep the
    /// command they were started from.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Catalog` if the source no longer loads; the
    /// previous catalog stays in place.
    pub fn reload(&self) -> Result<Arc<Catalog>, RegistryError> {
        let fresh = Arc::new(self.catalog().reload()?);
        *self.catalog.write() = Arc::clone(&fresh);
        self.touch();
        info!("Catalog reloaded from {}", fresh.source().display());
        Ok(fresh)
    }

    /// Validate `params`, build the command line and start a new task.
    ///
    /// # Errors
    ///
    /// Returns `CommandNotFound`, `UnsupportedKind` or `Validation` before
    /// anything is created, and `Task` errors if the script is missing, the
    /// log file is taken or the process cannot be spawned. A task that fails
    /// to start is not kept.
    pub fn execute(
        &self,
        command_id: NodeId,
        params: &ExecuteParams,
    ) -> Result<TaskId, RegistryError> {
        let command = self
            .catalog()
            .find_command(command_id)
            .ok_or(RegistryError::CommandNotFound(command_id))?;
        let builder = self.builders.get(command.kind)?;
        validate(&command.parameters, params)?;
        if !command.path.is_file() {
            return Err(TaskError::ScriptNotFound(command.path.clone()).into());
        }
        let argv = builder.build(&command, params);

        let task_id = self.ids.next_id();
        let log_path = self.log_dir.join(log_file_name(&command, task_id));
        let task = Task::new(task_id, command, argv, log_path)?;
        task.execute()?;
        self.tasks.lock().insert(task_id, Arc::new(task));
        self.touch();
        Ok(task_id)
    }

    fn get(&self, task_id: TaskId) -> Result<Arc<Task>, RegistryError> {
        self.tasks
            .lock()
            .get(&task_id)
            .cloned()
            .ok_or(RegistryError::TaskNotFound(task_id))
    }

    /// # Errors
    ///
    /// Returns `RegistryError::TaskNotFound` for unknown IDs.
    pub fn status(&self, task_id: TaskId) -> Result<TaskStatus, RegistryError> {
        Ok(self.get(task_id)?.status())
    }

    /// Full status, exit code and timing of one task.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::TaskNotFound` for unknown IDs.
    pub fn task(&self, task_id: TaskId) -> Result<TaskSummary, RegistryError> {
        Ok(self.get(task_id)?.summary())
    }

    /// Read a task's output from `offset`, up to `max_bytes`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::TaskNotFound` for unknown IDs and
    /// `RegistryError::Task` on I/O errors.
    pub fn log(
        &self,
        task_id: TaskId,
        offset: u64,
        max_bytes: Option<u64>,
    ) -> Result<Vec<u8>, RegistryError> {
        Ok(self.get(task_id)?.read_log(offset, max_bytes)?)
    }

    /// Forget a task that is no longer running. Its log file stays on disk.
    ///
    /// # Errors
    ///
    /// Returns `TaskNotFound` for unknown IDs and `StillRunning` while the
    /// process is alive.
    pub fn delete(&self, task_id: TaskId) -> Result<(), RegistryError> {
        let mut tasks = self.tasks.lock();
        let task = tasks
            .get(&task_id)
            .ok_or(RegistryError::TaskNotFound(task_id))?;
        if task.status() == TaskStatus::Running {
            return Err(RegistryError::StillRunning(task_id));
        }
        tasks.remove(&task_id);
        drop(tasks);
        self.touch();
        info!("Task {task_id} deleted");
        Ok(())
    }

    /// Stop a running task; see [`Task::stop`].
    ///
    /// # Errors
    ///
    /// Returns `TaskNotFound` for unknown IDs and `NotRunning` if the task is
    /// not RUNNING.
    pub fn stop(&self, task_id: TaskId, force: bool) -> Result<(), RegistryError> {
        let task = self.get(task_id)?;
        task.stop(force, self.stop_grace).map_err(|e| match e {
            TaskError::IllegalTransition { current, .. } => RegistryError::NotRunning {
                task_id,
                status: current,
            },
            other => other.into(),
        })
    }

    /// Summaries of all known tasks, ordered by task ID.
    pub fn list(&self) -> TaskList {
        let tasks: Vec<Arc<Task>> = self.tasks.lock().values().cloned().collect();
        let mut tasks: Vec<TaskSummary> = tasks.iter().map(|task| task.summary()).collect();
        tasks.sort_by_key(|summary| summary.task_id);
        TaskList {
            last_update: self.last_update(),
            tasks,
        }
    }

    /// Time of the last task creation, deletion or catalog reload.
    pub fn last_update(&self) -> DateTime<Utc> {
        *self.last_update.lock()
    }

    fn touch(&self) {
        *self.last_update.lock() = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::command::ScriptKind;

    const CATALOG: &str = r#"[
        {"type": "scriptgroup", "name": "ops", "label": "Ops", "children": [
            {"type": "shell", "name": "greet", "label": "Greet", "path": "greet.sh",
             "parameters": [
                {"type": "input", "name": "who", "label": "Who", "required": true}
             ]},
            {"type": "shell", "name": "missing", "label": "Missing", "path": "missing.sh"}
        ]}
    ]"#;

    fn registry(dir: &Path) -> TaskRegistry {
        std::fs::write(dir.join("greet.sh"), "echo \"hello $1\"\n").unwrap();
        let source = dir.join("catalog.json");
        std::fs::write(&source, CATALOG).unwrap();
        TaskRegistry::new(
            Catalog::load(&source).unwrap(),
            BuilderRegistry::default(),
            &dir.join("logs"),
        )
        .unwrap()
    }

    fn who(value: &str) -> ExecuteParams {
        ExecuteParams::from([("who".to_string(), value.into())])
    }

    #[test]
    fn test_unknown_command() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        assert!(matches!(
            registry.execute(99, &ExecuteParams::new()),
            Err(RegistryError::CommandNotFound(99))
        ));
        assert!(matches!(
            registry.execute(1, &ExecuteParams::new()),
            Err(RegistryError::CommandNotFound(1))
        ));
    }

    #[test]
    fn test_validation_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let before = registry.last_update();
        assert!(matches!(
            registry.execute(2, &ExecuteParams::new()),
            Err(RegistryError::Validation(ValidationError::MissingParameter { .. }))
        ));
        assert!(registry.list().tasks.is_empty());
        assert_eq!(registry.last_update(), before);
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_spawn_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("greet.sh"), "echo \"hello $1\"\n").unwrap();
        let source = dir.path().join("catalog.json");
        std::fs::write(&source, CATALOG).unwrap();
        let interpreters = HashMap::from([(ScriptKind::Shell, "/nonexistent/bin/sh".to_string())]);
        let registry = TaskRegistry::new(
            Catalog::load(&source).unwrap(),
            BuilderRegistry::with_defaults(&interpreters),
            &dir.path().join("logs"),
        )
        .unwrap();
        let before = registry.last_update();

        assert!(matches!(
            registry.execute(2, &who("world")),
            Err(RegistryError::Task(TaskError::Spawn { .. }))
        ));
        assert!(registry.list().tasks.is_empty());
        assert_eq!(registry.last_update(), before);
        assert_eq!(std::fs::read_dir(dir.path().join("logs")).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_script() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        assert!(matches!(
            registry.execute(3, &ExecuteParams::new()),
            Err(RegistryError::Task(TaskError::ScriptNotFound(_)))
        ));
    }

    #[test]
    fn test_unknown_task() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let id = TaskId(7);
        assert!(matches!(registry.status(id), Err(RegistryError::TaskNotFound(_))));
        assert!(matches!(registry.log(id, 0, None), Err(RegistryError::TaskNotFound(_))));
        assert!(matches!(registry.delete(id), Err(RegistryError::TaskNotFound(_))));
        assert!(matches!(registry.stop(id, true), Err(RegistryError::TaskNotFound(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_execute_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let task_id = registry.execute(2, &who("world")).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while registry.status(task_id).unwrap() != TaskStatus::Finish {
            assert!(std::time::Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(registry.log(task_id, 0, None).unwrap(), b"hello world\n");
        let summary = registry.task(task_id).unwrap();
        assert_eq!(summary.exit_code, Some(0));
        assert_eq!(summary.command_name, "greet");

        registry.delete(task_id).unwrap();
        assert!(matches!(
            registry.status(task_id),
            Err(RegistryError::TaskNotFound(_))
        ));
        assert!(summary.log_file.exists());
    }

    #[test]
    fn test_reload_keeps_tasks_and_bumps_update() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let before = registry.last_update();
        std::thread::sleep(Duration::from_millis(5));
        let catalog = registry.reload().unwrap();
        assert_eq!(catalog.commands().len(), 2);
        assert!(registry.last_update() > before);
    }

    #[test]
    fn test_failed_reload_keeps_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        std::fs::write(dir.path().join("catalog.json"), "not json").unwrap();
        assert!(matches!(registry.reload(), Err(RegistryError::Catalog(_))));
        assert!(registry.catalog().find_command(2).is_some());
    }
}
