use std::path::Path;
use std::time::{Duration, Instant};

use taskdeck::catalog_file::CatalogError;
use taskdeck::commands::parameter::{ExecuteParams, ParamValue, ValidationError};
use taskdeck::load_registry;
use taskdeck::registry::{RegistryError, TaskRegistry};
use taskdeck::settings::Settings;
use taskdeck::task::{TaskId, TaskStatus};

fn write_catalog(dir: &Path, content: &str) {
    std::fs::write(dir.join("catalog.json"), content).unwrap();
}

fn write_settings(dir: &Path) {
    std::fs::write(
        dir.join(".taskdeck.yaml"),
        "catalog: catalog.json\nlog_dir: logs\nstop_grace_secs: 1\n",
    )
    .unwrap();
}

fn registry(dir: &Path) -> TaskRegistry {
    let settings = Settings::from_file(&dir.join(".taskdeck.yaml")).unwrap();
    load_registry(&settings).unwrap()
}

fn wait_for(registry: &TaskRegistry, task_id: TaskId, status: TaskStatus) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while registry.status(task_id).unwrap() != status {
        assert!(Instant::now() < deadline, "task {task_id} never reached {status}");
        std::thread::sleep(Duration::from_millis(20));
    }
}

fn params(entries: &[(&str, ParamValue)]) -> ExecuteParams {
    entries
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

const CATALOG: &str = r#"[
    {"type": "scriptgroup", "name": "release", "label": "Release", "children": [
        {"type": "shell", "name": "build", "label": "Build", "path": "scripts/build.sh",
         "parameters": [
            {"type": "select", "name": "targets", "label": "Targets", "multiple": true,
             "options": [{"label": "Linux", "value": "linux"}, {"label": "Mac", "value": "mac"}]},
            {"type": "switch", "name": "--verbose", "label": "Verbose"}
         ]},
        {"type": "shell", "name": "wait", "label": "Wait", "path": "scripts/wait.sh"}
    ]},
    {"type": "shell", "name": "fail", "label": "Fail", "path": "scripts/fail.sh"}
]"#;

fn setup() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let scripts = dir.path().join("scripts");
    std::fs::create_dir_all(&scripts).unwrap();
    std::fs::write(scripts.join("build.sh"), "echo \"args: $*\"\n").unwrap();
    std::fs::write(scripts.join("wait.sh"), "sleep 5\n").unwrap();
    std::fs::write(scripts.join("fail.sh"), "echo broken >&2\nexit 2\n").unwrap();
    write_catalog(dir.path(), CATALOG);
    write_settings(dir.path());
    dir
}

#[test]
fn test_load_from_settings() {
    let dir = setup();
    let registry = registry(dir.path());
    let catalog = registry.catalog();
    let names: Vec<String> = catalog
        .commands()
        .into_iter()
        .map(|(_, cmd)| cmd.name.clone())
        .collect();
    assert_eq!(names, vec!["build", "wait", "fail"]);
    assert_eq!(
        catalog.find_command(2).unwrap().path,
        dir.path().join("scripts").join("build.sh")
    );
    assert!(dir.path().join("logs").is_dir());
}

#[test]
fn test_duplicate_explicit_ids_rejected() {
    let dir = setup();
    write_catalog(
        dir.path(),
        r#"[
            {"type": "shell", "id": 4, "name": "a", "label": "A", "path": "a.sh"},
            {"type": "shell", "id": 4, "name": "b", "label": "B", "path": "b.sh"}
        ]"#,
    );
    let settings = Settings::from_file(&dir.path().join(".taskdeck.yaml")).unwrap();
    match load_registry(&settings) {
        Err(taskdeck::LoadError::Catalog(CatalogError::DuplicateId(id))) => assert_eq!(id, 4),
        other => panic!("Expected DuplicateId, got: {other:?}"),
    }
}

#[test]
fn test_validation_errors() {
    let dir = setup();
    let registry = registry(dir.path());

    let missing = registry.execute(2, &params(&[("targets", vec!["linux"].into())]));
    match missing {
        Err(RegistryError::Validation(ValidationError::MissingParameter { name })) => {
            assert_eq!(name, "--verbose");
        }
        other => panic!("Expected MissingParameter, got: {other:?}"),
    }

    let invalid = registry.execute(
        2,
        &params(&[
            ("targets", vec!["linux", "windows"].into()),
            ("--verbose", false.into()),
        ]),
    );
    assert!(matches!(
        invalid,
        Err(RegistryError::Validation(ValidationError::InvalidValue { .. }))
    ));
    assert!(registry.list().tasks.is_empty());
}

#[cfg(unix)]
#[test]
fn test_execute_builds_command_line() {
    let dir = setup();
    let registry = registry(dir.path());
    let task_id = registry
        .execute(
            2,
            &params(&[
                ("targets", vec!["mac", "linux"].into()),
                ("--verbose", true.into()),
            ]),
        )
        .unwrap();
    wait_for(&registry, task_id, TaskStatus::Finish);

    let summary = registry.task(task_id).unwrap();
    assert_eq!(summary.argv[0], "sh");
    assert_eq!(summary.exit_code, Some(0));
    assert_eq!(
        registry.log(task_id, 0, None).unwrap(),
        b"args: mac linux --verbose\n"
    );
}

#[cfg(unix)]
#[test]
fn test_failing_script_finishes_with_exit_code() {
    let dir = setup();
    let registry = registry(dir.path());
    let task_id = registry.execute(4, &ExecuteParams::new()).unwrap();
    wait_for(&registry, task_id, TaskStatus::Finish);
    let summary = registry.task(task_id).unwrap();
    assert_eq!(summary.exit_code, Some(2));
    assert_eq!(registry.log(task_id, 0, None).unwrap(), b"broken\n");
    assert!(matches!(
        registry.stop(task_id, false),
        Err(RegistryError::NotRunning {
            status: TaskStatus::Finish,
            ..
        })
    ));
}

#[cfg(unix)]
#[test]
fn test_undeclared_parameters_are_ignored() {
    let dir = setup();
    let registry = registry(dir.path());
    let task_id = registry
        .execute(4, &params(&[("extra", "x".into())]))
        .unwrap();
    wait_for(&registry, task_id, TaskStatus::Finish);
    assert_eq!(registry.task(task_id).unwrap().argv.len(), 2);
}

#[cfg(unix)]
#[test]
fn test_rapid_executes_get_distinct_ids_and_logs() {
    let dir = setup();
    let registry = registry(dir.path());
    let first = registry.execute(4, &ExecuteParams::new()).unwrap();
    let second = registry.execute(4, &ExecuteParams::new()).unwrap();
    assert_ne!(first, second);

    let list = registry.list();
    assert_eq!(list.tasks.len(), 2);
    assert_eq!(list.tasks[0].task_id, first);
    assert_eq!(list.tasks[1].task_id, second);
    assert_ne!(list.tasks[0].log_file, list.tasks[1].log_file);
}

#[cfg(unix)]
#[test]
fn test_delete_lifecycle() {
    let dir = setup();
    let registry = registry(dir.path());
    let task_id = registry.execute(3, &ExecuteParams::new()).unwrap();
    assert_eq!(registry.status(task_id).unwrap(), TaskStatus::Running);
    assert!(matches!(
        registry.delete(task_id),
        Err(RegistryError::StillRunning(_))
    ));

    registry.stop(task_id, false).unwrap();
    assert_eq!(registry.status(task_id).unwrap(), TaskStatus::Terminated);
    let before = registry.last_update();
    registry.delete(task_id).unwrap();
    assert!(registry.last_update() >= before);
    assert!(matches!(
        registry.status(task_id),
        Err(RegistryError::TaskNotFound(_))
    ));
}

#[cfg(unix)]
#[test]
fn test_reload_keeps_running_tasks() {
    let dir = setup();
    let registry = registry(dir.path());
    let task_id = registry.execute(3, &ExecuteParams::new()).unwrap();

    write_catalog(
        dir.path(),
        r#"[{"type": "shell", "name": "only", "label": "Only", "path": "scripts/fail.sh"}]"#,
    );
    let catalog = registry.reload().unwrap();
    assert_eq!(catalog.commands().len(), 1);
    assert_eq!(registry.task(task_id).unwrap().command_name, "wait");
    assert!(matches!(
        registry.execute(3, &ExecuteParams::new()),
        Err(RegistryError::CommandNotFound(3))
    ));

    registry.stop(task_id, true).unwrap();
    assert_eq!(registry.status(task_id).unwrap(), TaskStatus::Terminated);
}
