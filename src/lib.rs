//! Core implementation of the taskdeck script runner
//!
//! Taskdeck loads a catalog of script definitions (PowerShell, Python or shell
//! scripts with typed parameters, arranged in groups), validates parameters
//! for a chosen script, runs it as a background process with its output
//! captured to a log file, and tracks each run as a task whose status and
//! output can be polled.

use log::debug;
use thiserror::Error;

use crate::builder::BuilderRegistry;
use crate::catalog::Catalog;
use crate::catalog_file::CatalogError;
use crate::registry::{RegistryError, TaskRegistry};
use crate::settings::{Settings, SettingsError};

pub mod builder;
pub mod catalog;
pub mod catalog_file;
pub mod commands;
pub mod logger;
pub mod mcp;
pub mod registry;
pub mod settings;
pub mod task;
pub mod watch;

/// Errors that can occur while assembling a registry from settings
#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Load the configured catalog and build a task registry around it.
///
/// # Errors
///
/// Returns `LoadError` if no catalog is configured, the catalog does not
/// load, or the log directory cannot be created.
pub fn load_registry(settings: &Settings) -> Result<TaskRegistry, LoadError> {
    let catalog = Catalog::load(settings.catalog()?)?;
    let builders = BuilderRegistry::with_defaults(&settings.interpreters);
    let log_dir = settings.log_dir();
    debug!(
        "Creating registry from catalog {} (logs: {})",
        catalog.source().display(),
        log_dir.display()
    );
    Ok(TaskRegistry::new(catalog, builders, &log_dir)?.with_stop_grace(settings.stop_grace()))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_load_registry_requires_catalog() {
        assert!(matches!(
            load_registry(&Settings::default()),
            Err(LoadError::Settings(SettingsError::NoCatalog))
        ));
    }

    #[test]
    fn test_load_registry_from_settings() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = dir.path().join("catalog.json");
        std::fs::write(
            &catalog,
            r#"[{"type": "shell", "name": "a", "label": "A", "path": "a.sh"}]"#,
        )
        .unwrap();
        let settings = Settings {
            catalog: Some(catalog),
            log_dir: Some(dir.path().join("logs")),
            ..Settings::default()
        };
        let registry = load_registry(&settings).unwrap();
        assert_eq!(registry.catalog().commands().len(), 1);
        assert_eq!(registry.log_dir(), dir.path().join("logs"));
        assert!(dir.path().join("logs").is_dir());

        let missing = Settings {
            catalog: Some(PathBuf::from("/nonexistent/catalog.json")),
            ..settings
        };
        assert!(matches!(
            load_registry(&missing),
            Err(LoadError::Catalog(CatalogError::NotFound(_)))
        ));
    }
}
