//! Settings file handling for taskdeck

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::commands::command::ScriptKind;
use crate::task::DEFAULT_STOP_GRACE;

/// Errors that can occur while loading settings
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("No settings file found in current directory or its parents: {0}")]
    SettingsNotFound(PathBuf),
    #[error("Unknown working directory: {0}")]
    UnknownWorkingDirectory(String),
    #[error("Unable to parse YAML settings file {path}: {source}")]
    Yaml {
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("Unable to parse JSON settings file {path}: {source}")]
    Json {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("No catalog configured; pass --catalog or set `catalog` in a settings file")]
    NoCatalog,
}

fn default_stop_grace_secs() -> u64 {
    DEFAULT_STOP_GRACE.as_secs()
}

/// Host settings; every field is optional
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Catalog source file
    #[serde(default)]
    pub catalog: Option<PathBuf>,
    /// Directory for task log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Program replacing a script kind's default interpreter
    #[serde(default)]
    pub interpreters: HashMap<ScriptKind, String>,
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            catalog: None,
            log_dir: None,
            interpreters: HashMap::new(),
            stop_grace_secs: default_stop_grace_secs(),
        }
    }
}

/// List of supported settings file names
const FILENAMES: [&str; 3] = [".taskdeck.json", ".taskdeck.yaml", ".taskdeck.yml"];

impl Settings {
    /// Loads and parses a settings file, resolving relative paths against
    /// the file's directory.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::SettingsNotFound` if the file cannot be read, or
    /// `SettingsError::Yaml`/`SettingsError::Json` if parsing fails.
    pub fn from_file(file: &Path) -> Result<Settings, SettingsError> {
        let contents = std::fs::read_to_string(file)
            .map_err(|_| SettingsError::SettingsNotFound(file.to_path_buf()))?;
        let mut settings: Settings = if file.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&contents).map_err(|e| SettingsError::Json {
                source: e,
                path: file.to_path_buf(),
            })?
        } else {
            serde_yaml::from_str(&contents).map_err(|e| SettingsError::Yaml {
                source: e,
                path: file.to_path_buf(),
            })?
        };
        if let Some(base) = file.parent() {
            settings.resolve_relative_to(base);
        }
        Ok(settings)
    }

    /// Searches for a settings file in the current directory and its parents.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::UnknownWorkingDirectory` if the cwd cannot be determined,
    /// or `SettingsError::SettingsNotFound` if no settings file is found.
    pub fn find_settings() -> Result<PathBuf, SettingsError> {
        let cwd = std::env::current_dir()
            .map_err(|e| SettingsError::UnknownWorkingDirectory(e.to_string()))?;
        Self::find_settings_from(&cwd)
    }

    fn find_settings_from(start: &Path) -> Result<PathBuf, SettingsError> {
        let mut path = start.to_path_buf();
        debug!("Searching for settings file in {}", start.display());
        loop {
            for file in &FILENAMES {
                let settings_path = path.join(file);
                if settings_path.exists() {
                    info!("Found settings file: {}", settings_path.display());
                    return Ok(settings_path);
                }
            }
            if !path.pop() {
                return Err(SettingsError::SettingsNotFound(start.to_path_buf()));
            }
        }
    }

    /// Load the named settings file, or the nearest one found by searching
    /// upwards, or defaults when there is none.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if a named file is missing or any file fails
    /// to parse.
    pub fn load(file: Option<&Path>) -> Result<Settings, SettingsError> {
        match file {
            Some(file) => Self::from_file(file),
            None => match Self::find_settings() {
                Ok(found) => Self::from_file(&found),
                Err(SettingsError::SettingsNotFound(_)) => {
                    debug!("No settings file found, using defaults");
                    Ok(Settings::default())
                }
                Err(e) => Err(e),
            },
        }
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        if let Some(catalog) = self.catalog.as_mut() {
            resolve(catalog);
        }
        if let Some(log_dir) = self.log_dir.as_mut() {
            resolve(log_dir);
        }
    }

    /// The configured catalog file.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::NoCatalog` when none is configured.
    pub fn catalog(&self) -> Result<&Path, SettingsError> {
        self.catalog.as_deref().ok_or(SettingsError::NoCatalog)
    }

    /// The configured log directory, or `<temp>/taskdeck/logs`.
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("taskdeck").join("logs"))
    }

    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}
