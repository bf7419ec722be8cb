//! Catalog hot-reload

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, Debouncer, RecommendedCache, new_debouncer};
use thiserror::Error;

use crate::registry::TaskRegistry;

const DEBOUNCE: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Error starting catalog watcher: {0}")]
    Watch(#[from] notify::Error),
    #[error("Catalog has no parent directory: {0}")]
    NoParent(PathBuf),
}

fn is_catalog_event(event: &notify::Event, catalog: &Path) -> bool {
    (event.kind.is_create() || event.kind.is_modify())
        && event.paths.iter().any(|path| path == catalog)
}

/// Reload the registry's catalog a second after its source file changes,
/// reading whatever the file holds by then. The watcher stops when the
/// returned handle is dropped.
///
/// The parent directory is watched rather than the file, so editors that
/// replace the file on save keep triggering reloads.
///
/// # Errors
///
/// Returns `WatchError` if the watcher cannot be started.
pub fn watch_catalog(
    registry: Arc<TaskRegistry>,
) -> Result<Debouncer<RecommendedWatcher, RecommendedCache>, WatchError> {
    let catalog = registry.catalog().source().to_path_buf();
    let dir = catalog
        .parent()
        .ok_or_else(|| WatchError::NoParent(catalog.clone()))?
        .to_path_buf();

    let watched = catalog.clone();
    let mut debouncer = new_debouncer(DEBOUNCE, None, move |res: DebounceEventResult| match res {
        Ok(events) => {
            if !events.iter().any(|event| is_catalog_event(event, &watched)) {
                return;
            }
            debug!("Catalog changed, {} events in batch", events.len());
            if let Err(e) = registry.reload() {
                error!("Catalog reload failed, keeping previous catalog: {e}");
            }
        }
        Err(errors) => {
            for e in errors {
                error!("Watch error: {e:?}");
            }
        }
    })?;
    debouncer.watch(&dir, RecursiveMode::NonRecursive)?;
    info!("Catalog watcher started for {}", catalog.display());
    Ok(debouncer)
}
