use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use log::debug;

use crate::commands::command::Command;
use crate::task::TaskId;

/// File name for a task's log: command ID, command name and task ID.
///
/// Task IDs are unique microsecond timestamps, so two executions of the same
/// command never share a name.
#[must_use]
pub fn log_file_name(command: &Command, task_id: TaskId) -> String {
    let name: String = command
        .name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}-{name}-{task_id}.log", command.id)
}

/// Read up to `max_bytes` (everything when `None`) starting at `offset`.
///
/// A missing file or an offset past the end reads as empty.
///
/// # Errors
///
/// Returns any I/O error other than the file not existing.
pub fn read_log(path: &Path, offset: u64, max_bytes: Option<u64>) -> io::Result<Vec<u8>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("Log file not found: {}", path.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };
    if offset >= file.metadata()?.len() {
        return Ok(Vec::new());
    }
    file.seek(SeekFrom::Start(offset))?;

    let mut buf = Vec::new();
    match max_bytes {
        Some(max) => file.take(max).read_to_end(&mut buf)?,
        None => file.read_to_end(&mut buf)?,
    };
    Ok(buf)
}
