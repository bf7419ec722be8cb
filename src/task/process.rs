use std::fs::File;
use std::io;
use std::process::{Child, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Spawn `program` with stdout and stderr appended to `log`.
pub(crate) fn spawn(
    program: &str,
    args: &[String],
    log: &File,
    new_console: bool,
) -> io::Result<Child> {
    debug!("Spawning {program} {args:?}");
    let mut command = std::process::Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(log.try_clone()?)
        .stderr(log.try_clone()?);
    configure_console(&mut command, new_console);
    command.spawn()
}

#[cfg(windows)]
fn configure_console(command: &mut std::process::Command, new_console: bool) {
    use std::os::windows::process::CommandExt;

    const CREATE_NEW_CONSOLE: u32 = 0x0000_0010;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    command.creation_flags(if new_console {
        CREATE_NEW_CONSOLE
    } else {
        CREATE_NO_WINDOW
    });
}

#[cfg(not(windows))]
fn configure_console(_command: &mut std::process::Command, new_console: bool) {
    if new_console {
        debug!("Ignoring newconsole: only supported on Windows");
    }
}

/// Ask the process to exit on its own.
#[cfg(unix)]
fn request_exit(child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let pid = i32::try_from(child.id())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(io::Error::from)
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child) -> io::Result<()> {
    child.kill()
}

/// Stop a child process and reap it.
///
/// Unless `force` is set the process gets a termination request and up to
/// `grace` to exit before it is killed. A failed request goes straight to
/// the kill.
pub(crate) fn terminate(mut child: Child, grace: Duration, force: bool) -> io::Result<ExitStatus> {
    if !force {
        match request_exit(&mut child) {
            Ok(()) => {
                if let Some(status) = wait_for_exit(&mut child, grace)? {
                    return Ok(status);
                }
                warn!(
                    "Process {} still running after {}ms, killing",
                    child.id(),
                    grace.as_millis()
                );
            }
            Err(e) => warn!("Termination request to process {} failed: {e}", child.id()),
        }
    }
    child.kill()?;
    child.wait()
}

fn wait_for_exit(child: &mut Child, grace: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + grace;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}
