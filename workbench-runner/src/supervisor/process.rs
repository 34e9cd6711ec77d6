//! Platform process handling
//!
//! The model runs in its own process group on unix so that a cancel can
//! reach every process it started, and so that the launching terminal's
//! job-control signals do not reach it.

use std::ffi::OsString;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::error::{SupervisorError, SupervisorResult};

/// Spawns the model with piped output streams
///
/// `argv[0]` is the executable. The child is not killed when its handle is
/// dropped; it is owned by the run task until it exits.
pub(crate) fn spawn_model(argv: &[OsString]) -> std::io::Result<Child> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command line"))?;

    debug!("Spawning {:?}", argv);
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    command.process_group(0);

    command.spawn()
}

/// Terminates the process tree rooted at `pid`
#[cfg(unix)]
pub(crate) async fn terminate_tree(pid: u32) -> SupervisorResult<()> {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| SupervisorError::Terminate {
        pid,
        message: "pid out of range".to_string(),
    })?;

    info!("Sending SIGTERM to process group {}", raw);
    killpg(Pid::from_raw(raw), Signal::SIGTERM).map_err(|e| SupervisorError::Terminate {
        pid,
        message: e.to_string(),
    })
}

/// Terminates the process tree rooted at `pid`
#[cfg(windows)]
pub(crate) async fn terminate_tree(pid: u32) -> SupervisorResult<()> {
    info!("Killing process tree {} with taskkill", pid);
    let output = Command::new("taskkill")
        .args(["/pid", &pid.to_string(), "/t", "/f"])
        .output()
        .await
        .map_err(|e| SupervisorError::Terminate {
            pid,
            message: e.to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("taskkill exited with {}: {}", output.status, stderr.trim());
        return Err(SupervisorError::Terminate {
            pid,
            message: stderr.trim().to_string(),
        });
    }
    Ok(())
}
