//! Helpers shared by everything that runs an external program.
//!
//! `CommandLine` is the value form of a command: it is what gets logged, what dry runs
//! report, and what the simulated runner records. `terminate` is the only place a child
//! process is stopped early.

use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// How long a child gets to exit after SIGTERM before it is killed.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl CommandLine {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.as_os_str())
    }

    /// Program followed by its arguments, all lossily converted for comparison and display.
    pub fn to_strings(&self) -> Vec<String> {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|s| s.to_string_lossy().into_owned())
            .collect()
    }

    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_strings().join(" "))
    }
}

/// Stop a running child: SIGTERM, wait up to `grace`, then SIGKILL. Always reaps it.
pub async fn terminate(child: &mut Child, grace: Duration) -> std::io::Result<()> {
    let Some(id) = child.id() else {
        // Already reaped.
        return Ok(());
    };

    debug!(pid = id, "Sending SIGTERM to child process");
    if let Err(e) = kill(Pid::from_raw(id as i32), Signal::SIGTERM) {
        warn!(pid = id, error = %e, "Failed to send SIGTERM");
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => {
            debug!(pid = id, status = ?status, "Child exited after SIGTERM");
            status.map(|_| ())
        }
        Err(_) => {
            warn!(pid = id, "Child ignored SIGTERM, killing");
            child.kill().await
        }
    }
}
