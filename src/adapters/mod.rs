use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::process::CommandLine;

#[cfg(target_os = "linux")]
mod linux;
mod simulated;

#[cfg(target_os = "linux")]
pub use linux::{ProcMounts, SystemRunner, parse_mount_points};
pub use simulated::{SimulatedMountTable, SimulatedRunner};

/// How an external command finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Exited { code: Option<i32>, stderr: String },
    Cancelled,
}

impl RunOutcome {
    pub fn success() -> Self {
        Self::Exited {
            code: Some(0),
            stderr: String::new(),
        }
    }
}

/// Runs one external command to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, cmd: &CommandLine, cancel: &CancellationToken)
    -> std::io::Result<RunOutcome>;
}

/// Read access to the live table of mounted filesystems.
pub trait MountTable: Send + Sync {
    fn is_mounted(&self, path: &Path) -> std::io::Result<bool>;
}

pub fn get_runner(simulation: bool) -> Arc<dyn CommandRunner> {
    if simulation {
        return Arc::new(SimulatedRunner::default());
    }

    #[cfg(target_os = "linux")]
    {
        return Arc::new(SystemRunner);
    }

    #[cfg(not(target_os = "linux"))]
    {
        return Arc::new(SimulatedRunner::default());
    }
}

pub fn get_mount_table(simulation: bool) -> Arc<dyn MountTable> {
    if simulation {
        return Arc::new(SimulatedMountTable::default());
    }

    #[cfg(target_os = "linux")]
    {
        return Arc::new(ProcMounts::default());
    }

    #[cfg(not(target_os = "linux"))]
    {
        return Arc::new(SimulatedMountTable::default());
    }
}
